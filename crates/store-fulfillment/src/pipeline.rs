//! Order Fulfillment
//!
//! Turns a verified payment event into a delivered license key:
//! metadata extraction, license issuance, email notification.
//!
//! A license minted but not emailed is still a fulfilled order; the key
//! must not be silently lost by failing the whole request after the
//! irreversible issuance step. Duplicate redelivery of the same event
//! re-runs the pipeline and mints a second, independent key; there is no
//! deduplication by session id.

use std::collections::HashMap;
use std::sync::Arc;

use store_payments::PaymentEvent;

use crate::email::{LicenseEmail, Mailer};
use crate::error::{FulfillmentError, Result};
use crate::license::{LicenseIssuer, LicenseKey};

/// Metadata key carrying the product name on a checkout session.
const META_PRODUCT_NAME: &str = "productName";

/// Metadata key carrying the access tier on a checkout session.
const META_ACCESS_LEVEL: &str = "accessLevel";

/// Outcome of processing one verified payment event
#[derive(Clone, Debug)]
pub enum FulfillmentOutcome {
    /// Event verified but not relevant to fulfillment; acknowledged only
    Ignored { event_type: String },

    /// License minted (and, when possible, delivered)
    Fulfilled(FulfillmentReport),
}

/// Terminal record of a fulfilled order
#[derive(Clone, Debug)]
pub struct FulfillmentReport {
    /// Checkout session that paid for the license
    pub session_id: String,

    /// The minted key
    pub license_key: LicenseKey,

    /// Buyer address the key was (or should have been) sent to
    pub customer_email: String,

    /// Product the license unlocks
    pub product_name: String,

    /// Whether the notification email actually went out
    pub email_delivered: bool,
}

/// Buyer and order data extracted from a completed checkout event
#[derive(Debug)]
struct OrderDetails {
    customer_email: String,
    access_level: String,
    product_name: String,
}

impl OrderDetails {
    /// Extract required order data, naming every absent field at once.
    fn from_event(
        customer_email: Option<String>,
        metadata: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut missing = Vec::new();

        let customer_email = customer_email.filter(|e| !e.is_empty());
        if customer_email.is_none() {
            missing.push("customerEmail");
        }

        let access_level = metadata
            .get(META_ACCESS_LEVEL)
            .filter(|v| !v.is_empty())
            .cloned();
        if access_level.is_none() {
            missing.push(META_ACCESS_LEVEL);
        }

        let product_name = metadata
            .get(META_PRODUCT_NAME)
            .filter(|v| !v.is_empty())
            .cloned();
        if product_name.is_none() {
            missing.push(META_PRODUCT_NAME);
        }

        if !missing.is_empty() {
            return Err(FulfillmentError::MissingMetadata { fields: missing });
        }

        Ok(Self {
            customer_email: customer_email.unwrap_or_default(),
            access_level: access_level.unwrap_or_default(),
            product_name: product_name.unwrap_or_default(),
        })
    }
}

/// The order fulfillment pipeline
///
/// Generic over its two provider seams so tests can substitute mocks.
pub struct OrderFulfillment<I, M> {
    issuer: Arc<I>,
    mailer: Arc<M>,
}

impl<I: LicenseIssuer, M: Mailer> OrderFulfillment<I, M> {
    pub fn new(issuer: Arc<I>, mailer: Arc<M>) -> Self {
        Self { issuer, mailer }
    }

    /// Process one verified payment event.
    ///
    /// Event types other than a completed checkout are acknowledged
    /// without touching the issuer or the mailer. For completed checkouts
    /// the steps are: extract order data, mint a license, email it.
    /// Issuance failure is terminal; email failure is not (see
    /// [`conclude`]).
    pub async fn process(&self, event: PaymentEvent) -> Result<FulfillmentOutcome> {
        let (session_id, customer_email, metadata, payment_status) = match event {
            PaymentEvent::Other { event_type } => {
                tracing::debug!(%event_type, "acknowledging unhandled event type");
                return Ok(FulfillmentOutcome::Ignored { event_type });
            }
            PaymentEvent::CheckoutCompleted {
                session_id,
                customer_email,
                metadata,
                payment_status,
            } => (session_id, customer_email, metadata, payment_status),
        };

        tracing::info!(%session_id, %payment_status, "processing completed checkout");

        let order = OrderDetails::from_event(customer_email, &metadata)?;

        let license_key = self.issuer.issue(&order.access_level).await?;
        tracing::info!(%session_id, "license issued");

        let email = LicenseEmail {
            to: order.customer_email.clone(),
            product_name: order.product_name.clone(),
            license_key: license_key.as_str().to_string(),
            order_id: session_id.clone(),
        };
        let delivery = self.mailer.send_license_email(&email).await;

        Ok(FulfillmentOutcome::Fulfilled(conclude(
            session_id,
            license_key,
            order,
            delivery,
        )))
    }
}

/// Combine the issuance and delivery sub-results into the final report.
///
/// Policy: notification failure does not downgrade an already-successful
/// issuance. The failure is logged and recorded on the report instead.
fn conclude(
    session_id: String,
    license_key: LicenseKey,
    order: OrderDetails,
    delivery: Result<()>,
) -> FulfillmentReport {
    let email_delivered = match delivery {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(
                %session_id,
                error = %err,
                "license email failed; key already minted, reporting fulfillment as successful"
            );
            false
        }
    };

    FulfillmentReport {
        session_id,
        license_key,
        customer_email: order.customer_email,
        product_name: order.product_name,
        email_delivered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct MockIssuer {
        fail: bool,
        calls: AtomicUsize,
    }

    impl MockIssuer {
        fn new() -> Self {
            Self { fail: false, calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            Self { fail: true, calls: AtomicUsize::new(0) }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LicenseIssuer for MockIssuer {
        async fn issue(&self, access_level: &str) -> Result<LicenseKey> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(FulfillmentError::Issuance("seller API down".into()));
            }
            assert!(!access_level.is_empty());
            Ok(LicenseKey::new(format!("KEY-{n:06}-TEST")))
        }
    }

    struct MockMailer {
        fail: bool,
        sent: Mutex<Vec<LicenseEmail>>,
    }

    impl MockMailer {
        fn new() -> Self {
            Self { fail: false, sent: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { fail: true, sent: Mutex::new(Vec::new()) }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        async fn send_license_email(&self, email: &LicenseEmail) -> Result<()> {
            if self.fail {
                return Err(FulfillmentError::Notification("mail API down".into()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn pipeline(
        issuer: MockIssuer,
        mailer: MockMailer,
    ) -> (OrderFulfillment<MockIssuer, MockMailer>, Arc<MockIssuer>, Arc<MockMailer>) {
        let issuer = Arc::new(issuer);
        let mailer = Arc::new(mailer);
        (
            OrderFulfillment::new(issuer.clone(), mailer.clone()),
            issuer,
            mailer,
        )
    }

    fn completed_event() -> PaymentEvent {
        let mut metadata = HashMap::new();
        metadata.insert(META_PRODUCT_NAME.to_string(), "GlideNote".to_string());
        metadata.insert(META_ACCESS_LEVEL.to_string(), "1".to_string());

        PaymentEvent::CheckoutCompleted {
            session_id: "cs_test_123".into(),
            customer_email: Some("buyer@example.com".into()),
            metadata,
            payment_status: "paid".into(),
        }
    }

    #[tokio::test]
    async fn test_other_event_is_noop() {
        let (pipeline, issuer, mailer) = pipeline(MockIssuer::new(), MockMailer::new());

        let outcome = pipeline
            .process(PaymentEvent::Other { event_type: "invoice.paid".into() })
            .await
            .unwrap();

        match outcome {
            FulfillmentOutcome::Ignored { event_type } => assert_eq!(event_type, "invoice.paid"),
            FulfillmentOutcome::Fulfilled(_) => panic!("expected no-op"),
        }
        assert_eq!(issuer.call_count(), 0);
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_happy_path_issues_and_emails() {
        let (pipeline, _, mailer) = pipeline(MockIssuer::new(), MockMailer::new());

        let outcome = pipeline.process(completed_event()).await.unwrap();
        let FulfillmentOutcome::Fulfilled(report) = outcome else {
            panic!("expected fulfillment");
        };

        assert_eq!(report.session_id, "cs_test_123");
        assert_eq!(report.customer_email, "buyer@example.com");
        assert_eq!(report.product_name, "GlideNote");
        assert!(report.email_delivered);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "buyer@example.com");
        assert_eq!(sent[0].order_id, "cs_test_123");
        assert_eq!(sent[0].license_key, report.license_key.as_str());
    }

    #[tokio::test]
    async fn test_missing_fields_are_all_named() {
        let (pipeline, issuer, _) = pipeline(MockIssuer::new(), MockMailer::new());

        let event = PaymentEvent::CheckoutCompleted {
            session_id: "cs_test_123".into(),
            customer_email: None,
            metadata: HashMap::new(),
            payment_status: "paid".into(),
        };

        let err = pipeline.process(event).await.unwrap_err();
        match err {
            FulfillmentError::MissingMetadata { fields } => {
                assert_eq!(fields, vec!["customerEmail", "accessLevel", "productName"]);
            }
            other => panic!("expected MissingMetadata, got {other:?}"),
        }
        assert_eq!(issuer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_metadata_values_count_as_missing() {
        let (pipeline, issuer, _) = pipeline(MockIssuer::new(), MockMailer::new());

        let mut metadata = HashMap::new();
        metadata.insert(META_PRODUCT_NAME.to_string(), "GlideNote".to_string());
        metadata.insert(META_ACCESS_LEVEL.to_string(), String::new());

        let event = PaymentEvent::CheckoutCompleted {
            session_id: "cs_test_123".into(),
            customer_email: Some("buyer@example.com".into()),
            metadata,
            payment_status: "paid".into(),
        };

        let err = pipeline.process(event).await.unwrap_err();
        match err {
            FulfillmentError::MissingMetadata { fields } => {
                assert_eq!(fields, vec!["accessLevel"]);
            }
            other => panic!("expected MissingMetadata, got {other:?}"),
        }
        assert_eq!(issuer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_email_failure_does_not_downgrade_fulfillment() {
        let (pipeline, issuer, _) = pipeline(MockIssuer::new(), MockMailer::failing());

        let outcome = pipeline.process(completed_event()).await.unwrap();
        let FulfillmentOutcome::Fulfilled(report) = outcome else {
            panic!("expected fulfillment");
        };

        assert_eq!(issuer.call_count(), 1);
        assert!(!report.email_delivered);
        assert!(!report.license_key.as_str().is_empty());
    }

    #[tokio::test]
    async fn test_issuance_failure_skips_notification() {
        let (pipeline, _, mailer) = pipeline(MockIssuer::failing(), MockMailer::new());

        let err = pipeline.process(completed_event()).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Issuance(_)));
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_replay_mints_independent_keys() {
        // Redelivery of the same event is not deduplicated: both runs
        // succeed and each mints its own key.
        let (pipeline, issuer, mailer) = pipeline(MockIssuer::new(), MockMailer::new());

        let first = pipeline.process(completed_event()).await.unwrap();
        let second = pipeline.process(completed_event()).await.unwrap();

        let (FulfillmentOutcome::Fulfilled(first), FulfillmentOutcome::Fulfilled(second)) =
            (first, second)
        else {
            panic!("expected two fulfillments");
        };

        assert_eq!(issuer.call_count(), 2);
        assert_eq!(mailer.sent_count(), 2);
        assert_ne!(first.license_key, second.license_key);
    }
}
