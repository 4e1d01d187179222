//! Stripe Webhook Verification
//!
//! Authenticates inbound payment notifications against the shared signing
//! secret and parses them into [`PaymentEvent`] values. Verification runs
//! over the untouched raw body bytes; re-serializing parsed JSON would
//! invalidate the signature.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::checkout::StripeSession;
use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Event type that triggers fulfillment.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Verified webhook event
#[derive(Clone, Debug)]
pub enum PaymentEvent {
    /// Completed checkout carrying the buyer and order metadata
    CheckoutCompleted {
        session_id: String,
        customer_email: Option<String>,
        metadata: HashMap<String, String>,
        payment_status: String,
    },

    /// Any other verified event type; acknowledged but not processed
    Other { event_type: String },
}

/// Parsed Stripe-Signature header components.
///
/// The header format is: `t=<unix timestamp>,v1=<hex signature>[,...]`
#[derive(Clone, Debug)]
pub struct SignatureHeader {
    /// Unix timestamp when the provider generated the event
    pub timestamp: i64,

    /// HMAC-SHA256 signature, decoded from hex
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parse a Stripe-Signature header into components.
    pub fn parse(header: &str) -> Result<Self> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };

            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse().map_err(|_| {
                        PaymentError::SignatureVerification("invalid timestamp in header".into())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value.trim()).map_err(|_| {
                        PaymentError::SignatureVerification("signature is not valid hex".into())
                    })?);
                }
                // Ignore v0 and unknown fields for forward compatibility
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or_else(|| {
                PaymentError::SignatureVerification("missing timestamp (t=) in header".into())
            })?,
            v1_signature: v1_signature.ok_or_else(|| {
                PaymentError::SignatureVerification("missing v1 signature in header".into())
            })?,
        })
    }
}

/// Verifies webhook payloads and produces trusted payment events
pub struct WebhookVerifier {
    signing_secret: String,
}

impl WebhookVerifier {
    /// Create a verifier for the given signing secret
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
        }
    }

    /// Verify a raw webhook payload and parse it into a [`PaymentEvent`].
    ///
    /// Fails before any verification if the signature header or the signing
    /// secret is absent, so unsigned events are never accepted.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<PaymentEvent> {
        if self.signing_secret.is_empty() {
            return Err(PaymentError::MissingVerification("webhook signing secret"));
        }
        if signature_header.trim().is_empty() {
            return Err(PaymentError::MissingVerification("signature header"));
        }

        let header = SignatureHeader::parse(signature_header)?;
        self.check_timestamp(header.timestamp)?;

        // Signed payload is "<timestamp>.<raw body>"; feed the raw bytes
        // straight into the MAC rather than building an intermediate string.
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        // verify_slice is a constant-time comparison
        mac.verify_slice(&header.v1_signature).map_err(|_| {
            tracing::warn!("webhook signature mismatch");
            PaymentError::SignatureVerification("signature mismatch".into())
        })?;

        parse_event(payload)
    }

    fn check_timestamp(&self, timestamp: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(event_timestamp = timestamp, age_secs = age, "webhook event too old");
            return Err(PaymentError::SignatureVerification(format!(
                "event too old ({age} seconds)"
            )));
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(event_timestamp = timestamp, "webhook event timestamp in future");
            return Err(PaymentError::SignatureVerification(
                "event timestamp in future".into(),
            ));
        }

        Ok(())
    }
}

/// Raw event envelope as delivered by the provider
#[derive(Debug, serde::Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, serde::Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// Parse a verified payload into a [`PaymentEvent`].
///
/// Only `checkout.session.completed` carries data relevant to fulfillment;
/// every other event type is surfaced as [`PaymentEvent::Other`].
fn parse_event(payload: &[u8]) -> Result<PaymentEvent> {
    let envelope: EventEnvelope = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::Parse(format!("invalid event JSON: {e}")))?;

    if envelope.event_type != CHECKOUT_COMPLETED {
        return Ok(PaymentEvent::Other {
            event_type: envelope.event_type,
        });
    }

    let session: StripeSession = serde_json::from_value(envelope.data.object)
        .map_err(|e| PaymentError::Parse(format!("invalid checkout session object: {e}")))?;

    Ok(PaymentEvent::CheckoutCompleted {
        session_id: session.id,
        customer_email: session.customer_details.and_then(|d| d.email),
        metadata: session.metadata.unwrap_or_default(),
        payment_status: session.payment_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn current_timestamp() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, compute_signature(payload, secret, timestamp))
    }

    fn checkout_completed_payload() -> Vec<u8> {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_123",
                    "customer_details": {"email": "buyer@example.com"},
                    "metadata": {"productName": "GlideNote", "accessLevel": "1"},
                    "payment_status": "paid"
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_valid_signature_accepted() {
        let verifier = WebhookVerifier::new(SECRET);
        let payload = checkout_completed_payload();
        let header = signed_header(&payload, SECRET, current_timestamp());

        let event = verifier.verify(&payload, &header).expect("should verify");
        match event {
            PaymentEvent::CheckoutCompleted {
                session_id,
                customer_email,
                metadata,
                payment_status,
            } => {
                assert_eq!(session_id, "cs_test_123");
                assert_eq!(customer_email.as_deref(), Some("buyer@example.com"));
                assert_eq!(metadata.get("productName").map(String::as_str), Some("GlideNote"));
                assert_eq!(payment_status, "paid");
            }
            PaymentEvent::Other { .. } => panic!("expected CheckoutCompleted"),
        }
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let payload = checkout_completed_payload();
        let header = signed_header(&payload, "wrong_secret", current_timestamp());

        let err = verifier.verify(&payload, &header).unwrap_err();
        assert!(matches!(err, PaymentError::SignatureVerification(_)));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let payload = checkout_completed_payload();
        let header = signed_header(&payload, SECRET, current_timestamp());

        let mut tampered = payload.clone();
        tampered.extend_from_slice(b" ");

        let err = verifier.verify(&tampered, &header).unwrap_err();
        assert!(matches!(err, PaymentError::SignatureVerification(_)));
    }

    #[test]
    fn test_missing_signature_header_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let payload = checkout_completed_payload();

        let err = verifier.verify(&payload, "").unwrap_err();
        assert!(matches!(err, PaymentError::MissingVerification(_)));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let verifier = WebhookVerifier::new("");
        let payload = checkout_completed_payload();
        let header = signed_header(&payload, SECRET, current_timestamp());

        let err = verifier.verify(&payload, &header).unwrap_err();
        assert!(matches!(err, PaymentError::MissingVerification(_)));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let payload = checkout_completed_payload();

        assert!(verifier.verify(&payload, "garbage").is_err());
        assert!(verifier.verify(&payload, "t=1234567890").is_err());
        assert!(verifier.verify(&payload, "v1=deadbeef").is_err());
        assert!(verifier.verify(&payload, "t=notanumber,v1=deadbeef").is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let payload = checkout_completed_payload();
        // 10 minutes ago, beyond the 5-minute tolerance
        let header = signed_header(&payload, SECRET, current_timestamp() - 600);

        let err = verifier.verify(&payload, &header).unwrap_err();
        assert!(matches!(err, PaymentError::SignatureVerification(_)));
    }

    #[test]
    fn test_other_event_type_is_acknowledged_not_processed() {
        let verifier = WebhookVerifier::new(SECRET);
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "invoice.payment_failed",
            "data": {"object": {"id": "in_123"}}
        })
        .to_string()
        .into_bytes();
        let header = signed_header(&payload, SECRET, current_timestamp());

        let event = verifier.verify(&payload, &header).expect("should verify");
        match event {
            PaymentEvent::Other { event_type } => {
                assert_eq!(event_type, "invoice.payment_failed");
            }
            PaymentEvent::CheckoutCompleted { .. } => panic!("expected Other"),
        }
    }

    #[test]
    fn test_signature_header_parse() {
        let header = SignatureHeader::parse("t=1704067200,v1=deadbeef").unwrap();
        assert_eq!(header.timestamp, 1704067200);
        assert_eq!(header.v1_signature, vec![0xde, 0xad, 0xbe, 0xef]);

        // v0 and unknown fields are ignored
        let header = SignatureHeader::parse("t=1,v0=00,v1=ff,x=y").unwrap();
        assert_eq!(header.v1_signature, vec![0xff]);
    }
}
