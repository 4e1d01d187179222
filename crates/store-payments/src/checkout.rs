//! Stripe Checkout Integration
//!
//! Creates and retrieves hosted checkout sessions through the Stripe REST
//! API. One-time card payments only; the buyer's email is collected on the
//! hosted page, not supplied by the caller.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PaymentError, Result};

/// Stripe API configuration
#[derive(Clone, Debug)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...)
    pub secret_key: String,

    /// Webhook signing secret (whsec_...)
    pub webhook_secret: String,

    /// Base URL for the Stripe API
    pub api_base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl StripeConfig {
    /// Create a new Stripe configuration
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base_url: "https://api.stripe.com".into(),
            timeout_secs: 15,
        }
    }

    /// Create from environment variables
    ///
    /// Reads `STRIPE_SECRET_KEY` and `STRIPE_WEBHOOK_SECRET`; both are
    /// required.
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(secret_key, webhook_secret))
    }

    /// Set a custom API base URL (for testing)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Request to create a checkout session
#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    /// Product name shown on the hosted checkout page
    pub product_name: String,

    /// Access tier to mint a license for once payment completes
    pub access_level: String,

    /// Price in the smallest currency unit (USD cents)
    pub unit_amount_cents: i64,

    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,
}

/// Result of creating a checkout session
#[derive(Clone, Debug)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect user to
    pub checkout_url: String,
}

/// Checkout session object as returned by the Stripe API and carried in
/// `checkout.session.completed` webhook payloads.
#[derive(Clone, Debug, Deserialize)]
pub struct StripeSession {
    /// Unique session identifier (cs_...)
    pub id: String,

    /// Hosted page URL; present while the session is open
    #[serde(default)]
    pub url: Option<String>,

    /// Buyer details captured on the hosted page
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,

    /// Custom metadata attached at session creation
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,

    /// Session payment status (paid, unpaid, no_payment_required)
    #[serde(default)]
    pub payment_status: String,
}

/// Buyer details captured by the hosted checkout page
#[derive(Clone, Debug, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

/// Stripe client wrapper
pub struct StripeClient {
    config: StripeConfig,
    http: reqwest::Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(config: StripeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::Config(e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    /// Get the webhook signing secret
    pub fn webhook_secret(&self) -> &str {
        &self.config.webhook_secret
    }

    /// Create a one-time-payment checkout session.
    ///
    /// Returns a URL to redirect the buyer to Stripe's hosted page. The
    /// product name and access level ride along as session metadata so the
    /// completed-checkout webhook can fulfill the order.
    pub async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        let params: Vec<(&str, String)> = vec![
            ("mode", "payment".into()),
            ("payment_method_types[0]", "card".into()),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
            ("line_items[0][quantity]", "1".into()),
            ("line_items[0][price_data][currency]", "usd".into()),
            (
                "line_items[0][price_data][unit_amount]",
                request.unit_amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.product_name.clone(),
            ),
            ("metadata[productName]", request.product_name),
            ("metadata[accessLevel]", request.access_level),
        ];

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, error = %body, "Stripe checkout session creation failed");
            return Err(PaymentError::Api(format!("HTTP {status}: {body}")));
        }

        let session: StripeSession = response
            .json()
            .await
            .map_err(|e| PaymentError::Api(format!("failed to parse Stripe response: {e}")))?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Api("no checkout URL returned".into()))?;

        tracing::info!(session_id = %session.id, "created checkout session");

        Ok(CheckoutSession {
            id: session.id,
            checkout_url,
        })
    }

    /// Retrieve an existing checkout session by ID.
    ///
    /// Used by the manual-fulfillment path to re-read buyer email and order
    /// metadata outside the signed webhook flow.
    pub async fn retrieve_checkout_session(&self, session_id: &str) -> Result<StripeSession> {
        let url = format!(
            "{}/v1/checkout/sessions/{}",
            self.config.api_base_url, session_id
        );

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Api(format!("failed to parse Stripe response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_parse_with_customer_details() {
        let json = r#"{
            "id": "cs_test_123",
            "url": null,
            "customer_details": {"email": "buyer@example.com"},
            "metadata": {"productName": "GlideNote", "accessLevel": "1"},
            "payment_status": "paid"
        }"#;

        let session: StripeSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.id, "cs_test_123");
        assert_eq!(
            session.customer_details.unwrap().email.as_deref(),
            Some("buyer@example.com")
        );
        let metadata = session.metadata.unwrap();
        assert_eq!(metadata.get("accessLevel").map(String::as_str), Some("1"));
        assert_eq!(session.payment_status, "paid");
    }

    #[test]
    fn test_session_parse_tolerates_missing_fields() {
        let session: StripeSession = serde_json::from_str(r#"{"id": "cs_test_min"}"#).unwrap();
        assert!(session.url.is_none());
        assert!(session.customer_details.is_none());
        assert!(session.metadata.is_none());
        assert_eq!(session.payment_status, "");
    }

    #[test]
    fn test_session_parse_tolerates_null_metadata() {
        let session: StripeSession =
            serde_json::from_str(r#"{"id": "cs_test_null", "metadata": null}"#).unwrap();
        assert!(session.metadata.is_none());
    }

    #[test]
    fn test_config_default_base_url() {
        let config = StripeConfig::new("sk_test_xxx", "whsec_xxx");
        assert_eq!(config.api_base_url, "https://api.stripe.com");

        let config = config.with_base_url("http://localhost:12111");
        assert_eq!(config.api_base_url, "http://localhost:12111");
    }
}
