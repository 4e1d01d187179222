//! License Delivery Email
//!
//! Sends the transactional email carrying the license key to the buyer via
//! the SendGrid v3 mail API. Delivery failure is reported to the caller;
//! the pipeline decides whether it is fatal.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FulfillmentError, Result};

/// Fallback sender when no verified sender is configured.
const FALLBACK_SENDER: &str = "orders@northlight.dev";

/// Email provider configuration
#[derive(Clone, Debug)]
pub struct EmailConfig {
    /// SendGrid API key
    pub api_key: String,

    /// Verified sender address
    pub sender: String,

    /// Base URL for the mail API
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl EmailConfig {
    /// Create a new configuration
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            sender: FALLBACK_SENDER.into(),
            base_url: "https://api.sendgrid.com".into(),
            timeout_secs: 10,
        }
    }

    /// Create from environment variables
    ///
    /// Reads `SENDGRID_API_KEY` (required) and `SENDGRID_VERIFIED_SENDER`
    /// (optional, falls back to a fixed address).
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("SENDGRID_API_KEY")
            .map_err(|_| FulfillmentError::Config("SENDGRID_API_KEY not set".into()))?;

        let mut config = Self::new(api_key);
        if let Ok(sender) = std::env::var("SENDGRID_VERIFIED_SENDER") {
            if !sender.is_empty() {
                config.sender = sender;
            }
        }

        Ok(config)
    }

    /// Set a custom API base URL (for testing)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// One license delivery message
#[derive(Clone, Debug)]
pub struct LicenseEmail {
    /// Buyer address
    pub to: String,

    /// Product the license unlocks
    pub product_name: String,

    /// The minted key, embedded verbatim
    pub license_key: String,

    /// Checkout session id, doubles as the order reference
    pub order_id: String,
}

impl LicenseEmail {
    /// All four fields are required; missing any is a caller error.
    fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.to.is_empty() {
            missing.push("to");
        }
        if self.product_name.is_empty() {
            missing.push("productName");
        }
        if self.license_key.is_empty() {
            missing.push("licenseKey");
        }
        if self.order_id.is_empty() {
            missing.push("orderId");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(FulfillmentError::InvalidRequest(format!(
                "missing email fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Notification sender trait
///
/// Implemented by the SendGrid client; mocked in pipeline tests.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one license delivery email.
    async fn send_license_email(&self, email: &LicenseEmail) -> Result<()>;
}

/// SendGrid mail client
pub struct SendGridMailer {
    config: EmailConfig,
    http: reqwest::Client,
}

impl SendGridMailer {
    /// Create a new mailer
    pub fn new(config: EmailConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FulfillmentError::Config(e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(EmailConfig::from_env()?)
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send_license_email(&self, email: &LicenseEmail) -> Result<()> {
        email.validate()?;

        let url = format!("{}/v3/mail/send", self.config.base_url);
        let body = serde_json::json!({
            "personalizations": [{"to": [{"email": email.to}]}],
            "from": {"email": self.config.sender},
            "subject": format!("Your Northlight Software License Key - {}", email.product_name),
            "content": [{"type": "text/html", "value": render_html(email)}],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FulfillmentError::Notification(format!("mail API unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(%status, error = %detail, "mail API rejected send");
            return Err(FulfillmentError::Notification(format!(
                "mail API returned HTTP {status}: {detail}"
            )));
        }

        tracing::info!(to = %email.to, order_id = %email.order_id, "license email sent");
        Ok(())
    }
}

/// Render the fixed license-delivery template.
///
/// Product name, order id, and key are embedded verbatim. Values originate
/// from the payment provider and the issuer, not from arbitrary user input.
fn render_html(email: &LicenseEmail) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <div style="text-align: center; padding: 20px 0; border-bottom: 2px solid #2f6fde;">
    <h1 style="color: #333333; margin: 0;">Northlight <span style="color: #2f6fde;">Software</span></h1>
  </div>
  <div style="padding: 30px 0;">
    <h2 style="color: #2f6fde; text-align: center;">Thank You for Your Purchase!</h2>
    <div style="background-color: #f8f9fa; border-radius: 8px; padding: 20px; border: 1px solid #eaeaea;">
      <h3 style="color: #333; border-bottom: 1px solid #eaeaea; padding-bottom: 10px;">Your License Information</h3>
      <p style="color: #666;"><strong style="color: #333;">Product:</strong> {product}</p>
      <p style="color: #666;"><strong style="color: #333;">Order ID:</strong> {order_id}</p>
      <p style="color: #666;"><strong style="color: #333;">License Key:</strong>
        <code style="background: #eee; padding: 3px 6px; border-radius: 4px; display: block; margin-top: 5px; word-break: break-all;">{key}</code>
      </p>
      <div style="margin-top: 20px; padding-top: 20px; border-top: 1px solid #eaeaea;">
        <h4 style="color: #333;">Important Notes:</h4>
        <ul style="color: #666; padding-left: 20px;">
          <li>Keep your license key safe and secure</li>
          <li>Do not share your license key with others</li>
          <li>Your license key is permanent and will not expire</li>
          <li>For technical support, contact support@northlight.dev</li>
        </ul>
      </div>
    </div>
    <div style="background-color: #f0f4ff; border-radius: 8px; padding: 15px; margin-top: 20px;">
      <p style="color: #666; margin: 0; font-size: 0.9em;">If you didn't make this purchase or need assistance, please contact our support team immediately.</p>
    </div>
  </div>
</div>"#,
        product = email.product_name,
        order_id = email.order_id,
        key = email.license_key,
    )
}
