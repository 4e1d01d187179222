//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API returned a non-success status
    #[error("Stripe API error: {0}")]
    Api(String),

    /// Request to Stripe never completed
    #[error("network error: {0}")]
    Network(String),

    /// Signature header or signing secret absent; verification not attempted
    #[error("missing webhook verification material: {0}")]
    MissingVerification(&'static str),

    /// Recomputed signature did not match, or the header was unusable
    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    /// Verified payload could not be parsed
    #[error("webhook parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// True for errors caused by the inbound request rather than this service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PaymentError::MissingVerification(_)
                | PaymentError::SignatureVerification(_)
                | PaymentError::Parse(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Api(_) | PaymentError::Network(_) => {
                "Payment processing failed. Please try again."
            }
            PaymentError::MissingVerification(_) | PaymentError::SignatureVerification(_) => {
                "Webhook could not be authenticated."
            }
            PaymentError::Parse(_) => "Webhook payload was not understood.",
            PaymentError::Config(_) => "Service configuration error.",
        }
    }
}
