//! Fulfillment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, FulfillmentError>;

/// Fulfillment-related errors
#[derive(Error, Debug)]
pub enum FulfillmentError {
    /// Caller supplied invalid input; nothing was sent upstream
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Completed checkout event lacked required buyer or order data
    #[error("missing required checkout data: {}", fields.join(", "))]
    MissingMetadata { fields: Vec<&'static str> },

    /// Seller API unreachable, non-2xx, or unrecognized response shape
    #[error("license issuance failed: {0}")]
    Issuance(String),

    /// Email provider rejected or failed the send
    #[error("license email failed: {0}")]
    Notification(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl FulfillmentError {
    /// True for errors caused by the caller rather than an upstream provider.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FulfillmentError::InvalidRequest(_) | FulfillmentError::MissingMetadata { .. }
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            FulfillmentError::InvalidRequest(_) | FulfillmentError::MissingMetadata { .. } => {
                "Order is missing required information."
            }
            FulfillmentError::Issuance(_) => "Failed to process order.",
            FulfillmentError::Notification(_) => {
                "Your license was created but the email could not be sent. Contact support."
            }
            FulfillmentError::Config(_) => "Service configuration error.",
        }
    }
}
