//! # store-fulfillment
//!
//! Order fulfillment for the storefront: turns a verified
//! "checkout completed" payment event into a minted license key and a
//! delivery email.
//!
//! ## Pipeline
//!
//! ```text
//! received → verified → metadata-extracted → license-issued → notified → done
//! ```
//!
//! Verification lives in `store-payments`; this crate picks up from the
//! verified [`store_payments::PaymentEvent`]. Each external call is a
//! single bounded-timeout attempt with no retry and no persisted state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use store_fulfillment::{KeyAuthClient, OrderFulfillment, SendGridMailer};
//!
//! let issuer = Arc::new(KeyAuthClient::from_env()?);
//! let mailer = Arc::new(SendGridMailer::from_env()?);
//! let pipeline = OrderFulfillment::new(issuer, mailer);
//!
//! let outcome = pipeline.process(event).await?;
//! ```

mod email;
mod error;
mod license;
mod pipeline;

pub use email::{EmailConfig, LicenseEmail, Mailer, SendGridMailer};
pub use error::{FulfillmentError, Result};
pub use license::{KeyAuthClient, KeyAuthConfig, LicenseIssuer, LicenseKey};
pub use pipeline::{FulfillmentOutcome, FulfillmentReport, OrderFulfillment};
