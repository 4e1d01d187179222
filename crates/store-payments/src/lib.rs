//! # store-payments
//!
//! Stripe integration for the storefront: hosted checkout session creation
//! and retrieval, plus webhook signature verification.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Storefront │────▶│  Stripe Hosted  │────▶│   Webhook   │
//! │  (checkout) │     │  Checkout Page  │     │ (fulfilled) │
//! └─────────────┘     └─────────────────┘     └─────────────┘
//! ```
//!
//! The storefront creates a session and redirects the buyer to Stripe's
//! hosted page; once payment completes, Stripe POSTs a signed
//! `checkout.session.completed` event back. [`WebhookVerifier`] recomputes
//! the HMAC-SHA256 signature over the raw body and only then hands the
//! parsed [`PaymentEvent`] to the fulfillment pipeline.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use store_payments::{StripeClient, StripeConfig, WebhookVerifier};
//!
//! let client = StripeClient::new(StripeConfig::from_env()?)?;
//! let verifier = WebhookVerifier::new(client.webhook_secret());
//!
//! let event = verifier.verify(&raw_body, signature_header)?;
//! ```

mod checkout;
mod error;
mod webhook;

pub use checkout::{
    CheckoutRequest, CheckoutSession, CustomerDetails, StripeClient, StripeConfig, StripeSession,
};
pub use error::{PaymentError, Result};
pub use webhook::{PaymentEvent, SignatureHeader, WebhookVerifier, CHECKOUT_COMPLETED};
