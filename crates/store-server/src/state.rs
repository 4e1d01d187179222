//! Application State

use std::sync::Arc;

use anyhow::Context;

use store_fulfillment::{KeyAuthClient, OrderFulfillment, SendGridMailer};
use store_payments::{StripeClient, WebhookVerifier};

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Public site base URL for checkout redirects
    pub site_url: String,

    /// Bearer token guarding the manual/admin endpoints
    pub admin_token: String,
}

impl ServerConfig {
    /// Create from environment variables
    ///
    /// `SITE_URL` and `ADMIN_TOKEN` are required; `BIND_ADDR` defaults to
    /// `0.0.0.0:3000`.
    pub fn from_env() -> anyhow::Result<Self> {
        let site_url = std::env::var("SITE_URL").context("SITE_URL not set")?;
        let admin_token = std::env::var("ADMIN_TOKEN").context("ADMIN_TOKEN not set")?;
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

        Ok(Self {
            bind_addr,
            site_url: site_url.trim_end_matches('/').to_string(),
            admin_token,
        })
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Stripe client for checkout session creation and lookup
    pub stripe: Arc<StripeClient>,

    /// Webhook signature verifier
    pub verifier: Arc<WebhookVerifier>,

    /// License issuer; also shared with the pipeline
    pub issuer: Arc<KeyAuthClient>,

    /// The order fulfillment pipeline
    pub pipeline: Arc<OrderFulfillment<KeyAuthClient, SendGridMailer>>,

    /// Public site base URL for checkout redirects
    pub site_url: String,

    /// Bearer token guarding the manual/admin endpoints
    pub admin_token: String,
}
