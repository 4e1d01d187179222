//! Storefront HTTP Server
//!
//! Axum-based server exposing the product catalog, checkout session
//! creation, and the payment webhook that drives license fulfillment.

mod catalog;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use store_fulfillment::{KeyAuthClient, OrderFulfillment, SendGridMailer};
use store_payments::{StripeClient, WebhookVerifier};

use crate::handlers::{
    create_checkout, health_check, list_products, mint_license, order_status, stripe_webhook,
};
use crate::state::{AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Every provider secret is required; missing configuration aborts startup
    let server_config = ServerConfig::from_env()?;
    let stripe = Arc::new(StripeClient::from_env()?);
    let issuer = Arc::new(KeyAuthClient::from_env()?);
    let mailer = Arc::new(SendGridMailer::from_env()?);

    let verifier = Arc::new(WebhookVerifier::new(stripe.webhook_secret()));
    let pipeline = Arc::new(OrderFulfillment::new(issuer.clone(), mailer));

    tracing::info!("✓ Stripe configured");
    tracing::info!("✓ License issuer configured");
    tracing::info!("✓ Email sender configured");
    tracing::info!("Catalog: {} products", catalog::products().len());

    // Build application state
    let state = AppState {
        stripe,
        verifier,
        issuer,
        pipeline,
        site_url: server_config.site_url.clone(),
        admin_token: server_config.admin_token.clone(),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health & catalog
        .route("/health", get(health_check))
        .route("/api/products", get(list_products))
        // Checkout & fulfillment
        .route("/api/checkout", post(create_checkout))
        .route("/webhook/stripe", post(stripe_webhook))
        // Manual fulfillment and direct minting; admin bearer token required
        .route("/api/orders/{session_id}", get(order_status))
        .route("/api/admin/license", post(mint_license))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr).await?;

    tracing::info!("🚀 storefront server running on http://{}", server_config.bind_addr);
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                  - Health check");
    tracing::info!("  GET  /api/products            - Product catalog");
    tracing::info!("  POST /api/checkout            - Create checkout session");
    tracing::info!("  POST /webhook/stripe          - Payment webhook");
    tracing::info!("  GET  /api/orders/:session_id  - Manual fulfillment (admin)");
    tracing::info!("  POST /api/admin/license       - Mint license (admin)");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
