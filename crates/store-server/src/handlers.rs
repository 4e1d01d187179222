//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};

use store_fulfillment::{FulfillmentOutcome, LicenseIssuer};
use store_payments::{CheckoutRequest, PaymentEvent};

use crate::catalog::{self, Product};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub products: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub product_id: u32,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

/// Acknowledgement returned to the payment provider's webhook dispatcher
#[derive(Debug, Default, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookAck {
    fn acknowledged() -> Self {
        Self {
            received: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub success: bool,
    pub session_id: String,
    pub customer_email: String,
    pub product_name: String,
    pub license_key: String,
    pub email_delivered: bool,
}

#[derive(Debug, Deserialize)]
pub struct MintLicenseRequest {
    pub access_level: String,
}

#[derive(Debug, Serialize)]
pub struct MintLicenseResponse {
    pub success: bool,
    pub license_key: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        products: catalog::products().len(),
    })
}

/// Product catalog listing
pub async fn list_products() -> Json<&'static [Product]> {
    Json(catalog::products())
}

/// Create a checkout session for a catalog product.
///
/// Price, display name, and access tier are resolved from the server-side
/// catalog; the client only names the product.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, (StatusCode, Json<ErrorResponse>)> {
    let product = catalog::find(payload.product_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown product id {}", payload.product_id),
                code: "UNKNOWN_PRODUCT".into(),
            }),
        )
    })?;

    let request = CheckoutRequest {
        product_name: product.name.to_string(),
        access_level: product.access_level.to_string(),
        unit_amount_cents: product.price_cents,
        success_url: format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", state.site_url),
        cancel_url: state.site_url.clone(),
    };

    let session = state.stripe.create_checkout_session(request).await.map_err(|e| {
        tracing::error!("Checkout error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.user_message().into(),
                code: "CHECKOUT_ERROR".into(),
            }),
        )
    })?;

    Ok(Json(CheckoutResponse {
        checkout_url: session.checkout_url,
        session_id: session.id,
    }))
}

/// Payment webhook endpoint.
///
/// The body is taken as raw bytes; signature verification must see them
/// untouched. Status mapping: 400 for verification and missing-data
/// failures, 500 for issuance failure, 200 otherwise (including an email
/// failure after the license was minted).
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    tracing::info!("received webhook");

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let event = match state.verifier.verify(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "webhook rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookAck {
                    error: Some(format!("Webhook Error: {err}")),
                    ..WebhookAck::default()
                }),
            );
        }
    };

    match state.pipeline.process(event).await {
        Ok(FulfillmentOutcome::Ignored { .. }) => {
            (StatusCode::OK, Json(WebhookAck::acknowledged()))
        }
        Ok(FulfillmentOutcome::Fulfilled(report)) => (
            StatusCode::OK,
            Json(WebhookAck {
                received: true,
                status: Some("Success"),
                license_key: Some(report.license_key.as_str().to_string()),
                customer_email: Some(report.customer_email),
                product_name: Some(report.product_name),
                error: None,
            }),
        ),
        Err(err) if err.is_client_error() => (
            StatusCode::BAD_REQUEST,
            Json(WebhookAck {
                received: true,
                error: Some(err.to_string()),
                ..WebhookAck::default()
            }),
        ),
        Err(err) => {
            tracing::error!(error = %err, "order processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookAck {
                    received: true,
                    error: Some("Failed to process order".into()),
                    ..WebhookAck::default()
                }),
            )
        }
    }
}

/// Manual fulfillment by checkout session id.
///
/// Re-fetches the session from Stripe and re-runs issuance + email outside
/// the signed webhook path. Mints a fresh key on every call, so it is
/// gated behind the admin bearer token.
pub async fn order_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OrderStatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    authorize(&headers, &state.admin_token)?;

    let session = state
        .stripe
        .retrieve_checkout_session(&session_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to retrieve checkout session");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.user_message().into(),
                    code: "SESSION_LOOKUP_FAILED".into(),
                }),
            )
        })?;

    tracing::info!(
        session_id = %session.id,
        payment_status = %session.payment_status,
        "re-running fulfillment for session"
    );

    let event = PaymentEvent::CheckoutCompleted {
        session_id: session.id,
        customer_email: session.customer_details.and_then(|d| d.email),
        metadata: session.metadata.unwrap_or_default(),
        payment_status: session.payment_status,
    };

    match state.pipeline.process(event).await {
        Ok(FulfillmentOutcome::Fulfilled(report)) => Ok(Json(OrderStatusResponse {
            success: true,
            session_id: report.session_id,
            customer_email: report.customer_email,
            product_name: report.product_name,
            license_key: report.license_key.as_str().to_string(),
            email_delivered: report.email_delivered,
        })),
        Ok(FulfillmentOutcome::Ignored { event_type }) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("unexpected no-op for event type {event_type}"),
                code: "FULFILLMENT_ERROR".into(),
            }),
        )),
        Err(err) if err.is_client_error() => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
                code: "MISSING_ORDER_DATA".into(),
            }),
        )),
        Err(err) => {
            tracing::error!(error = %err, "manual fulfillment failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.user_message().into(),
                    code: "FULFILLMENT_ERROR".into(),
                }),
            ))
        }
    }
}

/// Mint a license directly for an access tier (admin)
pub async fn mint_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MintLicenseRequest>,
) -> Result<Json<MintLicenseResponse>, (StatusCode, Json<ErrorResponse>)> {
    authorize(&headers, &state.admin_token)?;

    match state.issuer.issue(&payload.access_level).await {
        Ok(key) => Ok(Json(MintLicenseResponse {
            success: true,
            license_key: key.as_str().to_string(),
        })),
        Err(err) if err.is_client_error() => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
                code: "INVALID_LEVEL".into(),
            }),
        )),
        Err(err) => {
            tracing::error!(error = %err, "direct license mint failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.user_message().into(),
                    code: "ISSUANCE_ERROR".into(),
                }),
            ))
        }
    }
}

/// Require the admin bearer token on manual endpoints.
fn authorize(
    headers: &HeaderMap,
    admin_token: &str,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let ok = matches!(provided, Some(token) if !admin_token.is_empty() && token == admin_token);
    if ok {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "missing or invalid bearer token".into(),
                code: "UNAUTHORIZED".into(),
            }),
        ))
    }
}
