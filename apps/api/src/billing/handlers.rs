//! Axum route handlers for the billing API.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::billing::stripe::{CheckoutRequest, CheckoutSession};
use crate::billing::webhook::{handle_event, verify_signature, StripeEvent};
use crate::errors::AppError;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub active: bool,
    pub status: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutBody {
    pub email: Option<String>,
}

/// GET /api/subscription
pub async fn handle_subscription_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SubscriptionStatusResponse>, AppError> {
    let row = state.subscriptions.get(&user.user_id).await?;
    Ok(Json(match row {
        Some(row) => SubscriptionStatusResponse {
            active: row.is_active(),
            status: Some(row.status),
            current_period_end: row.current_period_end,
        },
        None => SubscriptionStatusResponse {
            active: false,
            status: None,
            current_period_end: None,
        },
    }))
}

/// POST /api/checkout
///
/// Creates a hosted checkout session; the client redirects to `url`.
pub async fn handle_create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    body: Option<Json<CheckoutBody>>,
) -> Result<Json<CheckoutSession>, AppError> {
    if let Some(row) = state.subscriptions.get(&user.user_id).await? {
        if row.is_active() {
            return Err(AppError::Validation(
                "subscription is already active".to_string(),
            ));
        }
    }

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let session = state
        .payments
        .create_checkout_session(&CheckoutRequest {
            user_id: user.user_id,
            customer_email: body.email,
        })
        .await?;
    Ok(Json(session))
}

/// POST /api/webhooks/stripe
///
/// Unauthenticated; trust comes from the signature over the raw body.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidWebhook("missing Stripe-Signature header".to_string()))?;

    verify_signature(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        Utc::now().timestamp(),
    )?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidWebhook(format!("malformed event payload: {e}")))?;

    handle_event(state.subscriptions.as_ref(), &event).await?;

    Ok(Json(json!({ "received": true })))
}
