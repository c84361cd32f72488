//! Stripe webhook verification and event handling.
//!
//! Stripe signs each delivery with `Stripe-Signature: t=<unix>,v1=<hex>`,
//! where the signature is HMAC-SHA256 over `"<t>.<raw body>"` keyed by the
//! endpoint secret. During secret rotation several `v1` entries may appear;
//! any one matching is accepted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::billing::store::{SubscriptionRepository, SubscriptionUpdate};
use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Deliveries older (or further in the future) than this are rejected as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Metadata key the checkout session stamps on the subscription.
pub const USER_ID_METADATA_KEY: &str = "user_id";

/// Checkout `payment_status` values that mean the subscription is paid for.
/// Async payment methods complete the session as `unpaid` first.
const SETTLED_PAYMENT_STATUSES: &[&str] = &["paid", "no_payment_required"];

/// Verifies a `Stripe-Signature` header against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), AppError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::InvalidWebhook("signature header has no timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(AppError::InvalidWebhook(
            "signature header has no v1 signature".to_string(),
        ));
    }
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::InvalidWebhook(
            "signature timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    if signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok())
    {
        Ok(())
    } else {
        Err(AppError::InvalidWebhook(
            "no signature matches the payload".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    client_reference_id: Option<String>,
    payment_status: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: Option<String>,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// Recognised event that could not be tied to a user.
    Unmatched,
    /// Event type this service does not act on.
    Ignored,
}

/// Applies a verified event to subscription state.
pub async fn handle_event(
    subscriptions: &dyn SubscriptionRepository,
    event: &StripeEvent,
) -> Result<WebhookOutcome, AppError> {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = parse_object(event)?;
            let Some(user_id) = session.client_reference_id else {
                warn!("Checkout session in event {} has no client_reference_id", event.id);
                return Ok(WebhookOutcome::Unmatched);
            };
            let payment_status = session.payment_status.as_deref().unwrap_or("");
            if !SETTLED_PAYMENT_STATUSES.contains(&payment_status) {
                info!(
                    "Checkout for user {user_id} not paid yet ('{payment_status}', event {})",
                    event.id
                );
                return Ok(WebhookOutcome::Ignored);
            }
            let recorded = subscriptions
                .record_checkout(
                    &user_id,
                    session.customer.as_deref(),
                    session.subscription.as_deref(),
                )
                .await?;
            if recorded {
                info!("Recorded checkout for user {user_id} (event {})", event.id);
                Ok(WebhookOutcome::Applied)
            } else {
                warn!(
                    "User {user_id} already has another active subscription (event {})",
                    event.id
                );
                Ok(WebhookOutcome::Unmatched)
            }
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let sub: SubscriptionObject = parse_object(event)?;
            let status = if event.event_type == "customer.subscription.deleted" {
                "canceled".to_string()
            } else {
                sub.status
            };
            let update = SubscriptionUpdate {
                subscription_id: sub.id,
                user_id: sub.metadata.get(USER_ID_METADATA_KEY).cloned(),
                customer_id: sub.customer,
                status,
                current_period_end: sub
                    .current_period_end
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            };
            if subscriptions.apply_update(&update).await? {
                info!(
                    "Subscription {} is now '{}' (event {})",
                    update.subscription_id, update.status, event.id
                );
                Ok(WebhookOutcome::Applied)
            } else {
                warn!(
                    "No subscription row matches {} (event {})",
                    update.subscription_id, event.id
                );
                Ok(WebhookOutcome::Unmatched)
            }
        }
        other => {
            info!("Ignoring Stripe event type '{other}' ({})", event.id);
            Ok(WebhookOutcome::Ignored)
        }
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &StripeEvent) -> Result<T, AppError> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        AppError::InvalidWebhook(format!(
            "malformed {} object in event {}: {e}",
            event.event_type, event.id
        ))
    })
}

#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
