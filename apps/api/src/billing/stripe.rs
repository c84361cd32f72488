//! Stripe REST client. Only checkout-session creation is needed server-side;
//! everything else arrives through the webhook.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::billing::webhook::USER_ID_METADATA_KEY;
use crate::errors::AppError;

const STRIPE_API_URL: &str = "https://api.stripe.com/v1";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Checkout session {0} has no redirect URL")]
    MissingUrl(String),
}

impl From<StripeError> for AppError {
    fn from(e: StripeError) -> Self {
        AppError::Payments(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Creates hosted checkout sessions. Carried in `AppState` as
/// `Arc<dyn PaymentsProvider>`.
#[async_trait]
pub trait PaymentsProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError>;
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    price_id: String,
    app_url: String,
}

impl StripeClient {
    pub fn new(secret_key: String, price_id: String, app_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("Failed to build HTTP client")?,
            secret_key,
            price_id,
            app_url,
        })
    }

    fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), self.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("client_reference_id".to_string(), request.user_id.clone()),
            (
                format!("subscription_data[metadata][{USER_ID_METADATA_KEY}]"),
                request.user_id.clone(),
            ),
            (
                "success_url".to_string(),
                format!("{}/builder?checkout=success", self.app_url),
            ),
            (
                "cancel_url".to_string(),
                format!("{}/builder?checkout=cancelled", self.app_url),
            ),
        ];
        if let Some(email) = request.customer_email.as_deref().filter(|e| !e.is_empty()) {
            form.push(("customer_email".to_string(), email.to_string()));
        }
        form
    }

    /// POSTs a form to the Stripe API. Retries 429 and 5xx with exponential
    /// backoff; the idempotency key keeps retries from creating duplicates.
    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, StripeError> {
        let url = format!("{STRIPE_API_URL}{path}");
        let idempotency_key = Uuid::new_v4().to_string();
        let mut last_error: Option<StripeError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                warn!(
                    "Stripe call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.secret_key)
                .header("Idempotency-Key", &idempotency_key)
                .form(form)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(StripeError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Stripe API returned {}: {}", status, body);
                last_error = Some(StripeError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<StripeErrorResponse>(&body)
                    .ok()
                    .and_then(|e| e.error.message)
                    .unwrap_or(body);
                return Err(StripeError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            debug!("Stripe POST {path} succeeded");
            return Ok(response.json().await?);
        }

        Err(last_error.unwrap_or(StripeError::Api {
            status: 0,
            message: format!("gave up after {MAX_RETRIES} attempts"),
        }))
    }
}

#[async_trait]
impl PaymentsProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        let form = self.checkout_form(request);
        let session: CheckoutSessionResponse =
            self.post_form("/checkout/sessions", &form).await?;
        let url = session
            .url
            .ok_or_else(|| StripeError::MissingUrl(session.id.clone()))?;
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}

/// Returns a canned session. Used by handler tests.
#[cfg(test)]
pub struct FakePayments;

#[cfg(test)]
#[async_trait]
impl PaymentsProvider for FakePayments {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        Ok(CheckoutSession {
            id: format!("cs_test_{}", request.user_id),
            url: "https://checkout.stripe.com/c/pay/cs_test".to_string(),
        })
    }
}
