use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::errors::AppError;
#[cfg(test)]
use crate::models::subscription::ACTIVE_STATUSES;
use crate::models::subscription::SubscriptionRow;

/// A subscription state change reported by the payments provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub subscription_id: String,
    /// Owning user, when the provider echoes it back in the subscription metadata.
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Persistence for per-user subscription state. Carried in `AppState` as
/// `Arc<dyn SubscriptionRepository>`.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRow>, AppError>;

    /// Marks the user's subscription active after a completed checkout.
    ///
    /// A row that already holds this subscription keeps the status the
    /// subscription events gave it, so a replayed checkout cannot revive a
    /// canceled subscription. A row holding a different subscription that is
    /// still active is left alone. Returns `false` when nothing was written.
    async fn record_checkout(
        &self,
        user_id: &str,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> Result<bool, AppError>;

    /// Applies a subscription update. Returns `false` when no row could be
    /// matched: the subscription is unknown and there is no user id to create
    /// a row for, or the user's row already tracks another subscription.
    async fn apply_update(&self, update: &SubscriptionUpdate) -> Result<bool, AppError>;
}

pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRow>, AppError> {
        Ok(
            sqlx::query_as::<_, SubscriptionRow>(
                r#"
                SELECT user_id, stripe_customer_id, stripe_subscription_id, status,
                       current_period_end, updated_at
                FROM subscriptions WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?,
        )
    }

    async fn record_checkout(
        &self,
        user_id: &str,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, stripe_customer_id, stripe_subscription_id, status)
            VALUES ($1, $2, $3, 'active')
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id, subscriptions.stripe_subscription_id),
                status = CASE
                    WHEN subscriptions.stripe_subscription_id = EXCLUDED.stripe_subscription_id
                        AND subscriptions.status <> '' THEN subscriptions.status
                    ELSE 'active'
                END,
                updated_at = NOW()
            WHERE subscriptions.stripe_subscription_id IS NULL
                OR subscriptions.stripe_subscription_id = EXCLUDED.stripe_subscription_id
                OR subscriptions.status NOT IN ('active', 'trialing')
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_update(&self, update: &SubscriptionUpdate) -> Result<bool, AppError> {
        let result = match &update.user_id {
            Some(user_id) => {
                sqlx::query(
                    r#"
                    INSERT INTO subscriptions
                        (user_id, stripe_customer_id, stripe_subscription_id, status, current_period_end)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (user_id) DO UPDATE SET
                        stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                        stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                        status = EXCLUDED.status,
                        current_period_end = EXCLUDED.current_period_end,
                        updated_at = NOW()
                    WHERE subscriptions.stripe_subscription_id IS NULL
                        OR subscriptions.stripe_subscription_id = EXCLUDED.stripe_subscription_id
                    "#,
                )
                .bind(user_id)
                .bind(&update.customer_id)
                .bind(&update.subscription_id)
                .bind(&update.status)
                .bind(update.current_period_end)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE subscriptions SET
                        stripe_customer_id = COALESCE($2, stripe_customer_id),
                        status = $3,
                        current_period_end = $4,
                        updated_at = NOW()
                    WHERE stripe_subscription_id = $1
                    "#,
                )
                .bind(&update.subscription_id)
                .bind(&update.customer_id)
                .bind(&update.status)
                .bind(update.current_period_end)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    rows: std::sync::Mutex<std::collections::HashMap<String, SubscriptionRow>>,
}

#[cfg(test)]
fn empty_row(user_id: &str) -> SubscriptionRow {
    SubscriptionRow {
        user_id: user_id.to_string(),
        stripe_customer_id: None,
        stripe_subscription_id: None,
        status: String::new(),
        current_period_end: None,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRow>, AppError> {
        Ok(self.rows.lock().unwrap().get(user_id).cloned())
    }

    async fn record_checkout(
        &self,
        user_id: &str,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .entry(user_id.to_string())
            .or_insert_with(|| empty_row(user_id));
        let same_subscription =
            subscription_id.is_some() && row.stripe_subscription_id.as_deref() == subscription_id;
        if row.stripe_subscription_id.is_some() && !same_subscription
            && ACTIVE_STATUSES.contains(&row.status.as_str())
        {
            return Ok(false);
        }
        if let Some(c) = customer_id {
            row.stripe_customer_id = Some(c.to_string());
        }
        if let Some(s) = subscription_id {
            row.stripe_subscription_id = Some(s.to_string());
        }
        if !same_subscription || row.status.is_empty() {
            row.status = "active".to_string();
        }
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn apply_update(&self, update: &SubscriptionUpdate) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let key = match &update.user_id {
            Some(user_id) => Some(user_id.clone()),
            None => rows
                .values()
                .find(|r| r.stripe_subscription_id.as_deref() == Some(&update.subscription_id))
                .map(|r| r.user_id.clone()),
        };
        let Some(key) = key else {
            return Ok(false);
        };
        let row = rows.entry(key.clone()).or_insert_with(|| empty_row(&key));
        if row
            .stripe_subscription_id
            .as_deref()
            .is_some_and(|current| current != update.subscription_id)
        {
            return Ok(false);
        }
        if update.customer_id.is_some() {
            row.stripe_customer_id = update.customer_id.clone();
        }
        row.stripe_subscription_id = Some(update.subscription_id.clone());
        row.status = update.status.clone();
        row.current_period_end = update.current_period_end;
        row.updated_at = Utc::now();
        Ok(true)
    }
}
