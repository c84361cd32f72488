use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stripe statuses that unlock export.
pub(crate) const ACTIVE_STATUSES: &[&str] = &["active", "trialing"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRow {
    pub user_id: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    /// Whether this subscription grants paid features at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        ACTIVE_STATUSES.contains(&self.status.as_str())
            && self.current_period_end.map_or(true, |end| end > now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn make_row(status: &str, current_period_end: Option<DateTime<Utc>>) -> SubscriptionRow {
        SubscriptionRow {
            user_id: "user_1".to_string(),
            stripe_customer_id: Some("cus_1".to_string()),
            stripe_subscription_id: Some("sub_1".to_string()),
            status: status.to_string(),
            current_period_end,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_and_trialing_unlock() {
        assert!(make_row("active", None).is_active());
        assert!(make_row("trialing", None).is_active());
    }

    #[test]
    fn test_other_statuses_do_not_unlock() {
        for status in ["canceled", "past_due", "incomplete", "unpaid"] {
            assert!(!make_row(status, None).is_active(), "{status} must not unlock");
        }
    }

    #[test]
    fn test_expired_period_does_not_unlock() {
        let now = Utc::now();
        let row = make_row("active", Some(now - TimeDelta::hours(1)));
        assert!(!row.is_active_at(now));
        let row = make_row("active", Some(now + TimeDelta::days(30)));
        assert!(row.is_active_at(now));
    }
}
