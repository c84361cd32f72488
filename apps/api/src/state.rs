use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::billing::store::SubscriptionRepository;
use crate::billing::stripe::PaymentsProvider;
use crate::config::Config;
use crate::resume::store::ResumeRepository;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub resumes: Arc<dyn ResumeRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    /// Stripe in production; swapped for a canned provider in handler tests.
    pub payments: Arc<dyn PaymentsProvider>,
    /// Clerk JWKS validation in production.
    pub verifier: Arc<dyn TokenVerifier>,
}

#[cfg(test)]
impl AppState {
    /// In-memory state. `tokens` maps bearer tokens to user ids.
    pub fn for_tests(tokens: &[(&str, &str)]) -> Self {
        use crate::auth::StaticVerifier;
        use crate::billing::store::InMemorySubscriptionRepository;
        use crate::billing::stripe::FakePayments;
        use crate::resume::store::InMemoryResumeRepository;

        AppState {
            config: Config::for_tests(),
            resumes: Arc::new(InMemoryResumeRepository::default()),
            subscriptions: Arc::new(InMemorySubscriptionRepository::default()),
            payments: Arc::new(FakePayments),
            verifier: Arc::new(StaticVerifier::new(tokens)),
        }
    }
}
