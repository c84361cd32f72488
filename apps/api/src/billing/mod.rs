// Subscription paywall: Stripe checkout, webhook-driven subscription state,
// and the status lookup the export endpoint gates on.

pub mod handlers;
pub mod store;
pub mod stripe;
pub mod webhook;
