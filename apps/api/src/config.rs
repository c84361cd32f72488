use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub clerk_secret_key: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_price_id: String,
    /// Public URL of the web app, used to build checkout success/cancel URLs.
    pub app_url: String,
    /// Allowed CORS origin. `None` keeps the permissive layer (local development).
    pub cors_origin: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            clerk_secret_key: require_env("CLERK_SECRET_KEY")?,
            stripe_secret_key: require_env("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: require_env("STRIPE_WEBHOOK_SECRET")?,
            stripe_price_id: require_env("STRIPE_PRICE_ID")?,
            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Configuration used by handler tests. Never reads the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/resume_test".to_string(),
            clerk_secret_key: "sk_test_clerk".to_string(),
            stripe_secret_key: "sk_test_stripe".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            stripe_price_id: "price_test".to_string(),
            app_url: "http://localhost:3000".to_string(),
            cors_origin: None,
            port: 8080,
            rust_log: "debug".to_string(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
