use std::env;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: String,
    pub database_url: Option<String>,
    pub db_busy_timeout: Duration,
    /// Shared secret of the payment provider. Callbacks are refused while
    /// unset.
    pub payment_callback_token: Option<String>,
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = env::var("SERVER_PORT").unwrap_or_else(|_| "3000".into());
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let busy_ms = match env::var("DB_BUSY_TIMEOUT_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("DB_BUSY_TIMEOUT_MS must be milliseconds, got `{raw}`"))?,
            Err(_) => 5_000,
        };
        let payment_callback_token = env::var("PAYMENT_CALLBACK_TOKEN")
            .ok()
            .filter(|v| !v.is_empty());
        let seed_file = env::var("SEED_FILE").ok().filter(|v| !v.is_empty());
        Ok(Self {
            server_port,
            database_url,
            db_busy_timeout: Duration::from_millis(busy_ms),
            payment_callback_token,
            seed_file,
        })
    }
}
