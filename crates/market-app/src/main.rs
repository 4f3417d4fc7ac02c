use std::sync::Arc;

use market_hex::application::{seed, Marketplace};
use market_hex::config::Config;
use market_hex::inbound::http::{HttpServer, HttpServerConfig};
use market_hex::outbound::notifier::TracingNotifier;
use market_repo::{build_repo, Repo};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for DATABASE_URL / SERVER_PORT / PAYMENT_CALLBACK_TOKEN when present.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
        .init();

    let config = Config::from_env()?;
    let repo: Repo = build_repo(config.database_url.as_deref(), config.db_busy_timeout).await?;
    if let Some(path) = &config.seed_file {
        seed::load_file(&repo, path).await?;
    }
    if config.payment_callback_token.is_none() {
        tracing::warn!("PAYMENT_CALLBACK_TOKEN unset; payment callbacks will be refused");
    }

    let market = Marketplace::new(
        repo,
        Arc::new(TracingNotifier),
        config.payment_callback_token.clone(),
    );
    let server_cfg = HttpServerConfig {
        port: config.server_port.clone(),
    };

    let http = HttpServer::new(market, server_cfg).await?;
    http.run().await
}
