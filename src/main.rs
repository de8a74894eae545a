use anyhow::Result;
use linkguard::config::Config;
use linkguard::rate_limiter::RateLimiter;
use linkguard::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("linkguard={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting linkguard service");

    let limits = config
        .rate_limit_config()
        .map_err(|e| anyhow::anyhow!("Invalid rate limit configuration: {}", e))?;

    tracing::info!(
        "Configuration: bind_addr={}, strategy={}, shorten={}/{}s, redirect={}/{}s",
        config.bind_addr,
        limits.strategy,
        limits.shorten.max_requests,
        limits.shorten.window.as_secs_f64(),
        limits.redirect.max_requests,
        limits.redirect.window.as_secs_f64()
    );

    let rate_limiter = RateLimiter::new(limits)
        .map_err(|e| anyhow::anyhow!("Failed to create rate limiter: {}", e))?;

    Server::new(config.bind_addr, rate_limiter)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
