use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::rate_limit_config::{LimitSpec, RateLimitConfig, RateLimitStrategy};

/// Service configuration, from command-line flags or environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "linkguard", version, about = "Per-user rate limiting for a URL shortener")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Algorithm enforcing every limit: token-bucket, sliding-window or fixed-window
    #[arg(long, env = "RATE_LIMIT_STRATEGY", default_value = "sliding-window")]
    pub strategy: RateLimitStrategy,

    /// Requests per window allowed on POST /shorten
    #[arg(long, env = "SHORTEN_LIMIT", default_value_t = 10)]
    pub shorten_limit: u32,

    /// Window for the shorten limit, e.g. "60s" or "1m"
    #[arg(long, env = "SHORTEN_WINDOW", default_value = "60s", value_parser = parse_window)]
    pub shorten_window: Duration,

    /// Requests per window allowed on redirects
    #[arg(long, env = "REDIRECT_LIMIT", default_value_t = 100)]
    pub redirect_limit: u32,

    /// Window for the redirect limit
    #[arg(long, env = "REDIRECT_WINDOW", default_value = "60s", value_parser = parse_window)]
    pub redirect_window: Duration,

    /// Evict least recently used keys beyond this many per endpoint class
    #[arg(long, env = "MAX_TRACKED_KEYS")]
    pub max_tracked_keys: Option<usize>,

    /// JSON file with limits; overrides the limit flags when given
    #[arg(long, env = "LIMITS_FILE")]
    pub limits_file: Option<PathBuf>,

    /// Log level for the linkguard target
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

fn parse_window(raw: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}

impl Config {
    /// Load configuration from flags and environment
    pub fn from_env() -> Self {
        Config::parse()
    }

    /// Build the limiter configuration. Invalid limits are rejected here,
    /// before any traffic is served.
    pub fn rate_limit_config(&self) -> Result<RateLimitConfig> {
        if let Some(path) = &self.limits_file {
            return RateLimitConfig::from_json_file(path);
        }

        let config = RateLimitConfig {
            strategy: self.strategy,
            shorten: LimitSpec::new(self.shorten_limit, self.shorten_window)?,
            redirect: LimitSpec::new(self.redirect_limit, self.redirect_window)?,
            max_tracked_keys: self.max_tracked_keys,
        };
        config.validate()?;
        Ok(config)
    }
}
