pub mod adapter;
pub mod algorithms;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod key;
pub mod middleware;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod store;

pub use adapter::admit;
pub use algorithms::Decision;
pub use config::Config;
pub use error::{Error, Result};
pub use key::{EndpointClass, RateLimitKey};
pub use rate_limit_config::{LimitSpec, RateLimitConfig, RateLimitStrategy};
pub use rate_limiter::RateLimiter;
pub use server::create_app;
