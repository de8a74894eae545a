use crate::error::Result;
use crate::handlers::{
    check_rate_limit, delete_all_rate_limits, delete_rate_limit, get_rate_limit, health_check,
    AppState,
};
use crate::middleware::logging_middleware;
use crate::rate_limiter::RateLimiter;
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the admission API router.
pub fn create_app(rate_limiter: RateLimiter) -> Router {
    Router::new()
        // Rate limiting endpoints
        .route("/check/:endpoint_class", post(check_rate_limit))
        .route(
            "/limits/:endpoint_class",
            get(get_rate_limit).delete(delete_rate_limit),
        )
        .route("/limits", delete(delete_all_rate_limits))
        // Health endpoint
        .route("/health", get(health_check))
        .with_state(AppState::new(rate_limiter))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub fn new(bind_addr: SocketAddr, rate_limiter: RateLimiter) -> Self {
        Self {
            app: create_app(rate_limiter),
            bind_addr,
        }
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Linkguard server listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
