//! Instance Orchestrator Service
//!
//! HTTP service that manages per-tenant tool-executing instances:
//! - Spawns a dedicated backend instance on a tenant's first tool call
//! - Routes `/execute` invocations to the tenant's instance verbatim
//! - Exposes instance inspection and explicit despawn endpoints

use std::sync::Arc;
use std::time::Duration;

use orchestrator::provider::K8sProvider;
use orchestrator::server::{router, AppState};
use orchestrator::{Orchestrator, OrchestratorConfig};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Outer request deadline: spawn polling plus the proxied call itself.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting instance orchestrator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = OrchestratorConfig::from_env();
    let bind_address = config.bind_address.clone();
    let proxy_timeout = config.proxy_timeout;

    let orchestrator = match K8sProvider::new(config).await {
        Ok(provider) => {
            info!("Connected to Kubernetes cluster");
            Some(Arc::new(Orchestrator::new(
                Arc::new(provider),
                proxy_timeout,
            )))
        }
        Err(e) => {
            error!("Failed to initialize provider: {}", e);
            error!("Orchestrator endpoints will answer 503; check the cluster configuration and restart");
            None
        }
    };

    let app = router(AppState { orchestrator }).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
    );

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Orchestrator HTTP server listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Orchestrator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
