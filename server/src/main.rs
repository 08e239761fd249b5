#![allow(missing_docs)]

use folio_server::api;
use folio_server::metrics;
use folio_server::state::AppState;

use axum::{middleware, routing::get, Router};
use clap::Parser;
use folio_config::{FolioConfig, LogFormat};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Folio auth gateway - verifies bearer tokens and caches the results.
#[derive(Parser)]
#[command(name = "folio-server")]
#[command(about = "Folio auth gateway")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", env = "FOLIO_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => folio_config::load_from_file(path),
        None => folio_config::load(),
    };
    // Any config error is fatal, including a bad file on the search path.
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Error: Failed to load config: {e}");
        std::process::exit(1);
    });

    init_logging(&config);

    let state = match AppState::from_config(&config.auth) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialise token verification");
            std::process::exit(1);
        }
    };
    let token_cache = Arc::clone(&state.token_cache);

    let app = build_app(state, &config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Folio auth gateway listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    let grace = Duration::from_secs(
        config
            .server
            .shutdown_timeout_secs
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
    );
    if tokio::time::timeout(grace, token_cache.shutdown()).await.is_err() {
        tracing::warn!(?grace, "Token cache sweeper did not stop in time");
    }
    tracing::info!("Shutdown complete");
}

fn build_app(state: Arc<AppState>, config: &FolioConfig) -> Router {
    let mut app = api::create_router(state);

    if config.server.metrics.enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                app = app.merge(
                    Router::new()
                        .route(&config.server.metrics.path, get(metrics::metrics_handler))
                        .with_state(handle),
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Prometheus recorder unavailable, metrics endpoint disabled");
            }
        }
    }

    let mut app = app.layer(middleware::from_fn(metrics::metrics_middleware));
    if let Some(secs) = config.server.request_timeout_secs {
        app = app.layer(TimeoutLayer::new(Duration::from_secs(secs)));
    }
    app.layer(TraceLayer::new_for_http())
}

fn init_logging(config: &FolioConfig) {
    let filter = if config.logging.filter.is_empty() {
        config.logging.level.as_str().to_string()
    } else {
        config.logging.filter.clone()
    };

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));

    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
