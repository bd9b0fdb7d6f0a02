use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use returns_api::{config::AppConfig, create_app, ratelimit::RateLimiter, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    info!(
        limit = config.rate_limiting.requests_per_window,
        window_secs = config.rate_limiting.window_seconds,
        key_source = ?config.rate_limiting.key_source,
        "Configuration loaded"
    );

    let metrics = if config.metrics.enabled {
        let handle = returns_api::metrics::install_recorder()?;
        info!("Prometheus recorder installed");
        Some(handle)
    } else {
        None
    };

    // One limiter for the whole process, shared by every connection.
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limiting));
    let sweeper = match config.rate_limiting.sweep_interval() {
        Some(every) => Some(
            limiter
                .clone()
                .spawn_sweeper(every, config.rate_limiting.eviction_grace()),
        ),
        None => {
            warn!("Rate limit tracker eviction disabled, tracker map will grow unbounded");
            None
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, limiter, metrics);
    let app = create_app(state)?;

    let listener = TcpListener::bind(&addr).await?;
    info!("Returns API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
        info!("Rate limit tracker sweeper stopped");
    }

    info!("Returns API stopped");
    Ok(())
}

fn init_tracing() -> Result<()> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(filter);

    match log_format.as_str() {
        "json" => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        _ => subscriber.with(tracing_subscriber::fmt::layer()).try_init()?,
    }

    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
