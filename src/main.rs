use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use course_recommender::core;
use course_recommender::core::config::AppPaths;
use course_recommender::server;
use course_recommender::state::AppState;

const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    core::logging::init(&paths);
    let state = AppState::initialize(paths).await?;

    let config = state
        .config
        .load_config()
        .context("Failed to reload configuration")?;
    tracing::debug!(
        "Effective configuration: {}",
        state.config.redact_sensitive_values(&config)
    );

    let host = config["server"]["host"]
        .as_str()
        .unwrap_or("127.0.0.1")
        .to_string();
    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .or_else(|| {
            config["server"]["port"]
                .as_u64()
                .and_then(|port| u16::try_from(port).ok())
        })
        .unwrap_or(8000);
    let bind_addr = format!("{}:{}", host, port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            limiter.prune();
            tracing::trace!("rate limiter tracks {} clients", limiter.tracked_clients());
        }
    });

    let app: Router = server::router::router(state.clone());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
