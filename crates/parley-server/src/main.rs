mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::AppStateInner;
use parley_gateway::longpoll::LongPoll;
use parley_gateway::notifier::ChangeNotifier;
use parley_store::{Clock, IdentityStore, MessageLog, SystemClock};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Stores
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let online_window = chrono::Duration::from_std(config.online_window)?;
    let identity = Arc::new(IdentityStore::new(clock.clone(), online_window));
    let log = Arc::new(MessageLog::new(identity.clone(), clock));
    let longpoll = LongPoll::new(log, ChangeNotifier::new(), config.long_poll_timeout);

    if let Some(admin) = &config.admin {
        identity
            .add(&admin.username, &admin.password, true)
            .map_err(|e| anyhow::anyhow!("creating admin {}: {}", admin.username, e))?;
        info!("Admin account {} created", admin.username);
    }

    let app = parley_api::router(AppStateInner::new(identity, longpoll))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Parley server listening on {}", addr);
    info!(
        "Long-poll timeout {}s, online window {}s",
        config.long_poll_timeout.as_secs(),
        config.online_window.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
