use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use innkeep::api::{self, AppState};
use innkeep::config::Config;
use innkeep::engine::Engine;
use innkeep::notify::{self, LogNotifier, Notifier, Outbox, RetryPolicy, WebhookNotifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "innkeep=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    innkeep::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let (outbox, outbox_rx) = Outbox::new();
    let engine = Arc::new(Engine::new(config.wal_path(), outbox)?);

    let notifier: Arc<dyn Notifier> = match config.notify_webhook.as_deref() {
        Some(url) => Arc::new(WebhookNotifier::new(url)?),
        None => Arc::new(LogNotifier),
    };
    let policy = RetryPolicy {
        max_attempts: config.notify_max_attempts,
        ..RetryPolicy::default()
    };
    tokio::spawn(notify::run_dispatcher(outbox_rx, notifier, policy));
    tokio::spawn(innkeep::compactor::run_compactor(engine.clone(), config.compact_threshold));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("innkeep listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  api token: {}", if config.api_token.is_some() { "required" } else { "disabled" });
    info!("  notifications: {}", config.notify_webhook.as_deref().unwrap_or("log only"));
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let app = api::router(AppState::new(engine.clone(), config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Give queued notices a moment to go out before the runtime stops.
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("innkeep stopped");
    Ok(())
}

/// Resolves on SIGTERM or ctrl-c; axum then drains in-flight requests.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
