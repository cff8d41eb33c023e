use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use orgplane::app::{app, ApiSettings, AppState};
use orgplane::auth::TokenVerifier;
use orgplane::database::bootstrap::{bootstrap, resolve_catalog};
use orgplane::database::{DatabaseManager, PartitionRouter, PgTenantStore};
use orgplane::services::TenantService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = orgplane::config::config();
    config.validate().map_err(anyhow::Error::msg).context("invalid configuration")?;
    info!("Starting orgplane in {:?} mode", config.environment);

    let database_url = DatabaseManager::database_url_from_env()?;
    let db = DatabaseManager::connect(&database_url, &config.database)
        .await
        .context("failed to connect to the shared database")?;
    bootstrap(db.main_pool()).await.context("failed to prepare the shared area")?;
    let catalog = resolve_catalog(db.main_pool(), config.tenancy.catalog_path.as_deref())
        .await
        .context("failed to load the plan catalog")?;

    let router = Arc::new(PartitionRouter::new(db.partition_backend()));
    let store = Arc::new(PgTenantStore::new(db.main_pool().clone()));
    let tokens = TokenVerifier::from_config(&config.security)?;
    let state = AppState::new(
        store,
        router.clone(),
        Arc::new(catalog),
        tokens,
        ApiSettings::from_config(config),
    );

    let sweeper = spawn_trial_sweep(state.tenants.clone(), config.tenancy.trial_sweep_interval_secs);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("orgplane listening on http://{}", bind_addr);

    axum::serve(listener, app(state, config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    router.close_all().await;
    db.close().await;
    info!("orgplane stopped");
    Ok(())
}

/// Periodically move elapsed trials to `EXPIRED`. Disabled when the
/// interval is zero.
fn spawn_trial_sweep(service: Arc<TenantService>, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match service.expire_trials(chrono::Utc::now()).await {
                Ok(expired) if !expired.is_empty() => info!(count = expired.len(), "Expired trials"),
                Ok(_) => {}
                Err(e) => error!("Trial sweep failed: {}", e),
            }
        }
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
