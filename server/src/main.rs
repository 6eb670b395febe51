//! Tierward Server - Main Entry Point

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use tierward_server::{
    api,
    audit::{AuditLog, AuditLogOptions},
    config::{self, EngineMode},
    control::{self, Core},
    engine::{CommandExecutor, CommandSet, PermissionEngine, ProcessExecutor, SimulatedEngine},
    health::{self, HealthMonitor},
    notify::{LogNotifier, Notifier},
    reconcile::SessionWorkflow,
    state::{StateStore, StateStoreOptions},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tierward_server=debug,tower_http=info".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "Starting Tierward Server"
    );

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Could not create {}", config.data_dir.display()))?;

    // Control context owns the state store and audit log
    let store = StateStore::open(StateStoreOptions {
        path: Some(config.state_path()),
        persist_on_write: config.persist_on_write,
    });
    let audit = AuditLog::open(AuditLogOptions {
        path: Some(config.audit_path()),
        max_entries: config.audit_max_entries,
        enabled: config.audit_log_enabled,
        persist_on_write: config.persist_on_write,
    });
    let (control, control_task) = control::spawn_control(Core::new(store, audit));

    // Permission engine adapter
    let executor: Arc<dyn CommandExecutor> = match config.engine_mode {
        EngineMode::Process => {
            let executor = ProcessExecutor::from_launcher(&config.engine_exec)?;
            info!(launcher = executor.program(), "Using process engine executor");
            Arc::new(executor)
        }
        EngineMode::Simulated => {
            tracing::warn!("Using simulated permission engine, changes are not enforced");
            Arc::new(SimulatedEngine::new(config.engine_command_prefix.clone()))
        }
    };
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let engine = Arc::new(
        PermissionEngine::new(
            executor,
            CommandSet::new(config.engine_command_prefix.clone()),
            config.group_mapping()?,
            control.clone(),
            Arc::clone(&notifier),
        )
        .with_batch_delay(config.batch_delay()),
    );

    let workflow = SessionWorkflow::new(Arc::clone(&engine), control.clone(), notifier);
    let monitor = Arc::new(
        HealthMonitor::new(Arc::clone(&engine), control.clone(), config.data_dir.clone())
            .with_memory_threshold(config.memory_threshold_percent),
    );

    // Background tasks
    let autosave_task = control::spawn_autosave_task(
        control.clone(),
        config.auto_save_interval(),
        config.audit_retention_days,
    );
    let health_task = health::spawn_health_task(Arc::clone(&monitor), config.health_check_interval());

    let startup = monitor.run().await;
    if !startup.healthy {
        tracing::warn!(summary = %startup.summary(), "Starting in degraded state");
    }

    // Build application state
    let state = api::AppState::new(config.clone(), control.clone(), engine, workflow, monitor);
    let limiter_task = {
        let limiter = state.rate_limiter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                limiter.cleanup().await;
            }
        })
    };

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    autosave_task.abort();
    health_task.abort();
    limiter_task.abort();

    // Final flush of state and audit log
    control.shutdown().await?;
    control_task.await?;

    info!("Server shutdown complete");

    Ok(())
}
