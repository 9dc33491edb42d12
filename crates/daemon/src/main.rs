//! podhostd: the control plane daemon.
//!
//! Wires the store, container runtime, and adapter registry together, then
//! drives the reconcile loop until shutdown. Status changes observed by the
//! feed are logged for operators.

mod config;

use anyhow::Context;
use clap::Parser;
use config::DaemonConfig;
use podhost_adapters::{AdapterRegistry, ChatRelayAdapter};
use podhost_core::{EncryptionKey, Reconciler, StatusFeed};
use podhost_runtime::{ContainerRuntime, DockerRuntime, RuntimeContext};
use podhost_store::{PodStore, PostgresStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "podhostd", version, about = "Multi-tenant pod control plane")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run one reconcile pass and exit.
    #[arg(long)]
    once: bool,
}

fn init_tracing(cfg: &DaemonConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = DaemonConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&cfg);

    // Fail fast on a malformed key instead of at the first pod create.
    if let Some(hex_key) = &cfg.encryption_key {
        EncryptionKey::from_hex(hex_key).context("invalid encryption key")?;
    } else {
        warn!("no encryption key configured; gateway tokens will be stored in plaintext");
    }

    let store = PostgresStore::connect(&cfg.database_url, cfg.max_db_connections)
        .await
        .context("failed to connect to database")?;
    store
        .initialize_schema()
        .await
        .context("failed to initialize schema")?;
    let store: Arc<dyn PodStore> = Arc::new(store);

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerRuntime::connect().context("failed to connect to container engine")?);

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(ChatRelayAdapter::default()));
    info!(adapters = registry.len(), "adapter registry ready");
    let registry = Arc::new(registry);

    let reconciler = Reconciler::new(
        store.clone(),
        runtime.clone(),
        registry,
        RuntimeContext {
            network: cfg.network.clone(),
            domain: cfg.domain.clone(),
        },
        Duration::from_secs(cfg.reconcile_interval_secs),
    );

    if cli.once {
        let summary = reconciler.reconcile_once().await?;
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "reconcile pass complete"
        );
        for failure in &summary.failures {
            warn!(pod_id = %failure.pod_id, error = %failure.error, "pod failed to converge");
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed = StatusFeed::new(
        store.clone(),
        Duration::from_secs(cfg.status_feed_interval_secs),
    );
    let mut changes = feed.subscribe(shutdown_rx.clone());
    tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            info!(
                pod_id = %change.pod_id,
                phase = %change.phase,
                ready = change.ready,
                "pod status changed"
            );
        }
    });

    let reconciler_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { reconciler.run(shutdown).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    reconciler_task
        .await
        .context("reconciler task panicked")?;
    info!("shutdown complete");
    Ok(())
}
