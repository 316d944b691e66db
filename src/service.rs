//! Process wiring: builds the store, OBS client, Telegram channel and
//! scheduler from a [`WatchConfig`] and runs them until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gradewatch_obs::ObsClient;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::channels::{ChannelAdapter, ChannelNotifier, ChannelRuntime, TelegramAdapter};
use crate::commands::CommandHandler;
use crate::config::{ConfigSeverity, WatchConfig};
use crate::error::WatchError;
use crate::gateway;
use crate::scheduler::{FleetConfig, FleetScheduler, SweepReport, SweepRunner};
use crate::store::{SnapshotStore, SqliteSnapshotStore};

/// Everything a running watcher is made of.
pub struct Components {
    pub store: Arc<SqliteSnapshotStore>,
    pub adapter: Arc<TelegramAdapter>,
    pub notifier: Arc<ChannelNotifier>,
    pub fleet: FleetScheduler<ObsClient>,
}

/// Log validation issues and refuse to continue on errors.
pub fn check_config(config: &WatchConfig) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => warn!(id = %issue.id, "{}", issue.summary),
            ConfigSeverity::Error => error!(id = %issue.id, "{}", issue.summary),
        }
    }
    if WatchConfig::has_blocking_issues(&issues) {
        anyhow::bail!("configuration has blocking errors");
    }
    Ok(())
}

/// Open the store and construct all collaborators. No network traffic.
pub fn build(config: &WatchConfig) -> anyhow::Result<Components> {
    check_config(config)?;

    let db_path = config.store.resolved_path();
    let store = Arc::new(
        SqliteSnapshotStore::open(&db_path)
            .with_context(|| format!("failed to open store at {}", db_path.display()))?,
    );
    info!(path = %db_path.display(), "snapshot store opened");

    let obs = Arc::new(ObsClient::new(config.obs.clone()).context("invalid OBS configuration")?);
    let adapter = Arc::new(TelegramAdapter::new(
        &config.telegram,
        config.telegram.resolved_bot_token(),
    )?);
    let notifier = Arc::new(ChannelNotifier::new(
        Arc::clone(&adapter) as Arc<dyn ChannelAdapter>,
        config.telegram.rate_limits(),
    ));
    let fleet = FleetScheduler::new(
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        obs,
        Arc::clone(&notifier) as _,
        FleetConfig::from(&config.scheduler),
    );

    Ok(Components {
        store,
        adapter,
        notifier,
        fleet,
    })
}

/// Run a single sweep and return its report.
pub async fn sweep_once(config: &WatchConfig) -> anyhow::Result<SweepReport> {
    let components = build(config)?;
    let report = components.fleet.sweep().await;
    if let Some(reason) = &report.listing_error {
        return Err(WatchError::Scheduler(format!("could not list eligible users: {reason}")).into());
    }
    Ok(report)
}

/// Run the watcher until Ctrl-C or SIGTERM.
pub async fn run(config: WatchConfig) -> anyhow::Result<()> {
    let components = build(&config)?;
    run_until(&config, components, shutdown_signal()).await
}

/// Run the watcher until `shutdown` resolves.
pub async fn run_until(
    config: &WatchConfig,
    components: Components,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let Components {
        store,
        adapter,
        notifier,
        fleet,
    } = components;

    match adapter.health_check().await {
        Ok(true) => info!("telegram bot reachable"),
        Ok(false) => warn!("telegram health check failed; continuing"),
        Err(err) => warn!("telegram health check errored: {err}; continuing"),
    }

    let cancel = fleet.shutdown_token();
    let mut tasks = JoinSet::new();

    let runner = SweepRunner::new(
        fleet.clone(),
        Duration::from_secs(config.scheduler.interval_secs),
    )
    .with_startup_sweep(config.scheduler.startup_sweep)
    .run();
    tasks.spawn(async move {
        if let Err(err) = runner.await {
            error!("sweep runner task failed: {err}");
        }
    });

    if config.gateway.enabled {
        let gateway_config = config.gateway.clone();
        let fleet = fleet.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(err) = gateway::run_gateway(&gateway_config, fleet, cancel).await {
                error!("admin gateway stopped: {err}");
            }
        });
    }

    let handler = CommandHandler::new(Arc::clone(&store) as Arc<dyn SnapshotStore>, fleet.clone());
    let runtime = ChannelRuntime::new(adapter, notifier, handler)
        .with_queue_size(config.telegram.inbound_queue_size);
    let runtime_cancel = cancel.clone();
    tasks.spawn(async move {
        if let Err(err) = runtime.run(runtime_cancel).await {
            error!("channel runtime failed: {err}");
        }
    });

    info!("gradewatch running");
    shutdown.await;
    info!("shutting down");
    fleet.shutdown();
    while tasks.join_next().await.is_some() {}
    info!("gradewatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
