//! CLI command implementations
//!
//! `serve` wires the node together: the in-process DCS seeded from the
//! configuration, the snapshot refresh loop, the standalone HA handle, the
//! local status probe and the REST listener. `validate` only loads the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::PgHaConfig;
use crate::dcs::{Dcs, MemoryDcs, SnapshotHandle};
use crate::ha::{run_refresh_loop, HaAction, StandaloneHa};
use crate::health::NodeIdentity;
use crate::http_server::{ApiServer, ApiState};
use crate::postgres::{Connector, FileConnector, PgConnector, Retry, State, StatusProbe};
use crate::shutdown::ShutdownSignal;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::Validate { config } => validate(&config),
    }
}

/// Load and validate a configuration file.
pub fn validate(config_path: &Path) -> CliResult<()> {
    let config = PgHaConfig::load(config_path)?;
    config.restapi.listen_addr()?;
    info!(
        name = %config.name,
        scope = %config.scope,
        listen = %config.restapi.listen,
        "configuration is valid"
    );
    Ok(())
}

/// Run the REST API until SIGTERM, Ctrl-C or `POST /sigterm`.
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = PgHaConfig::load(config_path)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(serve_node(config, config_path.to_path_buf()))
}

/// The status file when one is configured, the database otherwise.
/// Needs a running tokio runtime.
fn connector(config: &PgHaConfig) -> CliResult<Arc<dyn Connector>> {
    let settings = &config.postgresql;
    if let Some(path) = &settings.status_file {
        return Ok(Arc::new(FileConnector::new(path.clone())));
    }
    let connector = PgConnector::new(
        &settings.connect_url,
        settings.pool_size,
        Duration::from_secs(settings.connect_timeout),
    )
    .map_err(|e| CliError::boot_failed(format!("postgresql: {}", e.message)))?;
    Ok(Arc::new(connector))
}

async fn serve_node(config: PgHaConfig, config_path: PathBuf) -> CliResult<()> {
    let shutdown = Arc::new(ShutdownSignal::new());
    let snapshot = Arc::new(SnapshotHandle::with_settings(config.initial_settings()));
    let dcs: Arc<dyn Dcs> = Arc::new(MemoryDcs::new(config.dcs.seed.clone().unwrap_or_default()));

    let ha = Arc::new(StandaloneHa::new(
        config.name.clone(),
        Arc::clone(&snapshot),
        Arc::clone(&shutdown),
    ));
    ha.set_server_version(config.postgresql.server_version);
    ha.set_state(State::Running);

    let probe = Arc::new(StatusProbe::new(
        connector(&config)?,
        Retry::with_deadline(Duration::from_secs(config.dcs.retry_timeout)),
    ));

    let state = Arc::new(ApiState::new(
        NodeIdentity::new(config.name.clone(), config.scope.clone()),
        config.tags.clone(),
        Arc::clone(&dcs),
        Arc::clone(&snapshot),
        ha.clone(),
        probe,
        Arc::clone(&shutdown),
    ));

    let restapi = config.restapi.clone();
    let server = tokio::task::spawn_blocking(move || ApiServer::new(state, restapi))
        .await
        .map_err(|e| CliError::boot_failed(e.to_string()))??;
    let server = Arc::new(server);

    info!(name = %config.name, scope = %config.scope, "starting node");

    tokio::spawn(run_refresh_loop(
        Arc::clone(&dcs),
        Arc::clone(&snapshot),
        Arc::clone(&ha),
        Arc::clone(&shutdown),
    ));
    tokio::spawn(process_actions(
        Arc::clone(&ha),
        Arc::clone(&server),
        config_path.clone(),
        Arc::clone(&shutdown),
    ));
    tokio::spawn(watch_signals(
        Arc::clone(&server),
        config_path,
        Arc::clone(&shutdown),
    ));

    server
        .serve()
        .await
        .map_err(|e| CliError::io_error(format!("REST API failed: {}", e)))
}

/// Re-read the configuration file and apply its `restapi` section.
async fn reload(server: &ApiServer, config_path: &Path) {
    let path = config_path.to_path_buf();
    let loaded = tokio::task::spawn_blocking(move || PgHaConfig::load(&path)).await;
    match loaded {
        Ok(Ok(config)) => {
            if let Err(err) = server.reload_config(config.restapi).await {
                error!(error = %err, "configuration reload rejected");
            }
        }
        Ok(Err(err)) => error!(error = %err, "configuration reload failed"),
        Err(err) => error!(error = %err, "configuration reload task failed"),
    }
}

/// Execute what the REST API queued on the HA handle.
async fn process_actions(
    ha: Arc<StandaloneHa>,
    server: Arc<ApiServer>,
    config_path: PathBuf,
    shutdown: Arc<ShutdownSignal>,
) {
    loop {
        let actions = tokio::select! {
            actions = ha.next_actions() => actions,
            _ = shutdown.wait() => break,
        };
        for action in actions {
            match action {
                HaAction::Reload => reload(&server, &config_path).await,
                HaAction::Restart(request) => {
                    warn!(?request, "restart has no process manager attached");
                }
                HaAction::Reinitialize { force } => {
                    warn!(force, "reinitialize has no process manager attached");
                }
                HaAction::MppEvent(event) => info!(%event, "mpp event received"),
            }
        }
    }
}

#[cfg(unix)]
async fn watch_signals(server: Arc<ApiServer>, config_path: PathBuf, shutdown: Arc<ShutdownSignal>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut hangup, mut terminate) = match (
        signal(SignalKind::hangup()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(hangup), Ok(terminate)) => (hangup, terminate),
        (Err(err), _) | (_, Err(err)) => {
            error!(error = %err, "cannot install signal handlers");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading configuration");
                reload(&server, &config_path).await;
            }
            _ = terminate.recv() => {
                info!("SIGTERM received, shutting down");
                shutdown.trigger();
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                shutdown.trigger();
                break;
            }
            _ = shutdown.wait() => break,
        }
    }
}

#[cfg(not(unix))]
async fn watch_signals(_server: Arc<ApiServer>, _config_path: PathBuf, shutdown: Arc<ShutdownSignal>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            shutdown.trigger();
        }
        _ = shutdown.wait() => {}
    }
}
