use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use converge_core::{Config, Project};
use converge_sync::{applier_for, Applier, GitAccess, RepositoryAccess};

use crate::error::{io_err, DaemonError};
use crate::http::{self, AppState};
use crate::reconcile::{LoopSettings, ReconciliationLoop};
use crate::status::{Phase, StatusBoard};
use crate::trigger::{TriggerBroadcaster, TriggerReceiver};

/// Chooses the apply action for each project.
pub type ApplierFactory = Arc<dyn Fn(&Project) -> Arc<dyn Applier> + Send + Sync>;

/// Start the daemon and block the current thread until it exits.
pub fn start_blocking(config: Config, log_level: &str, json: bool) -> Result<(), DaemonError> {
    init_tracing(log_level, json);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        let _ = fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

/// Run the daemon with the git backend until ctrl-c or SIGTERM.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| DaemonError::Server(format!("failed to bind {}: {e}", config.listen_addr)))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(shutdown_signal(shutdown, shutdown_rx))
    };

    let access: Arc<dyn RepositoryAccess> = Arc::new(GitAccess::new());
    let appliers: ApplierFactory = Arc::new(|project: &Project| applier_for(project));
    let result = serve(config, listener, access, appliers, shutdown_tx.clone()).await;

    let _ = shutdown_tx.send(());
    if let Err(err) = signal_handle.await {
        tracing::warn!(error = %err, "signal handler task failed");
    }
    result
}

/// Start one loop per project and serve the control surface on `listener`.
///
/// Returns once `shutdown` fires and every loop has finished its current pass.
pub async fn serve(
    config: Config,
    listener: TcpListener,
    access: Arc<dyn RepositoryAccess>,
    appliers: ApplierFactory,
    shutdown: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let settings = LoopSettings::from(&config);
    let broadcaster = Arc::new(TriggerBroadcaster::new());
    let status = StatusBoard::new();
    let mut server_shutdown = shutdown.subscribe();

    if config.projects.is_empty() {
        tracing::warn!("no projects configured; triggers will have nothing to reconcile");
    }
    for project in &config.projects {
        status.insert(project).await;
    }

    let loops = if config.strict_startup {
        let initialized =
            initialize_all(&config.projects, &access, &appliers, settings, &status).await?;
        initialized
            .into_iter()
            .map(|reconciler| {
                let triggers = broadcaster.register(reconciler.project().name.clone());
                tokio::spawn(reconciler.run(triggers, shutdown.subscribe()))
            })
            .collect::<Vec<_>>()
    } else {
        config
            .projects
            .iter()
            .map(|project| {
                let triggers = broadcaster.register(project.name.clone());
                tokio::spawn(start_project(
                    project.clone(),
                    access.clone(),
                    appliers(project),
                    settings,
                    status.clone(),
                    triggers,
                    shutdown.subscribe(),
                ))
            })
            .collect::<Vec<_>>()
    };

    let addr = listener.local_addr().map_err(|e| io_err("listener", e))?;
    tracing::info!(
        %addr,
        projects = config.projects.len(),
        interval_secs = settings.interval.as_secs(),
        "converge daemon listening",
    );

    let app = http::router(AppState::new(broadcaster, status));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.recv().await;
        })
        .await
        .map_err(|e| DaemonError::Server(e.to_string()));

    let _ = shutdown.send(());
    for handle in loops {
        handle_join("reconciliation", handle).await?;
    }
    tracing::info!("converge daemon stopped");
    served
}

/// Start one project. A startup failure stops only this project; dropping
/// `triggers` closes its slot.
async fn start_project(
    project: Project,
    access: Arc<dyn RepositoryAccess>,
    applier: Arc<dyn Applier>,
    settings: LoopSettings,
    status: StatusBoard,
    triggers: TriggerReceiver,
    shutdown: broadcast::Receiver<()>,
) {
    let name = project.name.clone();
    match ReconciliationLoop::initialize(project, access, applier, settings, status.clone()).await {
        Ok(reconciler) => reconciler.run(triggers, shutdown).await,
        Err(err) => {
            tracing::error!(project = %name, error = %err, "project failed to start; other projects continue");
            mark_failed(&status, &name, &err).await;
        }
    }
}

/// Initialize every project concurrently; fail if any one fails.
async fn initialize_all(
    projects: &[Project],
    access: &Arc<dyn RepositoryAccess>,
    appliers: &ApplierFactory,
    settings: LoopSettings,
    status: &StatusBoard,
) -> Result<Vec<ReconciliationLoop>, DaemonError> {
    let handles: Vec<_> = projects
        .iter()
        .map(|project| {
            tokio::spawn(ReconciliationLoop::initialize(
                project.clone(),
                access.clone(),
                appliers(project),
                settings,
                status.clone(),
            ))
        })
        .collect();

    let mut initialized = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for (project, handle) in projects.iter().zip(handles) {
        let result = handle
            .await
            .map_err(|err| DaemonError::Task(format!("initialize {}: {err}", project.name)))
            .and_then(|inner| inner);
        match result {
            Ok(reconciler) => initialized.push(reconciler),
            Err(err) => {
                tracing::error!(project = %project.name, error = %err, "project failed to start");
                mark_failed(status, &project.name, &err).await;
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(initialized),
    }
}

async fn mark_failed(status: &StatusBoard, name: &converge_core::ProjectName, err: &DaemonError) {
    let message = err.to_string();
    status
        .update(name, move |s| {
            s.phase = Phase::Failed;
            s.last_error = Some(message);
        })
        .await;
}

async fn shutdown_signal(shutdown: broadcast::Sender<()>, mut shutdown_rx: broadcast::Receiver<()>) {
    tokio::select! {
        _ = shutdown_rx.recv() => {}
        _ = terminate() => {
            tracing::info!("received shutdown signal, stopping daemon");
            let _ = shutdown.send(());
        }
    }
}

async fn terminate() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}

async fn handle_join(task: &str, handle: JoinHandle<()>) -> Result<(), DaemonError> {
    handle
        .await
        .map_err(|err| DaemonError::Task(format!("{task} task join failure: {err}")))
}
