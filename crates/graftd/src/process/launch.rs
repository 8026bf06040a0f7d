//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::StructuredHealthReporter;
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::builtin::Catalogue;
use crate::health::HealthReporter;
use crate::transport::{RequestConnectionHandler, SocketListener};

use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::PROCESS_TARGET;

/// Service dependencies required to construct the daemon runtime.
pub(crate) struct ServiceDeps<L> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) catalogue: Catalogue,
}

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) shutdown: S,
    pub(crate) services: ServiceDeps<L>,
}

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap, the request listener, the
/// watcher or the signal handlers fail.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        shutdown: SystemShutdownSignal::default(),
        services: ServiceDeps {
            loader: SystemConfigLoader,
            reporter: Arc::new(StructuredHealthReporter::new()),
            catalogue: Catalogue::builtin(),
        },
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan { shutdown, services } = plan;
    let ServiceDeps {
        loader,
        reporter,
        catalogue,
    } = services;

    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let daemon = bootstrap_with(&loader, reporter, catalogue)?;
    let listener = SocketListener::bind(daemon.config().listen_socket())?;
    let hot_reload = daemon.watch()?;
    let handler = Arc::new(RequestConnectionHandler::new(daemon.host()));
    let listener_handle = listener.start(handler)?;

    let waited = shutdown.wait();
    listener_handle.shutdown();
    let joined = listener_handle.join();
    if let Some(hot_reload) = hot_reload
        && let Err(error) = hot_reload.stop()
    {
        warn!(target: PROCESS_TARGET, %error, "reload worker did not stop cleanly");
    }
    // Teardown runs even when waiting for the signal failed.
    daemon.shutdown();
    waited?;
    joined?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
