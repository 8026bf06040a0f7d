//! Launch and supervision failures.

use std::io;

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;
use crate::watcher::WatchError;

use super::shutdown::ShutdownError;

/// Why the daemon failed to start or to stop cleanly.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration, telemetry, data source or the start-up scan failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Bootstrap failure.
        #[from]
        source: BootstrapError,
    },
    /// The request endpoint could not be served.
    #[error("request listener failed: {source}")]
    Listener {
        /// Listener failure.
        #[from]
        source: ListenerError,
    },
    /// Hot reload was enabled but the component directory cannot be watched.
    #[error("cannot watch the component directory: {source}")]
    Watch {
        /// Watcher failure.
        #[from]
        source: WatchError,
    },
    /// No thread could be spawned for reload events.
    #[error("cannot spawn the reload worker: {source}")]
    ReloadWorker {
        /// Spawn failure.
        #[source]
        source: io::Error,
    },
    /// The reload worker panicked while applying an event.
    #[error("reload worker panicked")]
    ReloadPanic,
    /// Waiting for the stop signal failed.
    #[error("cannot await the shutdown signal: {source}")]
    Shutdown {
        /// Signal failure.
        #[from]
        source: ShutdownError,
    },
}
