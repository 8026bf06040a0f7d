//! Blocking wait for the signal that ends the daemon's serving phase.

use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use signal_hook::low_level::signal_name;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Source of the "stop serving" notification.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until the daemon should tear down.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Failure while waiting for shutdown.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Signal handlers could not be registered.
    #[error("cannot register handlers for signals {signals:?}: {source}")]
    Install {
        /// Signals that were requested.
        signals: Vec<i32>,
        /// Registration failure.
        #[source]
        source: io::Error,
    },
}

/// Waits for one of a set of POSIX termination signals.
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    signals: Vec<i32>,
}

impl SystemShutdownSignal {
    /// Listens for the given signal numbers instead of the default set.
    #[must_use]
    pub fn with_signals(signals: impl IntoIterator<Item = i32>) -> Self {
        Self {
            signals: signals.into_iter().collect(),
        }
    }
}

impl Default for SystemShutdownSignal {
    fn default() -> Self {
        Self::with_signals([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut registered =
            Signals::new(&self.signals).map_err(|source| ShutdownError::Install {
                signals: self.signals.clone(),
                source,
            })?;
        let received = registered.forever().next();
        if let Some(signal) = received {
            info!(
                target: PROCESS_TARGET,
                signal = signal_name(signal).unwrap_or("unknown"),
                "shutdown requested"
            );
        }
        Ok(())
    }
}
