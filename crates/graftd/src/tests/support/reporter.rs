//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use graft_components::{ComponentError, RegistrationOutcome, ScanReport, TeardownReport};
use graft_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// The start-up scan finished.
    ScanCompleted {
        registered: usize,
        pending: usize,
        failed: usize,
    },
    /// A changed unit was applied.
    ComponentReloaded(RegistrationOutcome),
    /// A changed unit was rejected.
    ReloadFailed(PathBuf),
    /// The registry was drained.
    TeardownCompleted(TeardownReport),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Outcomes of every applied reload, in order.
    #[must_use]
    pub fn reloads(&self) -> Vec<RegistrationOutcome> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::ComponentReloaded(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn scan_completed(&self, report: &ScanReport) {
        self.record(HealthEvent::ScanCompleted {
            registered: report.registered.len(),
            pending: report.pending.len(),
            failed: report.failures.len(),
        });
    }

    fn component_reloaded(&self, _path: &Path, outcome: &RegistrationOutcome) {
        self.record(HealthEvent::ComponentReloaded(outcome.clone()));
    }

    fn reload_failed(&self, path: &Path, _error: &ComponentError) {
        self.record(HealthEvent::ReloadFailed(path.to_path_buf()));
    }

    fn teardown_completed(&self, report: &TeardownReport) {
        self.record(HealthEvent::TeardownCompleted(*report));
    }
}
