//! Structured health reporting for daemon lifecycle events.

use std::path::Path;
use std::sync::Arc;

use graft_components::{ComponentError, RegistrationOutcome, ScanReport, TeardownReport};
use graft_config::Config;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the start-up scan of the component directory finishes.
    fn scan_completed(&self, report: &ScanReport);

    /// Invoked after a changed unit was registered or swapped into place.
    fn component_reloaded(&self, path: &Path, outcome: &RegistrationOutcome);

    /// Invoked when a changed unit could not be reloaded.
    fn reload_failed(&self, path: &Path, error: &ComponentError);

    /// Invoked after the registry has been drained on shutdown.
    fn teardown_completed(&self, report: &TeardownReport);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn scan_completed(&self, report: &ScanReport) {
        (**self).scan_completed(report);
    }

    fn component_reloaded(&self, path: &Path, outcome: &RegistrationOutcome) {
        (**self).component_reloaded(path, outcome);
    }

    fn reload_failed(&self, path: &Path, error: &ComponentError) {
        (**self).reload_failed(path, error);
    }

    fn teardown_completed(&self, report: &TeardownReport) {
        (**self).teardown_completed(report);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.listen_socket(),
            components = %config.components_dir(),
            hot_reload = config.hot_reload(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn scan_completed(&self, report: &ScanReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "scan_completed",
            registered = report.registered.len(),
            pending = report.pending.len(),
            ignored = report.ignored.len(),
            failed = report.failures.len(),
            "component scan completed"
        );
        for failure in &report.failures {
            tracing::warn!(
                target: HEALTH_TARGET,
                event = "component_unavailable",
                path = %failure.path.display(),
                error = %failure.error,
                "component could not be loaded"
            );
        }
    }

    fn component_reloaded(&self, path: &Path, outcome: &RegistrationOutcome) {
        let state = match outcome {
            RegistrationOutcome::Registered(_) => "registered",
            RegistrationOutcome::Pending(_) => "pending",
            RegistrationOutcome::Reloaded(_) => "swapped",
        };
        tracing::info!(
            target: HEALTH_TARGET,
            event = "component_reloaded",
            path = %path.display(),
            identity = %outcome.identity(),
            state,
            "component reloaded"
        );
    }

    fn reload_failed(&self, path: &Path, error: &ComponentError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "reload_failed",
            path = %path.display(),
            error = %error,
            "component reload failed; previous implementation retained"
        );
    }

    fn teardown_completed(&self, report: &TeardownReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "teardown_completed",
            evicted = report.evicted,
            context_listeners = report.context_listeners_destroyed,
            components = report.components_destroyed,
            "component registry torn down"
        );
    }
}
