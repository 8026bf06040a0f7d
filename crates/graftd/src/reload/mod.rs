//! Background worker turning file notifications into registry reloads.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace};

use graft_components::{ComponentLoader, ComponentRegistry, RegistrationOutcome};

use crate::health::HealthReporter;
use crate::process::LaunchError;
use crate::watcher::{WatchEvent, WatchEventKind};

const RELOAD_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reload");
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Collaborators a reload needs.
#[derive(Clone)]
pub(crate) struct ReloadDeps {
    pub(crate) loader: Arc<ComponentLoader>,
    pub(crate) registry: Arc<ComponentRegistry>,
    pub(crate) reporter: Arc<dyn HealthReporter>,
}

/// Thread consuming a watcher's event stream.
///
/// The worker exits when asked to stop or when the stream disconnects, which
/// happens once the watcher releases its handles.
pub struct ReloadWorker {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ReloadWorker {
    pub(crate) fn spawn(events: Receiver<WatchEvent>, deps: ReloadDeps) -> Result<Self, LaunchError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name(String::from("graft-reload"))
            .spawn(move || run(&events, &flag, &deps))
            .map_err(|source| LaunchError::ReloadWorker { source })?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Asks the worker to exit at its next wake-up.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the worker thread to finish.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::ReloadPanic`] when the worker panicked.
    pub fn join(mut self) -> Result<(), LaunchError> {
        self.shutdown();
        match self.handle.take().map(thread::JoinHandle::join) {
            Some(Err(_)) => Err(LaunchError::ReloadPanic),
            Some(Ok(())) | None => Ok(()),
        }
    }
}

impl Drop for ReloadWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ReloadWorker {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReloadWorker")
            .field("stopping", &self.shutdown.load(Ordering::SeqCst))
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn run(events: &Receiver<WatchEvent>, shutdown: &AtomicBool, deps: &ReloadDeps) {
    info!(target: RELOAD_TARGET, "reload worker started");
    while !shutdown.load(Ordering::SeqCst) {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                apply(&event, deps);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(target: RELOAD_TARGET, "reload worker stopped");
}

/// Handles one notification. Returns the registry outcome when the event
/// led to a registration or swap.
pub(crate) fn apply(event: &WatchEvent, deps: &ReloadDeps) -> Option<RegistrationOutcome> {
    let path = event.path.as_path();
    if !deps.loader.accepts(path) {
        trace!(target: RELOAD_TARGET, path = %path.display(), "not a component unit");
        return None;
    }
    if event.kind == WatchEventKind::Deleted || !path.exists() {
        // No unregistration path: the last good implementation keeps serving.
        info!(
            target: RELOAD_TARGET,
            path = %path.display(),
            "component source removed; registration retained"
        );
        return None;
    }
    reload(path, deps)
}

fn reload(path: &Path, deps: &ReloadDeps) -> Option<RegistrationOutcome> {
    let result = deps
        .loader
        .load(path)
        .and_then(|unit| deps.registry.reload(unit));
    match result {
        Ok(outcome) => {
            deps.reporter.component_reloaded(path, &outcome);
            Some(outcome)
        }
        Err(error) if error.is_missing_role() => {
            debug!(target: RELOAD_TARGET, path = %path.display(), "unit declares no role");
            None
        }
        Err(error) => {
            deps.reporter.reload_failed(path, &error);
            None
        }
    }
}
