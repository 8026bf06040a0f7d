//! Scenario world for the daemon behaviour suite.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use graft_components::{Request, Response, Verb};

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, HotReload, bootstrap_with};
use crate::builtin::Catalogue;
use crate::process::LaunchError;

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    pub files: TestConfigLoader,
    failing: bool,
    pub reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    hot_reload: Option<HotReload>,
    watch_result: Option<Result<bool, String>>,
    pub response: Option<Response>,
}

impl TestWorld {
    /// Builds a world backed by a fresh temporary component directory.
    pub fn new() -> Self {
        Self {
            files: TestConfigLoader::new(),
            failing: false,
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            bootstrap_error: None,
            hot_reload: None,
            watch_result: None,
            response: None,
        }
    }

    /// Makes the next bootstrap fail while loading configuration.
    pub fn use_failing_loader(&mut self) {
        self.failing = true;
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        let loader: &dyn ConfigLoader = if self.failing {
            &FailingConfigLoader
        } else {
            &self.files
        };
        match bootstrap_with(loader, self.reporter.clone(), Catalogue::builtin()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Attaches the watcher and reload worker when hot reload is enabled.
    pub fn attach_watcher(&mut self) {
        let Some(daemon) = self.daemon.as_ref() else {
            return;
        };
        self.watch_result = Some(match daemon.watch() {
            Ok(Some(hot_reload)) => {
                self.hot_reload = Some(hot_reload);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(error) => Err(error.to_string()),
        });
    }

    /// Whether the last attach produced a running watcher.
    pub fn watch_result(&self) -> Option<&Result<bool, String>> {
        self.watch_result.as_ref()
    }

    /// Stops the watcher and worker, if any.
    pub fn stop_watcher(&mut self) -> Result<(), LaunchError> {
        self.hot_reload.take().map_or(Ok(()), HotReload::stop)
    }

    /// Returns the bootstrap error, if any.
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// The running daemon.
    ///
    /// # Panics
    ///
    /// Panics when bootstrap did not succeed.
    pub fn daemon(&self) -> &Daemon {
        self.daemon.as_ref().expect("daemon should be running")
    }

    /// Serves one `GET` through the host and keeps the response.
    pub fn get(&mut self, path: &str) -> &Response {
        let response = self.daemon().host().handle(Request::new(Verb::Get, path));
        self.response.insert(response)
    }

    /// Repeats `GET` until the body matches or the settle timeout lapses.
    pub fn get_until(&mut self, path: &str, body: &str) -> &Response {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        loop {
            let response = self.daemon().host().handle(Request::new(Verb::Get, path));
            if response.body() == body || Instant::now() >= deadline {
                return self.response.insert(response);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Waits until the reporter has seen `count` applied reloads.
    pub fn await_reloads(&self, count: usize) -> bool {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        while Instant::now() < deadline {
            if self.reporter.reloads().len() >= count {
                return true;
            }
            thread::sleep(POLL_INTERVAL);
        }
        false
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        let _ = self.stop_watcher();
    }
}

/// Default test world fixture.
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
