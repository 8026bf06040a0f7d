//! Daemon bootstrap orchestration.
//!
//! Start-up runs in a fixed order: configuration, telemetry, socket
//! preparation, the optional connection pool, the host with the fallback
//! filter installed first, the start-up scan, and finally the host start that
//! freezes routing and fires the context start-up callbacks. The watcher is
//! attached afterwards through [`Daemon::watch`].

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::{info, warn};

use graft_components::{
    ComponentLoader, ComponentRegistry, ConnectionFactories, ConnectionPool, DescriptorCompiler,
    FallbackDispatchFilter, HostError, ScanReport, TeardownReport,
};
use graft_config::{
    Config, DataSourceDiscovery, DataSourceError, DataSourceSettings, SocketPreparationError,
};

use crate::builtin::Catalogue;
use crate::health::HealthReporter;
use crate::host::InProcessHost;
use crate::process::LaunchError;
use crate::reload::{ReloadDeps, ReloadWorker};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::watcher::DirectoryWatcher;

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare listen socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The data-source settings file exists but could not be used.
    #[error("failed to read data-source settings: {source}")]
    DataSource {
        /// Underlying settings error.
        #[source]
        source: DataSourceError,
    },
    /// The fallback dispatch filter could not be installed.
    #[error("failed to install fallback dispatch: {source}")]
    Host {
        /// Host refusal.
        #[source]
        source: HostError,
    },
}

/// Hot-reload machinery attached to a running daemon.
#[derive(Debug)]
pub struct HotReload {
    watcher: DirectoryWatcher,
    worker: ReloadWorker,
}

impl HotReload {
    /// The attached watcher.
    #[must_use]
    pub fn watcher(&self) -> &DirectoryWatcher {
        &self.watcher
    }

    /// Releases the watch handles and waits for the reload worker to exit.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::ReloadPanic`] when the worker panicked.
    pub fn stop(mut self) -> Result<(), LaunchError> {
        self.watcher.stop();
        self.worker.join()
    }
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
    host: Arc<InProcessHost>,
    registry: Arc<ComponentRegistry>,
    loader: Arc<ComponentLoader>,
    scan: ScanReport,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// The host serving requests.
    #[must_use]
    pub fn host(&self) -> Arc<InProcessHost> {
        Arc::clone(&self.host)
    }

    /// The component registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Outcome of the start-up scan.
    #[must_use]
    pub fn scan_report(&self) -> &ScanReport {
        &self.scan
    }

    /// Attaches the directory watcher and its reload worker. Returns `None`
    /// when hot reload is disabled, leaving the registry static.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Watch`] when the component directory cannot be
    /// watched, or [`LaunchError::ReloadWorker`] when the worker thread cannot
    /// be spawned.
    pub fn watch(&self) -> Result<Option<HotReload>, LaunchError> {
        if !self.config.hot_reload() {
            info!(target: BOOTSTRAP_TARGET, "hot reload disabled; registry is static");
            return Ok(None);
        }
        let root = self.config.components_dir().as_std_path();
        let (watcher, events) =
            DirectoryWatcher::watch(root).map_err(|source| LaunchError::Watch { source })?;
        let worker = ReloadWorker::spawn(
            events,
            ReloadDeps {
                loader: Arc::clone(&self.loader),
                registry: Arc::clone(&self.registry),
                reporter: Arc::clone(&self.reporter),
            },
        )?;
        Ok(Some(HotReload { watcher, worker }))
    }

    /// Drains the registry, running every teardown callback.
    pub fn shutdown(&self) -> TeardownReport {
        let report = self.registry.teardown();
        self.reporter.teardown_completed(&report);
        report
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("host", &self.host)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    catalogue: Catalogue,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match start(loader, &reporter, catalogue) {
        Ok(daemon) => {
            reporter.bootstrap_succeeded(daemon.config());
            Ok(daemon)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn start(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    catalogue: Catalogue,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .listen_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    let (factories, drivers) = catalogue.into_parts();
    let pool = open_pool(&config, &drivers)?;
    let host = Arc::new(InProcessHost::new().with_pool(pool));
    let registry = Arc::new(ComponentRegistry::new(Arc::clone(&host) as _));
    if config.hot_reload() {
        let fallback = FallbackDispatchFilter::new(&registry, true);
        host.install_filter(Arc::new(fallback))
            .map_err(|source| BootstrapError::Host { source })?;
    }

    let component_loader = Arc::new(ComponentLoader::new(Arc::new(DescriptorCompiler::new(
        Arc::new(factories),
    ))));
    let scan = registry.register_all(&component_loader, config.components_dir().as_std_path());
    reporter.scan_completed(&scan);
    host.start();

    Ok(Daemon {
        config,
        telemetry,
        reporter: Arc::clone(reporter),
        host,
        registry,
        loader: component_loader,
        scan,
    })
}

/// Builds the connection pool when complete data-source settings name a
/// registered driver. Anything short of that means no managed connection
/// resource.
fn open_pool(
    config: &Config,
    drivers: &ConnectionFactories,
) -> Result<Option<Arc<ConnectionPool>>, BootstrapError> {
    let path = config.datasource_path();
    let settings = match DataSourceSettings::discover(&path)
        .map_err(|source| BootstrapError::DataSource { source })?
    {
        DataSourceDiscovery::Absent => {
            info!(target: BOOTSTRAP_TARGET, path = %path, "no data-source settings");
            return Ok(None);
        }
        DataSourceDiscovery::Incomplete { missing } => {
            warn!(
                target: BOOTSTRAP_TARGET,
                path = %path,
                missing = ?missing,
                "data-source settings incomplete; no managed connections"
            );
            return Ok(None);
        }
        DataSourceDiscovery::Ready(settings) => settings,
    };

    let pool = match ConnectionPool::from_factories(settings, drivers) {
        Ok(pool) => pool,
        Err(error) => {
            warn!(target: BOOTSTRAP_TARGET, %error, "no managed connections");
            return Ok(None);
        }
    };
    if let Err(error) = pool.warm() {
        warn!(
            target: BOOTSTRAP_TARGET,
            %error,
            "connection pool could not be warmed; connections open on demand"
        );
    }
    info!(
        target: BOOTSTRAP_TARGET,
        driver = %pool.settings().driver,
        max = pool.max(),
        open = pool.open(),
        "connection pool ready"
    );
    Ok(Some(Arc::new(pool)))
}
