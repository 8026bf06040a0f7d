//! Shared configuration for the graft daemon and its component registry.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file, then `GRAFT_*` environment variables, then command-line
//! flags. The same [`Config`] drives the startup scan of the component
//! directory, the hot-reload toggle, the request listener and telemetry.
//!
//! Hot reload is controlled by `GRAFT_HOT_RELOAD`. When it is `false` the
//! daemon performs the one-time startup load and behaves as a static registry.

mod datasource;
mod defaults;
mod logging;
mod socket;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use datasource::{DataSourceDiscovery, DataSourceError, DataSourceSettings};
pub use defaults::{
    DATASOURCE_FILE_NAME, DEFAULT_COMPONENTS_DIR, DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT,
    default_components_dir, default_log_filter, default_log_filter_string, default_log_format,
    default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved configuration shared by the daemon and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "GRAFT")]
pub struct Config {
    /// Root directory scanned recursively for component units.
    #[ortho_config(default = defaults::default_components_dir())]
    pub components_dir: Utf8PathBuf,
    /// Explicit location of the data-source settings file. Defaults to a
    /// `datasource.toml` sitting next to the component directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource_file: Option<Utf8PathBuf>,
    /// Enables the directory watcher and live component replacement.
    #[ortho_config(default = true)]
    pub hot_reload: bool,
    /// Endpoint on which the daemon accepts requests.
    #[ortho_config(default = defaults::default_socket_endpoint())]
    pub listen_socket: SocketEndpoint,
    /// `tracing` filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            components_dir: default_components_dir(),
            datasource_file: None,
            hot_reload: true,
            listen_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Directory holding the component units.
    #[must_use]
    pub fn components_dir(&self) -> &Utf8Path {
        self.components_dir.as_path()
    }

    /// Whether file changes should be picked up while running.
    #[must_use]
    pub fn hot_reload(&self) -> bool {
        self.hot_reload
    }

    /// Endpoint the request listener binds to.
    #[must_use]
    pub fn listen_socket(&self) -> &SocketEndpoint {
        &self.listen_socket
    }

    /// Filter expression handed to the telemetry subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Selected log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Location of the data-source settings file.
    ///
    /// An explicit `datasource_file` wins. Otherwise the file is expected as a
    /// sibling of the component directory, or inside the working directory
    /// when the component directory has no parent.
    #[must_use]
    pub fn datasource_path(&self) -> Utf8PathBuf {
        if let Some(path) = &self.datasource_file {
            return path.clone();
        }
        match self
            .components_dir
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
        {
            Some(parent) => parent.join(DATASOURCE_FILE_NAME),
            None => Utf8PathBuf::from(DATASOURCE_FILE_NAME),
        }
    }
}
