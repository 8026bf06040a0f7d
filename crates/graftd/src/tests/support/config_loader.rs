//! Test configuration loaders for scenarios covering success and failure paths.
//!
//! [`TestConfigLoader`] owns a temporary tree holding the component directory,
//! the listen socket and the optional data-source settings file, so each
//! scenario runs against its own filesystem.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use graft_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader that provisions a component directory and a Unix socket path under
/// a temporary directory.
#[derive(Debug)]
pub struct TestConfigLoader {
    root: TempDir,
    hot_reload: bool,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temporary directory");
        fs::create_dir(root.path().join("components")).expect("create component directory");
        Self {
            root,
            hot_reload: true,
        }
    }

    /// Switches the watcher on or off for the next load.
    pub fn set_hot_reload(&mut self, enabled: bool) {
        self.hot_reload = enabled;
    }

    /// Directory scanned for component units.
    #[must_use]
    pub fn components_dir(&self) -> PathBuf {
        self.root.path().join("components")
    }

    /// Writes `contents` to `relative` inside the component directory,
    /// creating intermediate directories.
    pub fn write_unit(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.components_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create unit directory");
        }
        fs::write(&path, contents).expect("write unit");
        path
    }

    /// Writes the data-source settings file next to the component directory.
    pub fn write_datasource(&self, contents: &str) {
        fs::write(self.root.path().join("datasource.toml"), contents)
            .expect("write data-source settings");
    }

    fn utf8(path: &Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf())
            .expect("temporary path was not valid UTF-8")
    }
}

impl Default for TestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let socket = Self::utf8(&self.root.path().join("graftd.sock"));
        Ok(Config {
            components_dir: Self::utf8(&self.components_dir()),
            hot_reload: self.hot_reload,
            listen_socket: SocketEndpoint::unix(socket),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("graftd"),
            OsString::from("--listen-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
