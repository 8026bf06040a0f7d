//! Discovery of the optional `datasource.toml` next to the component
//! directory.

use std::collections::BTreeSet;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const REQUIRED_KEYS: [&str; 4] = ["driver", "url", "user", "password"];

/// Connection settings for the managed data source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataSourceSettings {
    /// Driver name used to select a connection factory.
    pub driver: String,
    /// Connection URL passed to the driver.
    pub url: String,
    /// Account name.
    pub user: String,
    /// Account password.
    pub password: String,
    /// Connections opened eagerly when the pool is built.
    #[serde(default)]
    pub pool_min: Option<u32>,
    /// Upper bound on concurrently open connections.
    #[serde(default)]
    pub pool_max: Option<u32>,
}

impl DataSourceSettings {
    /// Reads the settings file at `path`.
    ///
    /// A missing file yields [`DataSourceDiscovery::Absent`]. A file lacking
    /// any of `driver`, `url`, `user` or `password` yields
    /// [`DataSourceDiscovery::Incomplete`] naming the missing keys. Neither is
    /// an error: both mean no managed connection resource is provided.
    pub fn discover(path: &Utf8Path) -> Result<DataSourceDiscovery, DataSourceError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(DataSourceDiscovery::Absent);
            }
            Err(source) => {
                return Err(DataSourceError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let table: toml::Table =
            toml::from_str(&contents).map_err(|source| DataSourceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let present: BTreeSet<&str> = table
            .iter()
            .filter(|(_, value)| value.as_str().is_some_and(|text| !text.is_empty()))
            .map(|(key, _)| key.as_str())
            .collect();
        let missing: Vec<&'static str> = REQUIRED_KEYS
            .into_iter()
            .filter(|key| !present.contains(key))
            .collect();
        if !missing.is_empty() {
            return Ok(DataSourceDiscovery::Incomplete { missing });
        }

        let settings: Self =
            toml::Value::Table(table)
                .try_into()
                .map_err(|source| DataSourceError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
        settings.validate(path)?;
        Ok(DataSourceDiscovery::Ready(settings))
    }

    fn validate(&self, path: &Utf8Path) -> Result<(), DataSourceError> {
        if let (Some(min), Some(max)) = (self.pool_min, self.pool_max)
            && min > max
        {
            return Err(DataSourceError::PoolBounds {
                path: path.to_path_buf(),
                min,
                max,
            });
        }
        if self.pool_max == Some(0) {
            return Err(DataSourceError::PoolBounds {
                path: path.to_path_buf(),
                min: self.pool_min.unwrap_or(0),
                max: 0,
            });
        }
        Ok(())
    }
}

/// Outcome of looking for data-source settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceDiscovery {
    /// No settings file exists.
    Absent,
    /// The file exists but lacks required keys.
    Incomplete {
        /// Required keys that were absent or empty.
        missing: Vec<&'static str>,
    },
    /// Complete settings were read.
    Ready(DataSourceSettings),
}

/// Errors raised while reading data-source settings.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The file exists but could not be read.
    #[error("failed to read data-source settings '{path}': {source}")]
    Read {
        /// Settings file location.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The file is not valid TOML or has mistyped values.
    #[error("invalid data-source settings '{path}': {source}")]
    Parse {
        /// Settings file location.
        path: Utf8PathBuf,
        /// Parser failure.
        #[source]
        source: toml::de::Error,
    },
    /// Pool bounds are inconsistent.
    #[error("invalid pool bounds in '{path}': min {min} exceeds max {max} or max is zero")]
    PoolBounds {
        /// Settings file location.
        path: Utf8PathBuf,
        /// Configured minimum.
        min: u32,
        /// Configured maximum.
        max: u32,
    },
}
