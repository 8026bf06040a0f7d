//! Managed connection pool for the optional data source.
//!
//! A pool exists only when the data-source settings are complete and a
//! [`ConnectionFactory`] is registered for the configured driver. Connections
//! are acquired lazily by [`RequestContext::connection`] and return to the
//! pool when the context is dropped.
//!
//! [`RequestContext::connection`]: crate::context::RequestContext::connection

use std::any::Any;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use graft_config::DataSourceSettings;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::PoolError;

const POOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pool");

/// Capacity used when the settings leave `pool_max` unset.
pub const DEFAULT_POOL_MAX: usize = 8;

/// Time an acquisition waits for a busy pool before failing.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// A driver connection.
pub trait Connection: Send {
    /// Whether the connection can be handed out again.
    fn is_valid(&self) -> bool {
        true
    }

    /// Downcasting hook for driver-specific APIs.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Opens connections for one driver.
pub trait ConnectionFactory: Send + Sync {
    /// Opens a connection using `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Connect`] when the driver fails.
    fn connect(&self, settings: &DataSourceSettings) -> Result<Box<dyn Connection>, PoolError>;
}

/// Connection factories keyed by driver name.
#[derive(Clone, Default)]
pub struct ConnectionFactories {
    factories: HashMap<String, Arc<dyn ConnectionFactory>>,
}

impl ConnectionFactories {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the factory for `driver`.
    pub fn register(&mut self, driver: impl Into<String>, factory: Arc<dyn ConnectionFactory>) {
        self.factories.insert(driver.into(), factory);
    }

    /// Looks up the factory for `driver`.
    #[must_use]
    pub fn get(&self, driver: &str) -> Option<Arc<dyn ConnectionFactory>> {
        self.factories.get(driver).cloned()
    }
}

impl std::fmt::Debug for ConnectionFactories {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut drivers: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        drivers.sort_unstable();
        formatter
            .debug_struct("ConnectionFactories")
            .field("drivers", &drivers)
            .finish()
    }
}

struct PoolState {
    idle: Vec<Box<dyn Connection>>,
    open: usize,
}

/// Bounded pool of driver connections.
pub struct ConnectionPool {
    settings: DataSourceSettings,
    factory: Arc<dyn ConnectionFactory>,
    max: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState>,
    released: Condvar,
}

impl ConnectionPool {
    /// Pool for `settings` opening connections through `factory`.
    #[must_use]
    pub fn new(settings: DataSourceSettings, factory: Arc<dyn ConnectionFactory>) -> Self {
        let max = settings
            .pool_max
            .and_then(|max| usize::try_from(max).ok())
            .filter(|max| *max > 0)
            .unwrap_or(DEFAULT_POOL_MAX);
        Self {
            settings,
            factory,
            max,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                open: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Resolves the driver's factory from `factories` and builds the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownDriver`] when no factory is registered.
    pub fn from_factories(
        settings: DataSourceSettings,
        factories: &ConnectionFactories,
    ) -> Result<Self, PoolError> {
        let factory = factories
            .get(&settings.driver)
            .ok_or_else(|| PoolError::UnknownDriver {
                driver: settings.driver.clone(),
            })?;
        Ok(Self::new(settings, factory))
    }

    /// Overrides how long [`ConnectionPool::acquire`] waits.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Settings the pool was built from.
    #[must_use]
    pub const fn settings(&self) -> &DataSourceSettings {
        &self.settings
    }

    /// Pool capacity.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Connections currently open, idle or lent out.
    #[must_use]
    pub fn open(&self) -> usize {
        self.state.lock().open
    }

    /// Connections waiting in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Opens `pool_min` connections up front.
    ///
    /// # Errors
    ///
    /// Returns the first connection failure.
    pub fn warm(&self) -> Result<(), PoolError> {
        let min = self
            .settings
            .pool_min
            .and_then(|min| usize::try_from(min).ok())
            .unwrap_or(0)
            .min(self.max);
        loop {
            {
                let mut state = self.state.lock();
                if state.open >= min {
                    return Ok(());
                }
                state.open += 1;
            }
            let connection = self.connect_reserved()?;
            self.state.lock().idle.push(connection);
        }
    }

    /// Lends a connection, opening one when the pool has spare capacity and
    /// waiting for a release otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Exhausted`] when no connection frees up in time,
    /// or the driver's failure when opening a connection fails.
    pub fn acquire(pool: &Arc<Self>) -> Result<PooledConnection, PoolError> {
        let started = Instant::now();
        let deadline = started + pool.acquire_timeout;
        let mut state = pool.state.lock();
        loop {
            if let Some(connection) = state.idle.pop() {
                return Ok(PooledConnection::new(Arc::clone(pool), connection));
            }
            if state.open < pool.max {
                state.open += 1;
                drop(state);
                let connection = pool.connect_reserved()?;
                return Ok(PooledConnection::new(Arc::clone(pool), connection));
            }
            if pool.released.wait_until(&mut state, deadline).timed_out() {
                return Err(PoolError::Exhausted {
                    max: pool.max,
                    waited: started.elapsed(),
                });
            }
        }
    }

    /// Opens a connection for a slot already counted in `open`.
    fn connect_reserved(&self) -> Result<Box<dyn Connection>, PoolError> {
        match self.factory.connect(&self.settings) {
            Ok(connection) => {
                debug!(target: POOL_TARGET, driver = %self.settings.driver, "opened connection");
                Ok(connection)
            }
            Err(err) => {
                let mut state = self.state.lock();
                state.open = state.open.saturating_sub(1);
                drop(state);
                self.released.notify_one();
                Err(err)
            }
        }
    }

    fn release(&self, connection: Box<dyn Connection>) {
        let mut state = self.state.lock();
        if connection.is_valid() {
            state.idle.push(connection);
        } else {
            warn!(target: POOL_TARGET, driver = %self.settings.driver, "discarding invalid connection");
            state.open = state.open.saturating_sub(1);
        }
        drop(state);
        self.released.notify_one();
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectionPool")
            .field("driver", &self.settings.driver)
            .field("max", &self.max)
            .field("open", &self.open())
            .finish_non_exhaustive()
    }
}

/// Stand-in left behind once a lent connection has gone back to the pool.
struct Released;

impl Connection for Released {
    fn is_valid(&self) -> bool {
        false
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A connection lent by a [`ConnectionPool`]; returned on drop.
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    connection: Box<dyn Connection>,
}

impl PooledConnection {
    const fn new(pool: Arc<ConnectionPool>, connection: Box<dyn Connection>) -> Self {
        Self { pool, connection }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PooledConnection")
            .finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let connection = std::mem::replace(&mut self.connection, Box::new(Released));
        self.pool.release(connection);
    }
}
