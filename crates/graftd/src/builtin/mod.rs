//! Component factories and connection drivers shipped with the daemon.
//!
//! Descriptor files name one of these factories and pass it a `settings`
//! object. Embedders that link `graftd` as a library can build their own
//! [`Catalogue`] instead.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use graft_components::{
    Component, Connection, ConnectionFactories, ConnectionFactory, ContextEvent,
    ContextListener, FactoryTable, Filter, Handler, InitConfig, InvocationError, PoolError,
    RequestContext, SessionEvent, SessionListener,
};
use graft_config::DataSourceSettings;

const COMPONENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::components");

/// Factories and drivers available to the daemon.
#[derive(Debug)]
pub struct Catalogue {
    factories: FactoryTable,
    drivers: ConnectionFactories,
}

impl Catalogue {
    /// Builds a catalogue from explicit tables.
    #[must_use]
    pub fn new(factories: FactoryTable, drivers: ConnectionFactories) -> Self {
        Self { factories, drivers }
    }

    /// The factories and drivers bundled with the daemon: `static-text`,
    /// `response-header`, `lifecycle-logger` and `connection-probe`, plus the
    /// `memory` connection driver.
    #[must_use]
    pub fn builtin() -> Self {
        let factories = FactoryTable::new()
            .with("static-text", static_text)
            .with("response-header", response_header)
            .with("lifecycle-logger", lifecycle_logger)
            .with("connection-probe", connection_probe);
        let mut drivers = ConnectionFactories::new();
        drivers.register("memory", Arc::new(MemoryDriver::default()));
        Self::new(factories, drivers)
    }

    /// Component factories by name.
    #[must_use]
    pub fn factories(&self) -> &FactoryTable {
        &self.factories
    }

    /// Connection drivers by name.
    #[must_use]
    pub fn drivers(&self) -> &ConnectionFactories {
        &self.drivers
    }

    /// Splits the catalogue into its tables.
    #[must_use]
    pub fn into_parts(self) -> (FactoryTable, ConnectionFactories) {
        (self.factories, self.drivers)
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::builtin()
    }
}

fn parse<T: DeserializeOwned>(settings: &Value) -> Result<T, String> {
    T::deserialize(settings).map_err(|error| format!("invalid settings: {error}"))
}

#[derive(Debug, Deserialize)]
struct StaticTextSettings {
    body: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    status: Option<u16>,
}

fn static_text(settings: &Value) -> Result<Arc<dyn Component>, String> {
    let settings: StaticTextSettings = parse(settings)?;
    Ok(Arc::new(StaticText {
        body: settings.body,
        content_type: settings
            .content_type
            .unwrap_or_else(|| String::from("text/plain")),
        status: settings.status.unwrap_or(200),
    }))
}

/// Handler answering `GET` and `HEAD` with a fixed body.
struct StaticText {
    body: String,
    content_type: String,
    status: u16,
}

impl StaticText {
    fn headers(&self, ctx: &mut RequestContext) {
        let response = ctx.response_mut();
        response.set_status(self.status);
        response.set_header("content-type", self.content_type.clone());
        response.set_header("content-length", self.body.len().to_string());
    }
}

impl Component for StaticText {
    fn as_handler(&self) -> Option<&dyn Handler> {
        Some(self)
    }
}

impl Handler for StaticText {
    fn get(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        self.headers(ctx);
        ctx.response_mut().write(&self.body);
        Ok(())
    }

    fn head(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        self.headers(ctx);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct HeaderSettings {
    name: String,
    value: String,
}

fn response_header(settings: &Value) -> Result<Arc<dyn Component>, String> {
    let settings: HeaderSettings = parse(settings)?;
    if settings.name.trim().is_empty() {
        return Err(String::from("header name is empty"));
    }
    Ok(Arc::new(ResponseHeader {
        name: settings.name,
        value: settings.value,
    }))
}

/// Filter adding one response header before passing the request on.
struct ResponseHeader {
    name: String,
    value: String,
}

impl Component for ResponseHeader {
    fn as_filter(&self) -> Option<&dyn Filter> {
        Some(self)
    }
}

impl Filter for ResponseHeader {
    fn do_filter(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        ctx.response_mut()
            .set_header(self.name.clone(), self.value.clone());
        ctx.proceed()
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoggerSettings {
    #[serde(default)]
    label: Option<String>,
}

fn lifecycle_logger(settings: &Value) -> Result<Arc<dyn Component>, String> {
    let settings: LoggerSettings = if settings.is_null() {
        LoggerSettings::default()
    } else {
        parse(settings)?
    };
    Ok(Arc::new(LifecycleLogger {
        label: settings.label.unwrap_or_else(|| String::from("lifecycle")),
    }))
}

/// Listener logging context and session lifecycle callbacks.
struct LifecycleLogger {
    label: String,
}

impl Component for LifecycleLogger {
    fn as_context_listener(&self) -> Option<&dyn ContextListener> {
        Some(self)
    }

    fn as_session_listener(&self) -> Option<&dyn SessionListener> {
        Some(self)
    }
}

impl ContextListener for LifecycleLogger {
    fn context_initialized(&self, event: &ContextEvent) -> Result<(), InvocationError> {
        info!(
            target: COMPONENT_TARGET,
            label = %self.label,
            context = %event.context,
            synthesized = event.synthesized,
            "context initialised"
        );
        Ok(())
    }

    fn context_destroyed(&self, event: &ContextEvent) -> Result<(), InvocationError> {
        info!(
            target: COMPONENT_TARGET,
            label = %self.label,
            context = %event.context,
            "context destroyed"
        );
        Ok(())
    }
}

impl SessionListener for LifecycleLogger {
    fn session_created(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        info!(
            target: COMPONENT_TARGET,
            label = %self.label,
            session = %event.session_id,
            "session created"
        );
        Ok(())
    }
}

fn connection_probe(_settings: &Value) -> Result<Arc<dyn Component>, String> {
    Ok(Arc::new(ConnectionProbe))
}

/// Handler reporting which pooled connection served the request.
struct ConnectionProbe;

impl Component for ConnectionProbe {
    fn as_handler(&self) -> Option<&dyn Handler> {
        Some(self)
    }
}

impl Handler for ConnectionProbe {
    fn init(&self, config: &InitConfig) -> Result<(), InvocationError> {
        info!(target: COMPONENT_TARGET, name = config.name(), "connection probe ready");
        Ok(())
    }

    fn get(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        let connection = ctx.connection()?;
        let Some(memory) = connection.as_any_mut().downcast_mut::<MemoryConnection>() else {
            return Err(InvocationError::failed("connection is not a memory connection"));
        };
        memory.uses += 1;
        let line = format!("connection {} use {}", memory.id, memory.uses);
        ctx.response_mut().write(&line);
        Ok(())
    }
}

/// Connection handed out by [`MemoryDriver`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    uses: u64,
    url: String,
}

impl MemoryConnection {
    /// Identifier assigned by the driver, unique per driver instance.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// How many requests used this connection.
    #[must_use]
    pub const fn uses(&self) -> u64 {
        self.uses
    }

    /// Address the connection was opened for.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connection for MemoryConnection {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Driver for `memory:` URLs. Connections live only inside the daemon.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    opened: AtomicU64,
}

impl MemoryDriver {
    /// Connections opened so far.
    #[must_use]
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for MemoryDriver {
    fn connect(&self, settings: &DataSourceSettings) -> Result<Box<dyn Connection>, PoolError> {
        if !settings.url.starts_with("memory:") {
            return Err(PoolError::Connect {
                driver: settings.driver.clone(),
                message: format!("unsupported url '{}'", settings.url),
            });
        }
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MemoryConnection {
            id,
            uses: 0,
            url: settings.url.clone(),
        }))
    }
}
