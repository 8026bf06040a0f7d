//! In-process reference host.
//!
//! The host keeps a routing table of handler facades, an ordered filter chain
//! and the attached listeners. Everything is registered during start-up;
//! [`InProcessHost::start`] freezes the table and fires the context start-up
//! callbacks, after which every formal registration is refused with
//! [`HostError::Frozen`].
//!
//! Each request is served on the caller's thread with its own
//! [`RequestContext`]: installed filters first, then the registered filters
//! whose patterns match, then the most specific matching handler, falling back
//! to a `404` responder.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use graft_components::registry::REGISTRY_CONTEXT;
use graft_components::{
    ConnectionPool, ContextEvent, ContextListener, Continuation, DispatchPhase,
    ExistingRegistration, Filter, FilterRegistration, Handler, HandlerRegistration, HostError,
    HostRegistrar, InvocationError, ListenerRegistration, Request, RequestContext, Response,
    RoleKind, SessionEvent, SessionListener, Stage, UrlPattern,
};

const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

#[derive(Default)]
struct HostState {
    frozen: bool,
    installed: Vec<Arc<dyn Filter>>,
    handlers: Vec<HandlerRegistration>,
    filters: Vec<FilterRegistration>,
    listeners: Vec<ListenerRegistration>,
}

impl HostState {
    fn names(&self) -> impl Iterator<Item = (&str, &str)> {
        let handlers = self
            .handlers
            .iter()
            .map(|entry| (entry.name.as_str(), entry.type_name.as_str()));
        let filters = self
            .filters
            .iter()
            .map(|entry| (entry.name.as_str(), entry.type_name.as_str()));
        let listeners = self
            .listeners
            .iter()
            .map(|entry| (entry.name.as_str(), entry.type_name.as_str()));
        handlers.chain(filters).chain(listeners)
    }

    fn ensure_open(&self, name: &str) -> Result<(), HostError> {
        if self.frozen {
            return Err(HostError::Frozen);
        }
        if self.names().any(|(registered, _)| registered == name) {
            return Err(HostError::Rejected {
                name: name.to_owned(),
                message: String::from("name already registered"),
            });
        }
        Ok(())
    }
}

/// Host serving registered components from the daemon process.
pub struct InProcessHost {
    state: RwLock<HostState>,
    sessions: Mutex<BTreeSet<String>>,
    pool: Option<Arc<ConnectionPool>>,
}

impl InProcessHost {
    /// Creates an open host with no managed data source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HostState::default()),
            sessions: Mutex::new(BTreeSet::new()),
            pool: None,
        }
    }

    /// Attaches the connection pool handed to every request context.
    #[must_use]
    pub fn with_pool(mut self, pool: Option<Arc<ConnectionPool>>) -> Self {
        self.pool = pool;
        self
    }

    /// Pool shared by request contexts, if a data source is configured.
    #[must_use]
    pub fn pool(&self) -> Option<&Arc<ConnectionPool>> {
        self.pool.as_ref()
    }

    /// Places `filter` ahead of every registered filter. Installed filters run
    /// in installation order.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Frozen`] once the host has started.
    pub fn install_filter(&self, filter: Arc<dyn Filter>) -> Result<(), HostError> {
        let mut state = self.state.write();
        if state.frozen {
            return Err(HostError::Frozen);
        }
        state.installed.push(filter);
        Ok(())
    }

    /// Freezes the routing table and fires `context_initialized` on every
    /// attached context listener. Returns how many listeners started. Calling
    /// it again does nothing.
    pub fn start(&self) -> usize {
        let listeners: Vec<_> = {
            let mut state = self.state.write();
            if state.frozen {
                return 0;
            }
            state.frozen = true;
            state
                .listeners
                .iter()
                .filter(|entry| entry.kind == RoleKind::ContextListener)
                .cloned()
                .collect()
        };

        let event = ContextEvent::new(REGISTRY_CONTEXT);
        let mut started = 0;
        for listener in &listeners {
            match listener.facade.context_initialized(&event) {
                Ok(()) => started += 1,
                Err(error) => warn!(
                    target: HOST_TARGET,
                    listener = %listener.name,
                    %error,
                    "context listener failed to start"
                ),
            }
        }
        let state = self.state.read();
        info!(
            target: HOST_TARGET,
            handlers = state.handlers.len(),
            filters = state.filters.len(),
            listeners = state.listeners.len(),
            "host started; routing table frozen"
        );
        started
    }

    /// Whether the routing table is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.state.read().frozen
    }

    /// Names of the formally registered handlers, in registration order.
    #[must_use]
    pub fn handler_names(&self) -> Vec<String> {
        self.state
            .read()
            .handlers
            .iter()
            .map(|entry| entry.name.to_string())
            .collect()
    }

    /// Serves one request and returns the finished response. Component
    /// failures become a `500` response carrying the error message.
    pub fn handle(&self, request: Request) -> Response {
        if let Some(session) = request.session() {
            self.observe_session(session);
        }
        let verb = request.verb();
        let path = request.path().to_owned();
        let continuation = Continuation::new(self.pipeline(&path));
        let mut ctx = RequestContext::new(request, continuation).with_pool(self.pool.clone());
        match ctx.proceed() {
            Ok(()) => {
                let response = ctx.into_response();
                debug!(
                    target: HOST_TARGET,
                    %verb,
                    path = %path,
                    status = response.status(),
                    "request served"
                );
                response
            }
            Err(error) => {
                warn!(target: HOST_TARGET, %verb, path = %path, %error, "request failed");
                let mut response = Response::with_status(500);
                response.write(&error.to_string());
                response
            }
        }
    }

    fn pipeline(&self, path: &str) -> Vec<Stage> {
        let state = self.state.read();
        let mut stages: Vec<Stage> = state.installed.iter().cloned().map(Stage::Filter).collect();
        stages.extend(
            state
                .filters
                .iter()
                .filter(|entry| entry.dispatch.contains(&DispatchPhase::Request))
                .filter(|entry| entry.patterns.iter().any(|pattern| pattern.matches(path)))
                .map(|entry| Stage::Filter(Arc::clone(&entry.facade) as Arc<dyn Filter>)),
        );
        let handler = state
            .handlers
            .iter()
            .filter_map(|entry| best_match(&entry.patterns, path).map(|rank| (rank, entry)))
            .max_by_key(|(rank, _)| *rank)
            .map_or_else(
                || Arc::new(NotFound) as Arc<dyn Handler>,
                |(_, entry)| Arc::clone(&entry.facade) as Arc<dyn Handler>,
            );
        stages.push(Stage::Handler(handler));
        stages
    }

    fn observe_session(&self, session: &str) {
        if !self.sessions.lock().insert(session.to_owned()) {
            return;
        }
        let listeners: Vec<_> = self
            .state
            .read()
            .listeners
            .iter()
            .filter(|entry| entry.kind == RoleKind::SessionListener)
            .cloned()
            .collect();
        let event = SessionEvent {
            session_id: session.to_owned(),
        };
        for listener in listeners {
            if let Err(error) = listener.facade.session_created(&event) {
                warn!(
                    target: HOST_TARGET,
                    listener = %listener.name,
                    %error,
                    "session listener failed"
                );
            }
        }
    }
}

impl Default for InProcessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InProcessHost {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        formatter
            .debug_struct("InProcessHost")
            .field("frozen", &state.frozen)
            .field("installed", &state.installed.len())
            .field("handlers", &state.handlers.len())
            .field("filters", &state.filters.len())
            .field("listeners", &state.listeners.len())
            .field("pool", &self.pool.is_some())
            .finish()
    }
}

impl HostRegistrar for InProcessHost {
    fn register_handler(&self, registration: HandlerRegistration) -> Result<(), HostError> {
        let mut state = self.state.write();
        state.ensure_open(registration.name.as_str())?;
        debug!(target: HOST_TARGET, name = %registration.name, "handler registered");
        state.handlers.push(registration);
        Ok(())
    }

    fn register_filter(&self, registration: FilterRegistration) -> Result<(), HostError> {
        let mut state = self.state.write();
        state.ensure_open(registration.name.as_str())?;
        debug!(target: HOST_TARGET, name = %registration.name, "filter registered");
        state.filters.push(registration);
        Ok(())
    }

    fn register_listener(&self, registration: ListenerRegistration) -> Result<(), HostError> {
        let mut state = self.state.write();
        state.ensure_open(registration.name.as_str())?;
        debug!(
            target: HOST_TARGET,
            name = %registration.name,
            kind = %registration.kind,
            "listener attached"
        );
        state.listeners.push(registration);
        Ok(())
    }

    fn existing_registration(&self, name: &str) -> Option<ExistingRegistration> {
        self.state
            .read()
            .names()
            .find(|(registered, _)| *registered == name)
            .map(|(registered, type_name)| ExistingRegistration {
                name: registered.to_owned(),
                type_name: type_name.to_owned(),
            })
    }
}

fn best_match(patterns: &[UrlPattern], path: &str) -> Option<(u8, usize)> {
    patterns
        .iter()
        .filter(|pattern| pattern.matches(path))
        .map(UrlPattern::specificity)
        .max()
}

/// Terminal stage when no handler claims the path.
struct NotFound;

impl Handler for NotFound {
    fn service(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        let path = ctx.request().path().to_owned();
        let response = ctx.response_mut();
        response.set_status(404);
        response.write(&format!("no component serves {path}"));
        Ok(())
    }
}
