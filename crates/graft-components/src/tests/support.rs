//! Test doubles shared by the unit and behaviour tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::component::{Component, ContextEvent, ContextListener, Filter, Handler, InitConfig};
use crate::context::RequestContext;
use crate::error::{HostError, InvocationError};
use crate::host::{
    ExistingRegistration, FilterRegistration, HandlerRegistration, HostRegistrar,
    ListenerRegistration,
};
use crate::loader::CompiledUnit;
use crate::role::{RoleKind, RoleMetadata};

/// Lifecycle callback counts observed across instances.
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub(crate) inits: AtomicUsize,
    pub(crate) destroys: AtomicUsize,
}

impl Calls {
    pub(crate) fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub(crate) fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

/// Handler answering `GET` with a fixed body.
pub(crate) struct TextHandler {
    body: String,
    calls: Arc<Calls>,
    fail_init: bool,
}

impl TextHandler {
    pub(crate) fn new(body: &str) -> Self {
        Self::with_calls(body, Arc::new(Calls::default()))
    }

    pub(crate) fn with_calls(body: &str, calls: Arc<Calls>) -> Self {
        Self {
            body: body.to_owned(),
            calls,
            fail_init: false,
        }
    }

    pub(crate) fn failing_init(body: &str) -> Self {
        Self {
            fail_init: true,
            ..Self::new(body)
        }
    }
}

impl Component for TextHandler {
    fn as_handler(&self) -> Option<&dyn Handler> {
        Some(self)
    }
}

impl Handler for TextHandler {
    fn init(&self, _config: &InitConfig) -> Result<(), InvocationError> {
        self.calls.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(InvocationError::failed("refusing to start"));
        }
        Ok(())
    }

    fn get(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        let path = ctx.request().path().to_owned();
        ctx.response_mut().set_header("x-path", path);
        ctx.response_mut().write(&self.body);
        Ok(())
    }

    fn destroy(&self) {
        self.calls.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

/// Filter stamping a header, then continuing the chain.
pub(crate) struct StampFilter {
    pub(crate) value: String,
}

impl Component for StampFilter {
    fn as_filter(&self) -> Option<&dyn Filter> {
        Some(self)
    }
}

impl Filter for StampFilter {
    fn do_filter(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        ctx.response_mut().set_header("x-stamp", self.value.clone());
        ctx.proceed()
    }
}

/// Context listener counting its callbacks.
pub(crate) struct LifecycleProbe {
    pub(crate) calls: Arc<Calls>,
}

impl Component for LifecycleProbe {
    fn as_context_listener(&self) -> Option<&dyn ContextListener> {
        Some(self)
    }
}

impl ContextListener for LifecycleProbe {
    fn context_initialized(&self, _event: &ContextEvent) -> Result<(), InvocationError> {
        self.calls.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn context_destroyed(&self, _event: &ContextEvent) -> Result<(), InvocationError> {
        self.calls.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Component exposing no capability at all.
pub(crate) struct Inert;

impl Component for Inert {}

pub(crate) fn unit(component: Arc<dyn Component>, metadata: RoleMetadata) -> CompiledUnit {
    CompiledUnit {
        source: PathBuf::from(format!("components/{}.json", metadata.identity())),
        component,
        metadata: Some(metadata),
    }
}

pub(crate) fn orders_metadata() -> RoleMetadata {
    RoleMetadata::handler("app.Orders")
        .with_name("orders")
        .with_pattern("/orders")
}

pub(crate) fn orders_unit(body: &str) -> CompiledUnit {
    unit(Arc::new(TextHandler::new(body)), orders_metadata())
}

/// What a [`RecordingHost`] accepted, by kind.
#[derive(Debug, Default)]
pub(crate) struct Accepted {
    pub(crate) handlers: Vec<HandlerRegistration>,
    pub(crate) filters: Vec<FilterRegistration>,
    pub(crate) listeners: Vec<ListenerRegistration>,
}

/// Host double keeping every registration until it is frozen.
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    frozen: Mutex<bool>,
    listeners_supported: bool,
    accepted: Mutex<Accepted>,
}

impl RecordingHost {
    pub(crate) fn new() -> Self {
        Self {
            listeners_supported: true,
            ..Self::default()
        }
    }

    pub(crate) fn without_listeners() -> Self {
        Self::default()
    }

    pub(crate) fn freeze(&self) {
        *self.frozen.lock() = true;
    }

    /// Freezes registration and fires start-up callbacks on the context
    /// listeners attached so far.
    pub(crate) fn start(&self) {
        self.freeze();
        let event = ContextEvent::new("graft");
        for registration in self.listeners() {
            if registration.kind == RoleKind::ContextListener {
                registration
                    .facade
                    .context_initialized(&event)
                    .expect("listener starts");
            }
        }
    }

    pub(crate) fn handlers(&self) -> Vec<HandlerRegistration> {
        self.accepted.lock().handlers.clone()
    }

    pub(crate) fn handler_names(&self) -> Vec<String> {
        self.accepted
            .lock()
            .handlers
            .iter()
            .map(|registration| registration.name.to_string())
            .collect()
    }

    pub(crate) fn handler(&self, name: &str) -> Option<HandlerRegistration> {
        self.accepted
            .lock()
            .handlers
            .iter()
            .find(|registration| registration.name.as_str() == name)
            .cloned()
    }

    pub(crate) fn filters(&self) -> Vec<FilterRegistration> {
        self.accepted.lock().filters.clone()
    }

    pub(crate) fn listeners(&self) -> Vec<ListenerRegistration> {
        self.accepted.lock().listeners.clone()
    }

    fn check_open(&self) -> Result<(), HostError> {
        if *self.frozen.lock() {
            Err(HostError::Frozen)
        } else {
            Ok(())
        }
    }
}

impl HostRegistrar for RecordingHost {
    fn register_handler(&self, registration: HandlerRegistration) -> Result<(), HostError> {
        self.check_open()?;
        self.accepted.lock().handlers.push(registration);
        Ok(())
    }

    fn register_filter(&self, registration: FilterRegistration) -> Result<(), HostError> {
        self.check_open()?;
        self.accepted.lock().filters.push(registration);
        Ok(())
    }

    fn register_listener(&self, registration: ListenerRegistration) -> Result<(), HostError> {
        if !self.listeners_supported {
            return Err(HostError::ListenerUnavailable);
        }
        self.check_open()?;
        self.accepted.lock().listeners.push(registration);
        Ok(())
    }

    fn existing_registration(&self, name: &str) -> Option<ExistingRegistration> {
        let accepted = self.accepted.lock();
        let handlers = accepted
            .handlers
            .iter()
            .map(|registration| (&registration.name, &registration.type_name));
        let filters = accepted
            .filters
            .iter()
            .map(|registration| (&registration.name, &registration.type_name));
        let listeners = accepted
            .listeners
            .iter()
            .map(|registration| (&registration.name, &registration.type_name));
        handlers
            .chain(filters)
            .chain(listeners)
            .find(|(registered, _)| registered.as_str() == name)
            .map(|(registered, type_name)| ExistingRegistration {
                name: registered.to_string(),
                type_name: type_name.clone(),
            })
    }
}

pub(crate) fn listener_metadata(kind: RoleKind, type_name: &str) -> RoleMetadata {
    RoleMetadata::new(kind, type_name)
}

pub(crate) fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}
