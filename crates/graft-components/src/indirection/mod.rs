//! Stable forwarding identities for swappable components.
//!
//! An [`IndirectionHandler`] is created once per identity and owns the
//! current [`LoadedComponent`] behind an [`ArcSwap`]. Replacing the target is
//! a single atomic publish. The host only receives the facades defined here,
//! each of which loads the target once per call: an invocation that started
//! before a swap finishes on the instance it began with, and every invocation
//! that starts after the swap sees the new one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwap;

use crate::component::{
    AttributeEvent, Component, ContextAttributeListener, ContextEvent, ContextListener, Filter,
    Handler, InitConfig, SessionActivationListener, SessionAttributeEvent,
    SessionAttributeListener, SessionEvent, SessionIdChangedEvent, SessionIdListener,
    SessionListener,
};
use crate::context::RequestContext;
use crate::error::InvocationError;
use crate::pattern::UrlPattern;
use crate::role::{ComponentIdentity, MetadataError, RoleKind, RoleMetadata};

/// A component instance together with the declarations it was loaded with.
pub struct LoadedComponent {
    component: Arc<dyn Component>,
    metadata: RoleMetadata,
    patterns: Vec<UrlPattern>,
    source: PathBuf,
}

impl LoadedComponent {
    /// Validates `metadata` and pairs it with `component`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when the declarations are inconsistent.
    pub fn new(
        component: Arc<dyn Component>,
        metadata: RoleMetadata,
        source: impl Into<PathBuf>,
    ) -> Result<Self, MetadataError> {
        let patterns = metadata.validate()?;
        Ok(Self {
            component,
            metadata,
            patterns,
            source: source.into(),
        })
    }

    /// The live instance.
    #[must_use]
    pub fn component(&self) -> &dyn Component {
        self.component.as_ref()
    }

    /// Declarations read from the unit.
    #[must_use]
    pub const fn metadata(&self) -> &RoleMetadata {
        &self.metadata
    }

    /// Parsed path patterns in declaration order.
    #[must_use]
    pub fn patterns(&self) -> &[UrlPattern] {
        &self.patterns
    }

    /// First declared pattern.
    #[must_use]
    pub fn primary_pattern(&self) -> Option<&UrlPattern> {
        self.patterns.first()
    }

    /// Source unit the instance was compiled from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl std::fmt::Debug for LoadedComponent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LoadedComponent")
            .field("metadata", &self.metadata)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Stable identity forwarding to the current implementation.
pub struct IndirectionHandler {
    identity: ComponentIdentity,
    kind: RoleKind,
    target: ArcSwap<LoadedComponent>,
    registered: AtomicBool,
    generation: AtomicU64,
}

impl IndirectionHandler {
    /// Wraps `target`. New handlers start unregistered.
    #[must_use]
    pub fn new(target: LoadedComponent) -> Self {
        Self {
            identity: target.metadata().identity(),
            kind: target.metadata().kind(),
            target: ArcSwap::from_pointee(target),
            registered: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Identity the handler was created for.
    #[must_use]
    pub const fn identity(&self) -> &ComponentIdentity {
        &self.identity
    }

    /// Role kind fixed at creation.
    #[must_use]
    pub const fn kind(&self) -> RoleKind {
        self.kind
    }

    /// Current target.
    #[must_use]
    pub fn get_target(&self) -> Arc<LoadedComponent> {
        self.target.load_full()
    }

    /// Publishes `target` and returns the one it replaced. In-flight calls
    /// keep the previous instance alive until they finish.
    pub fn set_target(&self, target: LoadedComponent) -> Arc<LoadedComponent> {
        let previous = self.target.swap(Arc::new(target));
        self.generation.fetch_add(1, Ordering::AcqRel);
        previous
    }

    /// Whether the host holds a formal registration for this identity.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Records whether the host holds a formal registration.
    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    /// Number of swaps since creation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for IndirectionHandler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IndirectionHandler")
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .field("registered", &self.is_registered())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

fn capability_missing(handler: &IndirectionHandler, capability: &'static str) -> InvocationError {
    InvocationError::CapabilityMissing {
        identity: handler.identity().as_str().to_owned(),
        capability,
    }
}

/// Handler facade handed to the host.
#[derive(Debug, Clone)]
pub struct HandlerFacade {
    handler: Arc<IndirectionHandler>,
}

impl HandlerFacade {
    /// Facade forwarding to `handler`'s target.
    #[must_use]
    pub const fn new(handler: Arc<IndirectionHandler>) -> Self {
        Self { handler }
    }

    /// Identity behind the facade.
    #[must_use]
    pub fn identity(&self) -> &ComponentIdentity {
        self.handler.identity()
    }

    fn forward(
        &self,
        call: impl FnOnce(&dyn Handler) -> Result<(), InvocationError>,
    ) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        let handler = target
            .component()
            .as_handler()
            .ok_or_else(|| capability_missing(&self.handler, "handler"))?;
        call(handler)
    }
}

macro_rules! forward_verbs {
    ($($verb:ident),+ $(,)?) => {
        $(
            fn $verb(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
                self.forward(|handler| handler.$verb(ctx))
            }
        )+
    };
}

impl Handler for HandlerFacade {
    fn init(&self, config: &InitConfig) -> Result<(), InvocationError> {
        self.forward(|handler| handler.init(config))
    }

    fn service(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        self.forward(|handler| handler.service(ctx))
    }

    forward_verbs!(get, head, post, put, delete, options, trace);

    fn destroy(&self) {
        if let Some(handler) = self.handler.get_target().component().as_handler() {
            handler.destroy();
        }
    }
}

/// Filter facade handed to the host.
#[derive(Debug, Clone)]
pub struct FilterFacade {
    handler: Arc<IndirectionHandler>,
}

impl FilterFacade {
    /// Facade forwarding to `handler`'s target.
    #[must_use]
    pub const fn new(handler: Arc<IndirectionHandler>) -> Self {
        Self { handler }
    }

    /// Identity behind the facade.
    #[must_use]
    pub fn identity(&self) -> &ComponentIdentity {
        self.handler.identity()
    }
}

impl Filter for FilterFacade {
    fn init(&self, config: &InitConfig) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_filter()
            .ok_or_else(|| capability_missing(&self.handler, "filter"))?
            .init(config)
    }

    fn do_filter(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_filter()
            .ok_or_else(|| capability_missing(&self.handler, "filter"))?
            .do_filter(ctx)
    }

    fn destroy(&self) {
        if let Some(filter) = self.handler.get_target().component().as_filter() {
            filter.destroy();
        }
    }
}

/// Listener facade handed to the host.
///
/// Implements every listener capability. Events the current target does not
/// listen for are dropped.
#[derive(Debug, Clone)]
pub struct ListenerFacade {
    handler: Arc<IndirectionHandler>,
}

impl ListenerFacade {
    /// Facade forwarding to `handler`'s target.
    #[must_use]
    pub const fn new(handler: Arc<IndirectionHandler>) -> Self {
        Self { handler }
    }

    /// Identity behind the facade.
    #[must_use]
    pub fn identity(&self) -> &ComponentIdentity {
        self.handler.identity()
    }

    /// Role kind of the listener.
    #[must_use]
    pub fn kind(&self) -> RoleKind {
        self.handler.kind()
    }
}

impl ContextListener for ListenerFacade {
    fn context_initialized(&self, event: &ContextEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_context_listener()
            .map_or(Ok(()), |listener| listener.context_initialized(event))
    }

    fn context_destroyed(&self, event: &ContextEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_context_listener()
            .map_or(Ok(()), |listener| listener.context_destroyed(event))
    }
}

impl ContextAttributeListener for ListenerFacade {
    fn attribute_added(&self, event: &AttributeEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_context_attribute_listener()
            .map_or(Ok(()), |listener| listener.attribute_added(event))
    }

    fn attribute_removed(&self, event: &AttributeEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_context_attribute_listener()
            .map_or(Ok(()), |listener| listener.attribute_removed(event))
    }

    fn attribute_replaced(&self, event: &AttributeEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_context_attribute_listener()
            .map_or(Ok(()), |listener| listener.attribute_replaced(event))
    }
}

impl SessionListener for ListenerFacade {
    fn session_created(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_session_listener()
            .map_or(Ok(()), |listener| listener.session_created(event))
    }

    fn session_destroyed(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_session_listener()
            .map_or(Ok(()), |listener| listener.session_destroyed(event))
    }
}

impl SessionAttributeListener for ListenerFacade {
    fn attribute_added(&self, event: &SessionAttributeEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_session_attribute_listener()
            .map_or(Ok(()), |listener| listener.attribute_added(event))
    }

    fn attribute_removed(&self, event: &SessionAttributeEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_session_attribute_listener()
            .map_or(Ok(()), |listener| listener.attribute_removed(event))
    }

    fn attribute_replaced(&self, event: &SessionAttributeEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_session_attribute_listener()
            .map_or(Ok(()), |listener| listener.attribute_replaced(event))
    }
}

impl SessionActivationListener for ListenerFacade {
    fn session_will_passivate(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_session_activation_listener()
            .map_or(Ok(()), |listener| listener.session_will_passivate(event))
    }

    fn session_did_activate(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_session_activation_listener()
            .map_or(Ok(()), |listener| listener.session_did_activate(event))
    }
}

impl SessionIdListener for ListenerFacade {
    fn session_id_changed(&self, event: &SessionIdChangedEvent) -> Result<(), InvocationError> {
        let target = self.handler.get_target();
        target
            .component()
            .as_session_id_listener()
            .map_or(Ok(()), |listener| listener.session_id_changed(event))
    }
}
