//! Registration ports consumed from the hosting runtime.
//!
//! The registry treats the host as an opaque capability: it hands over
//! facades plus routing and initialisation metadata and asks whether a name
//! is already taken. Hosts that freeze their routing table after start-up
//! answer late registrations with [`HostError::Frozen`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::HostError;
use crate::indirection::{FilterFacade, HandlerFacade, ListenerFacade};
use crate::pattern::UrlPattern;
use crate::role::{ComponentIdentity, DispatchPhase, RoleKind};

/// Formal registration of a request handler.
#[derive(Debug, Clone)]
pub struct HandlerRegistration {
    /// Registration name.
    pub name: ComponentIdentity,
    /// Canonical type name of the logical component.
    pub type_name: String,
    /// Source unit, for diagnostics.
    pub source: PathBuf,
    /// Forwarding facade.
    pub facade: Arc<HandlerFacade>,
    /// Path patterns routed to the handler.
    pub patterns: Vec<UrlPattern>,
    /// Declared initialisation parameters.
    pub init_params: BTreeMap<String, String>,
    /// Start-up order hint.
    pub load_on_startup: Option<i32>,
    /// Whether asynchronous processing is supported.
    pub async_supported: bool,
}

/// Formal registration of a filter.
#[derive(Debug, Clone)]
pub struct FilterRegistration {
    /// Registration name.
    pub name: ComponentIdentity,
    /// Canonical type name of the logical component.
    pub type_name: String,
    /// Source unit, for diagnostics.
    pub source: PathBuf,
    /// Forwarding facade.
    pub facade: Arc<FilterFacade>,
    /// Path patterns the filter applies to.
    pub patterns: Vec<UrlPattern>,
    /// Resolved dispatch phases.
    pub dispatch: Vec<DispatchPhase>,
    /// Declared initialisation parameters.
    pub init_params: BTreeMap<String, String>,
}

/// Registration of an event listener.
#[derive(Debug, Clone)]
pub struct ListenerRegistration {
    /// Registration name.
    pub name: ComponentIdentity,
    /// Canonical type name of the logical component.
    pub type_name: String,
    /// Source unit, for diagnostics.
    pub source: PathBuf,
    /// Declared listener kind.
    pub kind: RoleKind,
    /// Forwarding facade implementing every listener capability.
    pub facade: Arc<ListenerFacade>,
}

/// What the host already holds under a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRegistration {
    /// Registration name.
    pub name: String,
    /// Canonical type name of the registered component.
    pub type_name: String,
}

/// Registration API of the hosting runtime.
pub trait HostRegistrar: Send + Sync {
    /// Adds a handler to the routing table.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Frozen`] once the routing table is frozen.
    fn register_handler(&self, registration: HandlerRegistration) -> Result<(), HostError>;

    /// Adds a filter to the filter chain.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Frozen`] once the filter chain is frozen.
    fn register_filter(&self, registration: FilterRegistration) -> Result<(), HostError>;

    /// Attaches a listener.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ListenerUnavailable`] when the host has no
    /// listener path, or [`HostError::Frozen`] after start-up.
    fn register_listener(&self, registration: ListenerRegistration) -> Result<(), HostError>;

    /// Looks up a formal registration by name.
    fn existing_registration(&self, name: &str) -> Option<ExistingRegistration>;
}
