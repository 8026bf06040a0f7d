//! Component registry: classification, registration and hot reload.
//!
//! The [`ComponentRegistry`] owns the identity → [`IndirectionHandler`] map.
//! A component is registered with the host at most once; every later load of
//! the same logical component only swaps the handler's target. Identities
//! first seen after the host froze its routing table are kept *pending* and
//! reached through the fallback dispatch filter.
//!
//! The map is guarded by a read-write lock that is never held while
//! component or host code runs.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::component::{ContextEvent, InitConfig};
use crate::error::{ComponentError, HostError};
use crate::host::{FilterRegistration, HandlerRegistration, HostRegistrar, ListenerRegistration};
use crate::indirection::{
    FilterFacade, HandlerFacade, IndirectionHandler, ListenerFacade, LoadedComponent,
};
use crate::loader::{CompiledUnit, ComponentLoader, classify};
use crate::role::{ComponentIdentity, RoleKind};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Context name carried by events the registry synthesises.
pub const REGISTRY_CONTEXT: &str = "graft";

/// Where an identity is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Never seen, or evicted by teardown.
    Unseen,
    /// Formally registered with the host.
    Registered,
    /// Known locally but without a formal host registration.
    Pending,
}

/// Result of a successful register or reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// First sighting, formally registered with the host.
    Registered(ComponentIdentity),
    /// First sighting, kept pending.
    Pending(ComponentIdentity),
    /// Existing identity whose target was swapped.
    Reloaded(ComponentIdentity),
}

impl RegistrationOutcome {
    /// Identity the outcome concerns.
    #[must_use]
    pub const fn identity(&self) -> &ComponentIdentity {
        match self {
            Self::Registered(identity) | Self::Pending(identity) | Self::Reloaded(identity) => {
                identity
            }
        }
    }
}

/// A unit that failed during a directory scan.
#[derive(Debug)]
pub struct ScanFailure {
    /// Unit or directory that failed.
    pub path: PathBuf,
    /// Why it failed.
    pub error: ComponentError,
}

/// Summary of a start-up scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Identities formally registered with the host.
    pub registered: Vec<ComponentIdentity>,
    /// Identities kept pending.
    pub pending: Vec<ComponentIdentity>,
    /// Identities seen more than once during the scan.
    pub reloaded: Vec<ComponentIdentity>,
    /// Units that declare no role.
    pub ignored: Vec<PathBuf>,
    /// Units or directories that failed.
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    fn record(&mut self, path: PathBuf, result: Result<RegistrationOutcome, ComponentError>) {
        match result {
            Ok(RegistrationOutcome::Registered(identity)) => self.registered.push(identity),
            Ok(RegistrationOutcome::Pending(identity)) => self.pending.push(identity),
            Ok(RegistrationOutcome::Reloaded(identity)) => self.reloaded.push(identity),
            Err(error) if error.is_missing_role() => self.ignored.push(path),
            Err(error) => self.failures.push(ScanFailure { path, error }),
        }
    }
}

/// Summary of a teardown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Identities evicted from the map.
    pub evicted: usize,
    /// Context listeners whose destroy callback ran.
    pub context_listeners_destroyed: usize,
    /// Handlers and filters whose destroy callback ran.
    pub components_destroyed: usize,
}

enum Claim {
    Inserted(Arc<IndirectionHandler>),
    Taken(Arc<IndirectionHandler>, Box<LoadedComponent>),
}

/// Whether a target handed to `swap` already ran `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Fresh,
    Initialised,
}

/// Registry of live components keyed by identity.
pub struct ComponentRegistry {
    host: Arc<dyn HostRegistrar>,
    handlers: RwLock<HashMap<ComponentIdentity, Arc<IndirectionHandler>>>,
}

impl ComponentRegistry {
    /// Registry publishing to `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostRegistrar>) -> Self {
        Self {
            host,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Compiles and registers every unit under `root`.
    ///
    /// Units that fail are recorded in the report; they never stop the scan.
    pub fn register_all(&self, loader: &ComponentLoader, root: &Path) -> ScanReport {
        let mut report = ScanReport::default();
        let files = match loader.discover(root) {
            Ok(files) => files,
            Err(error) => {
                warn!(target: REGISTRY_TARGET, root = %root.display(), %error, "component scan failed");
                report.failures.push(ScanFailure {
                    path: root.to_path_buf(),
                    error,
                });
                return report;
            }
        };

        for path in files {
            let result = loader.load(&path).and_then(|unit| self.register(unit));
            match &result {
                Ok(outcome) => debug!(
                    target: REGISTRY_TARGET,
                    path = %path.display(),
                    identity = %outcome.identity(),
                    "loaded component"
                ),
                Err(error) if error.is_missing_role() => debug!(
                    target: REGISTRY_TARGET,
                    path = %path.display(),
                    "unit declares no role"
                ),
                Err(error) => warn!(
                    target: REGISTRY_TARGET,
                    path = %path.display(),
                    %error,
                    "component unavailable"
                ),
            }
            report.record(path, result);
        }

        info!(
            target: REGISTRY_TARGET,
            registered = report.registered.len(),
            pending = report.pending.len(),
            ignored = report.ignored.len(),
            failed = report.failures.len(),
            "component scan complete"
        );
        report
    }

    /// Registers a compiled unit with the host behind a new indirection
    /// handler. A unit whose identity is already known from the same logical
    /// component (same type name and source file) is treated as a reload, so
    /// the host sees it once.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::MissingRole`] when the unit is not a component.
    /// - [`ComponentError::InvalidMetadata`] for inconsistent declarations.
    /// - [`ComponentError::DuplicateRegistration`] when another logical
    ///   component holds the identity, here or in the host.
    /// - [`ComponentError::Initialisation`] when the instance fails `init`.
    /// - [`ComponentError::Host`] when the host rejects the registration for
    ///   a reason other than being frozen.
    pub fn register(&self, unit: CompiledUnit) -> Result<RegistrationOutcome, ComponentError> {
        let loaded = Self::prepare(unit)?;
        let identity = loaded.metadata().identity();

        if let Some(existing) = self.get(identity.as_str()) {
            return Self::swap(&existing, loaded, Readiness::Fresh);
        }

        let mut publish_formally = true;
        if let Some(existing) = self.host.existing_registration(identity.as_str()) {
            if existing.type_name != loaded.metadata().type_name() {
                return Err(ComponentError::DuplicateRegistration {
                    identity: identity.as_str().to_owned(),
                    existing: existing.type_name,
                    attempted: loaded.metadata().type_name().to_owned(),
                });
            }
            // The host slot belongs to a handler evicted by an earlier
            // teardown; it cannot be claimed twice.
            publish_formally = false;
        }

        Self::initialise(&loaded)?;
        let handler = match self.insert(loaded) {
            Claim::Inserted(handler) => handler,
            Claim::Taken(existing, loaded) => {
                return Self::swap(&existing, *loaded, Readiness::Initialised);
            }
        };

        if !publish_formally {
            self.settle_pending(&handler);
            return Ok(RegistrationOutcome::Pending(identity));
        }

        match self.publish(&handler) {
            Ok(()) => {
                handler.set_registered(true);
                info!(target: REGISTRY_TARGET, %identity, kind = %handler.kind(), "registered component");
                Ok(RegistrationOutcome::Registered(identity))
            }
            Err(HostError::Frozen | HostError::ListenerUnavailable) => {
                self.settle_pending(&handler);
                Ok(RegistrationOutcome::Pending(identity))
            }
            Err(source) => {
                self.evict(&handler);
                Err(ComponentError::Host {
                    identity: identity.as_str().to_owned(),
                    source,
                })
            }
        }
    }

    /// Swaps the target of the handler for the unit's identity, or creates a
    /// pending handler when the identity is new.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::MissingRole`] when the unit is not a component.
    /// - [`ComponentError::InvalidMetadata`] for inconsistent declarations.
    /// - [`ComponentError::RoleChanged`] when the declared kind differs from
    ///   the registered one.
    /// - [`ComponentError::DuplicateRegistration`] when another logical
    ///   component holds the identity.
    /// - [`ComponentError::Initialisation`] when the instance fails `init`.
    pub fn reload(&self, unit: CompiledUnit) -> Result<RegistrationOutcome, ComponentError> {
        let loaded = Self::prepare(unit)?;
        let identity = loaded.metadata().identity();

        if let Some(existing) = self.get(identity.as_str()) {
            return Self::swap(&existing, loaded, Readiness::Fresh);
        }

        Self::initialise(&loaded)?;
        match self.insert(loaded) {
            Claim::Inserted(handler) => {
                self.settle_pending(&handler);
                Ok(RegistrationOutcome::Pending(identity))
            }
            Claim::Taken(existing, loaded) => {
                Self::swap(&existing, *loaded, Readiness::Initialised)
            }
        }
    }

    /// Runs destroy callbacks and empties the map.
    ///
    /// Context listeners receive a synthesised `context_destroyed` event;
    /// handlers and filters get `destroy`. Failures are logged. Calling this
    /// on an empty registry, or twice, does nothing.
    pub fn teardown(&self) -> TeardownReport {
        let mut drained: Vec<Arc<IndirectionHandler>> = {
            let mut handlers = self.handlers.write();
            handlers.drain().map(|(_, handler)| handler).collect()
        };
        drained.sort_by(|left, right| left.identity().cmp(right.identity()));

        let mut report = TeardownReport {
            evicted: drained.len(),
            ..TeardownReport::default()
        };
        let event = ContextEvent::synthesized(REGISTRY_CONTEXT);
        for handler in drained {
            let target = handler.get_target();
            let component = target.component();
            if let Some(listener) = component.as_context_listener() {
                if let Err(error) = listener.context_destroyed(&event) {
                    warn!(
                        target: REGISTRY_TARGET,
                        identity = %handler.identity(),
                        %error,
                        "context listener failed during teardown"
                    );
                }
                report.context_listeners_destroyed += 1;
            }
            match handler.kind() {
                RoleKind::Handler => {
                    if let Some(instance) = component.as_handler() {
                        instance.destroy();
                        report.components_destroyed += 1;
                    }
                }
                RoleKind::Filter => {
                    if let Some(instance) = component.as_filter() {
                        instance.destroy();
                        report.components_destroyed += 1;
                    }
                }
                _ => {}
            }
        }

        if report.evicted > 0 {
            info!(
                target: REGISTRY_TARGET,
                evicted = report.evicted,
                context_listeners = report.context_listeners_destroyed,
                "registry torn down"
            );
        }
        report
    }

    /// Handler for `identity`.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<Arc<IndirectionHandler>> {
        self.handlers.read().get(identity).cloned()
    }

    /// Lifecycle state of `identity`.
    #[must_use]
    pub fn state(&self, identity: &str) -> LifecycleState {
        match self.get(identity) {
            None => LifecycleState::Unseen,
            Some(handler) if handler.is_registered() => LifecycleState::Registered,
            Some(_) => LifecycleState::Pending,
        }
    }

    /// Handler-role identities without a formal host registration, sorted by
    /// identity.
    #[must_use]
    pub fn pending_handlers(&self) -> Vec<Arc<IndirectionHandler>> {
        let mut pending: Vec<Arc<IndirectionHandler>> = self
            .handlers
            .read()
            .values()
            .filter(|handler| handler.kind() == RoleKind::Handler && !handler.is_registered())
            .cloned()
            .collect();
        pending.sort_by(|left, right| left.identity().cmp(right.identity()));
        pending
    }

    /// First pending handler whose first declared pattern matches `path`.
    #[must_use]
    pub fn pending_route(&self, path: &str) -> Option<Arc<IndirectionHandler>> {
        self.pending_handlers().into_iter().find(|handler| {
            handler
                .get_target()
                .primary_pattern()
                .is_some_and(|pattern| pattern.matches(path))
        })
    }

    /// Number of identities held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns `true` when no identity is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    fn prepare(unit: CompiledUnit) -> Result<LoadedComponent, ComponentError> {
        let Some(metadata) = classify(&unit).cloned() else {
            return Err(ComponentError::MissingRole { path: unit.source });
        };
        LoadedComponent::new(unit.component, metadata, unit.source.clone()).map_err(|source| {
            ComponentError::InvalidMetadata {
                path: unit.source,
                source,
            }
        })
    }

    fn initialise(loaded: &LoadedComponent) -> Result<(), ComponentError> {
        let config = InitConfig::from_metadata(loaded.metadata());
        let component = loaded.component();
        let result = match loaded.metadata().kind() {
            RoleKind::Handler => component.as_handler().map(|handler| handler.init(&config)),
            RoleKind::Filter => component.as_filter().map(|filter| filter.init(&config)),
            _ => None,
        };
        match result {
            Some(Err(source)) => Err(ComponentError::Initialisation {
                identity: config.name().to_owned(),
                source,
            }),
            Some(Ok(())) | None => Ok(()),
        }
    }

    fn swap(
        handler: &IndirectionHandler,
        loaded: LoadedComponent,
        readiness: Readiness,
    ) -> Result<RegistrationOutcome, ComponentError> {
        let current = handler.get_target();
        let attempted = loaded.metadata();
        if current.metadata().type_name() != attempted.type_name() {
            return Err(ComponentError::DuplicateRegistration {
                identity: handler.identity().as_str().to_owned(),
                existing: current.metadata().type_name().to_owned(),
                attempted: attempted.type_name().to_owned(),
            });
        }
        // Same type from another file that still exists is a second logical
        // component. A vanished file means the unit was moved or renamed.
        if !same_source(current.source(), loaded.source()) && current.source().exists() {
            return Err(ComponentError::DuplicateRegistration {
                identity: handler.identity().as_str().to_owned(),
                existing: current.source().display().to_string(),
                attempted: loaded.source().display().to_string(),
            });
        }
        if handler.kind() != attempted.kind() {
            return Err(ComponentError::RoleChanged {
                identity: handler.identity().as_str().to_owned(),
                previous: handler.kind(),
                attempted: attempted.kind(),
            });
        }
        drop(current);

        if readiness == Readiness::Fresh {
            Self::initialise(&loaded)?;
        }
        let source = loaded.source().to_path_buf();
        handler.set_target(loaded);
        info!(
            target: REGISTRY_TARGET,
            identity = %handler.identity(),
            source = %source.display(),
            generation = handler.generation(),
            "reloaded component"
        );
        Ok(RegistrationOutcome::Reloaded(handler.identity().clone()))
    }

    /// Inserts a handler for a vacant identity. When another thread claimed
    /// the identity first, hands back the winner and the unused target.
    fn insert(&self, loaded: LoadedComponent) -> Claim {
        let identity = loaded.metadata().identity();
        let mut handlers = self.handlers.write();
        match handlers.entry(identity) {
            Entry::Occupied(entry) => Claim::Taken(Arc::clone(entry.get()), Box::new(loaded)),
            Entry::Vacant(entry) => {
                let handler = Arc::new(IndirectionHandler::new(loaded));
                entry.insert(Arc::clone(&handler));
                Claim::Inserted(handler)
            }
        }
    }

    fn evict(&self, handler: &Arc<IndirectionHandler>) {
        let mut handlers = self.handlers.write();
        if handlers
            .get(handler.identity())
            .is_some_and(|current| Arc::ptr_eq(current, handler))
        {
            handlers.remove(handler.identity());
        }
    }

    fn publish(&self, handler: &Arc<IndirectionHandler>) -> Result<(), HostError> {
        let target = handler.get_target();
        let metadata = target.metadata();
        let name = handler.identity().clone();
        let type_name = metadata.type_name().to_owned();
        let source = target.source().to_path_buf();
        match handler.kind() {
            RoleKind::Handler => self.host.register_handler(HandlerRegistration {
                name,
                type_name,
                source,
                facade: Arc::new(HandlerFacade::new(Arc::clone(handler))),
                patterns: target.patterns().to_vec(),
                init_params: metadata.init_params().clone(),
                load_on_startup: metadata.load_on_startup(),
                async_supported: metadata.async_supported(),
            }),
            RoleKind::Filter => self.host.register_filter(FilterRegistration {
                name,
                type_name,
                source,
                facade: Arc::new(FilterFacade::new(Arc::clone(handler))),
                patterns: target.patterns().to_vec(),
                dispatch: metadata.resolved_dispatch(),
                init_params: metadata.init_params().clone(),
            }),
            kind => self.host.register_listener(ListenerRegistration {
                name,
                type_name,
                source,
                kind,
                facade: Arc::new(ListenerFacade::new(Arc::clone(handler))),
            }),
        }
    }

    /// Leaves `handler` pending. Context listeners that the host will never
    /// call get their start-up callback here instead.
    fn settle_pending(&self, handler: &Arc<IndirectionHandler>) {
        handler.set_registered(false);
        info!(
            target: REGISTRY_TARGET,
            identity = %handler.identity(),
            kind = %handler.kind(),
            "component pending: no formal host registration"
        );
        if handler.kind() != RoleKind::ContextListener {
            return;
        }
        let target = handler.get_target();
        let Some(listener) = target.component().as_context_listener() else {
            return;
        };
        let event = ContextEvent::synthesized(REGISTRY_CONTEXT);
        if let Err(error) = listener.context_initialized(&event) {
            warn!(
                target: REGISTRY_TARGET,
                identity = %handler.identity(),
                %error,
                "context listener failed to initialise"
            );
        }
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ComponentRegistry")
            .field("components", &self.len())
            .finish_non_exhaustive()
    }
}

/// Compares unit paths, resolving links and relative spellings of files that
/// exist.
fn same_source(left: &Path, right: &Path) -> bool {
    left == right
        || matches!(
            (left.canonicalize(), right.canonicalize()),
            (Ok(resolved_left), Ok(resolved_right)) if resolved_left == resolved_right
        )
}

#[cfg(test)]
mod tests;
