//! Hot-swappable request components for the graft host.
//!
//! Components are request handlers, intercepting filters and lifecycle or
//! event listeners, each compiled from one source unit in a watched
//! directory. This crate turns such units into live instances, registers them
//! with the host exactly once, and replaces their implementation in place when
//! the source changes.
//!
//! # Architecture
//!
//! A [`ComponentLoader`] asks a [`CompilerService`] to turn a file into a
//! [`CompiledUnit`]: a component instance plus its declared [`RoleMetadata`].
//! The [`ComponentRegistry`] classifies the unit, computes its
//! [`ComponentIdentity`] and hides the instance behind an
//! [`IndirectionHandler`]. The host is only ever given forwarding facades
//! ([`HandlerFacade`], [`FilterFacade`], [`ListenerFacade`]) through the
//! [`HostRegistrar`] port, so a later [`ComponentRegistry::reload`] swaps the
//! target with one atomic publish and every reference the host holds keeps
//! working.
//!
//! Components whose identity first appears after the host froze its routing
//! table stay *pending*. The [`FallbackDispatchFilter`], installed ahead of
//! every other filter, routes requests to them by path.
//!
//! Request state never lives on a component: every invocation receives its
//! own [`RequestContext`] carrying the request, the response under
//! construction, the continuation of the filter chain, request attributes and
//! a lazily acquired pooled connection.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use graft_components::{
//!     ComponentLoader, ComponentRegistry, DescriptorCompiler, FactoryTable, HostRegistrar,
//! };
//!
//! fn start(host: Arc<dyn HostRegistrar>, factories: FactoryTable) {
//!     let loader = ComponentLoader::new(Arc::new(DescriptorCompiler::new(Arc::new(factories))));
//!     let registry = ComponentRegistry::new(host);
//!     let report = registry.register_all(&loader, "components".as_ref());
//!     assert!(report.failures.is_empty());
//! }
//! ```

pub mod component;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod indirection;
pub mod loader;
pub mod pattern;
pub mod pool;
pub mod registry;
pub mod role;

#[cfg(test)]
mod tests;

pub use self::component::{
    AttributeEvent, Component, ContextAttributeListener, ContextEvent, ContextListener, Filter,
    Handler, InitConfig, SessionActivationListener, SessionAttributeEvent,
    SessionAttributeListener, SessionEvent, SessionIdChangedEvent, SessionIdListener,
    SessionListener,
};
pub use self::context::{Continuation, Request, RequestContext, Response, Stage, Verb};
pub use self::descriptor::{ComponentFactory, DescriptorCompiler, FactoryTable};
pub use self::dispatch::FallbackDispatchFilter;
pub use self::error::{ComponentError, HostError, InvocationError, PoolError};
pub use self::host::{
    ExistingRegistration, FilterRegistration, HandlerRegistration, HostRegistrar,
    ListenerRegistration,
};
pub use self::indirection::{
    FilterFacade, HandlerFacade, IndirectionHandler, ListenerFacade, LoadedComponent,
};
pub use self::loader::{CompiledUnit, CompilerService, ComponentLoader, classify};
pub use self::pattern::{PatternError, UrlPattern};
pub use self::pool::{
    Connection, ConnectionFactories, ConnectionFactory, ConnectionPool, PooledConnection,
};
pub use self::registry::{
    ComponentRegistry, LifecycleState, RegistrationOutcome, ScanFailure, ScanReport,
    TeardownReport,
};
pub use self::role::{ComponentIdentity, DispatchPhase, MetadataError, RoleKind, RoleMetadata};
