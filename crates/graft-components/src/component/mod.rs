//! Capability traits implemented by compiled components.
//!
//! A component exposes the capabilities it supports through the `as_*`
//! accessors on [`Component`]. Every capability method has a default, so a
//! handler that only answers `GET` implements [`Handler::get`] and nothing
//! else; an undeclared verb or event is a logged no-op, not an error.

use std::collections::BTreeMap;

use tracing::debug;

use crate::context::{RequestContext, Verb};
use crate::error::InvocationError;
use crate::role::RoleMetadata;

const COMPONENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::component");

/// A live instance produced by compiling one source unit.
///
/// Instances are replaced wholesale on reload and never mutated in place, so
/// they must not keep request data in fields.
pub trait Component: Send + Sync + 'static {
    /// Request handler capability.
    fn as_handler(&self) -> Option<&dyn Handler> {
        None
    }

    /// Filter capability.
    fn as_filter(&self) -> Option<&dyn Filter> {
        None
    }

    /// Context lifecycle listener capability.
    fn as_context_listener(&self) -> Option<&dyn ContextListener> {
        None
    }

    /// Context attribute listener capability.
    fn as_context_attribute_listener(&self) -> Option<&dyn ContextAttributeListener> {
        None
    }

    /// Session lifecycle listener capability.
    fn as_session_listener(&self) -> Option<&dyn SessionListener> {
        None
    }

    /// Session attribute listener capability.
    fn as_session_attribute_listener(&self) -> Option<&dyn SessionAttributeListener> {
        None
    }

    /// Session activation listener capability.
    fn as_session_activation_listener(&self) -> Option<&dyn SessionActivationListener> {
        None
    }

    /// Session identifier listener capability.
    fn as_session_id_listener(&self) -> Option<&dyn SessionIdListener> {
        None
    }
}

/// Name and parameters handed to a handler or filter before it serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitConfig {
    name: String,
    params: BTreeMap<String, String>,
}

impl InitConfig {
    /// Creates an initialisation configuration.
    #[must_use]
    pub const fn new(name: String, params: BTreeMap<String, String>) -> Self {
        Self { name, params }
    }

    /// Builds the configuration declared by `metadata`.
    #[must_use]
    pub fn from_metadata(metadata: &RoleMetadata) -> Self {
        Self::new(
            metadata.identity().as_str().to_owned(),
            metadata.init_params().clone(),
        )
    }

    /// Registered component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up one parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// All parameters.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

fn undeclared_verb(ctx: &RequestContext, verb: Verb) -> Result<(), InvocationError> {
    debug!(
        target: COMPONENT_TARGET,
        %verb,
        path = ctx.request().path(),
        "no handler declared for verb"
    );
    Ok(())
}

fn undeclared_event(event: &'static str) -> Result<(), InvocationError> {
    debug!(target: COMPONENT_TARGET, event, "no callback declared for event");
    Ok(())
}

/// Request handler capability.
pub trait Handler: Send + Sync {
    /// Called with the declared parameters before the instance serves.
    ///
    /// # Errors
    ///
    /// An error keeps the instance from being published.
    fn init(&self, config: &InitConfig) -> Result<(), InvocationError> {
        let _ = config;
        Ok(())
    }

    /// Routes the request to the verb-specific entry point.
    ///
    /// # Errors
    ///
    /// Propagates the entry point's failure.
    fn service(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        match ctx.request().verb() {
            Verb::Get => self.get(ctx),
            Verb::Head => self.head(ctx),
            Verb::Post => self.post(ctx),
            Verb::Put => self.put(ctx),
            Verb::Delete => self.delete(ctx),
            Verb::Options => self.options(ctx),
            Verb::Trace => self.trace(ctx),
        }
    }

    /// `GET` entry point.
    ///
    /// # Errors
    ///
    /// Implementations report failures to the host's error path.
    fn get(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        undeclared_verb(ctx, Verb::Get)
    }

    /// `HEAD` entry point.
    ///
    /// # Errors
    ///
    /// Implementations report failures to the host's error path.
    fn head(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        undeclared_verb(ctx, Verb::Head)
    }

    /// `POST` entry point.
    ///
    /// # Errors
    ///
    /// Implementations report failures to the host's error path.
    fn post(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        undeclared_verb(ctx, Verb::Post)
    }

    /// `PUT` entry point.
    ///
    /// # Errors
    ///
    /// Implementations report failures to the host's error path.
    fn put(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        undeclared_verb(ctx, Verb::Put)
    }

    /// `DELETE` entry point.
    ///
    /// # Errors
    ///
    /// Implementations report failures to the host's error path.
    fn delete(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        undeclared_verb(ctx, Verb::Delete)
    }

    /// `OPTIONS` entry point.
    ///
    /// # Errors
    ///
    /// Implementations report failures to the host's error path.
    fn options(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        undeclared_verb(ctx, Verb::Options)
    }

    /// `TRACE` entry point.
    ///
    /// # Errors
    ///
    /// Implementations report failures to the host's error path.
    fn trace(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        undeclared_verb(ctx, Verb::Trace)
    }

    /// Called once when the instance is retired at teardown.
    fn destroy(&self) {}
}

/// Intercepting filter capability.
pub trait Filter: Send + Sync {
    /// Called with the declared parameters before the instance serves.
    ///
    /// # Errors
    ///
    /// An error keeps the instance from being published.
    fn init(&self, config: &InitConfig) -> Result<(), InvocationError> {
        let _ = config;
        Ok(())
    }

    /// Processes the request. The default passes control straight on.
    ///
    /// # Errors
    ///
    /// Propagates failures from this filter or any later stage.
    fn do_filter(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        ctx.proceed()
    }

    /// Called once when the instance is retired at teardown.
    fn destroy(&self) {}
}

/// Context start-up or shut-down notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEvent {
    /// Name of the hosting context.
    pub context: String,
    /// `true` when the registry fabricated the event itself.
    pub synthesized: bool,
}

impl ContextEvent {
    /// Event raised by the host.
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            synthesized: false,
        }
    }

    /// Event fabricated by the registry for direct callbacks.
    #[must_use]
    pub fn synthesized(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            synthesized: true,
        }
    }
}

/// Context attribute change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEvent {
    /// Attribute name.
    pub name: String,
    /// New value, or the removed value on removal.
    pub value: String,
    /// Previous value on replacement.
    pub previous: Option<String>,
}

/// Session lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Session identifier.
    pub session_id: String,
}

/// Session attribute change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAttributeEvent {
    /// Session identifier.
    pub session_id: String,
    /// Attribute name.
    pub name: String,
    /// New value, or the removed value on removal.
    pub value: String,
    /// Previous value on replacement.
    pub previous: Option<String>,
}

/// Session identifier rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdChangedEvent {
    /// Identifier before the change.
    pub old_id: String,
    /// Identifier after the change.
    pub new_id: String,
}

/// Context lifecycle listener capability.
pub trait ContextListener: Send + Sync {
    /// Context finished starting.
    ///
    /// # Errors
    ///
    /// Reported to the host; the host decides whether start-up continues.
    fn context_initialized(&self, event: &ContextEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("context_initialized")
    }

    /// Context is shutting down.
    ///
    /// # Errors
    ///
    /// Logged by teardown, never propagated further.
    fn context_destroyed(&self, event: &ContextEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("context_destroyed")
    }
}

/// Context attribute listener capability.
pub trait ContextAttributeListener: Send + Sync {
    /// Attribute added.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn attribute_added(&self, event: &AttributeEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("context_attribute_added")
    }

    /// Attribute removed.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn attribute_removed(&self, event: &AttributeEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("context_attribute_removed")
    }

    /// Attribute replaced.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn attribute_replaced(&self, event: &AttributeEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("context_attribute_replaced")
    }
}

/// Session lifecycle listener capability.
pub trait SessionListener: Send + Sync {
    /// Session created.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn session_created(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("session_created")
    }

    /// Session destroyed.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn session_destroyed(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("session_destroyed")
    }
}

/// Session attribute listener capability.
pub trait SessionAttributeListener: Send + Sync {
    /// Attribute added.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn attribute_added(&self, event: &SessionAttributeEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("session_attribute_added")
    }

    /// Attribute removed.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn attribute_removed(&self, event: &SessionAttributeEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("session_attribute_removed")
    }

    /// Attribute replaced.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn attribute_replaced(&self, event: &SessionAttributeEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("session_attribute_replaced")
    }
}

/// Session activation listener capability.
pub trait SessionActivationListener: Send + Sync {
    /// Session about to be passivated.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn session_will_passivate(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("session_will_passivate")
    }

    /// Session activated.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn session_did_activate(&self, event: &SessionEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("session_did_activate")
    }
}

/// Session identifier listener capability.
pub trait SessionIdListener: Send + Sync {
    /// Session identifier rotated.
    ///
    /// # Errors
    ///
    /// Reported to the host's error path.
    fn session_id_changed(&self, event: &SessionIdChangedEvent) -> Result<(), InvocationError> {
        let _ = event;
        undeclared_event("session_id_changed")
    }
}
