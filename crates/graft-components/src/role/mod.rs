//! Declared roles and the identity derived from them.
//!
//! [`RoleMetadata`] is what a compiled unit says about itself: which kind of
//! component it is, the name it wants to be registered under, its path
//! patterns, dispatch phases and initialisation parameters. Metadata is
//! re-read on every reload because the file may have changed its declarations.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::component::Component;
use crate::pattern::{PatternError, UrlPattern};

/// The kinds of component a unit can declare.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoleKind {
    /// Request handler reached by path.
    Handler,
    /// Intercepting filter wrapped around matching requests.
    Filter,
    /// Receives context start-up and shut-down callbacks.
    ContextListener,
    /// Observes context attribute changes.
    ContextAttributeListener,
    /// Observes session creation and destruction.
    SessionListener,
    /// Observes session attribute changes.
    SessionAttributeListener,
    /// Observes session passivation and activation.
    SessionActivationListener,
    /// Observes session identifier changes.
    SessionIdListener,
}

impl RoleKind {
    /// Returns `true` for every listener kind.
    #[must_use]
    pub const fn is_listener(self) -> bool {
        !matches!(self, Self::Handler | Self::Filter)
    }

    /// Returns `true` when the role is routed by path patterns.
    #[must_use]
    pub const fn is_routed(self) -> bool {
        matches!(self, Self::Handler | Self::Filter)
    }

    /// Returns `true` when `component` exposes the capability this role needs.
    #[must_use]
    pub fn supported_by(self, component: &dyn Component) -> bool {
        match self {
            Self::Handler => component.as_handler().is_some(),
            Self::Filter => component.as_filter().is_some(),
            Self::ContextListener => component.as_context_listener().is_some(),
            Self::ContextAttributeListener => component.as_context_attribute_listener().is_some(),
            Self::SessionListener => component.as_session_listener().is_some(),
            Self::SessionAttributeListener => component.as_session_attribute_listener().is_some(),
            Self::SessionActivationListener => {
                component.as_session_activation_listener().is_some()
            }
            Self::SessionIdListener => component.as_session_id_listener().is_some(),
        }
    }
}

/// Points in request processing at which a filter runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispatchPhase {
    /// Every inbound request.
    #[default]
    Request,
    /// Server-side forwards.
    Forward,
    /// Server-side includes.
    Include,
    /// Asynchronous continuations.
    Async,
    /// Error page dispatches.
    Error,
}

/// Key correlating successive reloads of one logical component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentIdentity(String);

impl ComponentIdentity {
    /// Wraps an identity string.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Borrows the identity text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl Borrow<str> for ComponentIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Declarative classification and configuration of one compiled unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoleMetadata {
    kind: RoleKind,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dispatch: Vec<DispatchPhase>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    init_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    load_on_startup: Option<i32>,
    #[serde(default)]
    async_supported: bool,
}

impl RoleMetadata {
    /// Creates metadata for `kind` with the canonical `type_name` of the unit.
    #[must_use]
    pub fn new(kind: RoleKind, type_name: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            name: None,
            patterns: Vec::new(),
            dispatch: Vec::new(),
            init_params: BTreeMap::new(),
            load_on_startup: None,
            async_supported: false,
        }
    }

    /// Shorthand for handler metadata.
    #[must_use]
    pub fn handler(type_name: impl Into<String>) -> Self {
        Self::new(RoleKind::Handler, type_name)
    }

    /// Shorthand for filter metadata.
    #[must_use]
    pub fn filter(type_name: impl Into<String>) -> Self {
        Self::new(RoleKind::Filter, type_name)
    }

    /// Overrides the registration name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a path pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Appends a dispatch phase.
    #[must_use]
    pub fn with_dispatch(mut self, phase: DispatchPhase) -> Self {
        self.dispatch.push(phase);
        self
    }

    /// Adds an initialisation parameter.
    #[must_use]
    pub fn with_init_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.init_params.insert(key.into(), value.into());
        self
    }

    /// Sets the start-up order hint.
    #[must_use]
    pub const fn with_load_on_startup(mut self, order: i32) -> Self {
        self.load_on_startup = Some(order);
        self
    }

    /// Marks the handler as supporting asynchronous processing.
    #[must_use]
    pub const fn with_async_supported(mut self, supported: bool) -> Self {
        self.async_supported = supported;
        self
    }

    /// Declared kind.
    #[must_use]
    pub const fn kind(&self) -> RoleKind {
        self.kind
    }

    /// Canonical type name of the unit.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared name override, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Declared path patterns, unparsed.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Initialisation parameters.
    #[must_use]
    pub const fn init_params(&self) -> &BTreeMap<String, String> {
        &self.init_params
    }

    /// Start-up order hint.
    #[must_use]
    pub const fn load_on_startup(&self) -> Option<i32> {
        self.load_on_startup
    }

    /// Whether asynchronous processing is supported.
    #[must_use]
    pub const fn async_supported(&self) -> bool {
        self.async_supported
    }

    /// Identity under which the component is registered: the declared name,
    /// or the canonical type name when no name is declared.
    #[must_use]
    pub fn identity(&self) -> ComponentIdentity {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => ComponentIdentity::new(name),
            _ => ComponentIdentity::new(self.type_name.trim()),
        }
    }

    /// Dispatch phases with the request phase as the default.
    #[must_use]
    pub fn resolved_dispatch(&self) -> Vec<DispatchPhase> {
        if self.dispatch.is_empty() {
            vec![DispatchPhase::default()]
        } else {
            let mut phases = self.dispatch.clone();
            phases.dedup();
            phases
        }
    }

    /// Checks the declarations and returns the parsed path patterns.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when the type name is blank, a routed role
    /// declares no pattern, a pattern does not parse, or a non-handler role
    /// declares handler-only attributes.
    pub fn validate(&self) -> Result<Vec<UrlPattern>, MetadataError> {
        if self.type_name.trim().is_empty() {
            return Err(MetadataError::MissingTypeName);
        }
        if self.kind.is_routed() && self.patterns.is_empty() {
            return Err(MetadataError::MissingPattern { kind: self.kind });
        }
        if !self.kind.is_routed() && !self.patterns.is_empty() {
            return Err(MetadataError::UnexpectedAttribute {
                kind: self.kind,
                attribute: "patterns",
            });
        }
        if self.kind != RoleKind::Handler {
            if self.load_on_startup.is_some() {
                return Err(MetadataError::UnexpectedAttribute {
                    kind: self.kind,
                    attribute: "load_on_startup",
                });
            }
            if self.async_supported {
                return Err(MetadataError::UnexpectedAttribute {
                    kind: self.kind,
                    attribute: "async_supported",
                });
            }
        }
        if self.kind != RoleKind::Filter && !self.dispatch.is_empty() {
            return Err(MetadataError::UnexpectedAttribute {
                kind: self.kind,
                attribute: "dispatch",
            });
        }
        self.patterns
            .iter()
            .map(|pattern| {
                UrlPattern::parse(pattern).map_err(|source| MetadataError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }
}

/// Reasons declared metadata is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// The canonical type name was blank.
    #[error("role metadata has no type name")]
    MissingTypeName,
    /// A handler or filter declared no path pattern.
    #[error("{kind} role declares no path pattern")]
    MissingPattern {
        /// Declared kind.
        kind: RoleKind,
    },
    /// A declared pattern failed to parse.
    #[error("invalid path pattern '{pattern}': {source}")]
    Pattern {
        /// Declared text.
        pattern: String,
        /// Parser failure.
        #[source]
        source: PatternError,
    },
    /// An attribute was declared for a role that does not use it.
    #[error("{kind} role may not declare '{attribute}'")]
    UnexpectedAttribute {
        /// Declared kind.
        kind: RoleKind,
        /// Offending attribute.
        attribute: &'static str,
    },
}
