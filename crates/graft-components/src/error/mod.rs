//! Domain errors raised by component operations.
//!
//! Compile and classification failures are contained per file: the registry
//! reports them and carries on with sibling units. Invocation failures belong
//! to the host's own error path and are never retried here.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::role::{MetadataError, RoleKind};

/// Errors arising while loading, classifying or registering components.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// The component directory could not be walked.
    #[error("failed to scan component directory '{root}': {message}")]
    Discovery {
        /// Directory being scanned.
        root: PathBuf,
        /// Description of the walk failure.
        message: String,
    },

    /// A source unit could not be compiled into an instance.
    #[error("failed to compile '{path}': {message}")]
    Compile {
        /// Source unit.
        path: PathBuf,
        /// Description of the compile failure.
        message: String,
    },

    /// A compiled unit declares no role it can fulfil. Not every file has to
    /// be a component, so callers usually skip these quietly.
    #[error("'{path}' declares no recognisable component role")]
    MissingRole {
        /// Source unit.
        path: PathBuf,
    },

    /// Declared role metadata is inconsistent.
    #[error("invalid role metadata in '{path}': {source}")]
    InvalidMetadata {
        /// Source unit.
        path: PathBuf,
        /// Validation failure.
        #[source]
        source: MetadataError,
    },

    /// A reload changed the declared kind of an identity.
    #[error("'{identity}' changed role from {previous} to {attempted}; restart required")]
    RoleChanged {
        /// Affected identity.
        identity: String,
        /// Kind currently registered.
        previous: RoleKind,
        /// Kind declared by the new unit.
        attempted: RoleKind,
    },

    /// Two logical components claim the same identity.
    #[error("identity '{identity}' is already registered by '{existing}', rejecting '{attempted}'")]
    DuplicateRegistration {
        /// Contested identity.
        identity: String,
        /// Type name holding the identity, or its source file when both
        /// units declare the same type.
        existing: String,
        /// Type name, or source file, of the unit that attempted to claim it.
        attempted: String,
    },

    /// The new instance failed its initialisation callback and was not
    /// published.
    #[error("'{identity}' failed to initialise: {source}")]
    Initialisation {
        /// Affected identity.
        identity: String,
        /// Failure reported by the instance.
        #[source]
        source: InvocationError,
    },

    /// The host refused a registration.
    #[error("host rejected '{identity}': {source}")]
    Host {
        /// Affected identity.
        identity: String,
        /// Host failure.
        #[source]
        source: HostError,
    },
}

impl ComponentError {
    /// Returns `true` for units that simply are not components.
    #[must_use]
    pub const fn is_missing_role(&self) -> bool {
        matches!(self, Self::MissingRole { .. })
    }
}

/// Errors reported by the host's registration ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host finished start-up and accepts no further formal
    /// registrations.
    #[error("host routing table is frozen")]
    Frozen,
    /// The host has no generic listener registration path.
    #[error("host does not accept listener registrations")]
    ListenerUnavailable,
    /// The host refused the registration for another reason.
    #[error("registration of '{name}' refused: {message}")]
    Rejected {
        /// Registration name.
        name: String,
        /// Host explanation.
        message: String,
    },
}

/// Errors raised while a component serves a request or event.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The component reported a failure.
    #[error("{message}")]
    Failed {
        /// Description supplied by the component.
        message: String,
    },
    /// The current target lost the capability its facade forwards to.
    #[error("'{identity}' no longer provides the {capability} capability")]
    CapabilityMissing {
        /// Affected identity.
        identity: String,
        /// Capability that was requested.
        capability: &'static str,
    },
    /// A connection was requested but no data source is configured.
    #[error("no managed data source is configured")]
    NoDataSource,
    /// The connection pool could not supply a connection.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl InvocationError {
    /// Builds a component failure from a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Errors raised by the connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The driver could not open a connection.
    #[error("driver '{driver}' failed to connect: {message}")]
    Connect {
        /// Driver name.
        driver: String,
        /// Driver explanation.
        message: String,
    },
    /// Every connection stayed busy for the whole wait.
    #[error("all {max} pooled connections busy after {waited:?}")]
    Exhausted {
        /// Pool capacity.
        max: usize,
        /// Time spent waiting.
        waited: Duration,
    },
    /// No factory is registered for the configured driver.
    #[error("no connection factory registered for driver '{driver}'")]
    UnknownDriver {
        /// Driver name.
        driver: String,
    },
}
