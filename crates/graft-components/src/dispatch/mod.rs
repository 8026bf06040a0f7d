//! Fallback routing for pending handlers.
//!
//! Hosts that freeze their routing table after start-up never learn about
//! handlers created later. The [`FallbackDispatchFilter`] is installed ahead
//! of every other filter and routes such requests itself: it matches the
//! request path against the first declared pattern of each pending handler
//! and calls the target directly.

use std::sync::{Arc, Weak};

use tracing::trace;

use crate::component::Filter;
use crate::context::RequestContext;
use crate::error::InvocationError;
use crate::registry::ComponentRegistry;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Filter routing requests to pending handlers.
#[derive(Debug, Clone)]
pub struct FallbackDispatchFilter {
    registry: Weak<ComponentRegistry>,
    enabled: bool,
}

impl FallbackDispatchFilter {
    /// Filter consulting `registry`. A disabled filter only continues the
    /// chain.
    #[must_use]
    pub fn new(registry: &Arc<ComponentRegistry>, enabled: bool) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            enabled,
        }
    }

    /// Whether pending handlers are routed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Filter for FallbackDispatchFilter {
    fn do_filter(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        if !self.enabled {
            return ctx.proceed();
        }
        let Some(registry) = self.registry.upgrade() else {
            return ctx.proceed();
        };
        let Some(handler) = registry.pending_route(ctx.request().path()) else {
            return ctx.proceed();
        };
        drop(registry);

        let target = handler.get_target();
        match target.component().as_handler() {
            Some(instance) => {
                trace!(
                    target: DISPATCH_TARGET,
                    identity = %handler.identity(),
                    path = ctx.request().path(),
                    "routing to pending handler"
                );
                instance.service(ctx)
            }
            None => ctx.proceed(),
        }
    }
}
