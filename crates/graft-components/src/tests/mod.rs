//! Crate-level integration and BDD tests.

use std::sync::Arc;

use crate::context::{Continuation, Request, RequestContext, Stage, Verb};
use crate::dispatch::FallbackDispatchFilter;
use crate::registry::{ComponentRegistry, LifecycleState};

pub(crate) mod support;

use self::support::{RecordingHost, orders_unit};

#[test]
fn end_to_end_register_freeze_reload_and_fallback() {
    let host = Arc::new(RecordingHost::new());
    let registry = Arc::new(ComponentRegistry::new(Arc::clone(&host) as _));
    registry.register(orders_unit("v1")).expect("register");
    host.start();

    let late = support::unit(
        Arc::new(support::TextHandler::new("late")),
        crate::role::RoleMetadata::handler("app.Late").with_pattern("/late/*"),
    );
    registry.register(late).expect("late registration is pending");
    assert_eq!(registry.state("app.Late"), LifecycleState::Pending);
    assert_eq!(registry.state("orders"), LifecycleState::Registered);

    let filter = Arc::new(FallbackDispatchFilter::new(&registry, true));
    let mut ctx = RequestContext::new(
        Request::new(Verb::Get, "/late/report"),
        Continuation::new(vec![Stage::Filter(filter)]),
    );
    ctx.proceed().expect("fallback serves");
    assert_eq!(ctx.into_response().body(), "late");

    assert_eq!(registry.teardown().evicted, 2);
}
