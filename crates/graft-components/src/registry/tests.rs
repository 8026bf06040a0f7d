//! Unit tests for the component registry.

use std::fs;
use std::sync::{Arc, OnceLock, Weak};

use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::component::{Component, Handler};
use crate::context::{Continuation, Request, RequestContext, Verb};
use crate::descriptor::{DescriptorCompiler, FactoryTable};
use crate::host::ExistingRegistration;
use crate::role::{DispatchPhase, RoleMetadata};
use crate::tests::support::{
    Calls, Inert, LifecycleProbe, RecordingHost, StampFilter, TextHandler, listener_metadata,
    orders_metadata, orders_unit, unit,
};

mock! {
    Host {}
    impl HostRegistrar for Host {
        fn register_handler(&self, registration: HandlerRegistration) -> Result<(), HostError>;
        fn register_filter(&self, registration: FilterRegistration) -> Result<(), HostError>;
        fn register_listener(&self, registration: ListenerRegistration) -> Result<(), HostError>;
        fn existing_registration(&self, name: &str) -> Option<ExistingRegistration>;
    }
}

#[fixture]
fn host() -> Arc<RecordingHost> {
    Arc::new(RecordingHost::new())
}

fn registry_over(host: &Arc<RecordingHost>) -> ComponentRegistry {
    ComponentRegistry::new(Arc::clone(host) as Arc<dyn HostRegistrar>)
}

fn serve(handler: &dyn Handler, path: &str) -> String {
    let mut ctx = RequestContext::new(Request::new(Verb::Get, path), Continuation::terminal());
    handler.service(&mut ctx).expect("handler succeeds");
    ctx.into_response().body().to_owned()
}

fn impostor_unit() -> CompiledUnit {
    unit(
        Arc::new(TextHandler::new("impostor")),
        RoleMetadata::handler("app.Impostor")
            .with_name("orders")
            .with_pattern("/orders"),
    )
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn register_publishes_handler_metadata_to_host() {
    let mut host = MockHost::new();
    host.expect_existing_registration().return_const(None);
    host.expect_register_handler()
        .once()
        .withf(|registration| {
            registration.name.as_str() == "orders"
                && registration.type_name == "app.Orders"
                && registration.patterns.len() == 1
                && registration.init_params.get("greeting").map(String::as_str) == Some("hi")
        })
        .returning(|_| Ok(()));
    let registry = ComponentRegistry::new(Arc::new(host));

    let metadata = orders_metadata().with_init_param("greeting", "hi");
    let outcome = registry
        .register(unit(Arc::new(TextHandler::new("v1")), metadata))
        .expect("registers");

    assert_eq!(outcome, RegistrationOutcome::Registered("orders".into()));
    assert_eq!(registry.state("orders"), LifecycleState::Registered);
    assert_eq!(registry.len(), 1);
}

#[rstest]
fn registering_twice_reaches_the_host_once(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    registry.register(orders_unit("v1")).expect("first");
    let outcome = registry.register(orders_unit("v2")).expect("second");

    assert_eq!(outcome, RegistrationOutcome::Reloaded("orders".into()));
    assert_eq!(host.handler_names(), vec![String::from("orders")]);
    let registration = host.handler("orders").expect("registered");
    assert_eq!(serve(registration.facade.as_ref(), "/orders"), "v2");
}

#[rstest]
fn duplicate_identity_is_rejected_and_first_stays_intact(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    registry.register(orders_unit("v1")).expect("first");

    let err = registry.register(impostor_unit()).expect_err("duplicate");
    assert!(matches!(
        &err,
        ComponentError::DuplicateRegistration { identity, existing, attempted }
            if identity == "orders" && existing == "app.Orders" && attempted == "app.Impostor"
    ));

    let registration = host.handler("orders").expect("registered");
    assert_eq!(serve(registration.facade.as_ref(), "/orders"), "v1");
}

#[test]
fn identities_held_by_the_host_are_not_claimed_twice() {
    let mut host = MockHost::new();
    host.expect_existing_registration()
        .returning(|name| {
            Some(ExistingRegistration {
                name: name.to_owned(),
                type_name: String::from("legacy.Orders"),
            })
        });
    host.expect_register_handler().never();
    let registry = ComponentRegistry::new(Arc::new(host));

    let err = registry.register(orders_unit("v1")).expect_err("host owns name");
    assert!(matches!(err, ComponentError::DuplicateRegistration { .. }));
    assert!(registry.is_empty());
}

#[test]
fn frozen_hosts_leave_components_pending() {
    let mut host = MockHost::new();
    host.expect_existing_registration().return_const(None);
    host.expect_register_handler()
        .once()
        .returning(|_| Err(HostError::Frozen));
    let registry = ComponentRegistry::new(Arc::new(host));

    let outcome = registry.register(orders_unit("v1")).expect("pending");
    assert_eq!(outcome, RegistrationOutcome::Pending("orders".into()));
    assert_eq!(registry.state("orders"), LifecycleState::Pending);
    assert!(registry.pending_route("/orders").is_some());
    assert!(registry.pending_route("/invoices").is_none());
}

#[test]
fn other_host_rejections_surface_and_leave_no_trace() {
    let mut host = MockHost::new();
    host.expect_existing_registration().return_const(None);
    host.expect_register_handler().once().returning(|_| {
        Err(HostError::Rejected {
            name: String::from("orders"),
            message: String::from("pattern clash"),
        })
    });
    let registry = ComponentRegistry::new(Arc::new(host));

    let err = registry.register(orders_unit("v1")).expect_err("rejected");
    assert!(matches!(err, ComponentError::Host { .. }));
    assert_eq!(registry.state("orders"), LifecycleState::Unseen);
}

#[test]
fn failed_initialisation_is_never_published() {
    let mut host = MockHost::new();
    host.expect_existing_registration().return_const(None);
    host.expect_register_handler().never();
    let registry = ComponentRegistry::new(Arc::new(host));

    let failing = unit(Arc::new(TextHandler::failing_init("v1")), orders_metadata());
    let err = registry.register(failing).expect_err("init fails");
    assert!(matches!(err, ComponentError::Initialisation { identity, .. } if identity == "orders"));
    assert!(registry.is_empty());
}

#[rstest]
fn units_without_a_role_are_reported_as_such(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    let plain = CompiledUnit {
        component: Arc::new(Inert),
        metadata: None,
        source: "components/helper.json".into(),
    };
    let err = registry.register(plain).expect_err("no role");
    assert!(err.is_missing_role());
}

#[rstest]
fn inconsistent_metadata_is_rejected(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    let unrouted = unit(
        Arc::new(TextHandler::new("v1")),
        RoleMetadata::handler("app.Orders"),
    );
    let err = registry.register(unrouted).expect_err("no pattern");
    assert!(matches!(err, ComponentError::InvalidMetadata { .. }));
}

#[rstest]
fn filters_register_with_resolved_dispatch(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    let filter = unit(
        Arc::new(StampFilter {
            value: String::from("audit"),
        }),
        RoleMetadata::filter("app.Audit").with_pattern("/*"),
    );
    registry.register(filter).expect("registers");

    let filters = host.filters();
    assert_eq!(filters.len(), 1);
    let registration = filters.first().expect("one filter");
    assert_eq!(registration.dispatch, vec![DispatchPhase::Request]);
    assert_eq!(registration.name.as_str(), "app.Audit");
}

#[rstest]
fn listeners_attach_through_the_listener_port(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    let calls = Arc::new(Calls::default());
    let listener = unit(
        Arc::new(LifecycleProbe {
            calls: Arc::clone(&calls),
        }),
        listener_metadata(RoleKind::ContextListener, "app.Startup"),
    );
    registry.register(listener).expect("registers");

    let listeners = host.listeners();
    assert_eq!(listeners.len(), 1);
    assert_eq!(
        listeners.first().map(|registration| registration.kind),
        Some(RoleKind::ContextListener)
    );
    assert_eq!(calls.inits(), 0, "the host fires start-up callbacks itself");
}

#[test]
fn context_listeners_start_directly_without_a_listener_port() {
    let host = Arc::new(RecordingHost::without_listeners());
    let registry = registry_over(&host);
    let calls = Arc::new(Calls::default());
    let listener = unit(
        Arc::new(LifecycleProbe {
            calls: Arc::clone(&calls),
        }),
        listener_metadata(RoleKind::ContextListener, "app.Startup"),
    );

    let outcome = registry.register(listener).expect("pending");
    assert!(matches!(outcome, RegistrationOutcome::Pending(_)));
    assert_eq!(calls.inits(), 1);
    assert_eq!(calls.destroys(), 0);
}

// ---------------------------------------------------------------------------
// Reload
// ---------------------------------------------------------------------------

#[rstest]
fn reload_swaps_behind_the_facade_the_host_holds(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    registry.register(orders_unit("v1")).expect("register");
    let facade = host.handler("orders").expect("registered").facade;
    let before = registry.get("orders").expect("handler");

    let outcome = registry.reload(orders_unit("v2")).expect("reload");
    assert_eq!(outcome, RegistrationOutcome::Reloaded("orders".into()));

    let after = registry.get("orders").expect("handler");
    assert!(Arc::ptr_eq(&before, &after), "identity must be stable");
    assert_eq!(after.generation(), 1);
    assert_eq!(serve(facade.as_ref(), "/orders"), "v2");
    assert_eq!(host.handler_names().len(), 1);
}

#[rstest]
fn reloaded_instances_are_initialised_before_publication(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    let calls = Arc::new(Calls::default());
    registry
        .register(unit(
            Arc::new(TextHandler::with_calls("v1", Arc::clone(&calls))),
            orders_metadata(),
        ))
        .expect("register");
    registry
        .reload(unit(
            Arc::new(TextHandler::with_calls("v2", Arc::clone(&calls))),
            orders_metadata(),
        ))
        .expect("reload");
    assert_eq!(calls.inits(), 2);

    let err = registry
        .reload(unit(Arc::new(TextHandler::failing_init("v3")), orders_metadata()))
        .expect_err("init fails");
    assert!(matches!(err, ComponentError::Initialisation { .. }));
    let facade = host.handler("orders").expect("registered").facade;
    assert_eq!(serve(facade.as_ref(), "/orders"), "v2");
}

#[rstest]
fn reload_of_unknown_identity_creates_pending_handler(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    let outcome = registry.reload(orders_unit("v1")).expect("pending");

    assert_eq!(outcome, RegistrationOutcome::Pending("orders".into()));
    assert_eq!(registry.state("orders"), LifecycleState::Pending);
    assert!(host.handler_names().is_empty());
    let pending: Vec<_> = registry
        .pending_handlers()
        .iter()
        .map(|handler| handler.identity().to_string())
        .collect();
    assert_eq!(pending, vec![String::from("orders")]);
}

#[rstest]
fn reload_rejects_role_changes(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    registry.register(orders_unit("v1")).expect("register");

    let as_filter = unit(
        Arc::new(StampFilter {
            value: String::from("x"),
        }),
        RoleMetadata::filter("app.Orders")
            .with_name("orders")
            .with_pattern("/orders"),
    );
    let err = registry.reload(as_filter).expect_err("role changed");
    assert!(matches!(
        err,
        ComponentError::RoleChanged {
            previous: RoleKind::Handler,
            attempted: RoleKind::Filter,
            ..
        }
    ));
}

#[rstest]
fn reload_rejects_a_different_logical_component(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    registry.register(orders_unit("v1")).expect("register");
    let err = registry.reload(impostor_unit()).expect_err("duplicate");
    assert!(matches!(err, ComponentError::DuplicateRegistration { .. }));
}

#[rstest]
fn identity_survives_many_reloads(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    registry.register(orders_unit("v0")).expect("register");
    let handler = registry.get("orders").expect("handler");

    for round in 1..=50_u64 {
        let outcome = registry
            .reload(orders_unit(&format!("v{round}")))
            .expect("reload");
        assert_eq!(outcome, RegistrationOutcome::Reloaded("orders".into()));
        assert_eq!(registry.len(), 1);
        assert_eq!(handler.generation(), round);
    }

    assert_eq!(host.handler_names(), vec![String::from("orders")]);
    let facade = host.handler("orders").expect("registered").facade;
    assert_eq!(serve(facade.as_ref(), "/orders"), "v50");
}

#[test]
fn a_lost_claim_initialises_the_winning_unit_once() {
    let registry_slot: Arc<OnceLock<Weak<ComponentRegistry>>> = Arc::new(OnceLock::new());
    let rival_slot = Arc::clone(&registry_slot);
    let mut host = MockHost::new();
    // A concurrent reload claims the identity between the lookup and insert.
    host.expect_existing_registration().returning(move |_| {
        if let Some(registry) = rival_slot.get().and_then(Weak::upgrade) {
            registry.reload(orders_unit("rival")).expect("rival claims orders");
        }
        None
    });
    host.expect_register_handler().never();
    let registry = Arc::new(ComponentRegistry::new(Arc::new(host)));
    registry_slot.set(Arc::downgrade(&registry)).expect("slot empty");

    let calls = Arc::new(Calls::default());
    let outcome = registry
        .register(unit(
            Arc::new(TextHandler::with_calls("v1", Arc::clone(&calls))),
            orders_metadata(),
        ))
        .expect("register");

    assert_eq!(outcome, RegistrationOutcome::Reloaded("orders".into()));
    assert_eq!(calls.inits(), 1);
    let target = registry.get("orders").expect("handler").get_target();
    let live = target.component().as_handler().expect("handler capability");
    assert_eq!(serve(live, "/orders"), "v1");
}

#[test]
fn swapped_context_listeners_only_see_the_stop_event() {
    let host = Arc::new(RecordingHost::without_listeners());
    let registry = registry_over(&host);
    let first = Arc::new(Calls::default());
    let second = Arc::new(Calls::default());
    let listener_unit = |calls: &Arc<Calls>| {
        unit(
            Arc::new(LifecycleProbe {
                calls: Arc::clone(calls),
            }),
            listener_metadata(RoleKind::ContextListener, "app.Startup"),
        )
    };

    registry.register(listener_unit(&first)).expect("pending start");
    registry.reload(listener_unit(&second)).expect("reload");
    let report = registry.teardown();

    assert_eq!(report.context_listeners_destroyed, 1);
    assert_eq!((first.inits(), first.destroys()), (1, 0));
    assert_eq!((second.inits(), second.destroys()), (0, 1));
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[rstest]
fn teardown_of_empty_registry_is_a_no_op(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    assert_eq!(registry.teardown(), TeardownReport::default());
}

#[rstest]
fn teardown_destroys_once_and_second_call_does_nothing(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    let listener_calls = Arc::new(Calls::default());
    let handler_calls = Arc::new(Calls::default());
    registry
        .register(unit(
            Arc::new(LifecycleProbe {
                calls: Arc::clone(&listener_calls),
            }),
            listener_metadata(RoleKind::ContextListener, "app.Startup"),
        ))
        .expect("listener");
    registry
        .register(unit(
            Arc::new(TextHandler::with_calls("v1", Arc::clone(&handler_calls))),
            orders_metadata(),
        ))
        .expect("handler");

    let first = registry.teardown();
    assert_eq!(first.evicted, 2);
    assert_eq!(first.context_listeners_destroyed, 1);
    assert_eq!(first.components_destroyed, 1);
    assert_eq!(listener_calls.destroys(), 1);
    assert_eq!(handler_calls.destroys(), 1);
    assert!(registry.is_empty());
    assert_eq!(registry.state("orders"), LifecycleState::Unseen);

    assert_eq!(registry.teardown(), TeardownReport::default());
    assert_eq!(listener_calls.destroys(), 1);
}

#[rstest]
fn identities_return_pending_after_teardown(host: Arc<RecordingHost>) {
    let registry = registry_over(&host);
    registry.register(orders_unit("v1")).expect("register");
    registry.teardown();

    let outcome = registry.register(orders_unit("v2")).expect("fresh lifecycle");
    assert_eq!(outcome, RegistrationOutcome::Pending("orders".into()));
    assert_eq!(host.handler_names().len(), 1);
}

// ---------------------------------------------------------------------------
// Directory scan
// ---------------------------------------------------------------------------

fn text_factory(settings: &serde_json::Value) -> Result<Arc<dyn Component>, String> {
    let body = settings
        .get("body")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    Ok(Arc::new(TextHandler::new(body)))
}

#[rstest]
fn register_all_contains_failures_per_unit(host: Arc<RecordingHost>) {
    let dir = TempDir::new().expect("temp dir");
    let orders = json!({
        "factory": "text",
        "role": {"kind": "handler", "type": "app.Orders", "name": "orders", "patterns": ["/orders"]},
        "settings": {"body": "v1"}
    });
    let invoices = json!({
        "factory": "text",
        "role": {"kind": "handler", "type": "app.Invoices", "patterns": ["/invoices/*"]},
        "settings": {"body": "invoices"}
    });
    fs::write(dir.path().join("orders.json"), orders.to_string()).expect("orders");
    fs::create_dir(dir.path().join("billing")).expect("billing dir");
    fs::write(dir.path().join("billing/invoices.json"), invoices.to_string()).expect("invoices");
    fs::write(dir.path().join("broken.json"), "{").expect("broken");
    fs::write(dir.path().join("helper.json"), r#"{"factory":"text"}"#).expect("helper");
    fs::write(dir.path().join("README.md"), "not a unit").expect("readme");

    let factories = FactoryTable::new().with("text", text_factory);
    let loader = ComponentLoader::new(Arc::new(DescriptorCompiler::new(Arc::new(factories))));
    let registry = registry_over(&host);
    let report = registry.register_all(&loader, dir.path());

    assert_eq!(
        report.registered,
        vec![ComponentIdentity::from("app.Invoices"), ComponentIdentity::from("orders")]
    );
    assert_eq!(report.ignored, vec![dir.path().join("helper.json")]);
    assert_eq!(report.failures.len(), 1);
    let failure = report.failures.first().expect("one failure");
    assert_eq!(failure.path, dir.path().join("broken.json"));
    assert!(matches!(failure.error, ComponentError::Compile { .. }));
}

#[rstest]
fn register_all_reports_a_missing_root(host: Arc<RecordingHost>) {
    let dir = TempDir::new().expect("temp dir");
    let loader = ComponentLoader::new(Arc::new(DescriptorCompiler::new(Arc::default())));
    let registry = registry_over(&host);
    let report = registry.register_all(&loader, &dir.path().join("absent"));
    assert!(matches!(
        report.failures.first().map(|failure| &failure.error),
        Some(ComponentError::Discovery { .. })
    ));
    assert!(registry.is_empty());
}

fn orders_descriptor(body: &str) -> String {
    json!({
        "factory": "text",
        "role": {"kind": "handler", "type": "app.Orders", "name": "orders", "patterns": ["/orders"]},
        "settings": {"body": body}
    })
    .to_string()
}

fn text_loader() -> ComponentLoader {
    let factories = FactoryTable::new().with("text", text_factory);
    ComponentLoader::new(Arc::new(DescriptorCompiler::new(Arc::new(factories))))
}

#[rstest]
fn two_files_claiming_one_identity_fail_the_second(host: Arc<RecordingHost>) {
    let dir = TempDir::new().expect("temp dir");
    let first = dir.path().join("a.json");
    let second = dir.path().join("b.json");
    fs::write(&first, orders_descriptor("from-a")).expect("a.json");
    fs::write(&second, orders_descriptor("from-b")).expect("b.json");
    let loader = text_loader();
    let registry = registry_over(&host);

    let report = registry.register_all(&loader, dir.path());

    assert_eq!(report.registered, vec![ComponentIdentity::from("orders")]);
    assert!(report.reloaded.is_empty());
    let failure = report.failures.first().expect("second file rejected");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(failure.path, second);
    assert!(matches!(
        &failure.error,
        ComponentError::DuplicateRegistration { existing, attempted, .. }
            if existing == &first.display().to_string()
                && attempted == &second.display().to_string()
    ));

    fs::write(&second, orders_descriptor("from-b v2")).expect("edit b.json");
    let edited = loader.load(&second).expect("compiles");
    let err = registry.reload(edited).expect_err("still a second component");
    assert!(matches!(err, ComponentError::DuplicateRegistration { .. }));

    let facade = host.handler("orders").expect("registered").facade;
    assert_eq!(serve(facade.as_ref(), "/orders"), "from-a");
}

#[rstest]
fn renamed_units_keep_their_identity(host: Arc<RecordingHost>) {
    let dir = TempDir::new().expect("temp dir");
    let before = dir.path().join("orders.json");
    let after = dir.path().join("orders-v2.json");
    fs::write(&before, orders_descriptor("v1")).expect("orders.json");
    let loader = text_loader();
    let registry = registry_over(&host);
    registry.register_all(&loader, dir.path());

    fs::rename(&before, &after).expect("rename unit");
    fs::write(&after, orders_descriptor("v2")).expect("edit renamed unit");
    let outcome = registry
        .reload(loader.load(&after).expect("compiles"))
        .expect("rename is a reload");

    assert_eq!(outcome, RegistrationOutcome::Reloaded("orders".into()));
    let facade = host.handler("orders").expect("registered").facade;
    assert_eq!(serve(facade.as_ref(), "/orders"), "v2");
}
