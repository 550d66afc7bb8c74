//! Nested scopes: parent/child contexts and shared contract caches

use std::cell::RefCell;
use std::rc::Rc;

use weft_domain::{Component, ContextOptions, ContractBuilder, ServiceTypeId};
use weft_runtime::{Context, ContractCache};

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn count(log: &Log, needle: &str) -> usize {
    log.borrow().iter().filter(|entry| *entry == needle).count()
}

struct Gate;

struct GateWatcher {
    log: Log,
}

impl Component for GateWatcher {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder
            .on_activate::<Rc<Gate>, _>(|me, _gate| {
                me.log.borrow_mut().push("watcher:up".into());
                Ok(())
            })
            .on_deactivate(|me| me.log.borrow_mut().push("watcher:down".into()));
    }
}

#[test]
fn parent_services_resolve_child_dependents() {
    let parent = Context::new();
    let child = Context::with_parent(&parent);
    let log = new_log();

    child.register(Rc::new(GateWatcher { log: log.clone() })).unwrap();
    assert!(!child.is_resolved::<GateWatcher>());

    let gate = Rc::new(Gate);
    parent.register_service::<Gate>(gate.clone()).unwrap();

    // The parent's registration propagated into the child scope.
    assert!(child.contains_service(ServiceTypeId::of::<Gate>()));
    assert!(child.is_resolved::<GateWatcher>());
    assert_eq!(count(&log, "watcher:up"), 1);

    parent.unregister_service::<Gate>(&gate).unwrap();
    assert!(!child.is_resolved::<GateWatcher>());
    assert_eq!(count(&log, "watcher:down"), 1);
}

#[test]
fn child_services_stay_local() {
    let parent = Context::new();
    let child = Context::with_parent(&parent);

    let gate = Rc::new(Gate);
    child.register_service::<Gate>(gate).unwrap();

    assert!(child.contains_service(ServiceTypeId::of::<Gate>()));
    assert!(!parent.contains_service(ServiceTypeId::of::<Gate>()));
}

#[test]
fn parent_and_child_share_the_contract_cache() {
    let parent = Context::new();
    let child = Context::with_parent(&parent);
    assert!(Rc::ptr_eq(parent.contract_cache(), child.contract_cache()));
}

#[test]
fn sibling_engines_share_contracts_but_not_resolution() {
    let cache = Rc::new(ContractCache::new());
    let first = Context::with_cache(ContextOptions::default(), Rc::clone(&cache));
    let second = Context::with_cache(ContextOptions::default(), Rc::clone(&cache));
    let log = new_log();

    first.register(Rc::new(GateWatcher { log: log.clone() })).unwrap();
    second.register(Rc::new(GateWatcher { log: log.clone() })).unwrap();
    assert_eq!(cache.contract_count(), 1);

    // Resolution is per-engine: the gate exists only in the first.
    first.register_service::<Gate>(Rc::new(Gate)).unwrap();
    assert!(first.is_resolved::<GateWatcher>());
    assert!(!second.is_resolved::<GateWatcher>());
    assert_eq!(count(&log, "watcher:up"), 1);
}

#[test]
fn dropping_the_child_detaches_it_from_the_parent() {
    let parent = Context::new();
    let log = new_log();
    {
        let child = Context::with_parent(&parent);
        child.register(Rc::new(GateWatcher { log: log.clone() })).unwrap();
        child.dispose();
    }
    // The child is gone; parent-side mutations must not reach it.
    parent.register_service::<Gate>(Rc::new(Gate)).unwrap();
    assert_eq!(count(&log, "watcher:up"), 0);
}
