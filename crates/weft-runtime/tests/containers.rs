//! Container services through the engine: emptiness gating, eternal
//! retention, stack semantics

use std::cell::RefCell;
use std::rc::Rc;

use weft_domain::{Component, ContractBuilder};
use weft_runtime::{Context, EternalCollection, ServiceCollection, ServiceStack};

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn count(log: &Log, needle: &str) -> usize {
    log.borrow().iter().filter(|entry| *entry == needle).count()
}

trait Task {
    fn name(&self) -> &'static str;
}

struct Worker {
    name: &'static str,
}

impl Task for Worker {
    fn name(&self) -> &'static str {
        self.name
    }
}

impl Component for Worker {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder.provides_in::<ServiceCollection<dyn Task>, dyn Task>(|me| me);
    }
}

struct Supervisor {
    log: Log,
}

impl Component for Supervisor {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder
            .on_activate::<Rc<ServiceCollection<dyn Task>>, _>(|me, tasks| {
                me.log.borrow_mut().push(format!("supervisor:up:{}", tasks.len()));
                Ok(())
            })
            .on_deactivate(|me| me.log.borrow_mut().push("supervisor:down".into()));
    }
}

#[test]
fn empty_collection_does_not_satisfy_dependents() {
    let context = Context::new();
    let log = new_log();

    context.register(Rc::new(Supervisor { log: log.clone() })).unwrap();
    assert!(!context.is_resolved::<Supervisor>());

    // First member publishes the collection and resolves the dependent.
    let first = Rc::new(Worker { name: "first" });
    context.register(first.clone()).unwrap();
    assert!(context.is_resolved::<Supervisor>());
    assert_eq!(count(&log, "supervisor:up:1"), 1);

    // Growing the collection is not a presence flip: no re-activation.
    let second = Rc::new(Worker { name: "second" });
    context.register(second.clone()).unwrap();
    assert_eq!(log.borrow().len(), 1);

    let tasks = context.get_service::<ServiceCollection<dyn Task>>().unwrap();
    assert_eq!(tasks.len(), 2);

    // Shrinking to non-empty keeps dependents resolved; draining the last
    // member unresolves them.
    context.unregister(&first).unwrap();
    assert!(context.is_resolved::<Supervisor>());
    context.unregister(&second).unwrap();
    assert!(!context.is_resolved::<Supervisor>());
    assert_eq!(count(&log, "supervisor:down"), 1);
}

struct Beacon {
    name: &'static str,
}

impl Task for Beacon {
    fn name(&self) -> &'static str {
        self.name
    }
}

impl Component for Beacon {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder.provides_in::<EternalCollection<dyn Task>, dyn Task>(|me| me);
    }
}

struct BeaconWatcher {
    log: Log,
}

impl Component for BeaconWatcher {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder
            .on_activate::<Rc<EternalCollection<dyn Task>>, _>(|me, _beacons| {
                me.log.borrow_mut().push("watcher:up".into());
                Ok(())
            })
            .on_deactivate(|me| me.log.borrow_mut().push("watcher:down".into()));
    }
}

#[test]
fn eternal_collection_keeps_dependents_alive_while_empty() {
    let context = Context::new();
    let log = new_log();

    context.register(Rc::new(BeaconWatcher { log: log.clone() })).unwrap();
    // The container does not exist until its first provider arrives.
    assert!(!context.is_resolved::<BeaconWatcher>());

    let beacon = Rc::new(Beacon { name: "north" });
    context.register(beacon.clone()).unwrap();
    assert!(context.is_resolved::<BeaconWatcher>());

    // Draining an eternal container does not withdraw it.
    context.unregister(&beacon).unwrap();
    assert!(context.is_resolved::<BeaconWatcher>());
    assert_eq!(count(&log, "watcher:down"), 0);

    let beacons = context.get_service::<EternalCollection<dyn Task>>().unwrap();
    assert!(beacons.is_empty());
}

trait Screen {
    fn title(&self) -> &'static str;
}

struct Menu;

impl Screen for Menu {
    fn title(&self) -> &'static str {
        "menu"
    }
}

impl Component for Menu {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder.provides_in::<ServiceStack<dyn Screen>, dyn Screen>(|me| me);
    }
}

struct Game;

impl Screen for Game {
    fn title(&self) -> &'static str {
        "game"
    }
}

impl Component for Game {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder.provides_in::<ServiceStack<dyn Screen>, dyn Screen>(|me| me);
    }
}

struct ScreenObserver {
    log: Log,
}

impl Component for ScreenObserver {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder
            .on_activate::<Rc<ServiceStack<dyn Screen>>, _>(|me, screens| {
                let title = screens.current().map_or("none", |screen| screen.title());
                me.log.borrow_mut().push(format!("observer:up:{title}"));
                Ok(())
            })
            .on_deactivate(|me| me.log.borrow_mut().push("observer:down".into()));
    }
}

#[test]
fn stack_tracks_the_current_provider() {
    let context = Context::new();
    let log = new_log();

    context.register(Rc::new(ScreenObserver { log: log.clone() })).unwrap();
    assert!(!context.is_resolved::<ScreenObserver>());

    let menu = Rc::new(Menu);
    let game = Rc::new(Game);

    context.register(menu.clone()).unwrap();
    assert_eq!(count(&log, "observer:up:menu"), 1);

    context.register(game.clone()).unwrap();
    let screens = context.get_service::<ServiceStack<dyn Screen>>().unwrap();
    assert_eq!(screens.current().unwrap().title(), "game");

    // Popping a member below the top changes neither current nor presence.
    context.unregister(&menu).unwrap();
    assert_eq!(screens.current().unwrap().title(), "game");
    assert!(context.is_resolved::<ScreenObserver>());
    assert_eq!(count(&log, "observer:down"), 0);

    // Draining the stack withdraws it and unresolves the dependent.
    context.unregister(&game).unwrap();
    assert!(screens.current().is_none());
    assert!(!context.is_resolved::<ScreenObserver>());
    assert_eq!(count(&log, "observer:down"), 1);
}

#[test]
fn direct_member_registration_bypasses_instances() {
    let context = Context::new();
    let log = new_log();

    context.register(Rc::new(Supervisor { log: log.clone() })).unwrap();

    let task: Rc<dyn Task> = Rc::new(Worker { name: "direct" });
    context
        .register_member::<ServiceCollection<dyn Task>, dyn Task>(task.clone())
        .unwrap();
    assert!(context.is_resolved::<Supervisor>());

    context
        .unregister_member::<ServiceCollection<dyn Task>, dyn Task>(&task)
        .unwrap();
    assert!(!context.is_resolved::<Supervisor>());
}

#[test]
fn collection_observers_fire_through_the_engine() {
    let context = Context::new();
    let log = new_log();

    let first = Rc::new(Worker { name: "first" });
    context.register(first.clone()).unwrap();

    let tasks = context.get_service::<ServiceCollection<dyn Task>>().unwrap();
    let sink = log.clone();
    tasks.on_added(move |task| sink.borrow_mut().push(format!("added:{}", task.name())));
    let sink = log.clone();
    tasks.on_removed(move |task| sink.borrow_mut().push(format!("removed:{}", task.name())));

    let second = Rc::new(Worker { name: "second" });
    context.register(second.clone()).unwrap();
    context.unregister(&second).unwrap();

    assert_eq!(count(&log, "added:second"), 1);
    assert_eq!(count(&log, "removed:second"), 1);
}
