//! Container service implementations
//!
//! Two aggregator shapes: an unordered [`ServiceCollection`] (plus its
//! always-populated [`EternalCollection`] variant) and an ordered
//! [`ServiceStack`] where only the top member is "current".

/// Unordered multi-provider containers
pub mod collection;
/// Ordered multi-provider container with a current top
pub mod stack;

pub use collection::{EternalCollection, ServiceCollection};
pub use stack::ServiceStack;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft_domain::SubscriptionId;

/// Observer bookkeeping shared by the container implementations.
///
/// Invocation works on a snapshot so an observer may re-enter the container
/// or change subscriptions while an event is being delivered.
pub(crate) struct ObserverSet<F: ?Sized> {
    observers: RefCell<Vec<(SubscriptionId, Rc<F>)>>,
    next: Cell<u64>,
}

impl<F: ?Sized> ObserverSet<F> {
    pub(crate) fn new() -> Self {
        Self {
            observers: RefCell::new(Vec::new()),
            next: Cell::new(0),
        }
    }

    pub(crate) fn subscribe(&self, observer: Rc<F>) -> SubscriptionId {
        let raw = self.next.get();
        self.next.set(raw + 1);
        let id = SubscriptionId::from_raw(raw);
        self.observers.borrow_mut().push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<F>> {
        self.observers
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect()
    }
}
