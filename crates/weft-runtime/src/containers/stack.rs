//! Ordered multi-provider container
//!
//! A `ServiceStack<T>` holds any number of providers but exposes a single
//! "current" one: the most recently pushed member still present. Observers
//! always see a consistent current snapshot: `on_unregistered` fires with
//! the current value before a mutation, `on_registered` with the current
//! value after it.

use std::cell::RefCell;
use std::rc::Rc;

use weft_domain::{
    ContainerService, Error, InstanceKey, Result, ServiceContainer, ServiceHandle, ServiceTypeId,
    SubscriptionId,
};

use super::ObserverSet;

/// Ordered providers for service type `T`; the top of the stack is current
pub struct ServiceStack<T: ?Sized + 'static> {
    stack: RefCell<Vec<(InstanceKey, Rc<T>)>>,
    registered: ObserverSet<dyn Fn(Option<&Rc<T>>)>,
    unregistered: ObserverSet<dyn Fn(Option<&Rc<T>>)>,
}

impl<T: ?Sized + 'static> ServiceStack<T> {
    /// Create an empty stack
    pub fn new() -> Self {
        Self {
            stack: RefCell::new(Vec::new()),
            registered: ObserverSet::new(),
            unregistered: ObserverSet::new(),
        }
    }

    /// The current provider: the most recently pushed member still present
    pub fn current(&self) -> Option<Rc<T>> {
        self.stack.borrow().last().map(|(_, member)| Rc::clone(member))
    }

    /// Number of members on the stack
    pub fn len(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Whether the stack has no members
    pub fn is_empty(&self) -> bool {
        self.stack.borrow().is_empty()
    }

    /// Observe a new current value being established
    pub fn on_registered(&self, observer: impl Fn(Option<&Rc<T>>) + 'static) -> SubscriptionId {
        self.registered.subscribe(Rc::new(observer))
    }

    /// Observe the current value being withdrawn
    pub fn on_unregistered(&self, observer: impl Fn(Option<&Rc<T>>) + 'static) -> SubscriptionId {
        self.unregistered.subscribe(Rc::new(observer))
    }

    /// Drop an `on_registered` observer
    pub fn unsubscribe_registered(&self, id: SubscriptionId) -> bool {
        self.registered.unsubscribe(id)
    }

    /// Drop an `on_unregistered` observer
    pub fn unsubscribe_unregistered(&self, id: SubscriptionId) -> bool {
        self.unregistered.unsubscribe(id)
    }

    fn downcast_member(&self, member: &ServiceHandle) -> Result<Rc<T>> {
        member.downcast::<T>().ok_or_else(|| {
            Error::contract(format!(
                "member is not assignable to {}",
                ServiceTypeId::of::<T>()
            ))
        })
    }

    fn notify(&self, observers: &ObserverSet<dyn Fn(Option<&Rc<T>>)>) {
        let current = self.current();
        for observer in observers.snapshot() {
            observer(current.as_ref());
        }
    }
}

impl<T: ?Sized + 'static> Default for ServiceStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> ServiceContainer for ServiceStack<T> {
    fn register(&self, member: &ServiceHandle) -> Result<()> {
        let value = self.downcast_member(member)?;
        // Pushing the same instance twice is a mistake in almost all cases;
        // a variant that allows it is easy to build if ever needed.
        if self.stack.borrow().iter().any(|(key, _)| *key == member.key()) {
            return Err(Error::already_registered(ServiceTypeId::of::<T>()));
        }

        self.notify(&self.unregistered);
        self.stack.borrow_mut().push((member.key(), value));
        self.notify(&self.registered);
        Ok(())
    }

    fn unregister(&self, member: &ServiceHandle) -> Result<()> {
        let position = {
            let stack = self.stack.borrow();
            stack.iter().position(|(key, _)| *key == member.key())
        };
        let Some(position) = position else {
            return Err(Error::not_registered(ServiceTypeId::of::<T>()));
        };
        let was_current = position + 1 == self.stack.borrow().len();

        self.notify(&self.unregistered);
        self.stack.borrow_mut().remove(position);

        // A new current only exists if the top changed and members remain;
        // an emptied stack is about to be withdrawn from the registry.
        if was_current && !self.is_empty() {
            self.notify(&self.registered);
        }
        Ok(())
    }

    fn populated(&self) -> bool {
        !self.is_empty()
    }

    fn container_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T: ?Sized + 'static> ContainerService for ServiceStack<T> {
    fn make() -> Rc<Self> {
        Rc::new(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Screen(&'static str);

    fn member(screen: Rc<Screen>) -> ServiceHandle {
        ServiceHandle::new::<Screen>(screen)
    }

    #[test]
    fn push_pop_tracks_current() {
        let stack = ServiceStack::<Screen>::new();
        let x = Rc::new(Screen("x"));
        let y = Rc::new(Screen("y"));

        stack.register(&member(x.clone())).unwrap();
        assert_eq!(stack.current().unwrap().0, "x");

        stack.register(&member(y.clone())).unwrap();
        assert_eq!(stack.current().unwrap().0, "y");

        stack.unregister(&member(y)).unwrap();
        assert_eq!(stack.current().unwrap().0, "x");

        stack.unregister(&member(x)).unwrap();
        assert!(stack.current().is_none());
    }

    #[test]
    fn removal_below_the_top_keeps_current() {
        let stack = ServiceStack::<Screen>::new();
        let x = Rc::new(Screen("x"));
        let y = Rc::new(Screen("y"));

        stack.register(&member(x.clone())).unwrap();
        stack.register(&member(y)).unwrap();
        stack.unregister(&member(x)).unwrap();
        assert_eq!(stack.current().unwrap().0, "y");
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn duplicate_push_is_fatal() {
        let stack = ServiceStack::<Screen>::new();
        let x = Rc::new(Screen("x"));
        stack.register(&member(x.clone())).unwrap();
        assert!(matches!(
            stack.register(&member(x)).unwrap_err(),
            Error::AlreadyRegistered { .. }
        ));
    }

    #[test]
    fn observers_see_consistent_current_snapshots() {
        let stack = ServiceStack::<Screen>::new();
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        let sink = log.clone();
        stack.on_registered(move |current| {
            sink.borrow_mut()
                .push(format!("+{}", current.map_or("none", |screen| screen.0)));
        });
        let sink = log.clone();
        stack.on_unregistered(move |current| {
            sink.borrow_mut()
                .push(format!("-{}", current.map_or("none", |screen| screen.0)));
        });

        let x = Rc::new(Screen("x"));
        let y = Rc::new(Screen("y"));

        stack.register(&member(x.clone())).unwrap();
        stack.register(&member(y.clone())).unwrap();
        stack.unregister(&member(y)).unwrap();
        stack.unregister(&member(x)).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "-none".to_string(), // push x: no current yet
                "+x".to_string(),
                "-x".to_string(), // push y: x is being superseded
                "+y".to_string(),
                "-y".to_string(), // pop y: x becomes current again
                "+x".to_string(),
                "-x".to_string(), // pop x: stack empties, no new current
            ]
        );
    }

    #[test]
    fn popping_below_top_fires_no_registered_event() {
        let stack = ServiceStack::<Screen>::new();
        let registrations: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));

        let sink = registrations.clone();
        stack.on_registered(move |_| *sink.borrow_mut() += 1);

        let x = Rc::new(Screen("x"));
        let y = Rc::new(Screen("y"));
        stack.register(&member(x.clone())).unwrap();
        stack.register(&member(y)).unwrap();
        assert_eq!(*registrations.borrow(), 2);

        stack.unregister(&member(x)).unwrap();
        assert_eq!(*registrations.borrow(), 2);
    }
}
