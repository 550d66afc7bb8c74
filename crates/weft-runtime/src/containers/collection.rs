//! Unordered multi-provider container
//!
//! A `ServiceCollection<T>` aggregates any number of simultaneous providers
//! of `T`. As a registry entry it is present exactly while non-empty; the
//! [`EternalCollection`] variant stays present from its first member on,
//! keeping dependents resolved even while momentarily empty.

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use tracing::warn;
use weft_domain::{
    ContainerService, Error, InstanceKey, Result, ServiceContainer, ServiceHandle, ServiceTypeId,
    SubscriptionId,
};

use super::ObserverSet;

/// Unordered set of providers for service type `T`
pub struct ServiceCollection<T: ?Sized + 'static> {
    members: RefCell<Vec<(InstanceKey, Rc<T>)>>,
    added: ObserverSet<dyn Fn(&Rc<T>)>,
    removed: ObserverSet<dyn Fn(&Rc<T>)>,
}

impl<T: ?Sized + 'static> ServiceCollection<T> {
    /// Create an empty collection
    pub fn new() -> Self {
        Self {
            members: RefCell::new(Vec::new()),
            added: ObserverSet::new(),
            removed: ObserverSet::new(),
        }
    }

    /// Number of current members
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    /// Whether the collection has no members
    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Snapshot of the current members
    pub fn members(&self) -> Vec<Rc<T>> {
        self.members
            .borrow()
            .iter()
            .map(|(_, member)| Rc::clone(member))
            .collect()
    }

    /// Observe members being added
    pub fn on_added(&self, observer: impl Fn(&Rc<T>) + 'static) -> SubscriptionId {
        self.added.subscribe(Rc::new(observer))
    }

    /// Observe members being removed
    pub fn on_removed(&self, observer: impl Fn(&Rc<T>) + 'static) -> SubscriptionId {
        self.removed.subscribe(Rc::new(observer))
    }

    /// Drop an `on_added` observer
    pub fn unsubscribe_added(&self, id: SubscriptionId) -> bool {
        self.added.unsubscribe(id)
    }

    /// Drop an `on_removed` observer
    pub fn unsubscribe_removed(&self, id: SubscriptionId) -> bool {
        self.removed.unsubscribe(id)
    }

    fn downcast_member(&self, member: &ServiceHandle) -> Result<Rc<T>> {
        member.downcast::<T>().ok_or_else(|| {
            Error::contract(format!(
                "member is not assignable to {}",
                ServiceTypeId::of::<T>()
            ))
        })
    }
}

impl<T: ?Sized + 'static> Default for ServiceCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> ServiceContainer for ServiceCollection<T> {
    fn register(&self, member: &ServiceHandle) -> Result<()> {
        let value = self.downcast_member(member)?;
        {
            let mut members = self.members.borrow_mut();
            if members.iter().any(|(key, _)| *key == member.key()) {
                warn!(container = %ServiceTypeId::of::<Self>(), "member is already present");
                return Ok(());
            }
            members.push((member.key(), Rc::clone(&value)));
        }
        for observer in self.added.snapshot() {
            observer(&value);
        }
        Ok(())
    }

    fn unregister(&self, member: &ServiceHandle) -> Result<()> {
        let value = self.downcast_member(member)?;
        {
            let mut members = self.members.borrow_mut();
            let position = members.iter().position(|(key, _)| *key == member.key());
            match position {
                Some(position) => {
                    members.remove(position);
                }
                None => return Err(Error::not_registered(ServiceTypeId::of::<T>())),
            }
        }
        for observer in self.removed.snapshot() {
            observer(&value);
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

impl<T: ?Sized + 'static> ContainerService for ServiceCollection<T> {
    fn make() -> Rc<Self> {
        Rc::new(Self::new())
    }
}

/// A collection that stays published once created, even while empty.
///
/// Use for broadcast-style services that should keep dependents alive with
/// zero current providers.
pub struct EternalCollection<T: ?Sized + 'static> {
    inner: ServiceCollection<T>,
}

impl<T: ?Sized + 'static> EternalCollection<T> {
    /// Create an empty eternal collection
    pub fn new() -> Self {
        Self {
            inner: ServiceCollection::new(),
        }
    }
}

impl<T: ?Sized + 'static> Default for EternalCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> Deref for EternalCollection<T> {
    type Target = ServiceCollection<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: ?Sized + 'static> ServiceContainer for EternalCollection<T> {
    fn register(&self, member: &ServiceHandle) -> Result<()> {
        self.inner.register(member)
    }

    fn unregister(&self, member: &ServiceHandle) -> Result<()> {
        self.inner.unregister(member)
    }

    fn populated(&self) -> bool {
        true
    }

    fn eternal(&self) -> bool {
        true
    }

    fn container_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T: ?Sized + 'static> ContainerService for EternalCollection<T> {
    fn make() -> Rc<Self> {
        Rc::new(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    trait Speaker {
        fn word(&self) -> &'static str;
    }

    struct Dog;
    impl Speaker for Dog {
        fn word(&self) -> &'static str {
            "woof"
        }
    }

    struct Cat;
    impl Speaker for Cat {
        fn word(&self) -> &'static str {
            "meow"
        }
    }

    fn member(speaker: Rc<dyn Speaker>) -> ServiceHandle {
        ServiceHandle::new::<dyn Speaker>(speaker)
    }

    #[test]
    fn add_remove_members() {
        let collection = ServiceCollection::<dyn Speaker>::new();
        let dog = member(Rc::new(Dog));
        let cat = member(Rc::new(Cat));

        collection.register(&dog).unwrap();
        collection.register(&cat).unwrap();
        assert_eq!(collection.len(), 2);
        assert!(collection.populated());

        collection.unregister(&dog).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.members()[0].word(), "meow");

        collection.unregister(&cat).unwrap();
        assert!(!collection.populated());
    }

    #[test]
    fn observers_see_additions_and_removals() {
        let collection = ServiceCollection::<dyn Speaker>::new();
        let words: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        let sink = words.clone();
        collection.on_added(move |speaker| sink.borrow_mut().push(format!("+{}", speaker.word())));
        let sink = words.clone();
        collection.on_removed(move |speaker| sink.borrow_mut().push(format!("-{}", speaker.word())));

        let dog = member(Rc::new(Dog));
        collection.register(&dog).unwrap();
        collection.unregister(&dog).unwrap();

        assert_eq!(*words.borrow(), vec!["+woof".to_string(), "-woof".to_string()]);
    }

    #[test]
    fn unregistering_unknown_member_is_fatal() {
        let collection = ServiceCollection::<dyn Speaker>::new();
        let dog = member(Rc::new(Dog));
        assert!(collection.unregister(&dog).is_err());
    }

    #[test]
    fn wrong_member_type_is_a_contract_violation() {
        let collection = ServiceCollection::<dyn Speaker>::new();
        let wrong = ServiceHandle::new::<Dog>(Rc::new(Dog));
        assert!(matches!(
            collection.register(&wrong).unwrap_err(),
            Error::Contract { .. }
        ));
    }

    #[test]
    fn eternal_collection_is_always_populated() {
        let collection = EternalCollection::<dyn Speaker>::new();
        assert!(collection.populated());
        assert!(collection.eternal());
        assert!(collection.is_empty());

        let dog = member(Rc::new(Dog));
        collection.register(&dog).unwrap();
        collection.unregister(&dog).unwrap();
        assert!(collection.populated());
    }
}
