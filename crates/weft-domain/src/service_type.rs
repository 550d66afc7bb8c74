//! Service type identities and type-erased handles
//!
//! Everything the registry stores is keyed by [`ServiceTypeId`] and held
//! through [`ServiceHandle`], a type-erased slot that supports unsized
//! service types (`dyn Trait` objects and container types alike).

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use serde::{Serialize, Serializer};

/// Identity of a service type: a concrete type, a trait object, or a
/// container type.
///
/// Carries the static type name alongside the `TypeId` so diagnostics can
/// name the offending type without a lookup.
#[derive(Clone, Copy)]
pub struct ServiceTypeId {
    id: TypeId,
    name: &'static str,
}

impl ServiceTypeId {
    /// Identity of the service type `S`
    pub fn of<S: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: type_name::<S>(),
        }
    }

    /// The static name of the service type
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The underlying `TypeId`
    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for ServiceTypeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceTypeId {}

impl Hash for ServiceTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ServiceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// TypeId is not serializable; events carry the type name only.
impl Serialize for ServiceTypeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// A live object instance, type-erased.
///
/// The engine is single-logical-owner (one cooperative scheduling domain),
/// so instances are `Rc`, not `Arc`.
pub type InstanceHandle = Rc<dyn Any>;

/// Identity of a live instance: the `Rc` allocation address.
///
/// Stable for the lifetime of the allocation and shared by every clone of
/// the same `Rc`, including unsizing coercions of it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct InstanceKey(usize);

impl InstanceKey {
    /// Identity of an instance handle
    pub fn of(handle: &InstanceHandle) -> Self {
        Self(Rc::as_ptr(handle).cast::<()>() as usize)
    }

    /// Identity of any `Rc`, sized or not
    pub fn of_rc<T: ?Sized>(rc: &Rc<T>) -> Self {
        Self(Rc::as_ptr(rc) as *const () as usize)
    }
}

/// Type-erased provider slot.
///
/// Wraps a value of type `Rc<S>` (not the pointee itself), which is what
/// makes unsized service types representable: the registry stores the
/// smart pointer and hands back clones of it.
#[derive(Clone)]
pub struct ServiceHandle {
    key: InstanceKey,
    value: Rc<dyn Any>,
}

impl ServiceHandle {
    /// Wrap a provider for service type `S`
    pub fn new<S: ?Sized + 'static>(service: Rc<S>) -> Self {
        let key = InstanceKey::of_rc(&service);
        Self {
            key,
            value: Rc::new(service),
        }
    }

    /// Recover the typed provider, if this handle holds an `Rc<S>`
    pub fn downcast<S: ?Sized + 'static>(&self) -> Option<Rc<S>> {
        self.value.downcast_ref::<Rc<S>>().cloned()
    }

    /// Identity of the underlying provider allocation
    pub fn key(&self) -> InstanceKey {
        self.key
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Marker {}
    struct Concrete;
    impl Marker for Concrete {}

    #[test]
    fn service_type_id_equality_ignores_name() {
        assert_eq!(ServiceTypeId::of::<Concrete>(), ServiceTypeId::of::<Concrete>());
        assert_ne!(ServiceTypeId::of::<Concrete>(), ServiceTypeId::of::<dyn Marker>());
    }

    #[test]
    fn instance_key_survives_unsizing() {
        let concrete = Rc::new(Concrete);
        let erased: InstanceHandle = concrete.clone();
        assert_eq!(InstanceKey::of_rc(&concrete), InstanceKey::of(&erased));
    }

    #[test]
    fn handle_round_trips_trait_objects() {
        let concrete: Rc<dyn Marker> = Rc::new(Concrete);
        let handle = ServiceHandle::new::<dyn Marker>(concrete.clone());
        let back = handle.downcast::<dyn Marker>().unwrap();
        assert_eq!(InstanceKey::of_rc(&concrete), InstanceKey::of_rc(&back));
        assert!(handle.downcast::<Concrete>().is_none());
    }
}
