//! Typed dependency resolution for activate callbacks
//!
//! An activate callback names its dependencies as a tuple of `Rc<S>`
//! handles; the tuple's element set IS the type's required-services set.
//! Dependencies are fetched from a [`ServiceLookup`] bound to the current
//! registry at the moment activation starts.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::service_type::{ServiceHandle, ServiceTypeId};

/// Read-only view of a service registry, as seen by activate callbacks.
pub trait ServiceLookup {
    /// Fetch the provider handle for a service type
    fn lookup(&self, service: ServiceTypeId) -> Result<ServiceHandle>;

    /// Whether a service type is currently present
    fn contains(&self, service: ServiceTypeId) -> bool;
}

impl<'a> dyn ServiceLookup + 'a {
    /// Fetch a typed provider for service type `S`
    pub fn get<S: ?Sized + 'static>(&self) -> Result<Rc<S>> {
        let id = ServiceTypeId::of::<S>();
        let handle = self.lookup(id)?;
        handle
            .downcast::<S>()
            .ok_or_else(|| Error::contract(format!("provider for {id} has the wrong type")))
    }
}

/// One dependency: a service handle fetchable from a lookup.
pub trait ServiceDep: Sized {
    /// The service type this dependency names
    fn id() -> ServiceTypeId;

    /// Fetch the dependency from the lookup
    fn resolve(lookup: &dyn ServiceLookup) -> Result<Self>;
}

impl<S: ?Sized + 'static> ServiceDep for Rc<S> {
    fn id() -> ServiceTypeId {
        ServiceTypeId::of::<S>()
    }

    fn resolve(lookup: &dyn ServiceLookup) -> Result<Self> {
        lookup.get::<S>()
    }
}

/// The full dependency list of an activate callback.
///
/// Implemented for `Rc<S>` directly (single dependency) and for tuples of
/// dependencies up to arity 8. `()` means "no requirements": the type is
/// resolved unconditionally.
pub trait ServiceDeps: Sized {
    /// The service types this list names, in declaration order
    fn ids() -> Vec<ServiceTypeId>;

    /// Fetch every dependency from the lookup
    fn resolve(lookup: &dyn ServiceLookup) -> Result<Self>;
}

impl ServiceDeps for () {
    fn ids() -> Vec<ServiceTypeId> {
        Vec::new()
    }

    fn resolve(_lookup: &dyn ServiceLookup) -> Result<Self> {
        Ok(())
    }
}

impl<S: ?Sized + 'static> ServiceDeps for Rc<S> {
    fn ids() -> Vec<ServiceTypeId> {
        vec![<Rc<S> as ServiceDep>::id()]
    }

    fn resolve(lookup: &dyn ServiceLookup) -> Result<Self> {
        <Rc<S> as ServiceDep>::resolve(lookup)
    }
}

macro_rules! impl_service_deps {
    ($($name:ident),+) => {
        impl<$($name: ServiceDep),+> ServiceDeps for ($($name,)+) {
            fn ids() -> Vec<ServiceTypeId> {
                vec![$($name::id()),+]
            }

            fn resolve(lookup: &dyn ServiceLookup) -> Result<Self> {
                Ok(($($name::resolve(lookup)?,)+))
            }
        }
    };
}

impl_service_deps!(A);
impl_service_deps!(A, B);
impl_service_deps!(A, B, C);
impl_service_deps!(A, B, C, D);
impl_service_deps!(A, B, C, D, E);
impl_service_deps!(A, B, C, D, E, F);
impl_service_deps!(A, B, C, D, E, F, G);
impl_service_deps!(A, B, C, D, E, F, G, H);
