//! Container service abstraction
//!
//! A container service type is provided not by a single instance but by an
//! aggregator holding zero or more members. Containers are constructed
//! lazily on first need and published into the registry only while
//! populated (eternal containers count as populated even when empty).

use std::rc::Rc;

use downcast_rs::{impl_downcast, Downcast};

use crate::error::Result;
use crate::service_type::ServiceHandle;

/// Object-safe surface of a container service.
///
/// Members arrive as type-erased [`ServiceHandle`]s; an implementation
/// downcasts to its element type and treats a mismatch as a contract
/// violation (a programmer error, never a transient condition).
pub trait ServiceContainer: Downcast {
    /// Add a member to the container
    fn register(&self, member: &ServiceHandle) -> Result<()>;

    /// Remove a member from the container
    fn unregister(&self, member: &ServiceHandle) -> Result<()>;

    /// Whether the container currently satisfies dependents
    fn populated(&self) -> bool;

    /// Whether the container stays published even while empty
    fn eternal(&self) -> bool {
        false
    }

    /// Container type name for diagnostics
    fn container_name(&self) -> &'static str;
}

impl_downcast!(ServiceContainer);

/// A container type the registry can construct on first need.
pub trait ContainerService: ServiceContainer + Sized {
    /// Build a fresh, empty container
    fn make() -> Rc<Self>;
}
