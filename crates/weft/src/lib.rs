//! # weft
//!
//! Contract-driven service wiring for component-based applications.
//!
//! Object instances declare the service types they *require* and *provide*
//! through a [`Component`] contract. A [`Context`] tracks live instances and
//! live services, and wires dependents to dependencies as they become
//! available: when every required service of a type is present, the type is
//! Resolved and its instances receive their `activate` callback; when a
//! required service disappears, the flip propagates transitively and the
//! instances are deactivated again.
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use weft::{Component, Context, ContractBuilder};
//!
//! struct Clock;
//!
//! impl Component for Clock {
//!     fn contract(builder: &mut ContractBuilder<Self>) {
//!         builder.provides::<Clock>(|me| me);
//!     }
//! }
//!
//! struct Display;
//!
//! impl Component for Display {
//!     fn contract(builder: &mut ContractBuilder<Self>) {
//!         builder.on_activate::<Rc<Clock>, _>(|_me, _clock| Ok(()));
//!     }
//! }
//!
//! let context = Context::new();
//! let display = Rc::new(Display);
//! context.register(display.clone()).unwrap();
//! assert!(!context.is_resolved::<Display>());
//!
//! let clock = Rc::new(Clock);
//! context.register(clock).unwrap();
//! assert!(context.is_resolved::<Display>());
//! ```
//!
//! ## Architecture
//!
//! - `domain` — contracts, containers, typed dependencies, errors
//! - `runtime` — the service registry, container implementations and the
//!   resolution engine

/// Domain layer - contracts, containers and error types
///
/// Re-exports from the domain crate for convenience
pub mod domain {
    pub use weft_domain::*;
}

/// Runtime layer - registry, containers and the resolution engine
///
/// Re-exports from the runtime crate for convenience
pub mod runtime {
    pub use weft_runtime::*;
}

// Re-export the commonly used surface at the crate root
pub use domain::{
    ActivationOutcome, Component, ContainerService, ContextOptions, Contract, ContractBuilder,
    Error, InstanceHandle, InstanceKey, Result, ServiceContainer, ServiceDep, ServiceDeps,
    ServiceEvent, ServiceEventKind, ServiceHandle, ServiceLookup, ServiceTypeId, SubscriptionId,
};
pub use runtime::{
    init_logging, init_test_logging, Context, ContextHandle, ContractCache, EternalCollection,
    RegistrationGuard, ServiceCollection, ServiceMap, ServiceStack,
};
