//! # weft-domain
//!
//! Pure types for the weft service wiring runtime: service type identities,
//! type contracts and their builder, the container service abstraction,
//! typed dependency tuples, registry events and the error type.
//!
//! Nothing in this crate holds live registry state; the machinery lives in
//! `weft-runtime`.

/// Container service abstraction (collections, stacks)
pub mod container;
/// Type contracts and the contract builder
pub mod contract;
/// Typed dependency resolution for activate callbacks
pub mod deps;
/// Error handling types
pub mod error;
/// Registry transition events and engine options
pub mod events;
/// Service type identities and type-erased handles
pub mod service_type;

pub use container::{ContainerService, ServiceContainer};
pub use contract::{
    ActivateFn, ActivationOutcome, Component, Contract, ContractBuilder, DeactivateFn,
    MakeContainerFn, ProjectFn, ProvidedService, ProviderKind,
};
pub use deps::{ServiceDep, ServiceDeps, ServiceLookup};
pub use error::{Error, Result};
pub use events::{ContextOptions, ServiceEvent, ServiceEventKind, SubscriptionId};
pub use service_type::{InstanceHandle, InstanceKey, ServiceHandle, ServiceTypeId};
