//! # weft-runtime
//!
//! The live machinery of the weft wiring runtime: the service registry
//! with plain and container providers, the collection and stack container
//! implementations, the instance registry, the process-wide contract cache
//! with its reverse dependency index, and the resolution engine that drives
//! activate/deactivate transitions and propagates them through the graph.

/// Container service implementations
pub mod containers;
/// The resolution engine
pub mod context;
/// Contract memoization and the reverse dependency index
pub mod contract_cache;
/// Live instance registry
pub mod instance_map;
/// Structured logging bootstrap
pub mod logging;
/// The service registry
pub mod service_map;

pub use containers::{EternalCollection, ServiceCollection, ServiceStack};
pub use context::{Context, ContextHandle, RegistrationGuard};
pub use contract_cache::ContractCache;
pub use instance_map::{InstanceEntry, InstanceMap};
pub use logging::{init_logging, init_test_logging};
pub use service_map::ServiceMap;
