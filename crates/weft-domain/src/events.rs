//! Registry transition events and engine options
//!
//! A [`ServiceEvent`] fires exactly once per transition of a service type
//! between "absent" and "present" in a registry. Propagation in the
//! resolution engine is driven entirely by these transitions.

use serde::{Deserialize, Serialize};

use crate::service_type::ServiceTypeId;

/// Direction of a registry presence transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceEventKind {
    /// The service type became present
    Registered,
    /// The service type became absent
    Unregistered,
}

/// A service type flipped between absent and present
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServiceEvent {
    /// The service type whose presence changed
    pub service: ServiceTypeId,
    /// Direction of the change
    pub kind: ServiceEventKind,
}

/// Listener handle returned by event subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Build a subscription id from a raw counter value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Per-engine behavior switches.
///
/// Defined as a serde type so embedders can source it from whatever
/// configuration layer they already use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Diagnostic name of the engine, used in log output
    pub name: String,
    /// Treat duplicate instance registration and unknown instance
    /// unregistration as errors instead of warnings
    pub strict_instances: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            name: "weft".to_string(),
            strict_instances: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_defaults() {
        let options: ContextOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.name, "weft");
        assert!(!options.strict_instances);

        let options: ContextOptions =
            serde_json::from_str(r#"{"name":"sim","strict_instances":true}"#).unwrap();
        assert_eq!(options.name, "sim");
        assert!(options.strict_instances);
    }

    #[test]
    fn events_serialize_type_names() {
        let event = ServiceEvent {
            service: ServiceTypeId::of::<String>(),
            kind: ServiceEventKind::Registered,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("String"));
        assert!(json.contains("Registered"));
    }
}
