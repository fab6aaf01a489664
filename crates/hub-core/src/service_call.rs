//! Service call type passed to registered service handlers

use crate::Context;
use serde::{Deserialize, Serialize};

/// A call to a registered service from a `call_service` action
///
/// Carries the action's `params` and the context of the fire cycle that
/// produced the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The service name (e.g., "subscription_manager")
    pub service: String,

    /// Params from the action definition
    pub params: serde_json::Value,

    /// Context of the fire cycle
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(service: impl Into<String>, params: serde_json::Value, context: Context) -> Self {
        Self {
            service: service.into(),
            params,
            context,
        }
    }

    /// Create a service call with empty params
    pub fn simple(service: impl Into<String>, context: Context) -> Self {
        Self::new(
            service,
            serde_json::Value::Object(Default::default()),
            context,
        )
    }

    /// Get a value from params
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
