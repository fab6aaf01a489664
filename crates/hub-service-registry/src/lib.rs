//! Service registry with async handlers for the automation hub
//!
//! This crate provides the ServiceRegistry consulted by `call_service`
//! actions. A service is a named async handler receiving the action's
//! params together with the fire-cycle context.

use dashmap::DashMap;
use hub_core::{Context, ServiceCall};
use jsonschema::JSONSchema;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<serde_json::Value, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("invalid schema for service {service}: {reason}")]
    InvalidSchema { service: String, reason: String },
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// Service name
    pub service: String,
    /// JSON schema for the params (optional)
    pub schema: Option<serde_json::Value>,
}

impl ServiceDescription {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Internal representation of a registered service
struct RegisteredService {
    handler: ServiceHandler,
    validator: Option<Arc<JSONSchema>>,
}

/// The service registry maps service names to handlers
///
/// The ServiceRegistry is responsible for:
/// - Registering services with their handlers
/// - Validating params against a registered schema
/// - Calling services and routing to the appropriate handler
pub struct ServiceRegistry {
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service handler, replacing any previous one with that name
    #[instrument(skip(self, service, handler))]
    pub fn register<F, Fut>(&self, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let service = service.into();
        debug!(service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(
            service,
            RegisteredService {
                handler,
                validator: None,
            },
        );
    }

    /// Register a service with full description
    ///
    /// Fails when the description carries a schema that does not compile.
    #[instrument(skip(self, handler))]
    pub fn register_with_description<F, Fut>(
        &self,
        description: ServiceDescription,
        handler: F,
    ) -> Result<(), ServiceError>
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let validator = match &description.schema {
            Some(schema) => Some(Arc::new(JSONSchema::compile(schema).map_err(|e| {
                ServiceError::InvalidSchema {
                    service: description.service.clone(),
                    reason: e.to_string(),
                }
            })?)),
            None => None,
        };

        debug!(
            service = %description.service,
            has_schema = validator.is_some(),
            "Registering service with description"
        );

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(
            description.service.clone(),
            RegisteredService {
                handler,
                validator,
            },
        );
        Ok(())
    }

    /// Call a service
    ///
    /// # Arguments
    /// * `service` - The service name
    /// * `params` - Params to pass to the handler
    /// * `context` - Context of the fire cycle
    #[instrument(skip(self, params, context))]
    pub async fn call(
        &self,
        service: &str,
        params: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let registered = self.services.get(service).ok_or_else(|| {
            warn!(service = %service, "Service not found");
            ServiceError::NotFound(service.to_string())
        })?;

        if let Some(validator) = &registered.validator {
            if let Err(errors) = validator.validate(&params) {
                let reasons: Vec<String> = errors.map(|e| e.to_string()).collect();
                return Err(ServiceError::InvalidData(reasons.join("; ")));
            }
        }

        let call = ServiceCall::new(service, params, context);

        debug!(service = %service, "Calling service");

        let handler = registered.handler.clone();
        drop(registered); // Release the shard lock before calling the handler

        handler(call).await
    }

    /// Check if a service exists
    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Names of all registered services, sorted
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.iter().map(|s| s.key().clone()).collect();
        names.sort();
        names
    }

    /// Unregister a service
    #[instrument(skip(self))]
    pub fn unregister(&self, service: &str) -> bool {
        let removed = self.services.remove(service).is_some();

        if removed {
            debug!(service = %service, "Unregistered service");
        }

        removed
    }

    /// Get total number of registered services
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
