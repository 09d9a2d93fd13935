//! Service registry with async handlers
//!
//! Integrations register host-level commands here (for example
//! `velbus.sync_clock`). Service data is validated against the JSON schema
//! given at registration before the handler runs.

use dashmap::DashMap;
use ha_core::{Context, ServiceCall};
use jsonschema::JSONSchema;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub type ServiceResult = Result<(), ServiceError>;

pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("invalid schema for {domain}.{service}: {reason}")]
    InvalidSchema {
        domain: String,
        service: String,
        reason: String,
    },
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    pub domain: String,
    pub service: String,
    /// JSON schema for service data
    pub schema: Option<serde_json::Value>,
}

struct RegisteredService {
    handler: ServiceHandler,
    description: ServiceDescription,
    validator: Option<Arc<JSONSchema>>,
}

/// Registry of `domain.service` handlers
pub struct ServiceRegistry {
    services: DashMap<String, RegisteredService>,
}

/// Schema accepting only an empty object, for services without parameters
pub fn empty_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false
    })
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service, replacing any existing one with the same name
    ///
    /// Fails only if `schema` is not a valid JSON schema.
    #[instrument(skip(self, domain, service, handler, schema))]
    pub fn register<F, Fut>(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        handler: F,
        schema: Option<serde_json::Value>,
    ) -> ServiceResult
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();

        let validator = match &schema {
            Some(schema) => Some(Arc::new(JSONSchema::compile(schema).map_err(|e| {
                ServiceError::InvalidSchema {
                    domain: domain.clone(),
                    service: service.clone(),
                    reason: e.to_string(),
                }
            })?)),
            None => None,
        };

        debug!(domain = %domain, service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(
            format!("{}.{}", domain, service),
            RegisteredService {
                handler,
                description: ServiceDescription {
                    domain,
                    service,
                    schema,
                },
                validator,
            },
        );

        Ok(())
    }

    /// Call a service
    ///
    /// Validates `service_data` against the registered schema, then awaits
    /// the handler outside the registry lock.
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let (handler, validator) = {
            let registered = self.services.get(&key).ok_or_else(|| {
                warn!(domain = %domain, service = %service, "Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;
            (registered.handler.clone(), registered.validator.clone())
        };

        if let Some(validator) = validator {
            if let Err(mut errors) = validator.validate(&service_data) {
                let reason = errors
                    .next()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "schema mismatch".to_string());
                return Err(ServiceError::InvalidData(reason));
            }
        }

        debug!(domain = %domain, service = %service, "Calling service");

        handler(ServiceCall::new(domain, service, service_data, context)).await
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    pub fn get_service(&self, domain: &str, service: &str) -> Option<ServiceDescription> {
        self.services
            .get(&format!("{}.{}", domain, service))
            .map(|s| s.description.clone())
    }

    pub fn domain_services(&self, domain: &str) -> Vec<ServiceDescription> {
        self.services
            .iter()
            .filter(|s| s.description.domain == domain)
            .map(|s| s.description.clone())
            .collect()
    }

    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self
            .services
            .remove(&format!("{}.{}", domain, service))
            .is_some();

        if removed {
            debug!(domain = %domain, service = %service, "Unregistered service");
        }

        removed
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedServiceRegistry = Arc<ServiceRegistry>;
