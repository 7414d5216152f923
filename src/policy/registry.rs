//! Policy registry.
//!
//! # Responsibilities
//! - Map policy names to descriptors (schema, factory, contributions)
//! - Reject duplicate names at registration
//! - Resolve names for the validator and compiler
//!
//! # Design Decisions
//! - Populated through `&mut self` at startup, then shared as `Arc<PolicyRegistry>`;
//!   ownership alone guarantees it is read-only while traffic flows
//! - Append-only and ordered: iteration follows registration order

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use serde_json::Value;

use crate::error::{PolicyBuildError, RegistryError};
use crate::policy::context::PolicyContext;
use crate::policy::schema::OptionsSchema;
use crate::policy::PolicyHandler;

/// Builds a handler from bound options.
pub type PolicyFactory = Arc<
    dyn Fn(&Value, &PolicyContext<'_>) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError>
        + Send
        + Sync,
>;

/// Everything the gateway knows about one policy.
pub struct PolicyDescriptor {
    name: String,
    schema: OptionsSchema,
    factory: PolicyFactory,
    service_endpoint_fields: Vec<String>,
    admin_routes: Option<Router>,
}

impl PolicyDescriptor {
    /// Create a descriptor. Fails if `schema` is not a valid JSON Schema.
    pub fn new<F>(name: impl Into<String>, schema: Value, factory: F) -> Result<Self, RegistryError>
    where
        F: Fn(&Value, &PolicyContext<'_>) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let schema = OptionsSchema::compile(schema).map_err(|message| {
            RegistryError::InvalidSchema {
                name: name.clone(),
                message,
            }
        })?;
        Ok(Self {
            name,
            schema,
            factory: Arc::new(factory),
            service_endpoint_fields: Vec::new(),
            admin_routes: None,
        })
    }

    /// Declare an option whose string value names a service endpoint.
    pub fn with_service_endpoint_field(mut self, field: impl Into<String>) -> Self {
        self.service_endpoint_fields.push(field.into());
        self
    }

    /// Contribute routes to the admin listener.
    pub fn with_admin_routes(mut self, routes: Router) -> Self {
        self.admin_routes = Some(routes);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &OptionsSchema {
        &self.schema
    }

    /// Apply defaults and validate options against the schema.
    pub fn bind_options(&self, options: &Value) -> Result<Value, Vec<String>> {
        self.schema.bind(options)
    }

    /// Service endpoint names referenced by already-bound options.
    pub fn service_endpoint_refs<'v>(&self, options: &'v Value) -> Vec<(&str, &'v str)> {
        self.service_endpoint_fields
            .iter()
            .filter_map(|field| {
                options
                    .get(field)
                    .and_then(Value::as_str)
                    .map(|name| (field.as_str(), name))
            })
            .collect()
    }

    pub fn build(
        &self,
        options: &Value,
        context: &PolicyContext<'_>,
    ) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError> {
        (self.factory)(options, context)
    }

    pub fn admin_routes(&self) -> Option<&Router> {
        self.admin_routes.as_ref()
    }
}

impl std::fmt::Debug for PolicyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyDescriptor")
            .field("name", &self.name)
            .field("service_endpoint_fields", &self.service_endpoint_fields)
            .field("admin_routes", &self.admin_routes.is_some())
            .finish()
    }
}

/// Name-indexed, append-only table of policy descriptors.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    descriptors: Vec<Arc<PolicyDescriptor>>,
    index: HashMap<String, usize>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy from its parts.
    pub fn register<F>(&mut self, name: &str, schema: Value, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&Value, &PolicyContext<'_>) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError>
            + Send
            + Sync
            + 'static,
    {
        self.register_descriptor(PolicyDescriptor::new(name, schema, factory)?)
    }

    /// Register a fully built descriptor.
    pub fn register_descriptor(&mut self, descriptor: PolicyDescriptor) -> Result<(), RegistryError> {
        if self.index.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicatePolicy(descriptor.name().to_string()));
        }
        tracing::debug!(policy = %descriptor.name(), "Registered policy");
        self.index
            .insert(descriptor.name().to_string(), self.descriptors.len());
        self.descriptors.push(Arc::new(descriptor));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&Arc<PolicyDescriptor>, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.descriptors[i])
            .ok_or_else(|| RegistryError::UnknownPolicy(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<PolicyDescriptor>> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All admin routes contributed by registered policies.
    pub fn admin_routes(&self) -> Router {
        self.descriptors
            .iter()
            .filter_map(|d| d.admin_routes().cloned())
            .fold(Router::new(), |routes, contributed| routes.merge(contributed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Flow;
    use futures_util::FutureExt;
    use serde_json::json;

    struct Noop;

    impl PolicyHandler for Noop {
        fn handle<'a>(
            &'a self,
            _exchange: &'a mut crate::policy::Exchange,
        ) -> futures_util::future::BoxFuture<'a, Result<Flow, crate::error::PolicyError>> {
            async { Ok(Flow::Next) }.boxed()
        }
    }

    fn noop_factory(
        _options: &Value,
        _ctx: &PolicyContext<'_>,
    ) -> Result<Arc<dyn PolicyHandler>, PolicyBuildError> {
        Ok(Arc::new(Noop))
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = PolicyRegistry::new();
        registry
            .register("noop", json!({"type": "object"}), noop_factory)
            .unwrap();

        assert!(registry.contains("noop"));
        assert_eq!(registry.resolve("noop").unwrap().name(), "noop");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = PolicyRegistry::new();
        registry
            .register("noop", json!({"type": "object"}), noop_factory)
            .unwrap();
        let err = registry
            .register("noop", json!({"type": "object"}), noop_factory)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePolicy(name) if name == "noop"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_policy_fails() {
        let registry = PolicyRegistry::new();
        assert!(matches!(
            registry.resolve("missing"),
            Err(RegistryError::UnknownPolicy(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_invalid_schema_rejected_at_registration() {
        let mut registry = PolicyRegistry::new();
        let err = registry
            .register("bad", json!({"type": 12}), noop_factory)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchema { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_service_endpoint_refs() {
        let descriptor = PolicyDescriptor::new("p", json!({"type": "object"}), noop_factory)
            .unwrap()
            .with_service_endpoint_field("serviceEndpoint");
        let options = json!({"serviceEndpoint": "backend", "other": "x"});
        assert_eq!(
            descriptor.service_endpoint_refs(&options),
            vec![("serviceEndpoint", "backend")]
        );
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mut registry = PolicyRegistry::new();
        for name in ["c", "a", "b"] {
            registry
                .register(name, json!({"type": "object"}), noop_factory)
                .unwrap();
        }
        let names: Vec<&str> = registry.descriptors().map(|d| d.name()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
