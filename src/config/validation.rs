//! Configuration validation.
//!
//! # Responsibilities
//! - Structural validation of the raw document against `GATEWAY_SCHEMA`
//! - Check referential integrity (pipelines reference existing endpoints,
//!   policies reference existing service endpoints)
//! - Resolve every policy step and bind its options against the
//!   descriptor's schema, defaults applied
//!
//! # Design Decisions
//! - Structural problems are reported together, not just the first
//! - Validation is a pure function: raw document → `GatewayConfig`
//! - Any failing step rejects the whole document

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::schema::GatewayConfig;
use crate::error::{ConfigError, RegistryError};
use crate::policy::PolicyRegistry;

/// Validates raw documents against the document schema and the registry.
pub struct ConfigValidator {
    registry: Arc<PolicyRegistry>,
    schema: jsonschema::Validator,
}

impl ConfigValidator {
    pub fn new(registry: Arc<PolicyRegistry>) -> Result<Self, RegistryError> {
        let schema = jsonschema::options()
            .build(&gateway_schema())
            .map_err(|e| RegistryError::InvalidSchema {
                name: "gateway".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { registry, schema })
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Validate a raw document, returning the typed config with every
    /// policy's options bound (defaults applied).
    pub fn validate(&self, raw: &Value) -> Result<GatewayConfig, ConfigError> {
        let problems: Vec<String> = self
            .schema
            .iter_errors(raw)
            .map(|e| e.to_string())
            .collect();
        if !problems.is_empty() {
            return Err(ConfigError::Structural(problems));
        }

        let mut config: GatewayConfig = serde_json::from_value(raw.clone())
            .map_err(|e| ConfigError::Structural(vec![e.to_string()]))?;

        check_references(&config)?;
        self.bind_policies(&mut config)?;
        self.check_service_endpoints(&config)?;

        Ok(config)
    }

    fn bind_policies(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        for pipeline in &mut config.pipelines {
            for (index, step) in pipeline.policies.iter_mut().enumerate() {
                let descriptor = self.registry.resolve(&step.policy_name).map_err(|_| {
                    ConfigError::UnknownPolicy {
                        pipeline: pipeline.name.clone(),
                        index,
                        policy: step.policy_name.clone(),
                    }
                })?;
                step.options = descriptor.bind_options(&step.options).map_err(|errors| {
                    ConfigError::PolicyOptionValidation {
                        pipeline: pipeline.name.clone(),
                        index,
                        policy: step.policy_name.clone(),
                        errors,
                    }
                })?;
            }
        }
        Ok(())
    }

    fn check_service_endpoints(&self, config: &GatewayConfig) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        for pipeline in &config.pipelines {
            for (index, step) in pipeline.policies.iter().enumerate() {
                let Ok(descriptor) = self.registry.resolve(&step.policy_name) else {
                    continue;
                };
                for (field, name) in descriptor.service_endpoint_refs(&step.options) {
                    if !config.service_endpoints.contains_key(name) {
                        problems.push(format!(
                            "pipeline `{}` policy `{}` (#{index}): `{field}` references undefined service endpoint `{name}`",
                            pipeline.name, step.policy_name
                        ));
                    }
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Structural(problems))
        }
    }
}

fn check_references(config: &GatewayConfig) -> Result<(), ConfigError> {
    let mut problems = Vec::new();
    let mut names = HashSet::new();

    for pipeline in &config.pipelines {
        if !names.insert(pipeline.name.as_str()) {
            problems.push(format!("duplicate pipeline name `{}`", pipeline.name));
        }
        if pipeline.api_endpoints.is_empty() {
            problems.push(format!(
                "pipeline `{}` references no api endpoints",
                pipeline.name
            ));
        }
        for endpoint in &pipeline.api_endpoints {
            if !config.api_endpoints.contains_key(endpoint) {
                problems.push(format!(
                    "pipeline `{}` references undefined api endpoint `{endpoint}`",
                    pipeline.name
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Structural(problems))
    }
}

/// JSON Schema for the document's shape. Policy options are opaque here;
/// they are checked against each descriptor's own schema.
fn gateway_schema() -> Value {
    let port = json!({ "type": "integer", "minimum": 0, "maximum": 65535 });
    let names = json!({
        "oneOf": [
            { "type": "string", "minLength": 1 },
            { "type": "array", "items": { "type": "string", "minLength": 1 } }
        ]
    });
    let method = json!({ "type": "string", "pattern": "^[A-Za-z]+$" });
    let methods = json!({
        "oneOf": [
            method,
            { "type": "array", "items": method }
        ]
    });
    json!({
        "type": "object",
        "required": ["http", "https", "admin", "pipelines"],
        "properties": {
            "http": {
                "type": "object",
                "required": ["port"],
                "properties": {
                    "port": port,
                    "hostname": { "type": "string" }
                }
            },
            "https": {
                "type": "object",
                "required": ["port"],
                "properties": {
                    "port": port,
                    "hostname": { "type": "string" },
                    "tls": {
                        "type": "object",
                        "required": ["certPath", "keyPath"],
                        "properties": {
                            "certPath": { "type": "string", "minLength": 1 },
                            "keyPath": { "type": "string", "minLength": 1 }
                        }
                    }
                }
            },
            "admin": {
                "type": "object",
                "required": ["port"],
                "properties": {
                    "port": port,
                    "hostname": { "type": "string" },
                    "apiKey": { "type": "string", "minLength": 1 }
                }
            },
            "serviceEndpoints": {
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "required": ["url"],
                    "properties": { "url": { "type": "string", "minLength": 1 } }
                }
            },
            "apiEndpoints": {
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "properties": {
                        "host": { "type": "string", "minLength": 1 },
                        "paths": {
                            "oneOf": [
                                { "type": "string", "pattern": "^(/.*|\\*)$" },
                                {
                                    "type": "array",
                                    "items": { "type": "string", "pattern": "^(/.*|\\*)$" }
                                }
                            ]
                        },
                        "methods": methods
                    }
                }
            },
            "pipelines": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "apiEndpoints"],
                    "properties": {
                        "name": { "type": "string", "minLength": 1 },
                        "apiEndpoints": names,
                        "policies": {
                            "type": "array",
                            "items": { "type": "object", "minProperties": 1 }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::builtin;

    fn validator() -> ConfigValidator {
        ConfigValidator::new(Arc::new(builtin::registry().unwrap())).unwrap()
    }

    fn document() -> Value {
        json!({
            "http": {"port": 8080},
            "https": {"port": 8443},
            "admin": {"port": 9876},
            "serviceEndpoints": {"backend": {"url": "http://127.0.0.1:3000"}},
            "apiEndpoints": {"api": {"paths": ["/api/*"]}},
            "pipelines": [{
                "name": "default",
                "apiEndpoints": ["api"],
                "policies": [
                    {"key-auth": {"keys": ["abc"]}},
                    {"proxy": {"serviceEndpoint": "backend"}}
                ]
            }]
        })
    }

    #[test]
    fn test_valid_document_binds_defaults() {
        let config = validator().validate(&document()).unwrap();
        let policies = &config.pipelines[0].policies;
        assert_eq!(policies[0].options["apiKeyHeader"], "authorization");
        assert_eq!(policies[1].options["stripPath"], false);
    }

    #[test]
    fn test_missing_pipelines_is_structural() {
        let mut doc = document();
        doc.as_object_mut().unwrap().remove("pipelines");
        let err = validator().validate(&doc).unwrap_err();
        assert!(matches!(err, ConfigError::Structural(_)));
        assert!(err.to_string().contains("pipelines"));
    }

    #[test]
    fn test_port_out_of_range_is_structural() {
        let mut doc = document();
        doc["http"]["port"] = json!(70000);
        assert!(matches!(
            validator().validate(&doc),
            Err(ConfigError::Structural(_))
        ));
    }

    #[test]
    fn test_undefined_api_endpoint_is_reported() {
        let mut doc = document();
        doc["pipelines"][0]["apiEndpoints"] = json!(["api", "missing"]);
        let err = validator().validate(&doc).unwrap_err();
        let ConfigError::Structural(problems) = err else {
            panic!("expected structural error");
        };
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("`default`"));
        assert!(problems[0].contains("`missing`"));
    }

    #[test]
    fn test_duplicate_pipeline_names() {
        let mut doc = document();
        let pipeline = doc["pipelines"][0].clone();
        doc["pipelines"].as_array_mut().unwrap().push(pipeline);
        assert!(matches!(
            validator().validate(&doc),
            Err(ConfigError::Structural(_))
        ));
    }

    #[test]
    fn test_unknown_policy() {
        let mut doc = document();
        doc["pipelines"][0]["policies"][1] = json!({"teleport": {}});
        let err = validator().validate(&doc).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownPolicy { ref pipeline, index: 1, ref policy }
                if pipeline == "default" && policy == "teleport"
        ));
    }

    #[test]
    fn test_one_bad_option_rejects_document() {
        let mut doc = document();
        doc["pipelines"][0]["policies"][0] = json!({"key-auth": {"passThrough": "maybe"}});
        let err = validator().validate(&doc).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::PolicyOptionValidation { index: 0, ref policy, .. } if policy == "key-auth"
        ));
    }

    #[test]
    fn test_undefined_service_endpoint_is_structural() {
        let mut doc = document();
        doc["pipelines"][0]["policies"][1] = json!({"proxy": {"serviceEndpoint": "nowhere"}});
        let err = validator().validate(&doc).unwrap_err();
        assert!(matches!(err, ConfigError::Structural(_)));
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_invalid_method_name_is_structural() {
        let mut doc = document();
        doc["apiEndpoints"]["api"]["methods"] = json!(["G ET"]);
        assert!(matches!(
            validator().validate(&doc),
            Err(ConfigError::Structural(_))
        ));

        doc["apiEndpoints"]["api"]["methods"] = json!("delete");
        assert!(validator().validate(&doc).is_ok());
    }

    #[test]
    fn test_empty_pipelines_are_allowed() {
        let mut doc = document();
        doc["pipelines"] = json!([]);
        assert!(validator().validate(&doc).unwrap().pipelines.is_empty());
    }

    #[test]
    fn test_validation_is_pure() {
        let validator = validator();
        let doc = document();
        let first = validator.validate(&doc).unwrap();
        let second = validator.validate(&doc).unwrap();
        assert_eq!(first, second);
        assert_eq!(doc, document());
    }
}
