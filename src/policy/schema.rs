//! Option schemas attached to policy descriptors.
//!
//! # Responsibilities
//! - Compile a descriptor's JSON Schema once at registration
//! - Fill in declared `default` values for omitted fields
//! - Validate the resulting options, reporting every violation
//!
//! # Design Decisions
//! - Schemas are data; no policy has bespoke validation code here
//! - Defaults are applied before validation so `required` fields with a
//!   default never fail just for being omitted

use serde_json::{Map, Value};

/// A compiled options schema.
pub struct OptionsSchema {
    raw: Value,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for OptionsSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsSchema").field("raw", &self.raw).finish()
    }
}

impl OptionsSchema {
    /// Compile a schema document. Fails if it is not a valid JSON Schema.
    pub fn compile(raw: Value) -> Result<Self, String> {
        let validator = jsonschema::options()
            .build(&raw)
            .map_err(|e| e.to_string())?;
        Ok(Self { raw, validator })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Apply defaults to `options` and validate the result.
    ///
    /// `null` options are treated as an empty object.
    pub fn bind(&self, options: &Value) -> Result<Value, Vec<String>> {
        let mut bound = match options {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        apply_defaults(&self.raw, &mut bound);

        let errors: Vec<String> = self
            .validator
            .iter_errors(&bound)
            .map(|error| error.to_string())
            .collect();

        if errors.is_empty() {
            Ok(bound)
        } else {
            Err(errors)
        }
    }
}

/// Recursively insert `default` values from `schema` into `value`.
fn apply_defaults(schema: &Value, value: &mut Value) {
    match value {
        Value::Object(object) => {
            let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                return;
            };
            for (key, property_schema) in properties {
                if !object.contains_key(key) {
                    if let Some(default) = property_schema.get("default") {
                        object.insert(key.clone(), coerce_default(property_schema, default));
                    }
                }
                if let Some(child) = object.get_mut(key) {
                    apply_defaults(property_schema, child);
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items").filter(|s| s.is_object()) {
                for item in items {
                    apply_defaults(item_schema, item);
                }
            }
        }
        _ => {}
    }
}

/// A string default on a scalar-typed property is parsed into that type,
/// so `default: 'false'` on a boolean yields `false`.
fn coerce_default(schema: &Value, default: &Value) -> Value {
    let Some(text) = default.as_str() else {
        return default.clone();
    };
    let text = text.trim();
    let coerced = match schema.get("type").and_then(Value::as_str) {
        Some("boolean") => text.parse::<bool>().ok().map(Value::Bool),
        Some("integer") => text.parse::<i64>().ok().map(Value::from),
        Some("number") => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        _ => None,
    };
    coerced.unwrap_or_else(|| default.clone())
}
