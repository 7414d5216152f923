//! Configuration schema definitions.
//!
//! This module defines the gateway configuration document. All types derive
//! Serde traits; field names follow the camelCase spelling used on disk.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Plain HTTP client listener.
    pub http: HttpConfig,

    /// HTTPS client listener (only started when `tls` is present).
    pub https: HttpsConfig,

    /// Administrative listener.
    pub admin: AdminConfig,

    /// Named upstream services, referenced by policy options.
    #[serde(default)]
    pub service_endpoints: BTreeMap<String, ServiceEndpointConfig>,

    /// Named request match rules, referenced by pipelines.
    #[serde(default)]
    pub api_endpoints: BTreeMap<String, ApiEndpointConfig>,

    /// Ordered pipelines. The first pipeline with a matching endpoint wins.
    pub pipelines: Vec<PipelineConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HttpConfig {
    pub port: u16,

    #[serde(default = "default_public_hostname")]
    pub hostname: String,
}

impl HttpConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HttpsConfig {
    pub port: u16,

    #[serde(default = "default_public_hostname")]
    pub hostname: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl HttpsConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// TLS material for the HTTPS listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    pub port: u16,

    #[serde(default = "default_admin_hostname")]
    pub hostname: String,

    /// When set, admin requests must carry `Authorization: Bearer <apiKey>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl AdminConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

fn default_public_hostname() -> String {
    "0.0.0.0".to_string()
}

fn default_admin_hostname() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceEndpointConfig {
    pub url: String,
}

/// Match rule for an API endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct ApiEndpointConfig {
    /// `*` (any), `*.example.com` (subdomains) or an exact host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Path patterns; defaults to `/*`.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub paths: Vec<String>,

    /// Allowed methods; empty means any.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub name: String,

    #[serde(deserialize_with = "one_or_many")]
    pub api_endpoints: Vec<String>,

    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

/// One step of a pipeline.
///
/// On disk a step is either the short form `{<policy>: <options>}` or the
/// explicit form `{policy: <name>, options: <options>}`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    pub policy_name: String,
    pub options: Value,
}

impl PolicyConfig {
    pub fn new(policy_name: impl Into<String>, options: Value) -> Self {
        Self {
            policy_name: policy_name.into(),
            options,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExplicitEntry {
    policy: String,
    #[serde(default)]
    options: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyEntry {
    Explicit(ExplicitEntry),
    Short(BTreeMap<String, Option<Value>>),
}

impl<'de> Deserialize<'de> for PolicyConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match PolicyEntry::deserialize(deserializer)? {
            PolicyEntry::Explicit(ExplicitEntry { policy, options }) => Ok(PolicyConfig::new(
                policy,
                options.unwrap_or_else(empty_options),
            )),
            PolicyEntry::Short(map) => {
                if map.len() != 1 {
                    return Err(de::Error::custom(format!(
                        "a policy entry must name exactly one policy, found {}",
                        map.len()
                    )));
                }
                let (name, options) = map.into_iter().next().ok_or_else(|| {
                    de::Error::custom("a policy entry must name exactly one policy")
                })?;
                Ok(PolicyConfig::new(name, options.unwrap_or_else(empty_options)))
            }
        }
    }
}

impl Serialize for PolicyConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.policy_name, &self.options)?;
        map.end()
    }
}

fn empty_options() -> Value {
    Value::Object(serde_json::Map::new())
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}
