//! Pipeline compilation.
//!
//! # Responsibilities
//! - Turn a validated `GatewayConfig` into an immutable `ConfigSnapshot`
//! - Bind every policy step through its descriptor's factory
//! - Compile API endpoint references into match rules
//!
//! # Design Decisions
//! - Works on a private candidate; never reads or mutates the live snapshot
//! - Deterministic: same config and registry give equivalent pipelines
//! - The first failing factory aborts the whole compilation

use std::sync::Arc;

use axum::http::request::Parts;

use crate::config::schema::GatewayConfig;
use crate::error::ConfigError;
use crate::policy::{Infrastructure, PolicyContext, PolicyHandler, PolicyRegistry};
use crate::routing::EndpointRule;

/// A policy step bound to its options.
#[derive(Clone)]
pub struct BoundPolicy {
    pub name: String,
    pub handler: Arc<dyn PolicyHandler>,
}

impl std::fmt::Debug for BoundPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundPolicy").field("name", &self.name).finish()
    }
}

/// A pipeline ready to execute requests.
#[derive(Debug)]
pub struct CompiledPipeline {
    name: String,
    endpoints: Vec<EndpointRule>,
    policies: Vec<BoundPolicy>,
}

impl CompiledPipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[EndpointRule] {
        &self.endpoints
    }

    /// Bound handlers in execution order.
    pub fn policies(&self) -> &[BoundPolicy] {
        &self.policies
    }
}

/// Result of matching a request against a snapshot.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub pipeline: &'a CompiledPipeline,
    pub endpoint: &'a EndpointRule,
    pub matched_prefix: String,
}

/// Immutable, fully compiled configuration.
#[derive(Debug)]
pub struct ConfigSnapshot {
    version: u64,
    pipelines: Vec<CompiledPipeline>,
    raw: GatewayConfig,
}

impl ConfigSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pipelines(&self) -> &[CompiledPipeline] {
        &self.pipelines
    }

    /// The validated document this snapshot was compiled from.
    pub fn raw(&self) -> &GatewayConfig {
        &self.raw
    }

    /// First pipeline (in declaration order) with a matching endpoint.
    pub fn match_request(&self, parts: &Parts) -> Option<RouteMatch<'_>> {
        self.pipelines.iter().find_map(|pipeline| {
            pipeline.endpoints.iter().find_map(|endpoint| {
                endpoint.matches(parts).map(|matched_prefix| RouteMatch {
                    pipeline,
                    endpoint,
                    matched_prefix,
                })
            })
        })
    }
}

/// Builds snapshots from validated configuration.
#[derive(Clone)]
pub struct PipelineCompiler {
    registry: Arc<PolicyRegistry>,
    infrastructure: Infrastructure,
}

impl PipelineCompiler {
    pub fn new(registry: Arc<PolicyRegistry>, infrastructure: Infrastructure) -> Self {
        Self {
            registry,
            infrastructure,
        }
    }

    /// Compile `config` into a snapshot carrying `version`.
    pub fn compile(&self, config: GatewayConfig, version: u64) -> Result<ConfigSnapshot, ConfigError> {
        let mut pipelines = Vec::with_capacity(config.pipelines.len());

        for pipeline in &config.pipelines {
            let mut endpoints = Vec::with_capacity(pipeline.api_endpoints.len());
            for name in &pipeline.api_endpoints {
                let endpoint = config.api_endpoints.get(name).ok_or_else(|| {
                    ConfigError::Structural(vec![format!(
                        "pipeline `{}` references undefined api endpoint `{name}`",
                        pipeline.name
                    )])
                })?;
                endpoints.push(EndpointRule::new(name.clone(), endpoint));
            }

            let mut policies = Vec::with_capacity(pipeline.policies.len());
            for (index, step) in pipeline.policies.iter().enumerate() {
                let descriptor = self.registry.resolve(&step.policy_name).map_err(|_| {
                    ConfigError::UnknownPolicy {
                        pipeline: pipeline.name.clone(),
                        index,
                        policy: step.policy_name.clone(),
                    }
                })?;
                let context = PolicyContext::new(
                    &pipeline.name,
                    &step.policy_name,
                    index,
                    &config.service_endpoints,
                    &self.infrastructure,
                );
                let handler = descriptor.build(&step.options, &context).map_err(|e| {
                    ConfigError::PipelineCompile {
                        pipeline: pipeline.name.clone(),
                        index,
                        policy: step.policy_name.clone(),
                        message: e.to_string(),
                    }
                })?;
                policies.push(BoundPolicy {
                    name: step.policy_name.clone(),
                    handler,
                });
            }

            tracing::debug!(
                pipeline = %pipeline.name,
                endpoints = endpoints.len(),
                policies = policies.len(),
                "Compiled pipeline"
            );
            pipelines.push(CompiledPipeline {
                name: pipeline.name.clone(),
                endpoints,
                policies,
            });
        }

        Ok(ConfigSnapshot {
            version,
            pipelines,
            raw: config,
        })
    }
}
