//! Limitador Custom Resource Definition
//!
//! A Limitador instance declares one rate limiting service: how many replicas
//! to run, which limits to load, and where counters are stored.

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    Condition, ConditionStatus, Listener, PodDisruptionBudgetSpec, RateLimit, RateLimitHeaders,
    ServiceStatus, Storage,
};

/// Default replica count
pub const DEFAULT_REPLICAS: i32 = 1;

/// Default image tag
pub const DEFAULT_VERSION: &str = "latest";

/// Condition type for the aggregated health signal
pub const CONDITION_READY: &str = "Ready";

/// Specification for a Limitador instance
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "limitador.kuadrant.io",
    version = "v1alpha1",
    kind = "Limitador",
    plural = "limitadors",
    status = "LimitadorStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LimitadorSpec {
    /// Number of replicas (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Image tag (default "latest")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Listener ports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<Listener>,

    /// Ordered rate limit rules loaded by every replica
    #[serde(default)]
    pub limits: Vec<RateLimit>,

    /// Counter storage backend; absent means in-memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,

    /// Container resources; absent means the operator default, empty means none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_requirements: Option<ResourceRequirements>,

    /// Pod scheduling affinity, passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Disruption budget; no budget is created when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdb: Option<PodDisruptionBudgetSpec>,

    /// Rate limit response headers mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_headers: Option<RateLimitHeaders>,
}

impl LimitadorSpec {
    /// Replica count with default applied
    pub fn replicas(&self) -> i32 {
        self.replicas.unwrap_or(DEFAULT_REPLICAS)
    }

    /// Image tag with default applied
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    /// Listener configuration with defaults applied
    pub fn listener(&self) -> Listener {
        self.listener.clone().unwrap_or_default()
    }

    /// Validate the specification for internal consistency
    pub fn validate(&self, instance: &str) -> Result<(), crate::Error> {
        if let Some(pdb) = &self.pdb {
            if pdb.max_unavailable.is_some() && pdb.min_available.is_some() {
                return Err(crate::Error::validation_for_field(
                    instance,
                    "spec.pdb",
                    "pdb spec invalid, maxUnavailable and minAvailable are mutually exclusive",
                ));
            }
        }

        if let Some(replicas) = self.replicas {
            if replicas < 0 {
                return Err(crate::Error::validation_for_field(
                    instance,
                    "spec.replicas",
                    format!("replicas must not be negative, got {replicas}"),
                ));
            }
        }

        if let Some(storage) = &self.storage {
            storage.mode().map_err(|e| match e {
                crate::Error::Validation { message, .. } => {
                    crate::Error::validation_for_field(instance, "spec.storage", message)
                }
                other => other,
            })?;
        }

        Ok(())
    }
}

/// Status for a Limitador instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LimitadorStatus {
    /// Generation last processed by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the instance health
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// How to reach the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceStatus>,
}

impl LimitadorStatus {
    /// Set the observed generation
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    /// Set the service descriptor
    pub fn service(mut self, service: ServiceStatus) -> Self {
        self.service = Some(service);
        self
    }

    /// Add or replace a condition by type
    ///
    /// When a condition of the same type and status already exists its
    /// transition time is kept.
    pub fn condition(mut self, mut condition: Condition) -> Self {
        if let Some(existing) = self.conditions.iter().find(|c| c.type_ == condition.type_) {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
        }
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// Look up a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// True if the Ready condition is True
    pub fn is_ready(&self) -> bool {
        self.get_condition(CONDITION_READY)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }
}
