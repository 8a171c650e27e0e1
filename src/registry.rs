//! Kind registry
//!
//! Maps every logical kind the operator touches to the concrete API resource
//! used to address it. The registry is built once at startup and passed to
//! everything that performs cluster I/O; nothing registers kinds at runtime.

use std::collections::HashMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::discovery::ApiResource;

use crate::Error;

/// Kinds managed or observed by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// apps/v1 Deployment
    Deployment,
    /// v1 Service
    Service,
    /// v1 ConfigMap
    ConfigMap,
    /// policy/v1 PodDisruptionBudget
    PodDisruptionBudget,
    /// v1 PersistentVolumeClaim
    PersistentVolumeClaim,
    /// v1 Pod
    Pod,
}

/// All ResourceKind variants for iteration.
pub const ALL_RESOURCE_KINDS: &[ResourceKind] = &[
    ResourceKind::Deployment,
    ResourceKind::Service,
    ResourceKind::ConfigMap,
    ResourceKind::PodDisruptionBudget,
    ResourceKind::PersistentVolumeClaim,
    ResourceKind::Pod,
];

impl ResourceKind {
    /// Kubernetes Kind string
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::Service => "Service",
            Self::ConfigMap => "ConfigMap",
            Self::PodDisruptionBudget => "PodDisruptionBudget",
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::Pod => "Pod",
        }
    }

    fn api_resource(&self) -> ApiResource {
        match self {
            Self::Deployment => ApiResource::erase::<Deployment>(&()),
            Self::Service => ApiResource::erase::<Service>(&()),
            Self::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            Self::PodDisruptionBudget => ApiResource::erase::<PodDisruptionBudget>(&()),
            Self::PersistentVolumeClaim => ApiResource::erase::<PersistentVolumeClaim>(&()),
            Self::Pod => ApiResource::erase::<Pod>(&()),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_str())
    }
}

/// Immutable mapping from logical kind to API resource
#[derive(Debug, Clone)]
pub struct KindRegistry {
    entries: HashMap<ResourceKind, ApiResource>,
}

impl KindRegistry {
    /// Registry for the built-in Kubernetes kinds the operator manages
    pub fn standard() -> Self {
        Self::from_entries(ALL_RESOURCE_KINDS.iter().map(|k| (*k, k.api_resource())))
    }

    /// Build a registry from explicit entries
    pub fn from_entries(entries: impl IntoIterator<Item = (ResourceKind, ApiResource)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Resolve a kind to its API resource
    pub fn resolve(&self, kind: ResourceKind) -> Result<&ApiResource, Error> {
        self.entries.get(&kind).ok_or_else(|| {
            Error::internal_with_context("registry", format!("kind {kind} is not registered"))
        })
    }
}
