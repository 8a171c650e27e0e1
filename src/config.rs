//! Operator-wide configuration
//!
//! Built once at startup from command-line flags and environment variables,
//! then shared read-only through the controller context.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Default Limitador image repository
pub const DEFAULT_IMAGE_REPOSITORY: &str = "quay.io/kuadrant/limitador";

/// Default periodic resync interval
pub const DEFAULT_RESYNC_SECS: u64 = 300;

/// Default retry interval while waiting for a migration to become safe
pub const DEFAULT_MIGRATION_RETRY_SECS: u64 = 5;

/// Default requeue interval after a transient error
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 10;

/// How the Redis URL reaches the Limitador process
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RedisUrlMode {
    /// Inject the URL through an environment variable sourced from the secret
    #[default]
    #[value(name = "env")]
    EnvReference,
    /// Write the resolved URL into the container arguments
    #[value(name = "inline")]
    Inline,
}

/// Immutable operator configuration
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Image repository; the instance version is appended as the tag
    pub image_repository: String,
    /// Resources applied when an instance does not specify any
    pub default_resources: ResourceRequirements,
    /// Requeue interval after a successful pass
    pub resync_interval: Duration,
    /// Requeue interval after a transient error
    pub error_requeue_interval: Duration,
    /// Requeue interval while a legacy migration waits on availability
    pub migration_retry_interval: Duration,
    /// Redis URL delivery mode
    pub redis_url_mode: RedisUrlMode,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
            default_resources: default_resource_requirements(),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECS),
            error_requeue_interval: Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS),
            migration_retry_interval: Duration::from_secs(DEFAULT_MIGRATION_RETRY_SECS),
            redis_url_mode: RedisUrlMode::default(),
        }
    }
}

impl OperatorConfig {
    /// Full image reference for a version tag
    pub fn image(&self, version: &str) -> String {
        format!("{}:{}", self.image_repository, version)
    }
}

/// Operator default container resources
pub fn default_resource_requirements() -> ResourceRequirements {
    let quantities = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };

    ResourceRequirements {
        requests: Some(quantities("250m", "32Mi")),
        limits: Some(quantities("500m", "64Mi")),
        ..Default::default()
    }
}
