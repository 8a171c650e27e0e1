//! Supporting types for the Limitador CRD

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default HTTP listener port
pub const DEFAULT_HTTP_PORT: i32 = 8080;

/// Default gRPC listener port
pub const DEFAULT_GRPC_PORT: i32 = 8081;

/// A single rate limit rule as consumed by the Limitador process
///
/// Field names are snake_case on purpose: this is the on-disk format of the
/// limits file, not a Kubernetes API object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RateLimit {
    /// Conditions that must all hold for the limit to apply
    #[serde(default)]
    pub conditions: Vec<String>,

    /// Maximum number of hits allowed in the window
    pub max_value: i64,

    /// Namespace the limit belongs to
    pub namespace: String,

    /// Window length in seconds
    pub seconds: i64,

    /// Descriptor variables that partition the counter
    #[serde(default)]
    pub variables: Vec<String>,

    /// Optional human-readable name; not required to be unique
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Listener ports exposed by the Limitador process
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// HTTP listener (status endpoint and HTTP limits API)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<TransportProtocol>,

    /// gRPC listener (Envoy rate limit service)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<TransportProtocol>,
}

impl Listener {
    /// HTTP port, falling back to the default
    pub fn http_port(&self) -> i32 {
        self.http
            .as_ref()
            .and_then(|p| p.port)
            .unwrap_or(DEFAULT_HTTP_PORT)
    }

    /// gRPC port, falling back to the default
    pub fn grpc_port(&self) -> i32 {
        self.grpc
            .as_ref()
            .and_then(|p| p.port)
            .unwrap_or(DEFAULT_GRPC_PORT)
    }
}

/// Port configuration for one listener
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct TransportProtocol {
    /// Port number; the listener default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// Header injection mode for rate limited responses
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RateLimitHeaders {
    /// No rate limit headers
    #[default]
    #[serde(rename = "NONE")]
    None,
    /// Headers as described by draft-polli-ratelimit-headers-03
    #[serde(rename = "DRAFT_VERSION_03")]
    DraftVersion03,
}

impl std::fmt::Display for RateLimitHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::DraftVersion03 => write!(f, "DRAFT_VERSION_03"),
        }
    }
}

/// Storage backend for counters
///
/// At most one case may be set. None set means in-memory counters.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Storage {
    /// Redis, every hit goes to the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<Redis>,

    /// Redis with a local write-behind cache
    #[serde(
        rename = "redis-cached",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub redis_cached: Option<RedisCached>,

    /// Local disk backed by a persistent volume claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskStorage>,
}

/// The resolved storage case
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    /// Counters kept in process memory
    InMemory,
    /// Counters kept on a persistent volume
    Disk,
    /// Counters kept in Redis
    Redis,
    /// Counters kept in Redis behind a local cache
    RedisCached,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Redis => write!(f, "redis"),
            Self::RedisCached => write!(f, "redis_cached"),
        }
    }
}

impl Storage {
    /// Determine which storage case is set
    ///
    /// Returns a validation error when more than one case is populated.
    pub fn mode(&self) -> Result<StorageMode, crate::Error> {
        let set: Vec<StorageMode> = [
            self.redis.as_ref().map(|_| StorageMode::Redis),
            self.redis_cached.as_ref().map(|_| StorageMode::RedisCached),
            self.disk.as_ref().map(|_| StorageMode::Disk),
        ]
        .into_iter()
        .flatten()
        .collect();

        match set.as_slice() {
            [] => Ok(StorageMode::InMemory),
            [mode] => Ok(*mode),
            many => Err(crate::Error::validation(format!(
                "only one storage backend may be set, found {}",
                many.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// Reference to the secret holding a Redis connection URL
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SecretRef {
    /// Secret name
    #[serde(default)]
    pub name: String,

    /// Secret namespace; defaults to the instance namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Redis storage configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Redis {
    /// Secret with a `URL` key holding the connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_secret_ref: Option<SecretRef>,
}

/// Redis storage with a local cache
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedisCached {
    /// Secret with a `URL` key holding the connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_secret_ref: Option<SecretRef>,

    /// Cache tunables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RedisCachedOptions>,
}

/// Tunables for the cached Redis backend; each is passed only when set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RedisCachedOptions {
    /// TTL for cached counters in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Ratio to apply to the TTL from Redis on cached counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<i64>,

    /// Flushing period for counters in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_period: Option<i64>,

    /// Maximum amount of counters cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cached: Option<i64>,

    /// Timeout for Redis commands in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_timeout: Option<i64>,

    /// Size of entries to flush in one batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,
}

impl RedisCachedOptions {
    /// Flag/value pairs for every option that is set, in a fixed order
    pub fn to_args(&self) -> Vec<String> {
        let options = [
            ("--ttl", self.ttl),
            ("--ratio", self.ratio),
            ("--flush-period", self.flush_period),
            ("--max-cached", self.max_cached),
            ("--response-timeout", self.response_timeout),
            ("--batch-size", self.batch_size),
        ];

        options
            .into_iter()
            .filter_map(|(flag, value)| value.map(|v| [flag.to_string(), v.to_string()]))
            .flatten()
            .collect()
    }
}

/// On-disk storage configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiskStorage {
    /// Claim settings for the volume holding the counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PvcSpec>,

    /// Optimization target passed to the disk backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize: Option<DiskOptimize>,
}

/// Disk backend optimization mode
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiskOptimize {
    /// Favor throughput
    Throughput,
    /// Favor disk space
    DiskSpace,
}

impl std::fmt::Display for DiskOptimize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Throughput => write!(f, "throughput"),
            Self::DiskSpace => write!(f, "disk_space"),
        }
    }
}

/// Persistent volume claim settings for disk storage
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PvcSpec {
    /// Storage class for the claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Requested capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<PvcResources>,

    /// Bind to a specific pre-provisioned volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
}

/// Requested capacity for the claim
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PvcResources {
    /// Storage request, e.g. `1Gi`
    pub requests: Quantity,
}

/// Disruption budget thresholds; at most one may be set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodDisruptionBudgetSpec {
    /// Maximum pods that may be unavailable during a voluntary disruption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,

    /// Minimum pods that must stay available during a voluntary disruption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<IntOrString>,
}

/// Condition status values
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// True if the condition has the same status, reason and message
    ///
    /// Timestamps are ignored.
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// How clients reach the rate limiting service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// In-cluster DNS name of the service
    #[serde(default)]
    pub host: String,

    /// Ports the service exposes
    #[serde(default)]
    pub ports: Ports,
}

/// Resolved listener ports
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Ports {
    /// HTTP port
    pub http: i32,
    /// gRPC port
    pub grpc: i32,
}
