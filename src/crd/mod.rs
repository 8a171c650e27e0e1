//! Custom Resource Definitions for the Limitador operator

mod limitador;
mod types;

pub use limitador::{
    Limitador, LimitadorSpec, LimitadorStatus, CONDITION_READY, DEFAULT_REPLICAS, DEFAULT_VERSION,
};
pub use types::{
    Condition, ConditionStatus, DiskOptimize, DiskStorage, Listener, PodDisruptionBudgetSpec,
    Ports, PvcResources, PvcSpec, RateLimit, RateLimitHeaders, Redis, RedisCached,
    RedisCachedOptions, SecretRef, ServiceStatus, Storage, StorageMode, TransportProtocol,
    DEFAULT_GRPC_PORT, DEFAULT_HTTP_PORT,
};
