//! Limitador Operator - reconciles Limitador rate-limiting services on Kubernetes
//!
//! A `Limitador` custom resource declares one rate-limiting service. The
//! operator keeps a Deployment, Service, limits ConfigMap, and optionally a
//! PodDisruptionBudget and PersistentVolumeClaim in line with it, and reports
//! readiness back on the resource's status.
//!
//! # Architecture
//!
//! Every reconciliation pass flows one way:
//! spec → storage strategy → desired objects → applied diffs → status.
//! Nothing is cached between passes, so any pass can be abandoned and rerun.
//!
//! # Modules
//!
//! - [`crd`] - The Limitador custom resource and its spec/status types
//! - [`storage`] - Storage backend to launch arguments, volumes and rollout
//! - [`resources`] - Desired state builders for every owned object
//! - [`mutator`] - Per-kind field mergers that preserve foreign edits
//! - [`status`] - Ready condition aggregation and status write-back
//! - [`upgrade`] - Availability-gated migration off legacy object names
//! - [`propagation`] - Limits version stamping on running pods
//! - [`controller`] - Reconcile entry point and error policy
//! - [`client`] - Cluster I/O seam used by all of the above
//! - [`registry`] - Logical kind to API resource mapping
//! - [`config`] - Immutable operator configuration
//! - [`telemetry`] - Logging, tracing and metrics setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod mutator;
pub mod propagation;
pub mod registry;
pub mod resources;
pub mod status;
pub mod storage;
pub mod telemetry;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on every write the operator issues
pub const FIELD_MANAGER: &str = "limitador-operator";
