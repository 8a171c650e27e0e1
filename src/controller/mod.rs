//! Controller implementation for the Limitador CRD
//!
//! Controllers follow the Kubernetes controller pattern with observe-diff-act
//! loops. Every pass recomputes the full desired state; nothing is carried
//! between passes.

mod limitador;

pub use limitador::{error_policy, reconcile, Context, CONFLICT_REQUEUE};
