//! Integration tests for the Limitador operator
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! users interact with Limitador resources on a real API server.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about creating, reading, updating, and deleting
//!   Limitador resources through the Kubernetes API
//!
//! - `reconcile_flow`: Stories about a reconcile pass driving owned objects
//!   against a live API server
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod crd_operations;
mod helpers;
mod reconcile_flow;
