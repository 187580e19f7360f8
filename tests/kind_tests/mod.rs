//! Integration tests for the WildFly operator
//!
//! These tests require a Kubernetes cluster (kind) to run and tell the story
//! of how application teams interact with WildflyAppServer resources.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about creating, reading, updating, and deleting
//!   WildflyAppServer resources through the Kubernetes API
//!
//! - `reconcile`: Stories about the reconciler converging a resource's
//!   Deployment, Service, generated configuration and status
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod crd_operations;
mod helpers;
mod reconcile;
