//! WildFly Operator - keeps clustered WildFly application servers converged
//!
//! A `WildflyAppServer` custom resource declares how many application server
//! nodes to run, which image to run them from, and optionally which datasources
//! the standalone configuration should carry. The operator turns that into a
//! Deployment, a LoadBalancer Service and (optionally) a ConfigMap, keeps the
//! Deployment sized, and publishes the member pods and the external addresses
//! back onto the resource status.
//!
//! # Modules
//!
//! - [`crd`] - The `WildflyAppServer` custom resource definition
//! - [`workload`] - Desired-state builder for the child resources
//! - [`template`] - Standalone configuration rendering
//! - [`status`] - Status drift detection
//! - [`resolver`] - External address resolution for the LoadBalancer Service
//! - [`controller`] - Reconciliation logic
//! - [`config`] - Operator runtime configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod resolver;
pub mod status;
pub mod telemetry;
pub mod template;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Fixed Shape Constants
// =============================================================================
// The child resources have a fixed shape. These constants are shared between
// the builder, the resolver and the tests so the port numbers and names can
// never drift apart.

/// Port serving application HTTP traffic
pub const APPLICATION_HTTP_PORT: u16 = 8080;

/// Port serving the WildFly management console and API
pub const MANAGEMENT_HTTP_PORT: u16 = 9990;

/// JGroups TCP port used for cluster membership
pub const JGROUPS_TCP_PORT: u16 = 7600;

/// JGroups failure detection port
pub const JGROUPS_TCP_FD_PORT: u16 = 57600;

/// Label key selecting every child resource of a `WildflyAppServer`
pub const APP_NAME_LABEL: &str = "appName";

/// Field manager name used for server-side apply and patches
pub const FIELD_MANAGER: &str = "wildfly-operator";

/// Status key for the application endpoint in `externalAddresses`
pub const APPLICATION_ROLE: &str = "application";

/// Status key for the management endpoint in `externalAddresses`
pub const MANAGEMENT_ROLE: &str = "management";
