//! Error types for the WildFly operator

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error raised by a named store operation
    #[error("failed to {operation}: {source}")]
    KubeOperation {
        /// What the operator was doing (e.g. "create deployment")
        operation: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// Converting a built record to its wire type failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Rendering the standalone configuration failed
    #[error("template error: {0}")]
    Template(String),

    /// Invalid operator configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A resource the operator relies on lacks a required field
    #[error("missing field {field} on {resource}")]
    MissingField {
        /// Resource kind and name
        resource: String,
        /// Field path
        field: String,
    },
}

impl Error {
    /// Wrap a kube error with the store operation that produced it
    pub fn kube_operation(operation: impl Into<String>, source: kube::Error) -> Self {
        Self::KubeOperation {
            operation: operation.into(),
            source,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a template error with the given message
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing field error
    pub fn missing_field(resource: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            resource: resource.into(),
            field: field.into(),
        }
    }
}

/// Returns true when the API server rejected a create because the object exists
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Returns true when the API server reported the object as missing
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}
