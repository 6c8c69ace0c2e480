//! Operator-wide error types

use thiserror::Error;

/// Errors surfaced by the operator outside the render pipeline.
///
/// Render-pipeline failures have their own two-tier taxonomy in
/// [`crate::renderer::errors`]; anything critical enough to abort a unit of
/// work is converted into an invalidated artifact there and never escapes as
/// an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Operator configuration error (bad flags, missing CRDs)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid resource spec
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
