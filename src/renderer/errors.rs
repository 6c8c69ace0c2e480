//! Two-tier error taxonomy for the render pipeline
//!
//! Critical errors abort the entire unit of work and trigger invalidation:
//! the unit's artifact is re-rendered as the explicit zero value so that a
//! stale configuration never remains. Non-critical errors are scoped to one
//! route, backend or listener: they are recorded on that object's status and
//! never stop resolution of other objects. Per route, only the last
//! non-critical error is retained (a deliberate memory bound).

use thiserror::Error;

/// A failure that aborts the whole unit of work
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriticalError {
    /// The GatewayConfig referenced by the class cannot be resolved
    #[error("no GatewayConfig found for class {0:?}")]
    NoGatewayConfig(String),

    /// The Dataplane named by the config cannot be resolved (managed
    /// topology)
    #[error("no Dataplane found with name {0:?}")]
    NoDataplane(String),

    /// The referenced authentication Secret cannot be read
    #[error("cannot read auth Secret {0:?}")]
    AuthSecretNotFound(String),

    /// Authentication type string resolves to no known type
    #[error("unknown authentication type {0:?}")]
    UnknownAuthType(String),

    /// Readable external Secret left the auth underdetermined while inline
    /// fields are still set
    #[error("mixed inline/external auth: external Secret is incomplete and inline fields are set")]
    MixedAuthCredentials,

    /// A credential required by the resolved auth type is missing
    #[error("missing credential {field:?} for auth type {auth_type:?}")]
    MissingAuthCredential { auth_type: String, field: String },

    /// No usable authentication source at all
    #[error("invalid authentication config: {0}")]
    InvalidAuthConfig(String),

    /// Structurally invalid admin setting (bad enum value)
    #[error("invalid admin config: {0}")]
    InvalidAdminConfig(String),
}

/// Fixed vocabulary of non-critical failure reasons
///
/// The serialized name of each variant is what appears as the status
/// condition reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonCriticalReason {
    InvalidBackendGroup,
    InvalidBackendKind,
    BackendNotFound,
    ClusterIPNotFound,
    EndpointNotFound,
    InconsistentClusterType,
    InvalidPortRange,
    PublicAddressNotFound,
    PublicListenerAddressNotFound,
}

impl NonCriticalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NonCriticalReason::InvalidBackendGroup => "InvalidBackendGroup",
            NonCriticalReason::InvalidBackendKind => "InvalidBackendKind",
            NonCriticalReason::BackendNotFound => "BackendNotFound",
            NonCriticalReason::ClusterIPNotFound => "ClusterIPNotFound",
            NonCriticalReason::EndpointNotFound => "EndpointNotFound",
            NonCriticalReason::InconsistentClusterType => "InconsistentClusterType",
            NonCriticalReason::InvalidPortRange => "InvalidPortRange",
            NonCriticalReason::PublicAddressNotFound => "PublicAddressNotFound",
            NonCriticalReason::PublicListenerAddressNotFound => "PublicListenerAddressNotFound",
        }
    }
}

impl std::fmt::Display for NonCriticalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object-scoped failure that resolution continues past
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonCriticalError {
    pub reason: NonCriticalReason,
    /// Key of the object the failure is about (backend, listener, service)
    pub object: String,
}

impl NonCriticalError {
    pub fn new(reason: NonCriticalReason, object: impl Into<String>) -> Self {
        Self {
            reason,
            object: object.into(),
        }
    }
}

impl std::fmt::Display for NonCriticalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.object)
    }
}
