//! Shared types for the Turngate resource graph
//!
//! These types are used across the CRD definitions and the render pipeline:
//! status conditions following Kubernetes API conventions and cross-resource
//! references.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group owned by this operator.
///
/// Backend references with any other non-empty group are classified as
/// invalid by the cluster resolver.
pub const GROUP: &str = "turngate.io";

/// Maximum number of entries kept in any condition list.
///
/// Condition lists are fixed-capacity eviction buffers: once full, the
/// oldest entry is dropped to make room for a new condition type.
pub const MAX_CONDITIONS: usize = 8;

/// A status condition following Kubernetes API conventions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Accepted", "Programmed", "ResolvedRefs")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    /// The .metadata.generation the condition was computed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a condition with the transition time set to now
    pub fn new(type_: &str, status: bool, reason: &str, message: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Reference to a Secret, optionally in another namespace
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}
