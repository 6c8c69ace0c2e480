//! Dataplane Custom Resource Definition
//!
//! A Dataplane is the workload template for the relay server container in
//! the managed topology: image, replica count, scheduling constraints and
//! the dataplane-level admin toggles (metrics endpoint, health-check,
//! offload engine).

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "turngate.io",
    version = "v1alpha1",
    kind = "Dataplane",
    shortname = "dp",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataplaneSpec {
    /// Relay server container image
    pub image: String,

    /// Extra container arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Desired replica count; defaults to 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Labels merged onto the rendered workload and exposure objects
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Annotations merged onto the rendered workload and exposure objects
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub resources: Option<k8s_openapi::api::core::v1::ResourceRequirements>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub affinity: Option<k8s_openapi::api::core::v1::Affinity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Vec<serde_json::Value>>")]
    pub tolerations: Option<Vec<k8s_openapi::api::core::v1::Toleration>>,

    /// Run the relay pods on the host network
    #[serde(default)]
    pub host_network: bool,

    /// Expose the dataplane metrics endpoint; off by default
    #[serde(default)]
    pub enable_metrics_endpoint: bool,

    /// Disable the dataplane health-check endpoint; on by default
    #[serde(default)]
    pub disable_health_check: bool,

    /// Packet offload engine; structurally invalid values are a critical
    /// render error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offload_engine: Option<String>,

    /// Interfaces the offload engine binds to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offload_interfaces: Vec<String>,
}

/// Parsed offload engine selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum OffloadEngine {
    #[default]
    None,
    XDP,
    TC,
}

impl std::str::FromStr for OffloadEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(OffloadEngine::None),
            "xdp" => Ok(OffloadEngine::XDP),
            "tc" => Ok(OffloadEngine::TC),
            other => Err(format!("unknown offload engine {other:?}")),
        }
    }
}

impl std::fmt::Display for OffloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffloadEngine::None => write!(f, "None"),
            OffloadEngine::XDP => write!(f, "XDP"),
            OffloadEngine::TC => write!(f, "TC"),
        }
    }
}

impl Dataplane {
    pub fn replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }
}
