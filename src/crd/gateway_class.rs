//! GatewayClass Custom Resource Definition
//!
//! A GatewayClass names the controller responsible for a set of Gateways and
//! points at exactly one GatewayConfig carrying the per-class policy. A class
//! with an unresolvable or malformed parameters reference is excluded from
//! rendering entirely.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "turngate.io",
    version = "v1alpha1",
    kind = "GatewayClass",
    status = "GatewayClassStatus",
    shortname = "gwc",
    printcolumn = r#"{"name":"Controller","type":"string","jsonPath":".spec.controllerName"}"#,
    printcolumn = r#"{"name":"Accepted","type":"string","jsonPath":".status.conditions[?(@.type=='Accepted')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClassSpec {
    /// Name of the controller that manages Gateways of this class
    pub controller_name: String,

    /// Reference to the GatewayConfig holding per-class policy
    pub parameters_ref: ParametersRef,
}

/// Reference from a GatewayClass to its GatewayConfig
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParametersRef {
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClassStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl GatewayClass {
    /// Whether the parameters reference is well-formed and points at a
    /// GatewayConfig in our group.
    ///
    /// Classes failing this check never enter the rendered class set.
    pub fn has_valid_parameters_ref(&self) -> bool {
        let pref = &self.spec.parameters_ref;
        pref.kind == "GatewayConfig"
            && (pref.group.is_empty() || pref.group == super::types::GROUP)
            && !pref.name.is_empty()
            && pref
                .namespace
                .as_deref()
                .map(|ns| !ns.is_empty())
                .unwrap_or(false)
    }
}
