//! UDPRoute Custom Resource Definition
//!
//! A UDPRoute binds one or more parent Gateways (optionally scoped to a
//! single listener) to one or more backends. Routes are global, not
//! class-scoped: acceptance is computed per (route, parent) pair and status
//! is refreshed on every render pass.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "turngate.io",
    version = "v1alpha1",
    kind = "UDPRoute",
    namespaced,
    status = "UDPRouteStatus",
    shortname = "udproute",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteSpec {
    /// Gateways this route wants to attach to
    pub parent_refs: Vec<ParentReference>,

    /// Routing rules; only the first rule is used, extras are ignored
    pub rules: Vec<RouteRule>,
}

/// Reference from a route to a parent Gateway
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    /// Namespace of the Gateway; defaults to the route's namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    /// Restrict attachment to the listener with this name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_refs: Vec<BackendRef>,
}

/// Reference from a route rule to a backend
///
/// Backends are either dynamic Services (group empty or ours, kind
/// "Service") or operator-declared StaticServices. Anything else is
/// classified as invalid, never silently dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    /// Namespace of the backend; defaults to the route's namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Start of the relay port range advertised for this backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// End of the relay port range advertised for this backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_port: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<RouteParentStatus>,
}

/// Status of this route with respect to one parent Gateway
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
