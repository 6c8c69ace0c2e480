//! StaticService Custom Resource Definition
//!
//! A StaticService is an operator-declared endpoint set: a literal list of
//! address prefixes copied verbatim into the rendered cluster, with no
//! endpoint discovery involved.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "turngate.io",
    version = "v1alpha1",
    kind = "StaticService",
    namespaced,
    shortname = "ssvc",
    printcolumn = r#"{"name":"Prefixes","type":"string","jsonPath":".spec.prefixes"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StaticServiceSpec {
    /// Address prefixes reachable through this backend
    pub prefixes: Vec<String>,
}
