//! GatewayConfig Custom Resource Definition
//!
//! Per-class policy: TURN realm, authentication source, dataplane selection,
//! artifact target name and exposure annotations. Exactly one GatewayConfig
//! is referenced by each GatewayClass.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::SecretReference;

/// Default TURN realm when the config does not set one.
pub const DEFAULT_REALM: &str = "turngate.io";

/// Default name for the rendered relay configuration ConfigMap.
pub const DEFAULT_RELAY_CONFIG_NAME: &str = "turngate-config";

/// Default relay transport port range.
pub const DEFAULT_MIN_RELAY_PORT: i32 = 1 << 15;
pub const DEFAULT_MAX_RELAY_PORT: i32 = (1 << 15) + (1 << 14);

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "turngate.io",
    version = "v1alpha1",
    kind = "GatewayConfig",
    namespaced,
    shortname = "gwconf",
    printcolumn = r#"{"name":"Realm","type":"string","jsonPath":".spec.realm"}"#,
    printcolumn = r#"{"name":"Dataplane","type":"string","jsonPath":".spec.dataplane"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigSpec {
    /// TURN realm served by the relay fleet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// Inline authentication type ("static"/"plaintext" or
    /// "ephemeral"/"longterm"/"timewindowed")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,

    /// Inline username for static authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Inline password for static authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Inline shared secret for ephemeral authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,

    /// External authentication Secret; when set, overrides all inline
    /// authentication fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_ref: Option<SecretReference>,

    /// Dataplane log level (e.g. "all:INFO")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Name of the ConfigMap carrying the rendered relay configuration
    /// (legacy topology)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_config_name: Option<String>,

    /// Name of the Dataplane template (managed topology)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataplane: Option<String>,

    /// Annotations copied onto the public exposure Service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub load_balancer_service_annotations: BTreeMap<String, String>,

    /// Lowest relay transport port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_relay_port: Option<i32>,

    /// Highest relay transport port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_relay_port: Option<i32>,
}

impl GatewayConfig {
    pub fn realm(&self) -> &str {
        self.spec.realm.as_deref().unwrap_or(DEFAULT_REALM)
    }

    pub fn relay_config_name(&self) -> &str {
        self.spec
            .relay_config_name
            .as_deref()
            .unwrap_or(DEFAULT_RELAY_CONFIG_NAME)
    }

    /// Relay port range with defaults filled in and bounds clamped to the
    /// valid transport port range.
    pub fn relay_port_range(&self) -> (i32, i32) {
        let min = self.spec.min_relay_port.unwrap_or(DEFAULT_MIN_RELAY_PORT);
        let max = self.spec.max_relay_port.unwrap_or(DEFAULT_MAX_RELAY_PORT);
        (min.clamp(1, 65535), max.clamp(1, 65535))
    }
}
