//! The rendered relay-server configuration artifact
//!
//! Rebuilt from scratch on every render and serialized under one well-known
//! ConfigMap key. The artifact is either a complete, internally consistent
//! rendering or the explicit zero value produced by
//! [`RelayConfig::zero`] — never partially corrupt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known ConfigMap key the serialized artifact is stored under.
pub const RELAY_CONFIG_KEY: &str = "turngate.conf";

/// Complete relay-server configuration for one unit of work
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    pub admin: AdminConfig,
    pub auth: AuthConfig,
    pub listeners: Vec<ListenerConfig>,
    pub clusters: Vec<ClusterConfig>,
}

impl RelayConfig {
    /// The explicit "invalidated" representation: everything zeroed except
    /// the instance name, so the dataplane can tell which configuration was
    /// withdrawn.
    pub fn zero(name: &str) -> Self {
        Self {
            admin: AdminConfig {
                name: name.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Deterministic serialization; map keys are ordered and list order is
    /// fixed by the pipeline, so unchanged inputs yield byte-identical
    /// output.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Instance-level dataplane settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    pub name: String,
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_endpoint: Option<String>,
    pub offload_engine: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offload_interfaces: Vec<String>,
}

/// Resolved authentication settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub realm: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, String>,
}

/// One relay listener
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfig {
    pub name: String,
    pub protocol: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub public_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_port: Option<i32>,
    pub port: i32,
    pub min_relay_port: i32,
    pub max_relay_port: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<String>,
}

/// One resolved backend set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ClusterType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

/// How a cluster's endpoints are balanced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterType {
    /// Flattened literal endpoint list
    #[default]
    #[serde(rename = "STATIC")]
    Static,
    /// Single DNS name resolved by the dataplane
    #[serde(rename = "STRICT_DNS")]
    StrictDns,
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterType::Static => write!(f, "STATIC"),
            ClusterType::StrictDns => write!(f, "STRICT_DNS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_config_keeps_only_the_name() {
        let zero = RelayConfig::zero("default/gw");
        assert_eq!(zero.admin.name, "default/gw");
        assert!(zero.admin.log_level.is_empty());
        assert!(zero.listeners.is_empty());
        assert!(zero.clusters.is_empty());
        assert!(zero.auth.realm.is_empty());
    }

    #[test]
    fn serialization_is_camel_case_and_stable() {
        let config = RelayConfig {
            admin: AdminConfig {
                name: "gw".to_string(),
                log_level: "all:INFO".to_string(),
                metrics_endpoint: None,
                health_check_endpoint: Some("http://:8086".to_string()),
                offload_engine: "None".to_string(),
                offload_interfaces: Vec::new(),
            },
            auth: AuthConfig {
                realm: "turngate.io".to_string(),
                type_: "static".to_string(),
                credentials: BTreeMap::from([
                    ("username".to_string(), "user-1".to_string()),
                    ("password".to_string(), "pass-1".to_string()),
                ]),
            },
            listeners: vec![ListenerConfig {
                name: "default/gw/udp".to_string(),
                protocol: "UDP".to_string(),
                public_addr: "1.2.3.4".to_string(),
                public_port: Some(3478),
                port: 3478,
                min_relay_port: 32768,
                max_relay_port: 49152,
                routes: vec!["default/media".to_string()],
            }],
            clusters: vec![ClusterConfig {
                name: "default/media".to_string(),
                type_: ClusterType::Static,
                endpoints: vec!["10.0.0.1".to_string()],
            }],
        };

        let first = config.to_json().unwrap();
        let second = config.to_json().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"logLevel\":\"all:INFO\""));
        assert!(first.contains("\"type\":\"STATIC\""));
        assert!(first.contains("\"minRelayPort\":32768"));
        // metrics endpoint is off, so the key must be absent entirely
        assert!(!first.contains("metricsEndpoint"));
    }
}
