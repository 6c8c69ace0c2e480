//! Kubernetes resource builders for the managed dataplane
//!
//! This module builds the objects the operator owns per Gateway: the
//! ConfigMap carrying the rendered relay configuration, the dataplane
//! Deployment, and the LoadBalancer Service exposing the listeners. Builders
//! are pure; the control loop applies their output.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::{Dataplane, Gateway, GatewayConfig};

use super::artifact::RELAY_CONFIG_KEY;
use super::listener::ListenerProtocol;

/// Label marking an object as operator-owned
pub const LABEL_OWNED_BY: &str = "turngate.io/owned-by";
pub const OWNED_BY_VALUE: &str = "turngate";
/// Label tying an owned object to its Gateway
pub const LABEL_RELATED_GATEWAY: &str = "turngate.io/related-gateway-name";
/// Label tying a shared artifact to its GatewayClass
pub const LABEL_RELATED_CLASS: &str = "turngate.io/related-gateway-class";
/// Annotation overriding the exposure Service type
pub const ANNOTATION_SERVICE_TYPE: &str = "turngate.io/service-type";

const DATAPLANE_CONTAINER: &str = "turngate-dataplane";
const CONFIG_VOLUME: &str = "relay-config";
const CONFIG_MOUNT_PATH: &str = "/etc/turngate";
const HEALTH_CHECK_PORT: i32 = 8086;

/// OwnerReference for garbage collection of per-Gateway objects
pub fn owner_reference(gw: &Gateway) -> OwnerReference {
    OwnerReference {
        api_version: Gateway::api_version(&()).to_string(),
        kind: Gateway::kind(&()).to_string(),
        name: gw.name_any(),
        uid: gw.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// The fixed label pair selecting a Gateway's dataplane pods.
///
/// The Deployment selector is immutable, so this set must never grow.
pub fn related_labels(gw: &Gateway) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_OWNED_BY.to_string(), OWNED_BY_VALUE.to_string());
    labels.insert(LABEL_RELATED_GATEWAY.to_string(), gw.name_any());
    labels
}

/// Labels on a shared per-class artifact
pub fn class_labels(class_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_OWNED_BY.to_string(), OWNED_BY_VALUE.to_string());
    labels.insert(LABEL_RELATED_CLASS.to_string(), class_name.to_string());
    labels
}

/// Build the ConfigMap carrying one rendered artifact under the fixed key.
pub fn build_relay_config_map(
    namespace: &str,
    name: &str,
    labels: BTreeMap<String, String>,
    owner: Option<&Gateway>,
    content: String,
) -> ConfigMap {
    let mut data = BTreeMap::new();
    data.insert(RELAY_CONFIG_KEY.to_string(), content);

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: owner.map(|gw| vec![owner_reference(gw)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Annotations for the exposure Service.
///
/// Dataplane annotations are the base, the GatewayConfig's load-balancer
/// annotations override them, and the Gateway's own annotations override
/// both. Operator-internal keys inherited from the lower layers are stripped
/// so only the Gateway can set them.
pub fn merged_annotations(
    gw: &Gateway,
    config: &GatewayConfig,
    dataplane: Option<&Dataplane>,
) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    if let Some(dp) = dataplane {
        annotations.extend(dp.spec.annotations.clone());
    }
    annotations.extend(config.spec.load_balancer_service_annotations.clone());
    annotations.retain(|key, _| !key.starts_with("turngate.io/"));
    annotations.extend(gw.annotations().clone());
    annotations
}

/// Deduplicated (transport, port) pairs of a Gateway's valid listeners
fn listener_ports(gw: &Gateway) -> Vec<(String, &'static str, i32)> {
    let mut seen = Vec::new();
    let mut ports = Vec::new();
    for listener in &gw.spec.listeners {
        let Some(protocol) = ListenerProtocol::parse(&listener.protocol) else {
            continue;
        };
        let key = (protocol.transport(), listener.port);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        ports.push((listener.name.clone(), protocol.transport(), listener.port));
    }
    ports
}

/// Build the dataplane Deployment for one Gateway.
pub fn build_dataplane_deployment(
    gw: &Gateway,
    config_map_name: &str,
    dataplane: &Dataplane,
) -> Deployment {
    let selector = related_labels(gw);
    let mut pod_labels = dataplane.spec.labels.clone();
    pod_labels.extend(selector.clone());

    let container_ports: Vec<ContainerPort> = listener_ports(gw)
        .into_iter()
        .map(|(name, transport, port)| ContainerPort {
            name: Some(name),
            container_port: port,
            protocol: Some(transport.to_string()),
            ..Default::default()
        })
        .collect();

    let health_probe = |path: &str| {
        (!dataplane.spec.disable_health_check).then(|| Probe {
            http_get: Some(HTTPGetAction {
                path: Some(path.to_string()),
                port: IntOrString::Int(HEALTH_CHECK_PORT),
                ..Default::default()
            }),
            ..Default::default()
        })
    };

    let container = Container {
        name: DATAPLANE_CONTAINER.to_string(),
        image: Some(dataplane.spec.image.clone()),
        args: if dataplane.spec.args.is_empty() {
            None
        } else {
            Some(dataplane.spec.args.clone())
        },
        ports: if container_ports.is_empty() {
            None
        } else {
            Some(container_ports)
        },
        resources: dataplane.spec.resources.clone(),
        liveness_probe: health_probe("/live"),
        readiness_probe: health_probe("/ready"),
        volume_mounts: Some(vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(gw.name_any()),
            namespace: gw.namespace(),
            labels: Some(selector.clone()),
            annotations: if dataplane.spec.annotations.is_empty() {
                None
            } else {
                Some(dataplane.spec.annotations.clone())
            },
            owner_references: Some(vec![owner_reference(gw)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(dataplane.replicas()),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    host_network: dataplane.spec.host_network.then_some(true),
                    affinity: dataplane.spec.affinity.clone(),
                    tolerations: dataplane.spec.tolerations.clone(),
                    volumes: Some(vec![Volume {
                        name: CONFIG_VOLUME.to_string(),
                        config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                            name: Some(config_map_name.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Build the Service exposing one Gateway's listeners.
///
/// One port per distinct (transport, port) pair; the Service type defaults
/// to LoadBalancer and may be overridden through the service-type annotation.
pub fn build_exposure_service(
    gw: &Gateway,
    config: &GatewayConfig,
    dataplane: Option<&Dataplane>,
) -> Service {
    let annotations = merged_annotations(gw, config, dataplane);
    let service_type = annotations
        .get(ANNOTATION_SERVICE_TYPE)
        .cloned()
        .unwrap_or_else(|| "LoadBalancer".to_string());

    let ports: Vec<ServicePort> = listener_ports(gw)
        .into_iter()
        .map(|(name, transport, port)| ServicePort {
            name: Some(name),
            port,
            protocol: Some(transport.to_string()),
            ..Default::default()
        })
        .collect();

    Service {
        metadata: ObjectMeta {
            name: Some(gw.name_any()),
            namespace: gw.namespace(),
            labels: Some(related_labels(gw)),
            annotations: if annotations.is_empty() {
                None
            } else {
                Some(annotations)
            },
            owner_references: Some(vec![owner_reference(gw)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type),
            selector: Some(related_labels(gw)),
            ports: if ports.is_empty() { None } else { Some(ports) },
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DataplaneSpec, GatewayConfigSpec, GatewaySpec, Listener};

    fn gateway(listeners: Vec<(&str, i32, &str)>) -> Gateway {
        let mut gw = Gateway::new(
            "gw",
            GatewaySpec {
                gateway_class_name: "relay".to_string(),
                listeners: listeners
                    .into_iter()
                    .map(|(name, port, protocol)| Listener {
                        name: name.to_string(),
                        port,
                        protocol: protocol.to_string(),
                        allowed_routes: None,
                    })
                    .collect(),
                addresses: Vec::new(),
            },
        );
        gw.metadata.namespace = Some("default".to_string());
        gw.metadata.uid = Some("uid-1".to_string());
        gw
    }

    fn dataplane() -> Dataplane {
        Dataplane::new(
            "default",
            DataplaneSpec {
                image: "turngate/relay:latest".to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn deployment_selector_is_the_fixed_label_pair() {
        let gw = gateway(vec![("udp", 3478, "UDP")]);
        let deployment = build_dataplane_deployment(&gw, "gw", &dataplane());

        let selector = deployment
            .spec
            .as_ref()
            .and_then(|s| s.selector.match_labels.clone())
            .unwrap_or_default();
        assert_eq!(selector.len(), 2);
        assert_eq!(selector.get(LABEL_OWNED_BY).map(String::as_str), Some("turngate"));
        assert_eq!(
            selector.get(LABEL_RELATED_GATEWAY).map(String::as_str),
            Some("gw")
        );
    }

    #[test]
    fn deployment_mounts_the_relay_config() {
        let gw = gateway(vec![("udp", 3478, "UDP")]);
        let deployment = build_dataplane_deployment(&gw, "gw", &dataplane());

        let pod = deployment
            .spec
            .and_then(|s| s.template.spec)
            .expect("pod spec");
        let volume = &pod.volumes.as_ref().expect("volumes")[0];
        assert_eq!(
            volume.config_map.as_ref().and_then(|cm| cm.name.clone()),
            Some("gw".to_string())
        );
        let mounts = pod.containers[0].volume_mounts.as_ref().expect("mounts");
        assert_eq!(mounts[0].mount_path, CONFIG_MOUNT_PATH);
    }

    #[test]
    fn service_ports_deduplicate_transport_and_port() {
        // DTLS and UDP on the same port share a transport, so one port entry
        let gw = gateway(vec![
            ("udp", 3478, "UDP"),
            ("dtls", 3478, "DTLS"),
            ("tcp", 3478, "TCP"),
            ("bogus", 80, "HTTP"),
        ]);
        let config = GatewayConfig::new("config", GatewayConfigSpec::default());

        let service = build_exposure_service(&gw, &config, None);
        let ports = service.spec.and_then(|s| s.ports).unwrap_or_default();
        let pairs: Vec<(Option<String>, i32)> = ports
            .iter()
            .map(|p| (p.protocol.clone(), p.port))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Some("UDP".to_string()), 3478),
                (Some("TCP".to_string()), 3478)
            ]
        );
    }

    #[test]
    fn gateway_annotations_win_and_internal_keys_do_not_leak() {
        let mut gw = gateway(vec![("udp", 3478, "UDP")]);
        gw.metadata.annotations = Some(
            [("tier".to_string(), "edge".to_string())]
                .into_iter()
                .collect(),
        );

        let mut config = GatewayConfig::new("config", GatewayConfigSpec::default());
        config.spec.load_balancer_service_annotations = [
            ("tier".to_string(), "backbone".to_string()),
            (ANNOTATION_SERVICE_TYPE.to_string(), "NodePort".to_string()),
        ]
        .into_iter()
        .collect();

        let annotations = merged_annotations(&gw, &config, None);
        assert_eq!(annotations.get("tier").map(String::as_str), Some("edge"));
        // internal key from the config layer is stripped
        assert!(!annotations.contains_key(ANNOTATION_SERVICE_TYPE));
    }

    #[test]
    fn service_type_annotation_on_gateway_overrides_load_balancer() {
        let mut gw = gateway(vec![("udp", 3478, "UDP")]);
        gw.metadata.annotations = Some(
            [(ANNOTATION_SERVICE_TYPE.to_string(), "NodePort".to_string())]
                .into_iter()
                .collect(),
        );
        let config = GatewayConfig::new("config", GatewayConfigSpec::default());

        let service = build_exposure_service(&gw, &config, None);
        assert_eq!(
            service.spec.and_then(|s| s.type_),
            Some("NodePort".to_string())
        );
    }

    #[test]
    fn config_map_carries_content_under_fixed_key() {
        let gw = gateway(vec![("udp", 3478, "UDP")]);
        let cm = build_relay_config_map(
            "default",
            "gw",
            related_labels(&gw),
            Some(&gw),
            "{}".to_string(),
        );

        assert_eq!(
            cm.data.and_then(|d| d.get(RELAY_CONFIG_KEY).cloned()),
            Some("{}".to_string())
        );
        let owners = cm.metadata.owner_references.unwrap_or_default();
        assert_eq!(owners[0].uid, "uid-1");
        assert_eq!(owners[0].kind, "Gateway");
    }
}
