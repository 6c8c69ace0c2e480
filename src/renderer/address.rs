//! Address resolver: public address/port per listener
//!
//! Resolution is best effort across three exposure strategies: a declared
//! address hint, the LoadBalancer ingress status of the Service owned by the
//! Gateway, and finally a node external IP plus the Service's NodePort.
//! Failures here are never fatal; partial results are kept and only the
//! affected listener is marked not ready.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Service};
use kube::ResourceExt;
use tracing::debug;

use crate::crd::{AddressType, Gateway};
use crate::store::ResourceStore;

use super::errors::{NonCriticalError, NonCriticalReason};
use super::listener::ListenerProtocol;

/// A resolved public address for one listener
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicAddress {
    pub address_type: AddressType,
    pub address: String,
    pub port: i32,
}

/// Outcome of address resolution for one Gateway
///
/// `by_listener` maps listener names to their resolved address; listeners
/// absent from the map stay not-ready. `error` carries the last non-critical
/// failure, if any.
#[derive(Debug, Default)]
pub struct AddressResolution {
    pub by_listener: BTreeMap<String, PublicAddress>,
    pub error: Option<NonCriticalError>,
}

/// Resolve the public address of every listener of `gw`.
pub fn resolve_addresses(store: &ResourceStore, gw: &Gateway) -> AddressResolution {
    let mut resolution = AddressResolution::default();

    // A declared address hint short-circuits discovery for every listener.
    // Only the first hint is consulted.
    if let Some(hint) = gw.spec.addresses.first() {
        for listener in &gw.spec.listeners {
            resolution.by_listener.insert(
                listener.name.clone(),
                PublicAddress {
                    address_type: hint.type_,
                    address: hint.value.clone(),
                    port: listener.port,
                },
            );
        }
        return resolution;
    }

    let Some(service) = exposure_service(store, gw) else {
        debug!(gateway = %gw.name_any(), "no exposure Service owned by gateway");
        resolution.error = Some(NonCriticalError::new(
            NonCriticalReason::PublicAddressNotFound,
            format!("{}/{}", gw.namespace().unwrap_or_default(), gw.name_any()),
        ));
        return resolution;
    };

    for listener in &gw.spec.listeners {
        let Some(protocol) = ListenerProtocol::parse(&listener.protocol) else {
            continue;
        };
        match resolve_listener_address(store, &service, protocol, listener.port) {
            Some(public) => {
                resolution.by_listener.insert(listener.name.clone(), public);
            }
            None => {
                resolution.error = Some(NonCriticalError::new(
                    NonCriticalReason::PublicListenerAddressNotFound,
                    format!(
                        "{}/{}/{}",
                        gw.namespace().unwrap_or_default(),
                        gw.name_any(),
                        listener.name
                    ),
                ));
            }
        }
    }

    resolution
}

/// The exposure Service is located by owner back-reference, not by label
/// match: a relabeled Service must never change which Gateway it exposes.
fn exposure_service(store: &ResourceStore, gw: &Gateway) -> Option<std::sync::Arc<Service>> {
    let uid = gw.uid()?;
    store.services.all().into_iter().find(|svc| {
        svc.owner_references()
            .iter()
            .any(|owner| owner.uid == uid)
    })
}

fn resolve_listener_address(
    store: &ResourceStore,
    service: &Service,
    protocol: ListenerProtocol,
    port: i32,
) -> Option<PublicAddress> {
    let spec = service.spec.as_ref()?;
    let service_port = spec.ports.as_ref()?.iter().find(|sp| {
        sp.port == port && sp.protocol.as_deref().unwrap_or("TCP") == protocol.transport()
    })?;

    let ingress = service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());

    if let Some(entries) = ingress {
        for entry in entries {
            if let Some(ip) = entry.ip.as_ref().filter(|ip| !ip.is_empty()) {
                return Some(PublicAddress {
                    address_type: AddressType::IPAddress,
                    address: ip.clone(),
                    port,
                });
            }
            if let Some(hostname) = entry.hostname.as_ref().filter(|h| !h.is_empty()) {
                return Some(PublicAddress {
                    address_type: AddressType::Hostname,
                    address: hostname.clone(),
                    port,
                });
            }
        }
    }

    // No usable ingress entry: fall back to a node external IP plus the
    // Service's NodePort for this listener.
    let node_port = service_port.node_port?;
    let external_ip = first_external_node_ip(store)?;
    Some(PublicAddress {
        address_type: AddressType::IPAddress,
        address: external_ip,
        port: node_port,
    })
}

fn first_external_node_ip(store: &ResourceStore) -> Option<String> {
    store.nodes.all().iter().find_map(|node| {
        node_external_ip(node)
    })
}

fn node_external_ip(node: &Node) -> Option<String> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .find(|addr| addr.type_ == "ExternalIP" && !addr.address.is_empty())
        .map(|addr| addr.address.clone())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, NodeAddress, NodeStatus, ServicePort,
        ServiceSpec, ServiceStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    use super::*;
    use crate::crd::{AddressHint, GatewaySpec, Listener};

    fn gateway(listeners: Vec<(&str, i32, &str)>, hints: Vec<AddressHint>) -> Gateway {
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
                addresses: hints,
            },
        );
        gw.metadata.namespace = Some("default".to_string());
        gw.metadata.uid = Some("gw-uid".to_string());
        gw
    }

    fn owned_service(
        ports: Vec<ServicePort>,
        ingress: Option<Vec<LoadBalancerIngress>>,
    ) -> Service {
        Service {
            metadata: kube::api::ObjectMeta {
                name: Some("gw-public".to_string()),
                namespace: Some("default".to_string()),
                owner_references: Some(vec![OwnerReference {
                    uid: "gw-uid".to_string(),
                    kind: "Gateway".to_string(),
                    name: "gw".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(ports),
                ..Default::default()
            }),
            status: ingress.map(|entries| ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(entries),
                }),
                ..Default::default()
            }),
        }
    }

    fn udp_port(port: i32, node_port: Option<i32>) -> ServicePort {
        ServicePort {
            port,
            protocol: Some("UDP".to_string()),
            node_port,
            ..Default::default()
        }
    }

    #[test]
    fn first_address_hint_short_circuits_discovery() {
        let store = ResourceStore::default();
        let gw = gateway(
            vec![("udp", 3478, "UDP"), ("tls", 5349, "TLS")],
            vec![
                AddressHint {
                    type_: AddressType::IPAddress,
                    value: "203.0.113.1".to_string(),
                },
                AddressHint {
                    type_: AddressType::Hostname,
                    value: "ignored.example.com".to_string(),
                },
            ],
        );

        let resolution = resolve_addresses(&store, &gw);
        assert!(resolution.error.is_none());
        assert_eq!(resolution.by_listener.len(), 2);
        let udp = &resolution.by_listener["udp"];
        assert_eq!(udp.address, "203.0.113.1");
        assert_eq!(udp.port, 3478);
        let tls = &resolution.by_listener["tls"];
        assert_eq!(tls.address, "203.0.113.1");
        assert_eq!(tls.port, 5349);
    }

    #[test]
    fn load_balancer_ip_preferred_over_hostname() {
        let store = ResourceStore::default();
        let gw = gateway(vec![("udp", 3478, "UDP")], Vec::new());
        store.services.upsert(owned_service(
            vec![udp_port(3478, None)],
            Some(vec![LoadBalancerIngress {
                ip: Some("198.51.100.7".to_string()),
                hostname: Some("lb.example.com".to_string()),
                ..Default::default()
            }]),
        ));

        let resolution = resolve_addresses(&store, &gw);
        let addr = &resolution.by_listener["udp"];
        assert_eq!(addr.address_type, AddressType::IPAddress);
        assert_eq!(addr.address, "198.51.100.7");
    }

    #[test]
    fn hostname_used_when_no_ip() {
        let store = ResourceStore::default();
        let gw = gateway(vec![("udp", 3478, "UDP")], Vec::new());
        store.services.upsert(owned_service(
            vec![udp_port(3478, None)],
            Some(vec![LoadBalancerIngress {
                hostname: Some("lb.example.com".to_string()),
                ..Default::default()
            }]),
        ));

        let resolution = resolve_addresses(&store, &gw);
        let addr = &resolution.by_listener["udp"];
        assert_eq!(addr.address_type, AddressType::Hostname);
        assert_eq!(addr.address, "lb.example.com");
    }

    #[test]
    fn node_port_fallback() {
        let store = ResourceStore::default();
        let gw = gateway(vec![("udp", 3478, "UDP")], Vec::new());
        store
            .services
            .upsert(owned_service(vec![udp_port(3478, Some(30478))], None));
        let mut node = Node::default();
        node.metadata.name = Some("node-1".to_string());
        node.status = Some(NodeStatus {
            addresses: Some(vec![
                NodeAddress {
                    type_: "InternalIP".to_string(),
                    address: "10.0.0.5".to_string(),
                },
                NodeAddress {
                    type_: "ExternalIP".to_string(),
                    address: "192.0.2.10".to_string(),
                },
            ]),
            ..Default::default()
        });
        store.nodes.upsert(node);

        let resolution = resolve_addresses(&store, &gw);
        let addr = &resolution.by_listener["udp"];
        assert_eq!(addr.address, "192.0.2.10");
        assert_eq!(addr.port, 30478);
    }

    #[test]
    fn missing_exposure_service_is_gateway_wide() {
        let store = ResourceStore::default();
        let gw = gateway(vec![("udp", 3478, "UDP")], Vec::new());

        let resolution = resolve_addresses(&store, &gw);
        assert!(resolution.by_listener.is_empty());
        assert_eq!(
            resolution.error.as_ref().map(|e| e.reason),
            Some(NonCriticalReason::PublicAddressNotFound)
        );
    }

    #[test]
    fn per_listener_miss_keeps_other_listeners() {
        let store = ResourceStore::default();
        let gw = gateway(
            vec![("udp", 3478, "UDP"), ("tcp", 3478, "TCP")],
            Vec::new(),
        );
        // Only the UDP port exists on the exposure Service.
        store.services.upsert(owned_service(
            vec![udp_port(3478, None)],
            Some(vec![LoadBalancerIngress {
                ip: Some("198.51.100.7".to_string()),
                ..Default::default()
            }]),
        ));

        let resolution = resolve_addresses(&store, &gw);
        assert!(resolution.by_listener.contains_key("udp"));
        assert!(!resolution.by_listener.contains_key("tcp"));
        assert_eq!(
            resolution.error.as_ref().map(|e| e.reason),
            Some(NonCriticalReason::PublicListenerAddressNotFound)
        );
    }

    #[test]
    fn services_not_owned_by_the_gateway_are_ignored() {
        let store = ResourceStore::default();
        let gw = gateway(vec![("udp", 3478, "UDP")], Vec::new());
        let mut foreign = owned_service(
            vec![udp_port(3478, None)],
            Some(vec![LoadBalancerIngress {
                ip: Some("198.51.100.7".to_string()),
                ..Default::default()
            }]),
        );
        foreign.metadata.owner_references = Some(vec![OwnerReference {
            uid: "other-uid".to_string(),
            kind: "Gateway".to_string(),
            name: "other".to_string(),
            ..Default::default()
        }]);
        store.services.upsert(foreign);

        let resolution = resolve_addresses(&store, &gw);
        assert!(resolution.by_listener.is_empty());
        assert_eq!(
            resolution.error.as_ref().map(|e| e.reason),
            Some(NonCriticalReason::PublicAddressNotFound)
        );
    }
}
