//! Listener renderer and route-attachment policy
//!
//! One listener configuration is rendered per Gateway listener. Listeners
//! with a protocol outside the fixed set are skipped, never fatal.

use kube::ResourceExt;

use crate::crd::{
    Gateway, GatewayConfig, Listener, NamespacePolicy, ParentReference, UDPRoute,
};
use crate::store::ResourceStore;

use super::address::PublicAddress;
use super::artifact::ListenerConfig;

/// The fixed set of listener protocols the relay understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerProtocol {
    Udp,
    Tcp,
    Tls,
    Dtls,
}

impl ListenerProtocol {
    /// Parse a listener protocol, accepting the TURN-prefixed aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UDP" | "TURN-UDP" => Some(ListenerProtocol::Udp),
            "TCP" | "TURN-TCP" => Some(ListenerProtocol::Tcp),
            "TLS" | "TURN-TLS" => Some(ListenerProtocol::Tls),
            "DTLS" | "TURN-DTLS" => Some(ListenerProtocol::Dtls),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Udp => "TURN-UDP",
            ListenerProtocol::Tcp => "TURN-TCP",
            ListenerProtocol::Tls => "TURN-TLS",
            ListenerProtocol::Dtls => "TURN-DTLS",
        }
    }

    /// The L4 transport carrying this protocol, as written in Service ports.
    pub fn transport(&self) -> &'static str {
        match self {
            ListenerProtocol::Udp | ListenerProtocol::Dtls => "UDP",
            ListenerProtocol::Tcp | ListenerProtocol::Tls => "TCP",
        }
    }
}

/// Stable name of a listener inside the artifact: `<ns>/<gateway>/<listener>`.
pub fn listener_config_name(gw: &Gateway, listener: &Listener) -> String {
    format!(
        "{}/{}/{}",
        gw.namespace().unwrap_or_default(),
        gw.name_any(),
        listener.name
    )
}

/// Render one listener of the artifact.
pub fn render_listener(
    gw: &Gateway,
    listener: &Listener,
    protocol: ListenerProtocol,
    public: Option<&PublicAddress>,
    config: &GatewayConfig,
    routes: Vec<String>,
) -> ListenerConfig {
    let (min_relay_port, max_relay_port) = config.relay_port_range();
    ListenerConfig {
        name: listener_config_name(gw, listener),
        protocol: protocol.as_str().to_string(),
        public_addr: public.map(|p| p.address.clone()).unwrap_or_default(),
        public_port: public.map(|p| p.port),
        port: listener.port,
        min_relay_port,
        max_relay_port,
        routes,
    }
}

/// Whether `route` attaches to `listener` of `gw` through `parent_ref`.
///
/// Attachment requires the parent reference to name this Gateway, the
/// optional sectionName to name this listener, and the listener's
/// allowed-routes namespace policy to admit the route's namespace.
pub fn route_attaches(
    store: &ResourceStore,
    route: &UDPRoute,
    parent_ref: &ParentReference,
    gw: &Gateway,
    listener: &Listener,
) -> bool {
    let route_ns = route.namespace().unwrap_or_default();
    let parent_ns = parent_ref.namespace.clone().unwrap_or_else(|| route_ns.clone());

    if parent_ref.name != gw.name_any() || Some(parent_ns) != gw.namespace() {
        return false;
    }
    if let Some(section) = &parent_ref.section_name {
        if *section != listener.name {
            return false;
        }
    }

    namespace_allowed(store, &route_ns, gw, listener)
}

fn namespace_allowed(
    store: &ResourceStore,
    route_ns: &str,
    gw: &Gateway,
    listener: &Listener,
) -> bool {
    let policy = listener
        .allowed_routes
        .as_ref()
        .and_then(|ar| ar.namespaces.as_ref());

    match policy {
        // Default policy: same namespace only
        None => gw.namespace().as_deref() == Some(route_ns),
        Some(ns) => match ns.from {
            NamespacePolicy::Same => gw.namespace().as_deref() == Some(route_ns),
            NamespacePolicy::All => true,
            NamespacePolicy::Selector => {
                let Some(selector) = &ns.selector else {
                    return false;
                };
                let Some(namespace) = store.namespaces.get(None, route_ns) else {
                    return false;
                };
                let labels = namespace.labels();
                selector
                    .iter()
                    .all(|(k, v)| labels.get(k).map(|found| found == v).unwrap_or(false))
            }
        },
    }
}
