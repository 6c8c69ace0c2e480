//! Point-in-time snapshot cache of the watched resource graph
//!
//! Every resolver reads from an injected [`ResourceStore`], never from the
//! API server directly: resolvers see a concurrent-read snapshot and must
//! treat "not found" as a normal, non-blocking outcome. The watch subsystem
//! owns writes; the render pipeline only reads.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Namespace, Node, Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Resource, ResourceExt};

use crate::crd::{Dataplane, Gateway, GatewayClass, GatewayConfig, StaticService, UDPRoute};

/// Namespace/name key of a stored object; cluster-scoped objects have no
/// namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn of<K>(obj: &K) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Thread-safe cache of one resource kind
pub struct Cache<K> {
    objects: RwLock<HashMap<ObjectKey, Arc<K>>>,
}

impl<K> Default for Cache<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }
}

impl<K> Cache<K> {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ObjectKey, Arc<K>>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectKey, Arc<K>>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch one object by key; absence is a normal outcome
    pub fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>> {
        let key = ObjectKey {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        };
        self.read().get(&key).cloned()
    }

    /// Snapshot of every cached object, in key order for deterministic
    /// iteration
    pub fn all(&self) -> Vec<Arc<K>> {
        let guard = self.read();
        let mut entries: Vec<(&ObjectKey, &Arc<K>)> = guard.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, v)| Arc::clone(v)).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn delete(&self, key: &ObjectKey) {
        self.write().remove(key);
    }

    /// Drop every cached object whose key is not in `keys`; used after a
    /// watch re-list to evict objects deleted while disconnected.
    pub fn retain(&self, keys: &[ObjectKey]) {
        let keep: std::collections::HashSet<&ObjectKey> = keys.iter().collect();
        self.write().retain(|key, _| keep.contains(key));
    }
}

impl<K> Cache<K>
where
    K: Resource<DynamicType = ()>,
{
    pub fn upsert(&self, obj: K) {
        let key = ObjectKey::of(&obj);
        self.write().insert(key, Arc::new(obj));
    }
}

/// Snapshot cache of every watched resource kind
///
/// Passed by reference into every resolver; never ambient global state.
#[derive(Default)]
pub struct ResourceStore {
    pub gateway_classes: Cache<GatewayClass>,
    pub gateway_configs: Cache<GatewayConfig>,
    pub gateways: Cache<Gateway>,
    pub udp_routes: Cache<UDPRoute>,
    pub static_services: Cache<StaticService>,
    pub dataplanes: Cache<Dataplane>,
    pub services: Cache<Service>,
    pub endpoint_slices: Cache<EndpointSlice>,
    pub endpoints: Cache<Endpoints>,
    pub nodes: Cache<Node>,
    pub secrets: Cache<Secret>,
    pub config_maps: Cache<ConfigMap>,
    pub namespaces: Cache<Namespace>,
}

impl ResourceStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Gateways that belong to the given class
    pub fn gateways_of_class(&self, class_name: &str) -> Vec<Arc<Gateway>> {
        self.gateways
            .all()
            .into_iter()
            .filter(|gw| gw.spec.gateway_class_name == class_name)
            .collect()
    }

    /// EndpointSlices published for the given Service
    pub fn endpoint_slices_of_service(
        &self,
        namespace: &str,
        service: &str,
    ) -> Vec<Arc<EndpointSlice>> {
        self.endpoint_slices
            .all()
            .into_iter()
            .filter(|slice| {
                slice.namespace().as_deref() == Some(namespace)
                    && slice
                        .labels()
                        .get("kubernetes.io/service-name")
                        .map(|owner| owner == service)
                        .unwrap_or(false)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GatewaySpec, Listener};

    fn gateway(ns: &str, name: &str, class: &str) -> Gateway {
        let mut gw = Gateway::new(
            name,
            GatewaySpec {
                gateway_class_name: class.to_string(),
                listeners: vec![Listener {
                    name: "udp".to_string(),
                    port: 3478,
                    protocol: "UDP".to_string(),
                    allowed_routes: None,
                }],
                addresses: Vec::new(),
            },
        );
        gw.metadata.namespace = Some(ns.to_string());
        gw
    }

    #[test]
    fn upsert_get_delete_roundtrip() {
        let store = ResourceStore::default();
        store.gateways.upsert(gateway("default", "gw", "relay"));

        assert!(store.gateways.get(Some("default"), "gw").is_some());
        assert!(store.gateways.get(Some("other"), "gw").is_none());
        assert!(store.gateways.get(Some("default"), "missing").is_none());

        store
            .gateways
            .delete(&ObjectKey::namespaced("default", "gw"));
        assert!(store.gateways.is_empty());
    }

    #[test]
    fn all_iterates_in_key_order() {
        let store = ResourceStore::default();
        store.gateways.upsert(gateway("b", "gw", "relay"));
        store.gateways.upsert(gateway("a", "gw2", "relay"));
        store.gateways.upsert(gateway("a", "gw1", "relay"));

        let names: Vec<String> = store
            .gateways
            .all()
            .iter()
            .map(|gw| format!("{}/{}", gw.namespace().unwrap_or_default(), gw.name_any()))
            .collect();
        assert_eq!(names, vec!["a/gw1", "a/gw2", "b/gw"]);
    }

    #[test]
    fn gateways_of_class_filters() {
        let store = ResourceStore::default();
        store.gateways.upsert(gateway("default", "one", "relay"));
        store.gateways.upsert(gateway("default", "two", "other"));

        let relay = store.gateways_of_class("relay");
        assert_eq!(relay.len(), 1);
        assert_eq!(relay[0].name_any(), "one");
    }
}
