//! Update queue: the render pipeline's only output
//!
//! A render pass never touches the API server. It produces one
//! [`UpdateQueue`] per gateway class, a batch of desired objects and status
//! patches, which the control loop applies afterwards. Within a batch the
//! last write to a given object key wins.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

use crate::crd::{GatewayClassStatus, GatewayStatus, UDPRouteStatus};
use crate::store::ObjectKey;

/// Identity of the class a queue was rendered for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub class: String,
}

/// Desired upserts and deletions for one object kind
#[derive(Debug)]
pub struct UpdateSet<K> {
    upserts: BTreeMap<ObjectKey, K>,
    deletes: BTreeSet<ObjectKey>,
}

impl<K> Default for UpdateSet<K> {
    fn default() -> Self {
        Self {
            upserts: BTreeMap::new(),
            deletes: BTreeSet::new(),
        }
    }
}

impl<K> UpdateSet<K> {
    /// Queue an upsert, superseding any earlier write or delete of the key
    pub fn upsert(&mut self, key: ObjectKey, obj: K) {
        self.deletes.remove(&key);
        self.upserts.insert(key, obj);
    }

    /// Queue a delete, superseding any earlier write of the key
    pub fn delete(&mut self, key: ObjectKey) {
        self.upserts.remove(&key);
        self.deletes.insert(key);
    }

    pub fn upserts(&self) -> impl Iterator<Item = (&ObjectKey, &K)> {
        self.upserts.iter()
    }

    pub fn deletes(&self) -> impl Iterator<Item = &ObjectKey> {
        self.deletes.iter()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&K> {
        self.upserts.get(key)
    }

    pub fn is_delete(&self, key: &ObjectKey) -> bool {
        self.deletes.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    fn merge(&mut self, other: UpdateSet<K>) {
        for (key, obj) in other.upserts {
            self.upsert(key, obj);
        }
        for key in other.deletes {
            self.delete(key);
        }
    }
}

/// One render pass' batched output for a single gateway class
#[derive(Debug)]
pub struct UpdateQueue {
    /// Monotonic render generation this queue was produced at
    pub generation: u64,
    pub target: RenderTarget,
    pub config_maps: UpdateSet<ConfigMap>,
    pub deployments: UpdateSet<Deployment>,
    pub services: UpdateSet<Service>,
    /// Status patches, keyed by object; statuses only ever upsert
    pub gateway_class_statuses: BTreeMap<ObjectKey, GatewayClassStatus>,
    pub gateway_statuses: BTreeMap<ObjectKey, GatewayStatus>,
    pub udp_route_statuses: BTreeMap<ObjectKey, UDPRouteStatus>,
}

impl UpdateQueue {
    pub fn new(generation: u64, class: &str) -> Self {
        Self {
            generation,
            target: RenderTarget {
                class: class.to_string(),
            },
            config_maps: UpdateSet::default(),
            deployments: UpdateSet::default(),
            services: UpdateSet::default(),
            gateway_class_statuses: BTreeMap::new(),
            gateway_statuses: BTreeMap::new(),
            udp_route_statuses: BTreeMap::new(),
        }
    }

    /// Fold another queue for the same class into this one; later entries
    /// win. Merging queues of different classes is a programming error.
    pub fn merge(&mut self, other: UpdateQueue) {
        assert_eq!(
            self.target, other.target,
            "update queues of different classes must never merge"
        );
        self.generation = self.generation.max(other.generation);
        self.config_maps.merge(other.config_maps);
        self.deployments.merge(other.deployments);
        self.services.merge(other.services);
        self.gateway_class_statuses.extend(other.gateway_class_statuses);
        self.gateway_statuses.extend(other.gateway_statuses);
        self.udp_route_statuses.extend(other.udp_route_statuses);
    }

    pub fn is_empty(&self) -> bool {
        self.config_maps.is_empty()
            && self.deployments.is_empty()
            && self.services.is_empty()
            && self.gateway_class_statuses.is_empty()
            && self.gateway_statuses.is_empty()
            && self.udp_route_statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map(data: &str) -> ConfigMap {
        ConfigMap {
            data: Some(
                [("turngate.conf".to_string(), data.to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn last_write_wins_within_a_set() {
        let mut set = UpdateSet::default();
        let key = ObjectKey::namespaced("default", "cm");

        set.upsert(key.clone(), config_map("one"));
        set.upsert(key.clone(), config_map("two"));
        assert_eq!(set.upserts().count(), 1);
        let stored = set.get(&key).and_then(|cm| cm.data.clone());
        assert_eq!(
            stored.and_then(|d| d.get("turngate.conf").cloned()),
            Some("two".to_string())
        );

        set.delete(key.clone());
        assert!(set.get(&key).is_none());
        assert!(set.is_delete(&key));

        set.upsert(key.clone(), config_map("three"));
        assert!(!set.is_delete(&key));
        assert!(set.get(&key).is_some());
    }

    #[test]
    fn merge_folds_later_queue_over_earlier() {
        let key = ObjectKey::namespaced("default", "cm");

        let mut first = UpdateQueue::new(1, "relay");
        first.config_maps.upsert(key.clone(), config_map("stale"));

        let mut second = UpdateQueue::new(2, "relay");
        second.config_maps.upsert(key.clone(), config_map("fresh"));

        first.merge(second);
        assert_eq!(first.generation, 2);
        let data = first
            .config_maps
            .get(&key)
            .and_then(|cm| cm.data.clone())
            .and_then(|d| d.get("turngate.conf").cloned());
        assert_eq!(data, Some("fresh".to_string()));
    }

    #[test]
    #[should_panic(expected = "different classes")]
    fn merge_across_classes_panics() {
        let mut a = UpdateQueue::new(1, "relay-a");
        let b = UpdateQueue::new(1, "relay-b");
        a.merge(b);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let queue = UpdateQueue::new(1, "relay");
        assert!(queue.is_empty());
    }
}
