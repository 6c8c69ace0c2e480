//! Applies update queues to the API server
//!
//! Objects are written with forced server-side apply under one field
//! manager, deletes tolerate objects that are already gone, and statuses go
//! through the status subresource. The applier is the only component that
//! writes to the cluster.

use std::fmt::Debug;

use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::crd::{Gateway, GatewayClass, UDPRoute};
use crate::error::{Error, Result};
use crate::renderer::updater::{UpdateQueue, UpdateSet};
use crate::store::ObjectKey;
use crate::FIELD_MANAGER;

pub struct Applier {
    client: Client,
}

impl Applier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Apply one class' queue: owned objects first, then statuses.
    #[instrument(skip(self, queue), fields(class = %queue.target.class, generation = queue.generation))]
    pub async fn apply(&self, queue: &UpdateQueue) -> Result<()> {
        self.apply_set(&queue.config_maps).await?;
        self.apply_set(&queue.deployments).await?;
        self.apply_set(&queue.services).await?;

        for (key, status) in &queue.gateway_class_statuses {
            let api: Api<GatewayClass> = Api::all(self.client.clone());
            patch_status(&api, &key.name, status).await?;
        }
        for (key, status) in &queue.gateway_statuses {
            let api: Api<Gateway> = namespaced(&self.client, key);
            patch_status(&api, &key.name, status).await?;
        }
        for (key, status) in &queue.udp_route_statuses {
            let api: Api<UDPRoute> = namespaced(&self.client, key);
            patch_status(&api, &key.name, status).await?;
        }

        info!("update queue applied");
        Ok(())
    }

    async fn apply_set<K>(&self, set: &UpdateSet<K>) -> Result<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + Debug,
    {
        for (key, obj) in set.upserts() {
            let api: Api<K> = namespaced(&self.client, key);
            debug!(kind = K::kind(&()).as_ref(), key = %key, "server-side apply");
            api.patch(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(obj),
            )
            .await?;
        }
        for key in set.deletes() {
            let api: Api<K> = namespaced(&self.client, key);
            match api.delete(&key.name, &DeleteParams::default()).await {
                Ok(_) => info!(kind = K::kind(&()).as_ref(), key = %key, "deleted"),
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    warn!(kind = K::kind(&()).as_ref(), key = %key, "already gone");
                }
                Err(e) => return Err(Error::KubeError(e)),
            }
        }
        Ok(())
    }
}

fn namespaced<K>(client: &Client, key: &ObjectKey) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    Api::namespaced(client.clone(), key.namespace.as_deref().unwrap_or_default())
}

async fn patch_status<K, S>(api: &Api<K>, name: &str, status: &S) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    S: Serialize,
{
    let patch = serde_json::json!({ "status": status });
    match api
        .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(obj) => {
            debug!(kind = K::kind(&()).as_ref(), name = %obj.name_any(), "status patched");
            Ok(())
        }
        // The object may have been deleted between render and apply.
        Err(kube::Error::Api(e)) if e.code == 404 => {
            warn!(kind = K::kind(&()).as_ref(), name, "status target gone, skipped");
            Ok(())
        }
        Err(e) => Err(Error::KubeError(e)),
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{ConfigMap, Service};

    use super::*;

    fn assert_namespace_scoped<K>()
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
    }

    // Every kind routed through the namespaced helper; GatewayClass is
    // cluster scoped and uses Api::all directly.
    #[test]
    fn applied_kinds_are_namespace_scoped() {
        assert_namespace_scoped::<ConfigMap>();
        assert_namespace_scoped::<Deployment>();
        assert_namespace_scoped::<Service>();
        assert_namespace_scoped::<Gateway>();
        assert_namespace_scoped::<UDPRoute>();
    }
}
