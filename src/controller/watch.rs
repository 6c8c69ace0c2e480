//! Watch streams feeding the snapshot store
//!
//! One task per watched kind. Each event updates the kind's cache and nudges
//! the render loop; the loop itself decides when to re-render, so watchers
//! never block on rendering.

use std::fmt::Debug;
use std::sync::Arc;

use futures::TryStreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Namespace, Node, Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Api, Client, Resource};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::crd::{Dataplane, Gateway, GatewayClass, GatewayConfig, StaticService, UDPRoute};
use crate::store::{Cache, ObjectKey, ResourceStore};

/// Start a watch task for every kind in the resource graph.
pub fn spawn_watchers(client: &Client, store: Arc<ResourceStore>, trigger: mpsc::Sender<()>) {
    spawn::<GatewayClass>(Api::all(client.clone()), &store, |s| &s.gateway_classes, &trigger);
    spawn::<GatewayConfig>(Api::all(client.clone()), &store, |s| &s.gateway_configs, &trigger);
    spawn::<Gateway>(Api::all(client.clone()), &store, |s| &s.gateways, &trigger);
    spawn::<UDPRoute>(Api::all(client.clone()), &store, |s| &s.udp_routes, &trigger);
    spawn::<StaticService>(Api::all(client.clone()), &store, |s| &s.static_services, &trigger);
    spawn::<Dataplane>(Api::all(client.clone()), &store, |s| &s.dataplanes, &trigger);
    spawn::<Service>(Api::all(client.clone()), &store, |s| &s.services, &trigger);
    spawn::<EndpointSlice>(Api::all(client.clone()), &store, |s| &s.endpoint_slices, &trigger);
    spawn::<Endpoints>(Api::all(client.clone()), &store, |s| &s.endpoints, &trigger);
    spawn::<Node>(Api::all(client.clone()), &store, |s| &s.nodes, &trigger);
    spawn::<Secret>(Api::all(client.clone()), &store, |s| &s.secrets, &trigger);
    spawn::<ConfigMap>(Api::all(client.clone()), &store, |s| &s.config_maps, &trigger);
    spawn::<Namespace>(Api::all(client.clone()), &store, |s| &s.namespaces, &trigger);
}

fn spawn<K>(
    api: Api<K>,
    store: &Arc<ResourceStore>,
    cache: fn(&ResourceStore) -> &Cache<K>,
    trigger: &mpsc::Sender<()>,
) where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let store = Arc::clone(store);
    let trigger = trigger.clone();
    tokio::spawn(async move {
        if let Err(err) = watch_into(api, store, cache, trigger).await {
            error!(kind = K::kind(&()).as_ref(), error = %err, "watch stream terminated");
        }
    });
}

async fn watch_into<K>(
    api: Api<K>,
    store: Arc<ResourceStore>,
    cache: fn(&ResourceStore) -> &Cache<K>,
    trigger: mpsc::Sender<()>,
) -> Result<(), watcher::Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let kind = K::kind(&()).to_string();
    info!(kind = %kind, "watch started");

    let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
    // Keys seen during an in-flight re-list; objects deleted while the
    // watch was down are evicted when the listing completes.
    let mut relist_keys: Option<Vec<ObjectKey>> = None;

    while let Some(event) = stream.try_next().await? {
        match event {
            watcher::Event::Apply(obj) => {
                debug!(kind = %kind, key = %ObjectKey::of(&obj), "upsert");
                cache(&store).upsert(obj);
                let _ = trigger.try_send(());
            }
            watcher::Event::Delete(obj) => {
                debug!(kind = %kind, key = %ObjectKey::of(&obj), "delete");
                cache(&store).delete(&ObjectKey::of(&obj));
                let _ = trigger.try_send(());
            }
            watcher::Event::Init => {
                relist_keys = Some(Vec::new());
            }
            watcher::Event::InitApply(obj) => {
                if let Some(keys) = &mut relist_keys {
                    keys.push(ObjectKey::of(&obj));
                }
                cache(&store).upsert(obj);
            }
            watcher::Event::InitDone => {
                if let Some(keys) = relist_keys.take() {
                    cache(&store).retain(&keys);
                }
                info!(kind = %kind, count = cache(&store).len(), "listing complete");
                let _ = trigger.try_send(());
            }
        }
    }
    Ok(())
}
