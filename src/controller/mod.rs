//! Control loop: watch the resource graph, render, apply
//!
//! Watchers stream every kind in the graph into the snapshot store and
//! nudge the render loop through a trigger channel. The render loop
//! debounces triggers, runs one render pass over the whole store and hands
//! the resulting update queues to the applier.

mod applier;
mod watch;

pub use applier::Applier;
pub use watch::spawn_watchers;

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client, CustomResourceExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::crd::{Dataplane, Gateway, GatewayClass, GatewayConfig, StaticService, UDPRoute};
use crate::error::{Error, Result};
use crate::renderer::{RenderSettings, Renderer};
use crate::store::ResourceStore;

/// Quiet period after a trigger before a render pass starts, so bursts of
/// watch events collapse into one pass
const RENDER_DEBOUNCE: Duration = Duration::from_millis(250);

/// Shared state of the running operator
pub struct ControllerState {
    pub client: Client,
    pub store: Arc<ResourceStore>,
    pub settings: RenderSettings,
}

/// Verify that every CRD of the resource graph is installed.
///
/// The operator refuses to start against a cluster missing its API surface;
/// a watcher on a missing kind would otherwise fail in a loop.
pub async fn ensure_crds_installed(client: &Client) -> Result<()> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let required = [
        GatewayClass::crd_name(),
        GatewayConfig::crd_name(),
        Gateway::crd_name(),
        UDPRoute::crd_name(),
        StaticService::crd_name(),
        Dataplane::crd_name(),
    ];
    for name in required {
        match api.get(name).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 404 => {
                return Err(Error::ConfigError(format!(
                    "required CRD {name} is not installed"
                )));
            }
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
    info!("all required CRDs installed");
    Ok(())
}

/// Run the operator until the watch streams end.
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    ensure_crds_installed(&state.client).await?;

    let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(64);
    spawn_watchers(&state.client, Arc::clone(&state.store), trigger_tx);

    let renderer = Renderer::new(Arc::clone(&state.store), state.settings.clone());
    let applier = Applier::new(state.client.clone());
    let mut generation: u64 = 0;

    info!(mode = %state.settings.dataplane_mode, "controller started");

    while trigger_rx.recv().await.is_some() {
        tokio::time::sleep(RENDER_DEBOUNCE).await;
        while trigger_rx.try_recv().is_ok() {}

        generation += 1;
        let queues = renderer.render(generation, None);
        for queue in queues {
            let class = queue.target.class.clone();
            if let Err(err) = applier.apply(&queue).await {
                // The next watch event retries; the store still holds the
                // desired state.
                error!(class = %class, error = %err, "failed to apply update queue");
            }
        }
    }

    warn!("trigger channel closed, controller stopping");
    Ok(())
}
