//! Render pipeline: resource graph in, update queues out
//!
//! Rendering is a pure function over the snapshot store. One unit of work is
//! a gateway class: its policy object, its gateways, the routes attached to
//! them and their backends are resolved into a relay configuration artifact
//! plus the workload objects carrying it. The pipeline never talks to the
//! API server; it emits one [`UpdateQueue`](updater::UpdateQueue) per class
//! which the control loop applies afterwards.

pub mod address;
pub mod admin;
pub mod artifact;
pub mod auth;
pub mod cluster;
pub mod errors;
pub mod listener;
pub mod status;
pub mod updater;
pub mod workload;


use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::crd::{
    AddressType, Dataplane, Gateway, GatewayAddress, GatewayClass, GatewayClassStatus,
    GatewayConfig, Listener, ParentReference, UDPRoute, UDPRouteStatus,
};
use crate::store::{ObjectKey, ResourceStore};
use crate::CONTROLLER_NAME;

use address::{resolve_addresses, AddressResolution};
use artifact::{AuthConfig, ClusterConfig, ListenerConfig, RelayConfig};
use cluster::{render_cluster, ClusterResolution};
use errors::{CriticalError, NonCriticalReason};
use listener::{listener_config_name, render_listener, route_attaches, ListenerProtocol};
use status::{
    class_accepted, gateway_accepted, gateway_address, gateway_programmed, listener_status,
    route_parent_status, set_condition, REASON_INVALID, REASON_RESOLVED_REFS,
};
use updater::UpdateQueue;
use workload::{
    build_dataplane_deployment, build_exposure_service, build_relay_config_map, class_labels,
    related_labels, LABEL_RELATED_CLASS,
};

/// How rendered artifacts map onto dataplane workloads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataplaneMode {
    /// One shared artifact per class; the dataplane fleet is operated out of
    /// band
    Legacy,
    /// One artifact, Deployment and exposure Service per Gateway
    #[default]
    Managed,
}

impl FromStr for DataplaneMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(DataplaneMode::Legacy),
            "managed" => Ok(DataplaneMode::Managed),
            other => Err(format!("unknown dataplane mode {other:?}")),
        }
    }
}

impl std::fmt::Display for DataplaneMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataplaneMode::Legacy => write!(f, "legacy"),
            DataplaneMode::Managed => write!(f, "managed"),
        }
    }
}

/// Operator-level settings the pipeline renders under
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub dataplane_mode: DataplaneMode,
    /// Resolve live pod addresses for Service backends
    pub enable_endpoint_discovery: bool,
    /// Use the EndpointSlice API instead of the legacy Endpoints API
    pub endpoint_slice_api: bool,
    /// Also relay to the backend Service's cluster IP
    pub enable_relay_cluster_ip: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            dataplane_mode: DataplaneMode::Managed,
            enable_endpoint_discovery: true,
            endpoint_slice_api: true,
            enable_relay_cluster_ip: false,
        }
    }
}

/// Routing outcome for one route within one class
struct RouteOutcome {
    route: Arc<UDPRoute>,
    /// Every parent reference of the route with its attachment verdict;
    /// references that resolve to no gateway of the class are carried as
    /// not accepted
    parents: Vec<(ParentReference, bool)>,
    resolution: ClusterResolution,
}

/// The render pipeline
pub struct Renderer {
    store: Arc<ResourceStore>,
    settings: RenderSettings,
}

impl Renderer {
    pub fn new(store: Arc<ResourceStore>, settings: RenderSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Render every class owned by this controller, or just `target`.
    ///
    /// Classes with an invalid parameters reference are not units of work at
    /// all: they get no queue and their objects are left untouched.
    #[instrument(skip(self))]
    pub fn render(&self, generation: u64, target: Option<&str>) -> Vec<UpdateQueue> {
        let mut queues = Vec::new();
        for class in self.store.gateway_classes.all() {
            if class.spec.controller_name != CONTROLLER_NAME {
                continue;
            }
            if let Some(name) = target {
                if class.name_any() != name {
                    continue;
                }
            }
            if !class.has_valid_parameters_ref() {
                debug!(class = %class.name_any(), "parameters reference invalid, class skipped");
                continue;
            }
            queues.push(self.render_class(generation, &class));
        }
        info!(generation, queues = queues.len(), "render pass complete");
        queues
    }

    fn render_class(&self, generation: u64, class: &GatewayClass) -> UpdateQueue {
        let mut queue = UpdateQueue::new(generation, &class.name_any());
        if let Err(err) = self.try_render_class(&mut queue, class) {
            warn!(class = %class.name_any(), error = %err, "render failed, invalidating class");
            self.invalidate_class(&mut queue, class, &err);
        }
        queue
    }

    /// Render one class end to end; any error here is critical and triggers
    /// invalidation of the whole unit.
    fn try_render_class(
        &self,
        queue: &mut UpdateQueue,
        class: &GatewayClass,
    ) -> Result<(), CriticalError> {
        let class_name = class.name_any();
        let params = &class.spec.parameters_ref;
        let config = self
            .store
            .gateway_configs
            .get(params.namespace.as_deref(), &params.name)
            .ok_or_else(|| {
                CriticalError::NoGatewayConfig(format!(
                    "{}/{}",
                    params.namespace.as_deref().unwrap_or_default(),
                    params.name
                ))
            })?;

        // Validate every class-wide input before queueing any output, so an
        // invalidated queue never carries half-rendered objects.
        let auth = auth::render_auth(&self.store, &config)?;
        let gateways = self.store.gateways_of_class(&class_name);
        let outcomes = self.route_outcomes(&gateways);

        match self.settings.dataplane_mode {
            DataplaneMode::Legacy => {
                self.render_legacy(queue, &class_name, &config, &auth, &gateways, &outcomes)?;
            }
            DataplaneMode::Managed => {
                let name = config.spec.dataplane.as_deref().unwrap_or("default");
                let dataplane = self
                    .store
                    .dataplanes
                    .get(None, name)
                    .ok_or_else(|| CriticalError::NoDataplane(name.to_string()))?;
                self.render_managed(queue, &config, &auth, &dataplane, &gateways, &outcomes)?;
            }
        }

        self.queue_class_status(queue, class, true, "class accepted, configuration rendered");
        self.queue_route_statuses(queue, &outcomes);
        Ok(())
    }

    /// One shared artifact for the whole class, written to the config's
    /// target ConfigMap. No workloads are managed in this topology.
    fn render_legacy(
        &self,
        queue: &mut UpdateQueue,
        class_name: &str,
        config: &GatewayConfig,
        auth: &AuthConfig,
        gateways: &[Arc<Gateway>],
        outcomes: &BTreeMap<ObjectKey, RouteOutcome>,
    ) -> Result<(), CriticalError> {
        let config_ns = config.namespace().unwrap_or_else(|| "default".to_string());
        let artifact_name = format!("{}/{}", config_ns, config.relay_config_name());

        let mut relay = RelayConfig {
            admin: admin::render_admin(config, None, &artifact_name)?,
            auth: auth.clone(),
            listeners: Vec::new(),
            clusters: Vec::new(),
        };

        for gw in gateways {
            let resolution = resolve_addresses(&self.store, gw);
            let (listeners, _) =
                self.render_gateway_listeners(queue, gw, config, &resolution, outcomes);
            relay.listeners.extend(listeners);
        }
        relay.clusters = accepted_clusters(outcomes, None);

        let content = relay.to_json().unwrap_or_default();
        queue.config_maps.upsert(
            ObjectKey::namespaced(&config_ns, config.relay_config_name()),
            build_relay_config_map(
                &config_ns,
                config.relay_config_name(),
                class_labels(class_name),
                None,
                content,
            ),
        );
        Ok(())
    }

    /// One artifact, Deployment and exposure Service per Gateway.
    fn render_managed(
        &self,
        queue: &mut UpdateQueue,
        config: &GatewayConfig,
        auth: &AuthConfig,
        dataplane: &Dataplane,
        gateways: &[Arc<Gateway>],
        outcomes: &BTreeMap<ObjectKey, RouteOutcome>,
    ) -> Result<(), CriticalError> {
        // Admin settings are gateway-independent apart from the instance
        // name, so a validation failure hits before anything is queued.
        for gw in gateways {
            let gw_ns = gw.namespace().unwrap_or_else(|| "default".to_string());
            let gw_key = ObjectKey::namespaced(&gw_ns, &gw.name_any());
            let artifact_name = gw_key.to_string();

            let resolution = resolve_addresses(&self.store, gw);
            let mut relay = RelayConfig {
                admin: admin::render_admin(config, Some(dataplane), &artifact_name)?,
                auth: auth.clone(),
                listeners: Vec::new(),
                clusters: Vec::new(),
            };
            let (listeners, _) =
                self.render_gateway_listeners(queue, gw, config, &resolution, outcomes);
            relay.listeners = listeners;
            relay.clusters = accepted_clusters(outcomes, Some(gw.as_ref()));

            let content = relay.to_json().unwrap_or_default();
            queue.config_maps.upsert(
                gw_key.clone(),
                build_relay_config_map(
                    &gw_ns,
                    &gw.name_any(),
                    related_labels(gw),
                    Some(gw.as_ref()),
                    content,
                ),
            );
            queue.deployments.upsert(
                gw_key.clone(),
                build_dataplane_deployment(gw, &gw.name_any(), dataplane),
            );
            queue.services.upsert(
                gw_key,
                build_exposure_service(gw, config, Some(dataplane)),
            );
        }
        Ok(())
    }

    /// Render the listeners of one Gateway and queue its status.
    ///
    /// Returns the rendered listener configurations; the second element is
    /// whether the Gateway is fully programmed.
    fn render_gateway_listeners(
        &self,
        queue: &mut UpdateQueue,
        gw: &Gateway,
        config: &GatewayConfig,
        resolution: &AddressResolution,
        outcomes: &BTreeMap<ObjectKey, RouteOutcome>,
    ) -> (Vec<ListenerConfig>, bool) {
        let mut rendered = Vec::new();
        let mut listener_statuses = Vec::new();
        let mut programmed = true;

        for l in &gw.spec.listeners {
            let routes = attached_route_names(&self.store, gw, l, outcomes);
            let attached = routes.len() as i32;

            let Some(protocol) = ListenerProtocol::parse(&l.protocol) else {
                debug!(listener = %listener_config_name(gw, l), protocol = %l.protocol, "unsupported listener protocol, skipped");
                programmed = false;
                listener_statuses.push(listener_status(
                    &l.name,
                    attached,
                    false,
                    &format!("unsupported protocol {:?}", l.protocol),
                    false,
                    REASON_INVALID,
                    "listener not rendered",
                ));
                continue;
            };

            let public = resolution.by_listener.get(&l.name);
            let (resolved_reason, resolved_message) = match public {
                Some(_) => (REASON_RESOLVED_REFS, "all references resolved".to_string()),
                None => {
                    programmed = false;
                    match resolution.error.as_ref() {
                        Some(err) => (err.reason.as_str(), err.to_string()),
                        None => (
                            NonCriticalReason::PublicListenerAddressNotFound.as_str(),
                            format!("no public address for listener {}", l.name),
                        ),
                    }
                }
            };
            rendered.push(render_listener(gw, l, protocol, public, config, routes));
            listener_statuses.push(listener_status(
                &l.name,
                attached,
                true,
                "listener rendered",
                public.is_some(),
                resolved_reason,
                &resolved_message,
            ));
        }

        let mut gw_status = gw.status.clone().unwrap_or_default();
        let generation = gw.metadata.generation;
        set_condition(
            &mut gw_status.conditions,
            gateway_accepted(true, generation, "gateway accepted"),
        );
        set_condition(
            &mut gw_status.conditions,
            gateway_programmed(
                programmed,
                generation,
                if programmed {
                    "dataplane configuration rendered"
                } else {
                    "waiting for listeners or public address"
                },
            ),
        );
        gw_status.addresses = public_addresses(resolution);
        gw_status.listeners = listener_statuses;

        queue
            .gateway_statuses
            .insert(ObjectKey::of(gw), gw_status);

        (rendered, programmed)
    }

    /// Routing and backend resolution verdicts for every route in the store.
    /// Computed once per class and shared by the artifact renderers and the
    /// status reconciler.
    ///
    /// A parent reference that names no gateway of the class still yields a
    /// status entry, so dangling references surface as not accepted instead
    /// of disappearing.
    fn route_outcomes(&self, gateways: &[Arc<Gateway>]) -> BTreeMap<ObjectKey, RouteOutcome> {
        let mut outcomes = BTreeMap::new();
        for route in self.store.udp_routes.all() {
            let mut parents = Vec::new();
            for parent_ref in &route.spec.parent_refs {
                let accepted = match find_parent_gateway(gateways, &route, parent_ref) {
                    Some(gw) => gw
                        .spec
                        .listeners
                        .iter()
                        .any(|l| route_attaches(&self.store, &route, parent_ref, gw, l)),
                    None => false,
                };
                parents.push((parent_ref.clone(), accepted));
            }
            let resolution = render_cluster(&self.store, &route, &self.settings);
            outcomes.insert(
                ObjectKey::of(route.as_ref()),
                RouteOutcome {
                    route,
                    parents,
                    resolution,
                },
            );
        }
        outcomes
    }

    fn queue_class_status(
        &self,
        queue: &mut UpdateQueue,
        class: &GatewayClass,
        accepted: bool,
        message: &str,
    ) {
        let mut conditions = class
            .status
            .clone()
            .unwrap_or_default()
            .conditions;
        set_condition(&mut conditions, class_accepted(accepted, message));
        queue.gateway_class_statuses.insert(
            ObjectKey::cluster(&class.name_any()),
            GatewayClassStatus { conditions },
        );
    }

    fn queue_route_statuses(
        &self,
        queue: &mut UpdateQueue,
        outcomes: &BTreeMap<ObjectKey, RouteOutcome>,
    ) {
        for (key, outcome) in outcomes {
            let parents = outcome
                .parents
                .iter()
                .map(|(parent_ref, accepted)| {
                    route_parent_status(parent_ref, *accepted, outcome.resolution.error.as_ref())
                })
                .collect();
            queue
                .udp_route_statuses
                .insert(key.clone(), UDPRouteStatus { parents });
        }
    }

    /// Withdraw the class' configuration: re-render its artifacts as the
    /// explicit zero value and surface the error on every status in scope.
    /// Route statuses are still fully processed so per-route diagnostics
    /// survive the outage.
    fn invalidate_class(&self, queue: &mut UpdateQueue, class: &GatewayClass, err: &CriticalError) {
        let class_name = class.name_any();
        let gateways = self.store.gateways_of_class(&class_name);

        self.queue_class_status(queue, class, false, &err.to_string());

        match self.settings.dataplane_mode {
            DataplaneMode::Legacy => {
                // The target name lives on the (possibly missing) config, so
                // previously written artifacts are found by their class label.
                for cm in self.store.config_maps.all() {
                    if cm.labels().get(LABEL_RELATED_CLASS) != Some(&class_name) {
                        continue;
                    }
                    let ns = cm.namespace().unwrap_or_else(|| "default".to_string());
                    let name = cm.name_any();
                    let zero = RelayConfig::zero(&format!("{ns}/{name}"))
                        .to_json()
                        .unwrap_or_default();
                    queue.config_maps.upsert(
                        ObjectKey::namespaced(&ns, &name),
                        build_relay_config_map(&ns, &name, class_labels(&class_name), None, zero),
                    );
                }
            }
            DataplaneMode::Managed => {
                for gw in &gateways {
                    let gw_ns = gw.namespace().unwrap_or_else(|| "default".to_string());
                    let gw_key = ObjectKey::namespaced(&gw_ns, &gw.name_any());
                    let zero = RelayConfig::zero(&gw_key.to_string())
                        .to_json()
                        .unwrap_or_default();
                    queue.config_maps.upsert(
                        gw_key.clone(),
                        build_relay_config_map(
                            &gw_ns,
                            &gw.name_any(),
                            related_labels(gw),
                            Some(gw.as_ref()),
                            zero,
                        ),
                    );
                    if matches!(err, CriticalError::NoDataplane(_)) {
                        queue.deployments.delete(gw_key);
                    }
                }
            }
        }

        for gw in &gateways {
            let mut gw_status = gw.status.clone().unwrap_or_default();
            let generation = gw.metadata.generation;
            set_condition(
                &mut gw_status.conditions,
                gateway_accepted(true, generation, "gateway accepted"),
            );
            set_condition(
                &mut gw_status.conditions,
                gateway_programmed(false, generation, &err.to_string()),
            );
            queue
                .gateway_statuses
                .insert(ObjectKey::of(gw.as_ref()), gw_status);
        }

        let outcomes = self.route_outcomes(&gateways);
        self.queue_route_statuses(queue, &outcomes);
    }
}

/// The gateway of the class a parent reference points at, if any
fn find_parent_gateway<'a>(
    gateways: &'a [Arc<Gateway>],
    route: &UDPRoute,
    parent_ref: &ParentReference,
) -> Option<&'a Arc<Gateway>> {
    let parent_ns = parent_ref
        .namespace
        .clone()
        .or_else(|| route.namespace())?;
    gateways
        .iter()
        .find(|gw| {
            gw.name_any() == parent_ref.name
                && gw.namespace().as_deref() == Some(parent_ns.as_str())
        })
}

/// Route keys attached to one listener, in key order
fn attached_route_names(
    store: &ResourceStore,
    gw: &Gateway,
    l: &Listener,
    outcomes: &BTreeMap<ObjectKey, RouteOutcome>,
) -> Vec<String> {
    outcomes
        .iter()
        .filter(|(_, outcome)| {
            outcome
                .route
                .spec
                .parent_refs
                .iter()
                .any(|parent_ref| route_attaches(store, &outcome.route, parent_ref, gw, l))
        })
        .map(|(key, _)| key.to_string())
        .collect()
}

/// Clusters of every accepted route in scope, in key order.
///
/// With a gateway given, only routes attached to that gateway contribute
/// (per-gateway artifacts); otherwise every accepted route does.
fn accepted_clusters(
    outcomes: &BTreeMap<ObjectKey, RouteOutcome>,
    gw: Option<&Gateway>,
) -> Vec<ClusterConfig> {
    outcomes
        .values()
        .filter(|outcome| match gw {
            Some(gw) => outcome.parents.iter().any(|(parent_ref, accepted)| {
                *accepted
                    && parent_ref.name == gw.name_any()
                    && parent_ref
                        .namespace
                        .clone()
                        .or_else(|| outcome.route.namespace())
                        == gw.namespace()
            }),
            None => outcome.parents.iter().any(|(_, accepted)| *accepted),
        })
        .filter_map(|outcome| outcome.resolution.cluster.clone())
        .collect()
}

/// Deduplicated status addresses from a resolution
fn public_addresses(resolution: &AddressResolution) -> Vec<GatewayAddress> {
    let mut seen: Vec<(AddressType, String)> = Vec::new();
    for public in resolution.by_listener.values() {
        let key = (public.address_type, public.address.clone());
        if !seen.contains(&key) {
            seen.push(key);
        }
    }
    seen.into_iter()
        .map(|(type_, value)| gateway_address(type_, &value))
        .collect()
}
