//! Endpoint/cluster resolver: route → balanced endpoint set
//!
//! Resolves one cluster per route from the backends of the route's first
//! rule. Failures are classified, never silently dropped, and scoped to the
//! backend they concern; only the last non-critical error across a route's
//! backends is retained (bounded memory, last one wins).

use kube::ResourceExt;
use tracing::{debug, warn};

use crate::crd::{BackendRef, UDPRoute, GROUP};
use crate::store::ResourceStore;

use super::artifact::{ClusterConfig, ClusterType};
use super::errors::{NonCriticalError, NonCriticalReason};
use super::RenderSettings;

/// Outcome of cluster resolution for one route
#[derive(Debug, Default)]
pub struct ClusterResolution {
    pub cluster: Option<ClusterConfig>,
    /// Last non-critical error seen while resolving this route's backends
    pub error: Option<NonCriticalError>,
}

/// Resolve the cluster for `route`.
pub fn render_cluster(
    store: &ResourceStore,
    route: &UDPRoute,
    settings: &RenderSettings,
) -> ClusterResolution {
    let route_ns = route.namespace().unwrap_or_default();
    let route_key = format!("{}/{}", route_ns, route.name_any());

    let Some(rule) = route.spec.rules.first() else {
        return ClusterResolution {
            cluster: None,
            error: Some(NonCriticalError::new(
                NonCriticalReason::BackendNotFound,
                route_key,
            )),
        };
    };
    if route.spec.rules.len() > 1 {
        warn!(route = %route_key, rules = route.spec.rules.len(), "only the first route rule is used, extra rules ignored");
    }

    let mut endpoints: Vec<String> = Vec::new();
    let mut cluster_type: Option<ClusterType> = None;
    let mut last_error: Option<NonCriticalError> = None;
    let mut resolved_backends = 0usize;
    let mut aborted = false;

    for backend in &rule.backend_refs {
        let backend_ns = backend.namespace.clone().unwrap_or_else(|| route_ns.clone());
        let backend_key = format!("{}/{}", backend_ns, backend.name);

        if let Some(group) = backend.group.as_deref() {
            if !group.is_empty() && group != GROUP {
                debug!(backend = %backend_key, group, "backend group not ours");
                last_error = Some(NonCriticalError::new(
                    NonCriticalReason::InvalidBackendGroup,
                    backend_key,
                ));
                continue;
            }
        }

        let (backend_endpoints, backend_type) = match backend.kind.as_deref().unwrap_or("Service")
        {
            "Service" => {
                match resolve_service_backend(store, settings, backend, &backend_ns, &backend_key)
                {
                    Ok((eps, backend_type, partial)) => {
                        if partial.is_some() {
                            last_error = partial;
                        }
                        (eps, backend_type)
                    }
                    Err(err) => {
                        last_error = Some(err);
                        continue;
                    }
                }
            }
            "StaticService" => {
                match store.static_services.get(Some(&backend_ns), &backend.name) {
                    Some(ss) => (ss.spec.prefixes.clone(), ClusterType::Static),
                    None => {
                        last_error = Some(NonCriticalError::new(
                            NonCriticalReason::BackendNotFound,
                            backend_key,
                        ));
                        continue;
                    }
                }
            }
            other => {
                debug!(backend = %backend_key, kind = other, "unsupported backend kind");
                last_error = Some(NonCriticalError::new(
                    NonCriticalReason::InvalidBackendKind,
                    backend_key,
                ));
                continue;
            }
        };

        // All contributing backends must agree on one balancing type. The
        // first mismatch aborts accumulation and discards what was gathered.
        match cluster_type {
            None => cluster_type = Some(backend_type),
            Some(existing) if existing != backend_type => {
                last_error = Some(NonCriticalError::new(
                    NonCriticalReason::InconsistentClusterType,
                    route_key.clone(),
                ));
                endpoints.clear();
                resolved_backends = 0;
                aborted = true;
                break;
            }
            Some(_) => {}
        }

        let mut backend_endpoints = backend_endpoints;
        if backend_type == ClusterType::Static {
            if let Some(suffix) = port_range_suffix(backend) {
                for endpoint in &mut backend_endpoints {
                    endpoint.push(':');
                    endpoint.push_str(&suffix);
                }
            }
        }

        endpoints.extend(backend_endpoints);
        resolved_backends += 1;
    }

    if aborted || resolved_backends == 0 {
        return ClusterResolution {
            cluster: None,
            error: Some(last_error.unwrap_or_else(|| {
                NonCriticalError::new(NonCriticalReason::BackendNotFound, route_key)
            })),
        };
    }

    ClusterResolution {
        cluster: Some(ClusterConfig {
            name: route_key,
            type_: cluster_type.unwrap_or_default(),
            endpoints,
        }),
        error: last_error,
    }
}

/// Resolve a dynamic Service backend.
///
/// With endpoint discovery enabled, live member addresses come from one of
/// the two endpoint-publishing APIs; independently, the relay-to-cluster-IP
/// flag adds the Service's cluster IP. The two attempts union; both failing
/// skips only this backend; one succeeding keeps the backend usable and the
/// partial failure is reported alongside. With discovery off a single
/// DNS-name endpoint is synthesized instead.
#[allow(clippy::type_complexity)]
fn resolve_service_backend(
    store: &ResourceStore,
    settings: &RenderSettings,
    backend: &BackendRef,
    backend_ns: &str,
    backend_key: &str,
) -> Result<(Vec<String>, ClusterType, Option<NonCriticalError>), NonCriticalError> {
    if !settings.enable_endpoint_discovery {
        return Ok((
            vec![format!("{}.{}.svc", backend.name, backend_ns)],
            ClusterType::StrictDns,
            None,
        ));
    }

    let mut endpoints = if settings.endpoint_slice_api {
        discover_from_endpoint_slices(store, backend_ns, &backend.name)
    } else {
        discover_from_endpoints(store, backend_ns, &backend.name)
    };
    let mut last_error = if endpoints.is_empty() {
        Some(NonCriticalError::new(
            NonCriticalReason::EndpointNotFound,
            backend_key.to_string(),
        ))
    } else {
        None
    };

    if settings.enable_relay_cluster_ip {
        match store
            .services
            .get(Some(backend_ns), &backend.name)
            .and_then(|svc| svc.spec.as_ref().and_then(|spec| spec.cluster_ip.clone()))
            .filter(|ip| !ip.is_empty() && ip != "None")
        {
            Some(cluster_ip) => endpoints.push(cluster_ip),
            None => {
                // Headless or absent Service: record and continue, the pod
                // endpoint set may still be usable.
                last_error = Some(NonCriticalError::new(
                    NonCriticalReason::ClusterIPNotFound,
                    backend_key.to_string(),
                ));
            }
        }
    }

    if endpoints.is_empty() {
        return Err(NonCriticalError::new(
            NonCriticalReason::BackendNotFound,
            backend_key.to_string(),
        ));
    }

    endpoints.sort();
    endpoints.dedup();

    if let Some(err) = &last_error {
        debug!(backend = %backend_key, reason = %err.reason, "partial backend resolution");
    }
    Ok((endpoints, ClusterType::Static, last_error))
}

fn discover_from_endpoint_slices(store: &ResourceStore, ns: &str, service: &str) -> Vec<String> {
    let mut addresses = Vec::new();
    for slice in store.endpoint_slices_of_service(ns, service) {
        for endpoint in &slice.endpoints {
            let ready = endpoint
                .conditions
                .as_ref()
                .and_then(|c| c.ready)
                .unwrap_or(true);
            if !ready {
                continue;
            }
            addresses.extend(endpoint.addresses.iter().cloned());
        }
    }
    addresses
}

fn discover_from_endpoints(store: &ResourceStore, ns: &str, service: &str) -> Vec<String> {
    let mut addresses = Vec::new();
    if let Some(endpoints) = store.endpoints.get(Some(ns), service) {
        for subset in endpoints.subsets.iter().flatten() {
            for addr in subset.addresses.iter().flatten() {
                addresses.push(addr.ip.clone());
            }
        }
    }
    addresses
}

/// Bracketed relay port-range tag for a backend, if one is declared and
/// in-range. Out-of-range values are ignored, not errors, and the default
/// range is never suffixed.
fn port_range_suffix(backend: &BackendRef) -> Option<String> {
    let start = backend.port?;
    let end = backend.end_port.unwrap_or(start);
    if !(1..=65535).contains(&start) || !(1..=65535).contains(&end) || end < start {
        return None;
    }
    Some(format!("<{start}-{end}>"))
}
