//! Admin resolver: instance-level dataplane settings
//!
//! Produces the instance name, log level, metrics/health-check endpoints
//! and (managed topology) the packet offload settings. Validation fills
//! remaining defaults and fails only on structurally invalid enum values.

use crate::crd::{Dataplane, GatewayConfig, OffloadEngine};

use super::artifact::AdminConfig;
use super::errors::CriticalError;

/// Log level applied when neither the config nor the package overrides it.
pub const DEFAULT_LOG_LEVEL: &str = "all:INFO";

/// Metrics scrape endpoint exposed when the Dataplane enables it.
pub const METRICS_ENDPOINT: &str = "http://0.0.0.0:8080/metrics";

/// Liveness/readiness endpoint; on unless the Dataplane disables it.
pub const HEALTH_CHECK_ENDPOINT: &str = "http://0.0.0.0:8086";

const LOG_LEVELS: [&str; 6] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR", "CRITICAL"];

/// Render the admin block of the artifact.
///
/// `dataplane` is `None` in the legacy topology; metrics stay off and the
/// health-check stays on in that case.
pub fn render_admin(
    config: &GatewayConfig,
    dataplane: Option<&Dataplane>,
    instance_name: &str,
) -> Result<AdminConfig, CriticalError> {
    let log_level = config
        .spec
        .log_level
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    validate_log_level(&log_level)?;

    let metrics_endpoint = dataplane
        .filter(|dp| dp.spec.enable_metrics_endpoint)
        .map(|_| METRICS_ENDPOINT.to_string());

    let health_check_endpoint = if dataplane.map(|dp| dp.spec.disable_health_check) == Some(true) {
        None
    } else {
        Some(HEALTH_CHECK_ENDPOINT.to_string())
    };

    let (offload_engine, offload_interfaces) = match dataplane {
        Some(dp) => {
            let engine: OffloadEngine = dp
                .spec
                .offload_engine
                .as_deref()
                .unwrap_or("none")
                .parse()
                .map_err(CriticalError::InvalidAdminConfig)?;
            (engine, dp.spec.offload_interfaces.clone())
        }
        None => (OffloadEngine::None, Vec::new()),
    };

    Ok(AdminConfig {
        name: instance_name.to_string(),
        log_level,
        metrics_endpoint,
        health_check_endpoint,
        offload_engine: offload_engine.to_string(),
        offload_interfaces,
    })
}

/// A log level is a comma-separated list of `<scope>:<LEVEL>` items, with a
/// bare `<LEVEL>` allowed as shorthand for `all:<LEVEL>`.
fn validate_log_level(spec: &str) -> Result<(), CriticalError> {
    for item in spec.split(',') {
        let level = item.rsplit(':').next().unwrap_or(item).trim();
        if !LOG_LEVELS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(level))
        {
            return Err(CriticalError::InvalidAdminConfig(format!(
                "unknown log level {item:?}"
            )));
        }
    }
    Ok(())
}
