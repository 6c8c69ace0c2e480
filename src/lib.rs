//! Turngate: Kubernetes Gateway Operator for TURN/STUN Relay Fleets
//!
//! This crate renders the dataplane configuration for a fleet of TURN/STUN
//! relay instances from a Gateway-style resource graph and reconciles the
//! auxiliary objects (config carrier, workload, public exposure Service)
//! needed to run that fleet.

pub mod controller;
pub mod crd;
pub mod error;
pub mod renderer;
pub mod store;
pub mod telemetry;

pub use crate::error::{Error, Result};

/// Controller name claimed in GatewayClass resources managed by this operator.
pub const CONTROLLER_NAME: &str = "turngate.io/gateway-operator";

/// Field manager used for server-side apply.
pub const FIELD_MANAGER: &str = "turngate-operator";
