//! Custom Resource Definitions for Turngate
//!
//! This module defines the Gateway-style resource graph consumed by the
//! render pipeline: GatewayClass, GatewayConfig, Gateway, UDPRoute,
//! StaticService and Dataplane.

mod dataplane;
mod gateway;
mod gateway_class;
mod gateway_config;
mod static_service;
pub mod types;
mod udp_route;


pub use dataplane::{Dataplane, DataplaneSpec, OffloadEngine};
pub use gateway::{
    AddressHint, AddressType, AllowedRoutes, Gateway, GatewayAddress, GatewaySpec, GatewayStatus,
    Listener, ListenerStatus, NamespacePolicy, RouteNamespaces,
};
pub use gateway_class::{GatewayClass, GatewayClassSpec, GatewayClassStatus, ParametersRef};
pub use gateway_config::{GatewayConfig, GatewayConfigSpec};
pub use static_service::{StaticService, StaticServiceSpec};
pub use types::{Condition, SecretReference, GROUP, MAX_CONDITIONS};
pub use udp_route::{
    BackendRef, ParentReference, RouteParentStatus, RouteRule, UDPRoute, UDPRouteSpec,
    UDPRouteStatus,
};
