use std::net::Ipv4Addr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("interface '{0}' has no IPv4 address")]
    NoIpv4Address(String),

    #[error("interface '{0}' has no MAC address")]
    NoMacAddress(String),

    #[error("could not resolve the gateway {0}")]
    GatewayUnresolved(Ipv4Addr),

    #[error("gateway {0} is outside the interface subnet")]
    GatewayOffSubnet(Ipv4Addr),

    #[error("{0} is not the gateway")]
    NotGateway(Ipv4Addr),

    #[error("network error: {0}")]
    Network(String),

    #[error("insufficient permissions — run with sudo")]
    PermissionDenied,
}

pub type Result<T> = std::result::Result<T, WardenError>;
