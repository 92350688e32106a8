//! Plain request and response records of the driver operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::network::IpamData;

/// Fixed prefix of the interface name inside the sandbox.
pub const CONTAINER_IFACE_PREFIX: &str = "eth";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Global,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateNetworkRequest {
    pub network_id: String,
    pub ipv4_data: Vec<IpamData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeleteNetworkRequest {
    pub network_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkSummary {
    pub id: String,
    pub gateway: String,
    pub pool: String,
    pub address_space: String,
    pub endpoints: usize,
}

/// Interface fields of an endpoint. `None` means left to the driver.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointInterface {
    pub address: Option<String>,
    pub mac_address: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateEndpointRequest {
    pub network_id: String,
    pub endpoint_id: String,
    pub interface: Option<EndpointInterface>,
}

/// Only the fields the caller did not specify are filled in.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateEndpointResponse {
    pub interface: EndpointInterface,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EndpointRequest {
    pub network_id: String,
    pub endpoint_id: String,
}

impl EndpointRequest {
    pub fn new(network_id: &str, endpoint_id: &str) -> Self {
        EndpointRequest {
            network_id: network_id.to_string(),
            endpoint_id: endpoint_id.to_string(),
        }
    }
}

pub type LeaveRequest = EndpointRequest;
pub type DeleteEndpointRequest = EndpointRequest;
pub type InfoRequest = EndpointRequest;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub network_id: String,
    pub endpoint_id: String,
    pub sandbox_key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InterfaceName {
    pub src_name: String,
    pub dst_prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JoinResponse {
    pub interface_name: InterfaceName,
    pub gateway: String,
    pub disable_gateway_service: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoResponse {
    pub value: BTreeMap<String, String>,
}
