use std::{collections::HashMap, net::Ipv4Addr};

use log::info;
use serde::{Deserialize, Serialize};

use super::endpoint::Endpoint;
use crate::core::error::{DriverError, Result};

/// IPv4 pool data handed over by the runtime's IPAM.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct IpamData {
    pub address_space: String,
    pub pool: String,
    pub gateway: String,
}

impl IpamData {
    pub fn new(gateway: &str, pool: &str, address_space: &str) -> Self {
        IpamData {
            address_space: address_space.to_string(),
            pool: pool.to_string(),
            gateway: gateway.to_string(),
        }
    }
}

/// The persisted shape of a network. Endpoints never make it to disk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "IPv4Data")]
    pub ipv4_data: IpamData,
}

#[derive(Debug)]
pub struct Network {
    id: String,
    ipv4_data: IpamData,
    endpoints: HashMap<String, Endpoint>,
}

impl Network {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn gateway(&self) -> &str {
        &self.ipv4_data.gateway
    }

    pub fn pool(&self) -> &str {
        &self.ipv4_data.pool
    }

    pub fn address_space(&self) -> &str {
        &self.ipv4_data.address_space
    }

    /// Gateway without its mask, as used for the default route.
    pub fn gateway_address(&self) -> Result<Ipv4Addr> {
        parse_cidr(self.gateway()).map(|(ip, _)| ip)
    }

    pub fn endpoints(&self) -> &HashMap<String, Endpoint> {
        &self.endpoints
    }

    pub fn endpoint(&self, id: &str) -> Result<&Endpoint> {
        self.endpoints
            .get(id)
            .ok_or_else(|| DriverError::not_found(format!("Cannot find endpoint by id: {id}")))
    }

    pub fn endpoint_mut(&mut self, id: &str) -> Result<&mut Endpoint> {
        self.endpoints
            .get_mut(id)
            .ok_or_else(|| DriverError::not_found(format!("Cannot find endpoint by id: {id}")))
    }

    pub(crate) fn insert_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoints.insert(endpoint.id().to_string(), endpoint);
    }

    pub(crate) fn remove_endpoint(&mut self, id: &str) -> Result<Endpoint> {
        self.endpoints
            .remove(id)
            .ok_or_else(|| DriverError::not_found(format!("Cannot find endpoint by id: {id}")))
    }

    pub fn record(&self) -> NetworkRecord {
        NetworkRecord {
            id: self.id.clone(),
            ipv4_data: self.ipv4_data.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct NetworkRegistry {
    networks: HashMap<String, Network>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &str, ipv4_data: IpamData) -> Result<&Network> {
        if let Some(nw) = self.find_by_gateway(&ipv4_data.gateway) {
            return Err(DriverError::conflict(format!(
                "Exist network [{}] with same gateway [{}]",
                nw.id,
                nw.gateway()
            )));
        }

        if self.networks.contains_key(id) {
            return Err(DriverError::conflict(format!(
                "Network [{id}] already exists"
            )));
        }

        info!("RegisterNetwork [{id}] IPv4Data : [ {:?} ]", ipv4_data);
        let network = self.networks.entry(id.to_string()).or_insert(Network {
            id: id.to_string(),
            ipv4_data,
            endpoints: HashMap::new(),
        });

        Ok(network)
    }

    /// Drops the network whatever it still holds. Absent ids are fine.
    pub fn unregister(&mut self, id: &str) -> Option<Network> {
        self.networks.remove(id)
    }

    pub fn lookup(&self, id: &str) -> Result<&Network> {
        self.networks
            .get(id)
            .ok_or_else(|| DriverError::not_found(format!("Can not find network [ {id} ].")))
    }

    pub fn lookup_mut(&mut self, id: &str) -> Result<&mut Network> {
        self.networks
            .get_mut(id)
            .ok_or_else(|| DriverError::not_found(format!("Can not find network [ {id} ].")))
    }

    pub fn find_by_gateway(&self, gateway: &str) -> Option<&Network> {
        self.networks.values().find(|nw| nw.gateway() == gateway)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    /// Persistable records, ordered by id.
    pub fn records(&self) -> Vec<NetworkRecord> {
        let mut records: Vec<NetworkRecord> = self.networks.values().map(Network::record).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

pub fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8)> {
    let invalid = || DriverError::invalid_input(format!("Invalid CIDR [{cidr}]"));

    let (ip_str, len_str) = cidr.split_once('/').ok_or_else(invalid)?;
    let ip = ip_str.parse::<Ipv4Addr>().map_err(|_| invalid())?;
    let len = len_str.parse::<u8>().map_err(|_| invalid())?;

    if len > 32 {
        return Err(DriverError::invalid_input(format!(
            "Invalid prefix length in [{cidr}]"
        )));
    }

    Ok((ip, len))
}

/// Address part of `a.b.c.d/n`; anything without a mask is returned as is.
pub fn address_part(cidr: &str) -> &str {
    cidr.split_once('/').map_or(cidr, |(ip, _)| ip)
}
