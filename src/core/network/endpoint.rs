use std::collections::BTreeMap;

use log::{debug, info};

use super::{
    api::*,
    network::{address_part, NetworkRegistry},
    nic::{HostNic, NicInventory},
};
use crate::core::error::{DriverError, Result};

/// A container attachment, bound to exactly one host NIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    id: String,
    nic: String,
    src_name: String,
    sandbox_key: String,
}

impl Endpoint {
    fn bind_to(id: &str, nic: &HostNic) -> Self {
        Endpoint {
            id: id.to_string(),
            nic: nic.hardware_addr().to_string(),
            src_name: nic.name().to_string(),
            sandbox_key: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hardware address of the bound NIC.
    pub fn nic(&self) -> &str {
        &self.nic
    }

    /// NIC name as it was at bind time.
    pub fn src_name(&self) -> &str {
        &self.src_name
    }

    pub fn sandbox_key(&self) -> &str {
        &self.sandbox_key
    }

    pub fn is_joined(&self) -> bool {
        !self.sandbox_key.is_empty()
    }
}

/// Networks, their endpoints and the NICs those endpoints hold.
///
/// Lifecycle of one endpoint: create binds a free NIC, join records the
/// sandbox, leave forgets it, delete hands the NIC back.
pub struct EndpointBinder {
    networks: NetworkRegistry,
    nics: NicInventory,
    require_mac_address: bool,
}

impl EndpointBinder {
    pub fn new(networks: NetworkRegistry, nics: NicInventory, require_mac_address: bool) -> Self {
        EndpointBinder {
            networks,
            nics,
            require_mac_address,
        }
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    pub fn networks_mut(&mut self) -> &mut NetworkRegistry {
        &mut self.networks
    }

    pub fn nics(&self) -> &NicInventory {
        &self.nics
    }

    pub async fn create(&mut self, req: &CreateEndpointRequest) -> Result<CreateEndpointResponse> {
        let network = self.networks.lookup(&req.network_id)?;
        if network.endpoints().contains_key(&req.endpoint_id) {
            return Err(DriverError::conflict(format!(
                "Endpoint [{}] already exists in network [{}]",
                req.endpoint_id, req.network_id
            )));
        }

        let requested = req.interface.clone().unwrap_or_default();
        let requested_address = requested.address.as_deref().filter(|a| !a.is_empty());

        let hardware_addr = self.resolve_nic(&requested).await?;
        let nic = self.nics.bind(&hardware_addr, &req.endpoint_id)?;
        if let Some(address) = requested_address {
            nic.set_address(address);
        }

        let endpoint = Endpoint::bind_to(&req.endpoint_id, nic);
        let interface = EndpointInterface {
            address: match requested_address {
                Some(_) => None,
                None => nic.address().map(str::to_string),
            },
            mac_address: match requested.mac_address {
                Some(_) => None,
                None => Some(nic.hardware_addr().to_string()),
            },
        };

        info!(
            "Endpoint [{}] bound to nic [{}] ({})",
            endpoint.id, endpoint.src_name, endpoint.nic
        );
        self.networks
            .lookup_mut(&req.network_id)?
            .insert_endpoint(endpoint);

        Ok(CreateEndpointResponse { interface })
    }

    async fn resolve_nic(&mut self, requested: &EndpointInterface) -> Result<String> {
        if let Some(mac) = &requested.mac_address {
            if mac.is_empty() {
                return Err(DriverError::invalid_input("Mac address must not be empty"));
            }

            return self
                .nics
                .find_by_hardware_addr(mac)
                .await
                .map(|nic| nic.hardware_addr().to_string())
                .ok_or_else(|| {
                    DriverError::not_found(format!("Can not find host nic by mac address [{mac}]"))
                });
        }

        if self.require_mac_address {
            return Err(DriverError::invalid_input(
                "Please set --mac-address argument",
            ));
        }

        let wanted = requested
            .address
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(address_part);

        self.nics
            .find_unbound(|nic| match wanted {
                Some(ip) => nic.address().map(address_part) == Some(ip),
                None => true,
            })
            .await
            .map(|nic| nic.hardware_addr().to_string())
            .ok_or_else(|| match wanted {
                Some(ip) => DriverError::not_found(format!(
                    "Can not find free host nic with address [{ip}]"
                )),
                None => DriverError::not_found("No free host nic left"),
            })
    }

    pub fn join(&mut self, req: &JoinRequest) -> Result<JoinResponse> {
        let network = self.networks.lookup_mut(&req.network_id)?;
        let gateway = network.gateway_address();

        let endpoint = network.endpoint_mut(&req.endpoint_id)?;
        if req.sandbox_key.is_empty() {
            return Err(DriverError::invalid_input("Sandbox key must not be empty"));
        }
        if endpoint.is_joined() {
            return Err(DriverError::conflict(format!(
                "Endpoint [{}] has been bound to sandbox [{}]",
                endpoint.id, endpoint.sandbox_key
            )));
        }
        let gateway = gateway?;

        endpoint.sandbox_key = req.sandbox_key.clone();
        debug!("Endpoint [{}] joined sandbox [{}]", endpoint.id, endpoint.sandbox_key);

        Ok(JoinResponse {
            interface_name: InterfaceName {
                src_name: endpoint.src_name.clone(),
                dst_prefix: CONTAINER_IFACE_PREFIX.to_string(),
            },
            gateway: gateway.to_string(),
            disable_gateway_service: false,
        })
    }

    pub fn leave(&mut self, req: &LeaveRequest) -> Result<()> {
        let endpoint = self
            .networks
            .lookup_mut(&req.network_id)?
            .endpoint_mut(&req.endpoint_id)?;

        endpoint.sandbox_key.clear();
        Ok(())
    }

    pub fn delete(&mut self, req: &DeleteEndpointRequest) -> Result<()> {
        let endpoint = self
            .networks
            .lookup_mut(&req.network_id)?
            .remove_endpoint(&req.endpoint_id)?;

        self.nics.unbind(&endpoint.nic);
        info!("Endpoint [{}] released nic [{}]", endpoint.id, endpoint.nic);
        Ok(())
    }

    pub fn info(&self, req: &InfoRequest) -> Result<InfoResponse> {
        let endpoint = self
            .networks
            .lookup(&req.network_id)?
            .endpoint(&req.endpoint_id)?;

        let (name, address, hardware_addr) = match self.nics.get(&endpoint.nic) {
            Some(nic) => (
                nic.name().to_string(),
                nic.address().unwrap_or_default().to_string(),
                nic.hardware_addr().to_string(),
            ),
            None => (endpoint.src_name.clone(), String::new(), endpoint.nic.clone()),
        };

        let mut value = BTreeMap::new();
        value.insert("id".to_string(), endpoint.id.clone());
        value.insert("srcName".to_string(), endpoint.src_name.clone());
        value.insert("hostNic.Name".to_string(), name);
        value.insert("hostNic.Addr".to_string(), address);
        value.insert("hostNic.HardwareAddr".to_string(), hardware_addr);

        Ok(InfoResponse { value })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::network::{
        link::{HostLink, LinkSources, StaticLinks},
        network::IpamData,
    };
    use pretty_assertions::assert_eq;

    const MAC1: &str = "52:54:00:00:00:01";
    const MAC2: &str = "52:54:00:00:00:02";

    fn binder(require_mac_address: bool) -> (EndpointBinder, StaticLinks) {
        let host = StaticLinks::new(vec![
            HostLink::new("eth1", MAC1).with_address("10.0.0.5".parse().unwrap(), 24),
            HostLink::new("eth2", MAC2).with_address("10.0.0.6".parse().unwrap(), 24),
        ]);
        let sources = LinkSources::new(
            Box::new(host.clone()),
            Box::new(StaticLinks::default()),
            Duration::from_secs(1),
        );

        let mut networks = NetworkRegistry::new();
        networks
            .register("net", IpamData::new("10.0.0.1/24", "10.0.0.0/24", "LocalDefault"))
            .unwrap();

        (
            EndpointBinder::new(
                networks,
                NicInventory::new(sources, Vec::new()),
                require_mac_address,
            ),
            host,
        )
    }

    fn create_req(
        endpoint_id: &str,
        address: Option<&str>,
        mac: Option<&str>,
    ) -> CreateEndpointRequest {
        CreateEndpointRequest {
            network_id: "net".to_string(),
            endpoint_id: endpoint_id.to_string(),
            interface: Some(EndpointInterface {
                address: address.map(str::to_string),
                mac_address: mac.map(str::to_string),
            }),
        }
    }

    fn join_req(endpoint_id: &str, sandbox_key: &str) -> JoinRequest {
        JoinRequest {
            network_id: "net".to_string(),
            endpoint_id: endpoint_id.to_string(),
            sandbox_key: sandbox_key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_by_mac_echoes_address() {
        let (mut binder, _host) = binder(false);

        let resp = binder.create(&create_req("ep1", None, Some(MAC2))).await.unwrap();
        assert_eq!(
            resp.interface,
            EndpointInterface {
                address: Some("10.0.0.6/24".to_string()),
                mac_address: None,
            }
        );

        let endpoint = binder.networks().lookup("net").unwrap().endpoint("ep1").unwrap();
        assert_eq!(endpoint.src_name(), "eth2");
        assert_eq!(endpoint.nic(), MAC2);
        assert!(!endpoint.is_joined());
        assert_eq!(binder.nics().get(MAC2).and_then(HostNic::endpoint), Some("ep1"));
    }

    #[tokio::test]
    async fn test_create_by_address_echoes_mac() {
        let (mut binder, _host) = binder(false);

        let resp = binder
            .create(&create_req("ep1", Some("10.0.0.6/24"), None))
            .await
            .unwrap();
        assert_eq!(
            resp.interface,
            EndpointInterface {
                address: None,
                mac_address: Some(MAC2.to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_create_without_hints_takes_any_free_nic() {
        let (mut binder, _host) = binder(false);

        let req = CreateEndpointRequest {
            network_id: "net".to_string(),
            endpoint_id: "ep1".to_string(),
            interface: None,
        };
        let resp = binder.create(&req).await.unwrap();
        assert_eq!(resp.interface.mac_address.as_deref(), Some(MAC1));
        assert_eq!(resp.interface.address.as_deref(), Some("10.0.0.5/24"));
    }

    #[tokio::test]
    async fn test_create_failures() {
        let (mut binder, _host) = binder(true);

        let err = binder.create(&create_req("ep1", None, Some(""))).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidInput { .. }));

        let err = binder.create(&create_req("ep1", None, None)).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidInput { .. }));

        let err = binder
            .create(&create_req("ep1", None, Some("52:54:00:00:00:09")))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NotFound { .. }));

        let mut req = create_req("ep1", None, Some(MAC1));
        req.network_id = "nope".to_string();
        let err = binder.create(&req).await.unwrap_err();
        assert!(matches!(err, DriverError::NotFound { .. }));

        assert!(binder.nics().iter().all(|nic| !nic.is_bound()));
    }

    #[tokio::test]
    async fn test_nic_is_exclusive() {
        let (mut binder, _host) = binder(false);

        binder.create(&create_req("ep1", None, Some(MAC1))).await.unwrap();
        let err = binder.create(&create_req("ep2", None, Some(MAC1))).await.unwrap_err();
        assert!(matches!(err, DriverError::Conflict { .. }));

        let err = binder.create(&create_req("ep1", None, Some(MAC2))).await.unwrap_err();
        assert!(matches!(err, DriverError::Conflict { .. }));

        binder.create(&create_req("ep3", None, None)).await.unwrap();
        let err = binder.create(&create_req("ep4", None, None)).await.unwrap_err();
        assert!(matches!(err, DriverError::NotFound { .. }));

        let network = binder.networks().lookup("net").unwrap();
        assert_eq!(network.endpoints().len(), 2);
        assert_ne!(
            network.endpoint("ep1").unwrap().nic(),
            network.endpoint("ep3").unwrap().nic()
        );
    }

    #[tokio::test]
    async fn test_join_leave_cycle() {
        let (mut binder, _host) = binder(false);
        binder.create(&create_req("ep1", None, Some(MAC1))).await.unwrap();

        let resp = binder.join(&join_req("ep1", "/var/run/netns/c1")).unwrap();
        assert_eq!(
            resp,
            JoinResponse {
                interface_name: InterfaceName {
                    src_name: "eth1".to_string(),
                    dst_prefix: "eth".to_string(),
                },
                gateway: "10.0.0.1".to_string(),
                disable_gateway_service: false,
            }
        );

        let err = binder.join(&join_req("ep1", "/var/run/netns/c2")).unwrap_err();
        assert!(matches!(err, DriverError::Conflict { .. }));

        let leave = EndpointRequest::new("net", "ep1");
        binder.leave(&leave).unwrap();
        binder.leave(&leave).unwrap();
        let endpoint = binder.networks().lookup("net").unwrap().endpoint("ep1").unwrap();
        assert_eq!(endpoint.sandbox_key(), "");

        binder.join(&join_req("ep1", "/var/run/netns/c2")).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_not_found() {
        let (mut binder, _host) = binder(false);
        binder.create(&create_req("ep1", None, Some(MAC1))).await.unwrap();

        let err = binder.join(&join_req("ghost", "/var/run/netns/c1")).unwrap_err();
        assert!(matches!(err, DriverError::NotFound { .. }));
        let err = binder.join(&join_req("ghost", "")).unwrap_err();
        assert!(matches!(err, DriverError::NotFound { .. }));
        let err = binder.join(&join_req("ep1", "")).unwrap_err();
        assert!(matches!(err, DriverError::InvalidInput { .. }));
        let endpoint = binder.networks().lookup("net").unwrap().endpoint("ep1").unwrap();
        assert!(!endpoint.is_joined());

        let ghost = EndpointRequest::new("net", "ghost");
        assert!(matches!(binder.leave(&ghost), Err(DriverError::NotFound { .. })));
        assert!(matches!(binder.delete(&ghost), Err(DriverError::NotFound { .. })));
        assert!(matches!(binder.info(&ghost), Err(DriverError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_frees_nic() {
        let (mut binder, _host) = binder(false);
        binder.create(&create_req("ep1", None, Some(MAC1))).await.unwrap();
        binder.create(&create_req("ep2", None, Some(MAC2))).await.unwrap();

        binder.delete(&EndpointRequest::new("net", "ep1")).unwrap();
        assert!(binder.networks().lookup("net").unwrap().endpoint("ep1").is_err());

        let resp = binder.create(&create_req("ep3", None, None)).await.unwrap();
        assert_eq!(resp.interface.mac_address.as_deref(), Some(MAC1));
    }

    #[tokio::test]
    async fn test_info_snapshot() {
        let (mut binder, host) = binder(false);
        binder.create(&create_req("ep1", None, Some(MAC1))).await.unwrap();
        host.rename(MAC1, "ens3");
        binder.nics.find_by_hardware_addr(MAC1).await.unwrap();

        let info = binder.info(&EndpointRequest::new("net", "ep1")).unwrap();
        let expected: BTreeMap<String, String> = [
            ("id", "ep1"),
            ("srcName", "eth1"),
            ("hostNic.Name", "ens3"),
            ("hostNic.Addr", "10.0.0.5/24"),
            ("hostNic.HardwareAddr", MAC1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(info.value, expected);
    }
}
