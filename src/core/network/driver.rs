use log::{debug, error, warn};
use tokio::sync::RwLock;

use super::{
    api::*,
    endpoint::EndpointBinder,
    link::LinkSources,
    network::{parse_cidr, NetworkRegistry},
    nic::NicInventory,
    store::{JsonFileStore, NetworkStore},
};
use crate::core::{
    config::DriverConfig,
    error::{DriverError, Result},
};

/// Entry point of every driver operation.
///
/// All state sits behind one reader/writer lock: `endpoint_info`,
/// `list_networks` and `capabilities` share it, everything else holds it
/// exclusively. Creating endpoints concurrently relies on this to keep a NIC
/// bound to at most one endpoint; splitting the lock means re-deriving that.
pub struct HostNicDriver {
    state: RwLock<EndpointBinder>,
    store: Box<dyn NetworkStore>,
}

impl HostNicDriver {
    /// Driver over the real host interfaces, persisting under
    /// `config.config_dir`.
    pub fn open(config: &DriverConfig) -> Result<Self> {
        let store = JsonFileStore::create(&config.config_dir)?;
        let sources = LinkSources::host(config.discovery_timeout);

        Self::new(config, sources, Box::new(store))
    }

    /// Re-registers every persisted network, so a record set with a
    /// duplicate gateway fails here with `Conflict`.
    pub fn new(
        config: &DriverConfig,
        sources: LinkSources,
        store: Box<dyn NetworkStore>,
    ) -> Result<Self> {
        let mut networks = NetworkRegistry::new();
        for record in store.load()? {
            networks.register(&record.id, record.ipv4_data)?;
        }

        let nics = NicInventory::new(sources, config.exclude_interfaces.iter().cloned());
        let binder = EndpointBinder::new(networks, nics, config.require_mac_address);

        Ok(HostNicDriver {
            state: RwLock::new(binder),
            store,
        })
    }

    pub async fn capabilities(&self) -> Capabilities {
        Capabilities {
            scope: Scope::Local,
        }
    }

    pub async fn create_network(&self, req: CreateNetworkRequest) -> Result<()> {
        debug!("CreateNetwork Called: [ {:?} ]", req);

        let ipv4_data = req
            .ipv4_data
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::invalid_input("Network gateway config miss."))?;
        parse_cidr(&ipv4_data.gateway)?;

        let mut state = self.state.write().await;
        state.networks_mut().register(&req.network_id, ipv4_data)?;
        self.persist(&state)
    }

    pub async fn delete_network(&self, req: DeleteNetworkRequest) -> Result<()> {
        debug!("DeleteNetwork Called: [ {:?} ]", req);

        let mut state = self.state.write().await;
        match state.networks_mut().unregister(&req.network_id) {
            Some(network) if !network.endpoints().is_empty() => {
                warn!(
                    "Network [{}] deleted with {} endpoints, their nics stay bound",
                    network.id(),
                    network.endpoints().len()
                );
            }
            Some(_) => {}
            None => debug!("Network [{}] was not registered", req.network_id),
        }

        self.persist(&state)
    }

    pub async fn list_networks(&self) -> Vec<NetworkSummary> {
        let state = self.state.read().await;

        let mut summaries: Vec<NetworkSummary> = state
            .networks()
            .iter()
            .map(|nw| NetworkSummary {
                id: nw.id().to_string(),
                gateway: nw.gateway().to_string(),
                pool: nw.pool().to_string(),
                address_space: nw.address_space().to_string(),
                endpoints: nw.endpoints().len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub async fn create_endpoint(
        &self,
        req: CreateEndpointRequest,
    ) -> Result<CreateEndpointResponse> {
        debug!("CreateEndpoint Called: [ {:?} ]", req);

        let resp = self.state.write().await.create(&req).await?;
        debug!("CreateEndpoint resp interface: [ {:?} ]", resp.interface);
        Ok(resp)
    }

    pub async fn endpoint_info(&self, req: InfoRequest) -> Result<InfoResponse> {
        debug!("EndpointInfo Called: [ {:?} ]", req);

        let resp = self.state.read().await.info(&req)?;
        debug!("EndpointInfo resp.Value : [ {:?} ]", resp.value);
        Ok(resp)
    }

    pub async fn join(&self, req: JoinRequest) -> Result<JoinResponse> {
        debug!("Join Called: [ {:?} ]", req);

        let resp = self.state.write().await.join(&req)?;
        debug!("Join resp : [ {:?} ]", resp);
        Ok(resp)
    }

    pub async fn leave(&self, req: LeaveRequest) -> Result<()> {
        debug!("Leave Called: [ {:?} ]", req);

        self.state.write().await.leave(&req)
    }

    pub async fn delete_endpoint(&self, req: DeleteEndpointRequest) -> Result<()> {
        debug!("DeleteEndpoint Called: [ {:?} ]", req);

        self.state.write().await.delete(&req)
    }

    // Called with the write lock held. The in-memory change stands even if
    // this fails.
    fn persist(&self, state: &EndpointBinder) -> Result<()> {
        self.store.save(&state.networks().records()).map_err(|e| {
            error!("Failed to save network config: {e}");
            e
        })
    }
}
