use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use super::link::{normalize_mac, HostLink, LinkSources};
use crate::core::error::{DriverError, Result};

pub const LOOPBACK: &str = "lo";

/// A host interface known to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNic {
    name: String,
    hardware_addr: String,
    address: Option<String>,
    endpoint: Option<String>,
}

impl HostNic {
    fn from_link(link: &HostLink) -> Self {
        HostNic {
            name: link.name.clone(),
            hardware_addr: link.hardware_addr.clone(),
            address: link.ipv4_cidr(),
            endpoint: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hardware_addr(&self) -> &str {
        &self.hardware_addr
    }

    /// Cached IPv4 address in CIDR form.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Id of the endpoint bound to this NIC.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.endpoint.is_some()
    }

    pub(crate) fn set_address(&mut self, address: &str) {
        self.address = Some(address.to_string());
    }

    // Re-discovery invalidates the address cache.
    fn refresh(&mut self, link: &HostLink) {
        if self.name != link.name {
            info!("Nic [{}] renamed to [{}]", self.name, link.name);
            self.name = link.name.clone();
        }
        self.address = link.ipv4_cidr();
    }
}

/// Host NICs keyed by hardware address.
///
/// Entries are added on discovery or on a lookup miss and verified against the
/// host on every hardware-address lookup. Entries that vanished from the host
/// are dropped then, unless an endpoint still holds them.
pub struct NicInventory {
    nics: HashMap<String, HostNic>,
    sources: LinkSources,
    exclude: HashSet<String>,
}

impl NicInventory {
    pub fn new(sources: LinkSources, exclude: impl IntoIterator<Item = String>) -> Self {
        let mut exclude: HashSet<String> = exclude.into_iter().collect();
        exclude.insert(LOOPBACK.to_string());

        NicInventory {
            nics: HashMap::new(),
            sources,
            exclude,
        }
    }

    pub fn get(&self, hardware_addr: &str) -> Option<&HostNic> {
        self.nics.get(hardware_addr)
    }

    pub fn len(&self) -> usize {
        self.nics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostNic> {
        self.nics.values()
    }

    pub async fn find_by_hardware_addr(&mut self, hardware_addr: &str) -> Option<&HostNic> {
        let wanted = normalize_mac(hardware_addr);
        let mut host = HostView::new(&self.sources);

        let cached: Vec<String> = self.nics.keys().cloned().collect();
        let mut hit = false;
        for key in cached {
            match host.lookup(&key).await {
                Some(link) => {
                    if let Some(nic) = self.nics.get_mut(&key) {
                        if nic.name != link.name {
                            info!("Nic [{}] renamed to [{}]", nic.name, link.name);
                            nic.name = link.name;
                        }
                    }
                }
                None => {
                    if self.nics.get(&key).is_some_and(HostNic::is_bound) {
                        warn!("Bound nic [{key}] is missing from host, keeping it");
                    } else {
                        info!("Delete nic [{key}] from nic table");
                        self.nics.remove(&key);
                        continue;
                    }
                }
            }

            if key == wanted {
                hit = true;
                break;
            }
        }

        if !hit {
            let link = host.lookup(&wanted).await?;
            let nic = HostNic::from_link(&link);
            info!("Add nic [{:?}] to nic table", nic);
            self.nics.insert(wanted.clone(), nic);
        }

        self.nics.get(&wanted)
    }

    /// First free NIC accepted by `filter`, re-discovering the host once if
    /// the cache has none. Excluded names are never picked, whichever way the
    /// NIC entered the cache.
    pub async fn find_unbound<F>(&mut self, filter: F) -> Option<&HostNic>
    where
        F: Fn(&HostNic) -> bool,
    {
        let key = match self.first_unbound(&filter) {
            Some(key) => key,
            None => {
                self.rediscover().await;
                self.first_unbound(&filter)?
            }
        };

        self.nics.get(&key)
    }

    fn first_unbound<F>(&self, filter: &F) -> Option<String>
    where
        F: Fn(&HostNic) -> bool,
    {
        self.nics
            .values()
            .filter(|nic| !nic.is_bound() && !self.exclude.contains(&nic.name) && filter(nic))
            .min_by(|a, b| a.name.cmp(&b.name))
            .map(|nic| nic.hardware_addr.clone())
    }

    /// Sweep the host and merge what it reports. Returns how many NICs
    /// were new.
    pub async fn rediscover(&mut self) -> usize {
        let mut links = self.sources.list_primary().await;
        if links.is_empty() {
            links = self.sources.list_secondary().await;
        }

        let mut added = 0;
        for link in links {
            if self.exclude.contains(&link.name) {
                continue;
            }

            match self.nics.get_mut(&link.hardware_addr) {
                Some(nic) => nic.refresh(&link),
                None => {
                    let nic = HostNic::from_link(&link);
                    info!("Add nic [{:?}] to nic table", nic);
                    self.nics.insert(link.hardware_addr.clone(), nic);
                    added += 1;
                }
            }
        }

        debug!("Discovery added {added} nics, {} known", self.nics.len());
        added
    }

    pub fn bind(&mut self, hardware_addr: &str, endpoint_id: &str) -> Result<&mut HostNic> {
        let nic = self.nics.get_mut(hardware_addr).ok_or_else(|| {
            DriverError::not_found(format!("Can not find host nic [{hardware_addr}]"))
        })?;

        if let Some(bound) = &nic.endpoint {
            return Err(DriverError::conflict(format!(
                "Host nic [{}] has been bound to endpoint [{}]",
                nic.name, bound
            )));
        }

        nic.endpoint = Some(endpoint_id.to_string());
        Ok(nic)
    }

    /// Returns the endpoint id the NIC was bound to.
    pub fn unbind(&mut self, hardware_addr: &str) -> Option<String> {
        match self.nics.get_mut(hardware_addr) {
            Some(nic) => nic.endpoint.take(),
            None => {
                warn!("Unbind of unknown nic [{hardware_addr}]");
                None
            }
        }
    }
}

/// Lazily listed host state, shared by every check within one lookup.
struct HostView<'a> {
    sources: &'a LinkSources,
    primary: Option<Vec<HostLink>>,
    secondary: Option<Vec<HostLink>>,
}

impl<'a> HostView<'a> {
    fn new(sources: &'a LinkSources) -> Self {
        HostView {
            sources,
            primary: None,
            secondary: None,
        }
    }

    async fn lookup(&mut self, hardware_addr: &str) -> Option<HostLink> {
        if self.primary.is_none() {
            self.primary = Some(self.sources.list_primary().await);
        }
        if let Some(link) = Self::find(&self.primary, hardware_addr) {
            return Some(link);
        }

        if self.secondary.is_none() {
            self.secondary = Some(self.sources.list_secondary().await);
        }
        Self::find(&self.secondary, hardware_addr)
    }

    fn find(links: &Option<Vec<HostLink>>, hardware_addr: &str) -> Option<HostLink> {
        links
            .iter()
            .flatten()
            .find(|link| link.hardware_addr == hardware_addr)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::network::link::StaticLinks;
    use pretty_assertions::assert_eq;

    const MAC1: &str = "52:54:00:00:00:01";
    const MAC2: &str = "52:54:00:00:00:02";

    fn inventory(primary: &StaticLinks, secondary: &StaticLinks) -> NicInventory {
        let sources = LinkSources::new(
            Box::new(primary.clone()),
            Box::new(secondary.clone()),
            Duration::from_secs(1),
        );
        NicInventory::new(sources, vec!["docker0".to_string()])
    }

    fn eth(name: &str, mac: &str, ip: &str) -> HostLink {
        HostLink::new(name, mac).with_address(ip.parse().unwrap(), 24)
    }

    #[tokio::test]
    async fn test_lookup_miss_populates_cache() {
        let primary = StaticLinks::new(vec![eth("eth1", MAC1, "10.0.0.5")]);
        let mut nics = inventory(&primary, &StaticLinks::default());

        let nic = nics.find_by_hardware_addr("52:54:00:00:00:01").await.unwrap();
        assert_eq!(nic.name(), "eth1");
        assert_eq!(nic.address(), Some("10.0.0.5/24"));
        assert_eq!(nics.len(), 1);

        assert!(nics.find_by_hardware_addr(MAC2).await.is_none());
        assert_eq!(nics.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_accepts_dashed_mac() {
        let primary = StaticLinks::new(vec![eth("eth1", MAC1, "10.0.0.5")]);
        let mut nics = inventory(&primary, &StaticLinks::default());

        let nic = nics.find_by_hardware_addr("52-54-00-00-00-01").await;
        assert_eq!(nic.map(HostNic::hardware_addr), Some(MAC1));
        assert_eq!(nics.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_secondary() {
        let primary = StaticLinks::default();
        let secondary = StaticLinks::new(vec![HostLink::new("eth1", MAC1)]);
        let mut nics = inventory(&primary, &secondary);

        let nic = nics.find_by_hardware_addr(MAC1).await.unwrap();
        assert_eq!(nic.name(), "eth1");
        assert_eq!(nic.address(), None);
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let primary = StaticLinks::new(vec![eth("eth1", MAC1, "10.0.0.5")]);
        let mut nics = inventory(&primary, &StaticLinks::default());

        let upper = MAC1.to_uppercase();
        let nic = nics.find_by_hardware_addr(&upper).await;
        assert_eq!(nic.map(HostNic::name), Some("eth1"));
    }

    #[tokio::test]
    async fn test_stale_entries_are_evicted() {
        let primary = StaticLinks::new(vec![
            eth("eth1", MAC1, "10.0.0.5"),
            eth("eth2", MAC2, "10.0.0.6"),
        ]);
        let mut nics = inventory(&primary, &StaticLinks::default());
        assert_eq!(nics.rediscover().await, 2);

        primary.remove(MAC1);
        assert!(nics.find_by_hardware_addr(MAC2).await.is_some());
        assert!(nics.find_by_hardware_addr(MAC1).await.is_none());
        assert!(nics.get(MAC1).is_none());
    }

    #[tokio::test]
    async fn test_bound_entries_survive_disappearing() {
        let primary = StaticLinks::new(vec![eth("eth1", MAC1, "10.0.0.5")]);
        let mut nics = inventory(&primary, &StaticLinks::default());
        nics.rediscover().await;
        nics.bind(MAC1, "ep1").unwrap();

        primary.remove(MAC1);
        assert!(nics.find_by_hardware_addr(MAC1).await.is_some());
        assert_eq!(nics.get(MAC1).and_then(HostNic::endpoint), Some("ep1"));
    }

    #[tokio::test]
    async fn test_rename_is_picked_up() {
        let primary = StaticLinks::new(vec![eth("eth1", MAC1, "10.0.0.5")]);
        let mut nics = inventory(&primary, &StaticLinks::default());
        nics.find_by_hardware_addr(MAC1).await.unwrap();

        primary.rename(MAC1, "ens3");
        let nic = nics.find_by_hardware_addr(MAC1).await.unwrap();
        assert_eq!(nic.name(), "ens3");
    }

    #[tokio::test]
    async fn test_rediscover_skips_excluded_and_refreshes() {
        let primary = StaticLinks::new(vec![
            eth("eth1", MAC1, "10.0.0.5"),
            HostLink::new("docker0", "02:42:00:00:00:01"),
            HostLink::new("lo", "02:00:00:00:00:01"),
        ]);
        let mut nics = inventory(&primary, &StaticLinks::default());
        assert_eq!(nics.rediscover().await, 1);

        primary.set(vec![eth("eth1", MAC1, "10.0.1.5")]);
        assert_eq!(nics.rediscover().await, 0);
        assert_eq!(nics.get(MAC1).and_then(HostNic::address), Some("10.0.1.5/24"));
    }

    #[tokio::test]
    async fn test_find_unbound_never_picks_excluded() {
        let primary = StaticLinks::new(vec![eth("docker0", MAC1, "172.17.0.1")]);
        let mut nics = inventory(&primary, &StaticLinks::default());
        assert!(nics.find_unbound(|_| true).await.is_none());

        // Looked up by MAC, so it is cached, yet still off limits.
        assert!(nics.find_by_hardware_addr(MAC1).await.is_some());
        assert!(nics.find_unbound(|_| true).await.is_none());

        // Renamed onto an excluded name after being cached.
        primary.set(vec![eth("eth2", MAC2, "10.0.0.6")]);
        nics.find_by_hardware_addr(MAC2).await.unwrap();
        primary.rename(MAC2, "docker0");
        nics.find_by_hardware_addr(MAC2).await.unwrap();
        assert!(nics.find_unbound(|_| true).await.is_none());
    }

    #[tokio::test]
    async fn test_rediscover_uses_secondary_when_primary_fails() {
        let primary = StaticLinks::new(vec![eth("eth1", MAC1, "10.0.0.5")]);
        primary.set_failing(true);
        let secondary = StaticLinks::new(vec![HostLink::new("eth2", MAC2)]);
        let mut nics = inventory(&primary, &secondary);

        assert_eq!(nics.rediscover().await, 1);
        assert!(nics.get(MAC2).is_some());
    }

    #[tokio::test]
    async fn test_find_unbound_discovers_and_filters() {
        let primary = StaticLinks::new(vec![
            eth("eth1", MAC1, "10.0.0.5"),
            eth("eth2", MAC2, "10.0.0.6"),
        ]);
        let mut nics = inventory(&primary, &StaticLinks::default());
        assert!(nics.is_empty());

        let nic = nics.find_unbound(|_| true).await.unwrap();
        assert_eq!(nic.name(), "eth1");

        let nic = nics
            .find_unbound(|nic| nic.address() == Some("10.0.0.6/24"))
            .await
            .unwrap();
        assert_eq!(nic.hardware_addr(), MAC2);

        assert!(nics.find_unbound(|nic| nic.name() == "eth9").await.is_none());
    }

    #[tokio::test]
    async fn test_bind_is_exclusive() {
        let primary = StaticLinks::new(vec![eth("eth1", MAC1, "10.0.0.5")]);
        let mut nics = inventory(&primary, &StaticLinks::default());
        nics.rediscover().await;

        nics.bind(MAC1, "ep1").unwrap();
        let err = nics.bind(MAC1, "ep2").unwrap_err();
        assert!(matches!(err, DriverError::Conflict { .. }));
        assert!(nics.find_unbound(|_| true).await.is_none());

        assert_eq!(nics.unbind(MAC1).as_deref(), Some("ep1"));
        assert_eq!(nics.find_unbound(|_| true).await.map(HostNic::name), Some("eth1"));
    }
}
