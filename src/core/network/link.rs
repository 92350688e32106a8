use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context;
use futures::{future::BoxFuture, FutureExt, TryStreamExt};
use log::{debug, error};
use netlink_packet_route::link::{LinkAttribute, LinkMessage};

/// One address assigned to a host link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAddress {
    pub ip: IpAddr,
    pub prefix_len: u8,
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

/// A host interface as reported by one introspection mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLink {
    pub name: String,
    pub hardware_addr: String,
    pub addresses: Vec<LinkAddress>,
}

impl HostLink {
    pub fn new(name: &str, hardware_addr: &str) -> Self {
        HostLink {
            name: name.to_string(),
            hardware_addr: normalize_mac(hardware_addr),
            addresses: Vec::new(),
        }
    }

    pub fn with_address(mut self, ip: IpAddr, prefix_len: u8) -> Self {
        self.addresses.push(LinkAddress { ip, prefix_len });
        self
    }

    /// First IPv4 address of the link in CIDR form.
    pub fn ipv4_cidr(&self) -> Option<String> {
        self.addresses
            .iter()
            .find(|addr| addr.ip.is_ipv4())
            .map(|addr| addr.to_string())
    }
}

/// Something that can enumerate the interfaces of this host.
pub trait LinkSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn list_links(&self) -> BoxFuture<'_, anyhow::Result<Vec<HostLink>>>;
}

/// Primary source: `getifaddrs(3)`.
pub struct IfAddrsSource;

impl LinkSource for IfAddrsSource {
    fn name(&self) -> &'static str {
        "getifaddrs"
    }

    fn list_links(&self) -> BoxFuture<'_, anyhow::Result<Vec<HostLink>>> {
        async { tokio::task::spawn_blocking(list_ifaddrs).await? }.boxed()
    }
}

fn list_ifaddrs() -> anyhow::Result<Vec<HostLink>> {
    let mut links: Vec<HostLink> = Vec::new();

    for ifaddr in nix::ifaddrs::getifaddrs().context("getifaddrs failed")? {
        let idx = match links.iter().position(|l| l.name == ifaddr.interface_name) {
            Some(idx) => idx,
            None => {
                links.push(HostLink::new(&ifaddr.interface_name, ""));
                links.len() - 1
            }
        };
        let link = &mut links[idx];

        let Some(address) = ifaddr.address else {
            continue;
        };

        if let Some(ll) = address.as_link_addr() {
            if let Some(mac) = ll.addr() {
                link.hardware_addr = format_mac(&mac);
            }
        } else if let Some(sin) = address.as_sockaddr_in() {
            let prefix_len = ifaddr
                .netmask
                .as_ref()
                .and_then(|mask| mask.as_sockaddr_in())
                .map(|mask| u32::from(Ipv4Addr::from(mask.ip())).count_ones() as u8)
                .unwrap_or(32);

            link.addresses.push(LinkAddress {
                ip: IpAddr::V4(Ipv4Addr::from(sin.ip())),
                prefix_len,
            });
        }
    }

    Ok(links
        .into_iter()
        .filter(|link| is_usable_mac(&link.hardware_addr))
        .collect())
}

/// Secondary source: rtnetlink link dump. Reports no addresses.
pub struct NetlinkSource;

impl LinkSource for NetlinkSource {
    fn name(&self) -> &'static str {
        "netlink"
    }

    fn list_links(&self) -> BoxFuture<'_, anyhow::Result<Vec<HostLink>>> {
        list_netlink_links().boxed()
    }
}

async fn list_netlink_links() -> anyhow::Result<Vec<HostLink>> {
    let (connection, handle, _) = rtnetlink::new_connection()?;
    tokio::spawn(connection);

    let mut stream = handle.link().get().execute();
    let mut links = Vec::new();
    while let Some(msg) = stream.try_next().await? {
        if let Some(link) = link_from_message(msg) {
            links.push(link);
        }
    }

    Ok(links)
}

fn link_from_message(msg: LinkMessage) -> Option<HostLink> {
    let mut name = None;
    let mut mac = None;

    for attr in msg.attributes {
        match attr {
            LinkAttribute::IfName(n) => name = Some(n),
            LinkAttribute::Address(bytes) => mac = Some(format_mac(&bytes)),
            _ => {}
        }
    }

    let hardware_addr = mac.filter(|m| is_usable_mac(m))?;
    Some(HostLink {
        name: name?,
        hardware_addr,
        addresses: Vec::new(),
    })
}

/// Lowercase, colon separated, as the kernel prints it.
pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Lowercase colon form of a hardware address written with `:` or `-`.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().replace('-', ":").to_lowercase()
}

fn is_usable_mac(mac: &str) -> bool {
    !mac.is_empty() && mac.split(':').any(|octet| octet != "00")
}

/// The pair of discovery mechanisms, each call bounded by a timeout.
pub struct LinkSources {
    primary: Box<dyn LinkSource>,
    secondary: Box<dyn LinkSource>,
    timeout: Duration,
}

impl LinkSources {
    pub fn new(
        primary: Box<dyn LinkSource>,
        secondary: Box<dyn LinkSource>,
        timeout: Duration,
    ) -> Self {
        LinkSources {
            primary,
            secondary,
            timeout,
        }
    }

    pub fn host(timeout: Duration) -> Self {
        Self::new(Box::new(IfAddrsSource), Box::new(NetlinkSource), timeout)
    }

    pub async fn list_primary(&self) -> Vec<HostLink> {
        Self::list(self.primary.as_ref(), self.timeout).await
    }

    pub async fn list_secondary(&self) -> Vec<HostLink> {
        Self::list(self.secondary.as_ref(), self.timeout).await
    }

    // A failing source is a source that found nothing.
    async fn list(source: &dyn LinkSource, timeout: Duration) -> Vec<HostLink> {
        match tokio::time::timeout(timeout, source.list_links()).await {
            Ok(Ok(links)) => {
                debug!("Source {} listed {} links", source.name(), links.len());
                links
            }
            Ok(Err(e)) => {
                error!("Failed to list links from {}: {e:#}", source.name());
                Vec::new()
            }
            Err(_) => {
                error!(
                    "Listing links from {} timed out after {:?}",
                    source.name(),
                    timeout
                );
                Vec::new()
            }
        }
    }
}

/// A shareable, mutable link table standing in for the host.
///
/// Clones share the same table, so a test can keep one handle and rename or
/// remove links while the driver owns the other.
#[derive(Clone, Default)]
pub struct StaticLinks {
    links: Arc<Mutex<Vec<HostLink>>>,
    failing: Arc<Mutex<bool>>,
}

impl StaticLinks {
    pub fn new(links: Vec<HostLink>) -> Self {
        StaticLinks {
            links: Arc::new(Mutex::new(links)),
            failing: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set(&self, links: Vec<HostLink>) {
        if let Ok(mut guard) = self.links.lock() {
            *guard = links;
        }
    }

    pub fn push(&self, link: HostLink) {
        if let Ok(mut guard) = self.links.lock() {
            guard.push(link);
        }
    }

    pub fn remove(&self, hardware_addr: &str) {
        if let Ok(mut guard) = self.links.lock() {
            guard.retain(|l| l.hardware_addr != hardware_addr);
        }
    }

    pub fn rename(&self, hardware_addr: &str, name: &str) {
        if let Ok(mut guard) = self.links.lock() {
            for link in guard.iter_mut().filter(|l| l.hardware_addr == hardware_addr) {
                link.name = name.to_string();
            }
        }
    }

    /// Make every following listing fail until reset.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut guard) = self.failing.lock() {
            *guard = failing;
        }
    }

    fn snapshot(&self) -> anyhow::Result<Vec<HostLink>> {
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            anyhow::bail!("link listing unavailable");
        }
        self.links
            .lock()
            .map(|links| links.clone())
            .map_err(|_| anyhow::anyhow!("link table poisoned"))
    }
}

impl LinkSource for StaticLinks {
    fn name(&self) -> &'static str {
        "static"
    }

    fn list_links(&self) -> BoxFuture<'_, anyhow::Result<Vec<HostLink>>> {
        futures::future::ready(self.snapshot()).boxed()
    }
}
