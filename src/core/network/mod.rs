mod api;
mod driver;
mod endpoint;
mod link;
mod network;
mod nic;
mod store;

pub use api::*;
pub use driver::HostNicDriver;
pub use endpoint::{Endpoint, EndpointBinder};
pub use link::{
    format_mac, normalize_mac, HostLink, IfAddrsSource, LinkAddress, LinkSource, LinkSources,
    NetlinkSource, StaticLinks,
};
pub use network::{
    address_part, parse_cidr, IpamData, Network, NetworkRecord, NetworkRegistry,
};
pub use nic::{HostNic, NicInventory};
pub use store::{JsonFileStore, NetworkStore, CONFIG_FILE};
