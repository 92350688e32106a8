use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::{
    config::{CONFIG_DIR, DISCOVERY_TIMEOUT_SECS, SOCKET_PATH},
    msg::Request,
    network::*,
};

#[derive(Parser, Debug)]
#[command(name = "hostnic")]
#[command(about = "hostnic hands host network interfaces to containers.")]
pub struct CLI {
    /// Unix socket the daemon listens on.
    #[arg(long, global = true, default_value = SOCKET_PATH)]
    pub socket: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the driver daemon.
    Daemon(DaemonArgs),
    /// Manage networks.
    #[command(subcommand)]
    Network(NetworkCommands),
    /// Manage endpoints.
    #[command(subcommand)]
    Endpoint(EndpointCommands),
}

#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// Directory holding the persisted networks.
    #[arg(long, default_value = CONFIG_DIR)]
    pub config_dir: PathBuf,

    /// Interface never handed out, may be repeated.
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Only bind NICs named by --mac.
    #[arg(long)]
    pub require_mac: bool,

    /// Seconds one interface listing may take.
    #[arg(long, default_value_t = DISCOVERY_TIMEOUT_SECS)]
    pub discovery_timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum NetworkCommands {
    /// Register a network.
    Create(NetCreateArgs),
    /// Delete a network.
    RM(NetRmArgs),
    /// List networks.
    LS,
}

#[derive(Args, Debug)]
pub struct NetCreateArgs {
    /// Id of the network.
    pub id: String,

    /// Gateway in CIDR form, unique across networks.
    #[arg(long, value_parser(parse_cidr_arg))]
    pub gateway: String,

    /// Address pool in CIDR form.
    #[arg(long, value_parser(parse_cidr_arg))]
    pub pool: String,

    #[arg(long, default_value = "LocalDefault")]
    pub address_space: String,
}

#[derive(Args, Debug)]
pub struct NetRmArgs {
    pub id: String,
}

#[derive(Subcommand, Debug)]
pub enum EndpointCommands {
    /// Bind a host NIC to a new endpoint.
    Create(EpCreateArgs),
    /// Attach an endpoint to a sandbox.
    Join(EpJoinArgs),
    /// Detach an endpoint from its sandbox.
    Leave(EpArgs),
    /// Delete an endpoint, freeing its NIC.
    RM(EpArgs),
    /// Show an endpoint.
    Info(EpArgs),
}

#[derive(Args, Debug)]
pub struct EpArgs {
    pub network: String,
    pub endpoint: String,
}

#[derive(Args, Debug)]
pub struct EpCreateArgs {
    pub network: String,
    pub endpoint: String,

    /// Hardware address of the NIC to bind.
    #[arg(short, long, value_parser(parse_mac))]
    pub mac: Option<String>,

    /// Pick the free NIC holding this address.
    #[arg(short, long, value_parser(parse_cidr_arg))]
    pub address: Option<String>,
}

#[derive(Args, Debug)]
pub struct EpJoinArgs {
    pub network: String,
    pub endpoint: String,
    pub sandbox_key: String,
}

impl NetworkCommands {
    pub fn into_request(self) -> Request {
        match self {
            NetworkCommands::Create(args) => Request::CreateNetwork(CreateNetworkRequest {
                network_id: args.id,
                ipv4_data: vec![IpamData::new(&args.gateway, &args.pool, &args.address_space)],
            }),
            NetworkCommands::RM(args) => Request::DeleteNetwork(DeleteNetworkRequest {
                network_id: args.id,
            }),
            NetworkCommands::LS => Request::ListNetworks,
        }
    }
}

impl EndpointCommands {
    pub fn into_request(self) -> Request {
        match self {
            EndpointCommands::Create(args) => Request::CreateEndpoint(CreateEndpointRequest {
                network_id: args.network,
                endpoint_id: args.endpoint,
                interface: Some(EndpointInterface {
                    address: args.address,
                    mac_address: args.mac,
                }),
            }),
            EndpointCommands::Join(args) => Request::Join(JoinRequest {
                network_id: args.network,
                endpoint_id: args.endpoint,
                sandbox_key: args.sandbox_key,
            }),
            EndpointCommands::Leave(args) => {
                Request::Leave(EndpointRequest::new(&args.network, &args.endpoint))
            }
            EndpointCommands::RM(args) => {
                Request::DeleteEndpoint(EndpointRequest::new(&args.network, &args.endpoint))
            }
            EndpointCommands::Info(args) => {
                Request::EndpointInfo(EndpointRequest::new(&args.network, &args.endpoint))
            }
        }
    }
}

/// Parse `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff` into lowercase colon form.
fn parse_mac(input: &str) -> Result<String, String> {
    let octets: Vec<&str> = input.trim().split([':', '-']).collect();

    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(format!("Invalid mac address: {input}"));
    }

    Ok(octets.join(":").to_lowercase())
}

fn parse_cidr_arg(input: &str) -> Result<String, String> {
    parse_cidr(input.trim())
        .map(|_| input.trim().to_string())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
#[path = "cmd_test.rs"]
mod cmd_test;
