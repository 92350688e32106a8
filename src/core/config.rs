use std::{path::PathBuf, time::Duration};

use super::cmd::DaemonArgs;

pub const CONFIG_DIR: &str = "/etc/docker/hostnic";
pub const SOCKET_PATH: &str = "/run/docker/plugins/hostnic.sock";
pub const DISCOVERY_TIMEOUT_SECS: u64 = 5;

#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Where `config.json` lives.
    pub config_dir: PathBuf,
    /// Interface names never handed out, on top of loopback.
    pub exclude_interfaces: Vec<String>,
    /// Refuse endpoints that do not name their NIC by MAC.
    pub require_mac_address: bool,
    /// Upper bound for one host interface listing.
    pub discovery_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            config_dir: PathBuf::from(CONFIG_DIR),
            exclude_interfaces: Vec::new(),
            require_mac_address: false,
            discovery_timeout: Duration::from_secs(DISCOVERY_TIMEOUT_SECS),
        }
    }
}

impl DriverConfig {
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn with_excluded(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.exclude_interfaces.extend(names);
        self
    }

    pub fn with_require_mac_address(mut self, require: bool) -> Self {
        self.require_mac_address = require;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

impl From<&DaemonArgs> for DriverConfig {
    fn from(args: &DaemonArgs) -> Self {
        DriverConfig::default()
            .with_config_dir(&args.config_dir)
            .with_excluded(args.exclude.iter().cloned())
            .with_require_mac_address(args.require_mac)
            .with_discovery_timeout(Duration::from_secs(args.discovery_timeout))
    }
}
