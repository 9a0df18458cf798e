//! VM creation request

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully validated parameters for one VM creation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRequest {
    /// VM id (100..=999, unused on the host)
    pub id: u32,
    /// VM name (unique on the host)
    pub name: String,
    /// Memory in GB, may be fractional
    pub ram_gb: f64,
    /// Number of CPU cores
    pub cores: u32,
    /// Size of the primary disk in GB, may be fractional
    pub disk_size_gb: f64,
    /// Storage id the disk and cloud-init drive are placed on
    pub storage: String,
    /// Cloud-init user
    pub user: String,
    /// Cloud-init password
    #[serde(skip_serializing)]
    pub password: String,
    /// Upgrade packages on first boot
    pub upgrade_packages: bool,
    /// Supported OS codename (e.g. "noble")
    pub os_codename: String,
    /// Name of the SSH key in the local key store
    pub ssh_key_name: String,
    /// Network configuration applied through cloud-init
    pub network: NetworkConfig,
}

impl VmRequest {
    /// Memory in MB as passed to `qm create --memory`
    pub fn memory_mb(&self) -> u64 {
        (self.ram_gb * 1024.0).floor() as u64
    }

    /// Disk size argument as passed to `qm resize`
    pub fn disk_size_arg(&self) -> String {
        format!("{}G", self.disk_size_gb)
    }
}

/// Network settings for the first interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mode: NetworkMode,
    /// Nameservers, in order of preference
    pub dns_servers: Vec<String>,
}

impl NetworkConfig {
    /// Nameserver list in the space separated form cloud-init expects
    pub fn nameserver_arg(&self) -> String {
        self.dns_servers.join(" ")
    }
}

/// Addressing mode of `ipconfig0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum NetworkMode {
    Dhcp,
    Static { ip: String, gateway_ip: String },
}

impl NetworkMode {
    /// Prefix length used for static addresses
    pub const STATIC_PREFIX_LEN: u8 = 24;

    /// Value of the `ipconfig0` option
    pub fn ipconfig(&self) -> String {
        match self {
            NetworkMode::Dhcp => "ip=dhcp".to_string(),
            NetworkMode::Static { ip, gateway_ip } => {
                format!("ip={}/{},gw={}", ip, Self::STATIC_PREFIX_LEN, gateway_ip)
            }
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::Dhcp => write!(f, "DHCP"),
            NetworkMode::Static { ip, gateway_ip } => write!(
                f,
                "static {}/{} via {}",
                ip,
                Self::STATIC_PREFIX_LEN,
                gateway_ip
            ),
        }
    }
}
