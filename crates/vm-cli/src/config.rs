//! Tool configuration
//!
//! Built-in defaults, overridden by an optional TOML file and then by
//! `PVE_VM_PROVISION_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use pve_vm_apply::ProvisionSettings;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PVE_VM_PROVISION";

/// Files probed when no `--config` is given, first existing wins
pub const CONFIG_PATHS: &[&str] = &[
    "/etc/pve/vm-provision.toml",
    "/etc/proxmox/vm-provision.toml",
    "./vm-provision.toml",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Root of the SSH key tree
    pub key_store_dir: PathBuf,
    /// Where downloaded cloud images are kept
    pub image_cache_dir: PathBuf,
    /// Directory for provisioning journals
    pub journal_dir: Option<PathBuf>,
    /// `false` turns journals off even when `journal_dir` is set
    pub journal_enabled: bool,
    /// Bridge for `net0`
    pub bridge: String,
    pub cpu_model: String,
    /// Offered when `--dns-servers` is not given
    pub default_dns_servers: Vec<String>,
    /// Destroy a half-built VM when a step fails
    pub rollback_on_failure: bool,
    /// Per hypervisor command
    pub command_timeout_secs: u64,
    /// Connect timeout of image downloads
    pub download_connect_timeout_secs: u64,
    pub qm_path: PathBuf,
    pub pvesh_path: PathBuf,
    pub ssh_keygen_path: PathBuf,
    /// Reports the local node name
    pub hostname_path: PathBuf,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            key_store_dir: PathBuf::from("/root/.ssh/pve-vm-keys"),
            image_cache_dir: PathBuf::from("/var/lib/vz/template/iso"),
            journal_dir: Some(PathBuf::from("/var/log/pve-vm-provision")),
            journal_enabled: true,
            bridge: "vmbr0".to_string(),
            cpu_model: "host".to_string(),
            default_dns_servers: vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()],
            rollback_on_failure: true,
            command_timeout_secs: 300,
            download_connect_timeout_secs: 30,
            qm_path: PathBuf::from("/usr/sbin/qm"),
            pvesh_path: PathBuf::from("/usr/bin/pvesh"),
            ssh_keygen_path: PathBuf::from("ssh-keygen"),
            hostname_path: PathBuf::from("hostname"),
        }
    }
}

impl ProvisionConfig {
    /// Load the effective configuration
    ///
    /// An explicit `path` must exist; otherwise the first of
    /// [`CONFIG_PATHS`] that exists is used, if any.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => CONFIG_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists()),
        };

        let defaults = config::Config::try_from(&Self::default())
            .context("Failed to serialize default configuration")?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(file) = &file {
            debug!("Loading configuration from {}", file.display());
            builder = builder.add_source(
                config::File::from(file.as_path())
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("default_dns_servers"),
            )
            .build()
            .with_context(|| match &file {
                Some(file) => format!("Failed to load configuration from {}", file.display()),
                None => "Failed to load configuration".to_string(),
            })?;

        let config: ProvisionConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn download_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.download_connect_timeout_secs)
    }

    /// Orchestrator settings; `keep_on_failure` overrides the rollback switch
    pub fn provision_settings(&self, keep_on_failure: bool) -> ProvisionSettings {
        ProvisionSettings {
            bridge: self.bridge.clone(),
            cpu_model: self.cpu_model.clone(),
            rollback_on_failure: self.rollback_on_failure && !keep_on_failure,
            journal_dir: self
                .journal_dir
                .clone()
                .filter(|_| self.journal_enabled),
        }
    }
}
