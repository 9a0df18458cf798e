//! Typed interface to the hypervisor management tools
//!
//! Every mutation of the host goes through [`HypervisorClient`]. The `qm`
//! based implementation lives in `pve-vm-host`; `FakeHypervisor` (feature `test-helpers`)
//! records calls in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use pve_vm_types::VmSummary;

use crate::Result;

/// Raw node status as far as the provisioning tool cares about it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Total memory in bytes
    pub memory_total_bytes: u64,
    /// Logical CPUs
    pub cpus: u32,
}

/// Parameters of `qm create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateVmSpec {
    pub vmid: u32,
    pub name: String,
    pub memory_mb: u64,
    pub cores: u32,
    pub cpu_model: String,
    pub bridge: String,
    pub firewall: bool,
}

impl CreateVmSpec {
    /// Value of the `net0` option
    pub fn net0(&self) -> String {
        format!(
            "virtio,bridge={},firewall={}",
            self.bridge,
            u8::from(self.firewall)
        )
    }
}

/// A single VM configuration option applied with `qm set`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VmOption {
    /// SCSI controller model
    ScsiHw(String),
    /// Primary SCSI disk volume
    Scsi0(String),
    /// Boot order, disks in order of preference
    BootOrder(Vec<String>),
    /// Cloud-init drive on the given storage
    CloudInitDrive { storage: String },
    CiUser(String),
    CiPassword(String),
    /// Path to a public key file for `sshkeys`
    SshKeys(PathBuf),
    CiUpgrade(bool),
    IpConfig0(String),
    /// Space separated nameserver list
    Nameserver(String),
}

impl VmOption {
    /// Option name as understood by `qm set --<name>`
    pub fn name(&self) -> &'static str {
        match self {
            VmOption::ScsiHw(_) => "scsihw",
            VmOption::Scsi0(_) => "scsi0",
            VmOption::BootOrder(_) => "boot",
            VmOption::CloudInitDrive { .. } => "ide2",
            VmOption::CiUser(_) => "ciuser",
            VmOption::CiPassword(_) => "cipassword",
            VmOption::SshKeys(_) => "sshkeys",
            VmOption::CiUpgrade(_) => "ciupgrade",
            VmOption::IpConfig0(_) => "ipconfig0",
            VmOption::Nameserver(_) => "nameserver",
        }
    }

    /// Option value as passed on the command line
    pub fn value(&self) -> String {
        match self {
            VmOption::ScsiHw(v)
            | VmOption::Scsi0(v)
            | VmOption::CiUser(v)
            | VmOption::CiPassword(v)
            | VmOption::IpConfig0(v)
            | VmOption::Nameserver(v) => v.clone(),
            VmOption::BootOrder(disks) => format!("order={}", disks.join(";")),
            VmOption::CloudInitDrive { storage } => format!("{}:cloudinit", storage),
            VmOption::SshKeys(path) => path.display().to_string(),
            VmOption::CiUpgrade(enabled) => u8::from(*enabled).to_string(),
        }
    }

    /// `--name value` argument pair
    pub fn to_args(&self) -> [String; 2] {
        [format!("--{}", self.name()), self.value()]
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, VmOption::CiPassword(_))
    }
}

impl fmt::Display for VmOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_secret() {
            write!(f, "--{} ********", self.name())
        } else {
            write!(f, "--{} {}", self.name(), self.value())
        }
    }
}

/// Record of a mutating hypervisor call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HypervisorCall {
    CreateVm(CreateVmSpec),
    ImportDisk {
        vmid: u32,
        image: PathBuf,
        storage: String,
    },
    SetOptions {
        vmid: u32,
        options: Vec<VmOption>,
    },
    ResizeDisk {
        vmid: u32,
        disk: String,
        size: String,
    },
    DestroyVm {
        vmid: u32,
    },
}

impl HypervisorCall {
    pub fn vmid(&self) -> u32 {
        match self {
            HypervisorCall::CreateVm(spec) => spec.vmid,
            HypervisorCall::ImportDisk { vmid, .. }
            | HypervisorCall::SetOptions { vmid, .. }
            | HypervisorCall::ResizeDisk { vmid, .. }
            | HypervisorCall::DestroyVm { vmid } => *vmid,
        }
    }
}

impl fmt::Display for HypervisorCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HypervisorCall::CreateVm(spec) => write!(
                f,
                "qm create {} --name {} --memory {} --cores {} --cpu {} --net0 {}",
                spec.vmid,
                spec.name,
                spec.memory_mb,
                spec.cores,
                spec.cpu_model,
                spec.net0()
            ),
            HypervisorCall::ImportDisk {
                vmid,
                image,
                storage,
            } => write!(f, "qm importdisk {} {} {}", vmid, image.display(), storage),
            HypervisorCall::SetOptions { vmid, options } => {
                write!(f, "qm set {}", vmid)?;
                for option in options {
                    write!(f, " {}", option)?;
                }
                Ok(())
            }
            HypervisorCall::ResizeDisk { vmid, disk, size } => {
                write!(f, "qm resize {} {} {}", vmid, disk, size)
            }
            HypervisorCall::DestroyVm { vmid } => write!(f, "qm destroy {} --purge", vmid),
        }
    }
}

/// Capability interface to the virtualization host
#[async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Name of the local node
    async fn node_name(&self) -> Result<String>;

    async fn node_status(&self, node: &str) -> Result<NodeStatus>;

    /// Storage ids configured for the node
    async fn list_storages(&self, node: &str) -> Result<Vec<String>>;

    /// VMs known to the cluster
    async fn list_vms(&self) -> Result<Vec<VmSummary>>;

    async fn create_vm(&self, spec: &CreateVmSpec) -> Result<()>;

    /// Import an image as an unused disk, returning the tool's output
    async fn import_disk(&self, vmid: u32, image: &Path, storage: &str) -> Result<String>;

    async fn set_options(&self, vmid: u32, options: &[VmOption]) -> Result<()>;

    async fn resize_disk(&self, vmid: u32, disk: &str, size: &str) -> Result<()>;

    /// Remove the VM and all its volumes
    async fn destroy_vm(&self, vmid: u32) -> Result<()>;
}
