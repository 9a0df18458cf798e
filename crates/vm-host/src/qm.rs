//! `qm`/`pvesh` backed hypervisor client
//!
//! Every argument is passed as its own argv entry; no shell is involved.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use pve_vm_core::{
    CreateVmSpec, HypervisorCall, HypervisorClient, NodeStatus, ProvisionError, Result, VmOption,
};
use pve_vm_types::VmSummary;

/// Captured result of one external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Hypervisor client driving the Proxmox command line tools
pub struct QmClient {
    qm_path: PathBuf,
    pvesh_path: PathBuf,
    hostname_path: PathBuf,
    operation_timeout: Duration,
}

impl QmClient {
    pub fn new() -> Self {
        Self {
            qm_path: PathBuf::from("/usr/sbin/qm"),
            pvesh_path: PathBuf::from("/usr/bin/pvesh"),
            hostname_path: PathBuf::from("hostname"),
            operation_timeout: Duration::from_secs(300),
        }
    }

    /// Create with custom tool paths and timeout
    pub fn with_config(
        qm_path: impl Into<PathBuf>,
        pvesh_path: impl Into<PathBuf>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            qm_path: qm_path.into(),
            pvesh_path: pvesh_path.into(),
            hostname_path: PathBuf::from("hostname"),
            operation_timeout,
        }
    }

    pub fn with_hostname_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.hostname_path = path.into();
        self
    }

    /// Run `pvesh get <path> --output-format json` and return stdout
    async fn pvesh_get(&self, api_path: &str, extra: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.pvesh_path);
        cmd.arg("get").arg(api_path);
        cmd.args(extra);
        cmd.arg("--output-format").arg("json");

        let query = format!("pvesh get {}", api_path);
        let output = self.execute_command(cmd, &query).await?;
        if !output.success {
            return Err(ProvisionError::host_query(query, output.stderr.trim()));
        }
        Ok(output.stdout)
    }

    /// Run a `qm` subcommand and fail on a non-zero exit status
    async fn qm(&self, call: &HypervisorCall, args: Vec<String>) -> Result<CommandOutput> {
        info!("Running {}", call);

        let mut cmd = Command::new(&self.qm_path);
        cmd.args(&args);

        let operation = call.to_string();
        let output = self.execute_command(cmd, &operation).await?;
        if !output.success {
            return Err(ProvisionError::Command {
                command: operation,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Execute a command with timeout and logging
    async fn execute_command(&self, mut cmd: Command, operation: &str) -> Result<CommandOutput> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start_time = Instant::now();
        debug!("Executing {}", operation);

        let result = timeout(self.operation_timeout, cmd.output()).await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let success = output.status.success();
                let exit_code = output.status.code();

                if success {
                    debug!("{} completed successfully in {}ms", operation, duration_ms);
                } else {
                    warn!(
                        "{} failed with exit code {:?}: {}",
                        operation,
                        exit_code,
                        stderr.trim()
                    );
                }

                Ok(CommandOutput {
                    success,
                    exit_code,
                    stdout,
                    stderr,
                    duration_ms,
                })
            }
            Ok(Err(e)) => {
                error!("{} failed to execute: {}", operation, e);
                Err(ProvisionError::Command {
                    command: operation.to_string(),
                    exit_code: None,
                    stderr: e.to_string(),
                })
            }
            Err(_) => {
                error!("{} timed out after {:?}", operation, self.operation_timeout);
                Err(ProvisionError::Command {
                    command: operation.to_string(),
                    exit_code: None,
                    stderr: format!("timed out after {:?}", self.operation_timeout),
                })
            }
        }
    }
}

impl Default for QmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HypervisorClient for QmClient {
    async fn node_name(&self) -> Result<String> {
        let cmd = Command::new(&self.hostname_path);
        let output = self.execute_command(cmd, "hostname").await?;
        let node = output.stdout.trim().to_string();
        if !output.success || node.is_empty() {
            return Err(ProvisionError::host_query(
                "hostname",
                "could not determine the local node name",
            ));
        }
        Ok(node)
    }

    async fn node_status(&self, node: &str) -> Result<NodeStatus> {
        let path = format!("/nodes/{}/status", node);
        let json = self.pvesh_get(&path, &[]).await?;
        parse_node_status(&json)
    }

    async fn list_storages(&self, node: &str) -> Result<Vec<String>> {
        let path = format!("/nodes/{}/storage", node);
        let json = self.pvesh_get(&path, &[]).await?;
        parse_storage_list(&json)
    }

    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        let json = self
            .pvesh_get("/cluster/resources", &["--type", "vm"])
            .await?;
        parse_vm_list(&json)
    }

    async fn create_vm(&self, spec: &CreateVmSpec) -> Result<()> {
        let args = vec![
            "create".to_string(),
            spec.vmid.to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--memory".to_string(),
            spec.memory_mb.to_string(),
            "--cores".to_string(),
            spec.cores.to_string(),
            "--cpu".to_string(),
            spec.cpu_model.clone(),
            "--net0".to_string(),
            spec.net0(),
        ];
        self.qm(&HypervisorCall::CreateVm(spec.clone()), args)
            .await
            .map(drop)
    }

    async fn import_disk(&self, vmid: u32, image: &Path, storage: &str) -> Result<String> {
        let call = HypervisorCall::ImportDisk {
            vmid,
            image: image.to_path_buf(),
            storage: storage.to_string(),
        };
        let args = vec![
            "importdisk".to_string(),
            vmid.to_string(),
            image.display().to_string(),
            storage.to_string(),
        ];
        let output = self.qm(&call, args).await?;
        Ok(output.stdout)
    }

    async fn set_options(&self, vmid: u32, options: &[VmOption]) -> Result<()> {
        let call = HypervisorCall::SetOptions {
            vmid,
            options: options.to_vec(),
        };
        let mut args = vec!["set".to_string(), vmid.to_string()];
        args.extend(options.iter().flat_map(VmOption::to_args));
        self.qm(&call, args).await.map(drop)
    }

    async fn resize_disk(&self, vmid: u32, disk: &str, size: &str) -> Result<()> {
        let call = HypervisorCall::ResizeDisk {
            vmid,
            disk: disk.to_string(),
            size: size.to_string(),
        };
        let args = vec![
            "resize".to_string(),
            vmid.to_string(),
            disk.to_string(),
            size.to_string(),
        ];
        self.qm(&call, args).await.map(drop)
    }

    async fn destroy_vm(&self, vmid: u32) -> Result<()> {
        let args = vec![
            "destroy".to_string(),
            vmid.to_string(),
            "--purge".to_string(),
        ];
        self.qm(&HypervisorCall::DestroyVm { vmid }, args)
            .await
            .map(drop)
    }
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    memory: Option<MemoryInfo>,
    cpuinfo: Option<CpuInfo>,
}

#[derive(Debug, Deserialize)]
struct MemoryInfo {
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CpuInfo {
    cpus: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StorageEntry {
    storage: String,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    vmid: Option<u32>,
    name: Option<String>,
}

/// Parse `pvesh get /nodes/<node>/status` output
pub fn parse_node_status(json: &str) -> Result<NodeStatus> {
    const QUERY: &str = "node status";

    let doc: StatusDocument =
        serde_json::from_str(json).map_err(|e| ProvisionError::host_query(QUERY, e))?;

    let memory_total_bytes = doc
        .memory
        .and_then(|m| m.total)
        .filter(|total| *total > 0)
        .ok_or_else(|| ProvisionError::host_query(QUERY, "missing or zero memory.total"))?;
    let cpus = doc
        .cpuinfo
        .and_then(|c| c.cpus)
        .filter(|cpus| *cpus > 0)
        .ok_or_else(|| ProvisionError::host_query(QUERY, "missing or zero cpuinfo.cpus"))?;

    Ok(NodeStatus {
        memory_total_bytes,
        cpus,
    })
}

/// Parse `pvesh get /nodes/<node>/storage` output into storage ids
pub fn parse_storage_list(json: &str) -> Result<Vec<String>> {
    let entries: Vec<StorageEntry> =
        serde_json::from_str(json).map_err(|e| ProvisionError::host_query("storage list", e))?;
    Ok(entries.into_iter().map(|e| e.storage).collect())
}

/// Parse `pvesh get /cluster/resources --type vm` output
pub fn parse_vm_list(json: &str) -> Result<Vec<VmSummary>> {
    let entries: Vec<ResourceEntry> =
        serde_json::from_str(json).map_err(|e| ProvisionError::host_query("VM list", e))?;
    Ok(entries
        .into_iter()
        .filter_map(|e| e.vmid.map(|vmid| VmSummary { vmid, name: e.name }))
        .collect())
}
