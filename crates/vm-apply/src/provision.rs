//! Ordered VM creation

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use pve_vm_core::{CreateVmSpec, HypervisorClient, ProvisionError, Result, VmOption};
use pve_vm_types::VmRequest;

use crate::journal::Journal;
use crate::step::ProvisionStep;

const BOOT_DISK: &str = "scsi0";
const SCSI_CONTROLLER: &str = "virtio-scsi-pci";

/// Provisioning run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisionState {
    /// Run created, nothing issued yet
    Created,
    /// Steps are being issued
    Running,
    /// Every step succeeded
    Completed,
    /// A step failed and the VM is being destroyed
    RollingBack,
    /// The VM was destroyed after a failure
    RolledBack,
    /// A step failed and the VM was left as it was
    Failed,
}

/// A completed step and when it finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step: ProvisionStep,
    pub finished_at: DateTime<Utc>,
}

/// Bookkeeping for one provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRun {
    /// Unique run id
    pub id: String,
    pub vmid: u32,
    pub state: ProvisionState,
    pub started_at: DateTime<Utc>,
    pub completed: Vec<CompletedStep>,
}

impl ProvisionRun {
    pub fn new(vmid: u32) -> Self {
        let started_at = Utc::now();
        Self {
            id: format!("vm{}_{}", vmid, started_at.timestamp_millis()),
            vmid,
            state: ProvisionState::Created,
            started_at,
            completed: Vec::new(),
        }
    }

    fn complete(&mut self, step: ProvisionStep) {
        self.completed.push(CompletedStep {
            step,
            finished_at: Utc::now(),
        });
    }

    /// Names of the completed steps, in order
    pub fn completed_names(&self) -> Vec<String> {
        self.completed
            .iter()
            .map(|done| done.step.name().to_string())
            .collect()
    }

    fn vm_exists(&self) -> bool {
        self.completed
            .iter()
            .any(|done| done.step == ProvisionStep::CreateVm)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub run_id: String,
    pub vmid: u32,
    /// Volume id of the imported disk
    pub disk: String,
    pub completed: Vec<CompletedStep>,
    pub journal: Option<PathBuf>,
    pub duration_ms: u64,
}

/// Host specific knobs of the creation sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionSettings {
    /// Bridge `net0` is attached to
    pub bridge: String,
    /// CPU type passed to `qm create --cpu`
    pub cpu_model: String,
    /// Destroy the VM when a step after creation fails
    pub rollback_on_failure: bool,
    /// Where run journals are written, `None` disables journaling
    pub journal_dir: Option<PathBuf>,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            bridge: "vmbr0".to_string(),
            cpu_model: "host".to_string(),
            rollback_on_failure: true,
            journal_dir: None,
        }
    }
}

/// Inputs the individual steps draw from
struct StepContext<'a> {
    request: &'a VmRequest,
    image: &'a Path,
    ssh_public_key: &'a Path,
    disk: Option<String>,
}

/// Issues the creation sequence against a [`HypervisorClient`]
pub struct Provisioner {
    client: Arc<dyn HypervisorClient>,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(client: Arc<dyn HypervisorClient>, settings: ProvisionSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Create and configure the VM described by `request`
    ///
    /// `image` is the cached cloud image, `ssh_public_key` the public key file
    /// handed to cloud-init. On failure the error is
    /// [`ProvisionError::Aborted`] carrying the failed step and what was done
    /// before it.
    pub async fn provision(
        &self,
        request: &VmRequest,
        image: &Path,
        ssh_public_key: &Path,
    ) -> Result<ProvisionReport> {
        let started = Instant::now();
        let mut run = ProvisionRun::new(request.id);

        let journal = match &self.settings.journal_dir {
            Some(dir) => Journal::create(dir, &run).await,
            None => None,
        };
        if let Some(journal) = &journal {
            journal.record(&run, None, "Provisioning run created").await;
        }

        info!(
            "Provisioning VM {} ({}) as run {}",
            request.id, request.name, run.id
        );
        run.state = ProvisionState::Running;

        let mut context = StepContext {
            request,
            image,
            ssh_public_key,
            disk: None,
        };

        for step in ProvisionStep::sequence(request) {
            debug!("Running step {}", step);
            if let Err(e) = self.execute_step(step, &mut context).await {
                return Err(self.abort(&mut run, step, e, journal.as_ref()).await);
            }
            run.complete(step);
            info!("Step {} completed for VM {}", step, request.id);
            if let Some(journal) = &journal {
                journal.record(&run, Some(step), "Step completed").await;
            }
        }

        run.state = ProvisionState::Completed;
        if let Some(journal) = &journal {
            journal.record(&run, None, "Provisioning completed").await;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!("VM {} provisioned in {} ms", request.id, duration_ms);

        Ok(ProvisionReport {
            run_id: run.id,
            vmid: run.vmid,
            disk: context.disk.unwrap_or_default(),
            completed: run.completed,
            journal: journal.map(|journal| journal.path().to_path_buf()),
            duration_ms,
        })
    }

    async fn execute_step(&self, step: ProvisionStep, context: &mut StepContext<'_>) -> Result<()> {
        let request = context.request;
        let vmid = request.id;

        match step {
            ProvisionStep::CreateVm => {
                let spec = CreateVmSpec {
                    vmid,
                    name: request.name.clone(),
                    memory_mb: request.memory_mb(),
                    cores: request.cores,
                    cpu_model: self.settings.cpu_model.clone(),
                    bridge: self.settings.bridge.clone(),
                    firewall: true,
                };
                self.client.create_vm(&spec).await
            }
            ProvisionStep::ImportDisk => {
                let output = self
                    .client
                    .import_disk(vmid, context.image, &request.storage)
                    .await?;
                let disk = parse_imported_disk(&output).ok_or_else(|| {
                    ProvisionError::DiskImport {
                        vmid,
                        output: output.trim().to_string(),
                    }
                })?;
                debug!("Imported disk for VM {} is {}", vmid, disk);
                context.disk = Some(disk);
                Ok(())
            }
            ProvisionStep::AttachDisk => {
                let disk = context.disk.clone().ok_or_else(|| ProvisionError::DiskImport {
                    vmid,
                    output: String::new(),
                })?;
                self.set(
                    vmid,
                    vec![
                        VmOption::ScsiHw(SCSI_CONTROLLER.to_string()),
                        VmOption::Scsi0(disk),
                    ],
                )
                .await
            }
            ProvisionStep::SetBootOrder | ProvisionStep::ReassertBootOrder => {
                self.set(vmid, vec![VmOption::BootOrder(vec![BOOT_DISK.to_string()])])
                    .await
            }
            ProvisionStep::AttachCloudInit => {
                self.set(
                    vmid,
                    vec![VmOption::CloudInitDrive {
                        storage: request.storage.clone(),
                    }],
                )
                .await
            }
            ProvisionStep::ResizeDisk => {
                self.client
                    .resize_disk(vmid, BOOT_DISK, &request.disk_size_arg())
                    .await
            }
            ProvisionStep::ConfigureCloudInit => {
                self.set(
                    vmid,
                    vec![
                        VmOption::CiUser(request.user.clone()),
                        VmOption::CiPassword(request.password.clone()),
                        VmOption::SshKeys(context.ssh_public_key.to_path_buf()),
                    ],
                )
                .await
            }
            ProvisionStep::EnableUpgrade => {
                self.set(vmid, vec![VmOption::CiUpgrade(true)]).await
            }
            ProvisionStep::ConfigureNetwork => {
                self.set(vmid, vec![VmOption::IpConfig0(request.network.mode.ipconfig())])
                    .await
            }
            ProvisionStep::ConfigureDns => {
                self.set(
                    vmid,
                    vec![VmOption::Nameserver(request.network.nameserver_arg())],
                )
                .await
            }
        }
    }

    async fn set(&self, vmid: u32, options: Vec<VmOption>) -> Result<()> {
        self.client.set_options(vmid, &options).await
    }

    /// Move the run to its terminal failure state and build the error
    async fn abort(
        &self,
        run: &mut ProvisionRun,
        step: ProvisionStep,
        cause: ProvisionError,
        journal: Option<&Journal>,
    ) -> ProvisionError {
        error!("Step {} failed for VM {}: {}", step, run.vmid, cause);
        if let Some(journal) = journal {
            journal
                .record(run, Some(step), &format!("Step failed: {}", cause))
                .await;
        }

        let mut rolled_back = false;
        if !run.vm_exists() {
            run.state = ProvisionState::Failed;
        } else if !self.settings.rollback_on_failure {
            warn!(
                "Rollback disabled, VM {} is left in place after failed step {}",
                run.vmid, step
            );
            run.state = ProvisionState::Failed;
        } else {
            run.state = ProvisionState::RollingBack;
            info!("Rolling back: destroying VM {}", run.vmid);
            match self.client.destroy_vm(run.vmid).await {
                Ok(()) => {
                    run.state = ProvisionState::RolledBack;
                    rolled_back = true;
                    info!("VM {} destroyed", run.vmid);
                }
                Err(e) => {
                    run.state = ProvisionState::Failed;
                    error!(
                        "Rollback of VM {} failed, manual cleanup required: {}",
                        run.vmid, e
                    );
                }
            }
        }

        if let Some(journal) = journal {
            let message = if rolled_back {
                "VM destroyed"
            } else {
                "Provisioning failed"
            };
            journal.record(run, None, message).await;
        }

        ProvisionError::Aborted {
            step: step.name().to_string(),
            completed: run.completed_names(),
            rolled_back,
            source: Box::new(cause),
        }
    }
}

/// Extract the volume id from `qm importdisk` output
///
/// The tool reports e.g. `Successfully imported disk as
/// 'unused0:local-lvm:vm-105-disk-0'`; the volume id is everything after
/// the `unused<N>:` prefix.
pub fn parse_imported_disk(output: &str) -> Option<String> {
    // Volume ids contain no whitespace or quotes
    let pattern = Regex::new(r"unused\d+:([^'\s]+)").unwrap();
    pattern
        .captures(output)
        .map(|captures| captures[1].to_string())
}
