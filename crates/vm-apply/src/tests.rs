//! Tests for the provisioning sequence

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use pve_vm_core::fake::{FailOn, FakeHypervisor};
use pve_vm_core::{CreateVmSpec, HypervisorCall, ProvisionError, VmOption};
use pve_vm_types::{NetworkConfig, NetworkMode, VmRequest};

use crate::{parse_imported_disk, ProvisionSettings, ProvisionStep, Provisioner};

const IMAGE: &str = "/var/lib/vz/template/iso/noble-server-cloudimg-amd64.img";
const PUBKEY: &str = "/root/.ssh/pve-keys/ops/id_ops.pub";

fn request(mode: NetworkMode) -> VmRequest {
    VmRequest {
        id: 105,
        name: "web1".to_string(),
        ram_gb: 4.0,
        cores: 2,
        disk_size_gb: 20.0,
        storage: "local-lvm".to_string(),
        user: "admin".to_string(),
        password: "secret".to_string(),
        upgrade_packages: false,
        os_codename: "noble".to_string(),
        ssh_key_name: "ops".to_string(),
        network: NetworkConfig {
            mode,
            dns_servers: vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()],
        },
    }
}

fn set(options: Vec<VmOption>) -> HypervisorCall {
    HypervisorCall::SetOptions { vmid: 105, options }
}

async fn provision(
    fake: &Arc<FakeHypervisor>,
    settings: ProvisionSettings,
    request: &VmRequest,
) -> pve_vm_core::Result<crate::ProvisionReport> {
    Provisioner::new(fake.clone(), settings)
        .provision(request, Path::new(IMAGE), Path::new(PUBKEY))
        .await
}

#[test]
fn test_parse_imported_disk() {
    let output = "importing disk '/img' to VM 105 ...\n\
                  transferred 2.2 GiB of 2.2 GiB (100.00%)\n\
                  Successfully imported disk as 'unused0:local-lvm:vm-105-disk-0'\n";
    assert_eq!(
        parse_imported_disk(output).as_deref(),
        Some("local-lvm:vm-105-disk-0")
    );
    assert_eq!(
        parse_imported_disk("unused3:ceph:vm-105-disk-3").as_deref(),
        Some("ceph:vm-105-disk-3")
    );
    assert!(parse_imported_disk("import failed: storage full").is_none());
    assert!(parse_imported_disk("").is_none());
}

#[tokio::test]
async fn test_dhcp_call_sequence() {
    let fake = Arc::new(FakeHypervisor::standard());
    let report = provision(&fake, ProvisionSettings::default(), &request(NetworkMode::Dhcp))
        .await
        .unwrap();

    assert_eq!(report.vmid, 105);
    assert_eq!(report.disk, "local-lvm:vm-105-disk-0");
    assert!(report.journal.is_none());

    let expected = vec![
        HypervisorCall::CreateVm(CreateVmSpec {
            vmid: 105,
            name: "web1".to_string(),
            memory_mb: 4096,
            cores: 2,
            cpu_model: "host".to_string(),
            bridge: "vmbr0".to_string(),
            firewall: true,
        }),
        HypervisorCall::ImportDisk {
            vmid: 105,
            image: PathBuf::from(IMAGE),
            storage: "local-lvm".to_string(),
        },
        set(vec![
            VmOption::ScsiHw("virtio-scsi-pci".to_string()),
            VmOption::Scsi0("local-lvm:vm-105-disk-0".to_string()),
        ]),
        set(vec![VmOption::BootOrder(vec!["scsi0".to_string()])]),
        set(vec![VmOption::CloudInitDrive {
            storage: "local-lvm".to_string(),
        }]),
        set(vec![VmOption::BootOrder(vec!["scsi0".to_string()])]),
        HypervisorCall::ResizeDisk {
            vmid: 105,
            disk: "scsi0".to_string(),
            size: "20G".to_string(),
        },
        set(vec![
            VmOption::CiUser("admin".to_string()),
            VmOption::CiPassword("secret".to_string()),
            VmOption::SshKeys(PathBuf::from(PUBKEY)),
        ]),
        set(vec![VmOption::IpConfig0("ip=dhcp".to_string())]),
        set(vec![VmOption::Nameserver("1.1.1.1 8.8.8.8".to_string())]),
    ];
    assert_eq!(fake.calls(), expected);
    assert!(fake.calls().iter().all(|call| call.vmid() == 105));
}

#[tokio::test]
async fn test_static_network_and_upgrade() {
    let fake = Arc::new(FakeHypervisor::standard());
    let mut request = request(NetworkMode::Static {
        ip: "10.0.0.5".to_string(),
        gateway_ip: "10.0.0.1".to_string(),
    });
    request.upgrade_packages = true;
    request.ram_gb = 1.5;

    provision(&fake, ProvisionSettings::default(), &request)
        .await
        .unwrap();

    let calls = fake.calls();
    match &calls[0] {
        HypervisorCall::CreateVm(spec) => assert_eq!(spec.memory_mb, 1536),
        other => panic!("unexpected first call: {:?}", other),
    }
    let tail = &calls[calls.len() - 3..];
    assert_eq!(tail[0], set(vec![VmOption::CiUpgrade(true)]));
    assert_eq!(
        tail[1],
        set(vec![VmOption::IpConfig0(
            "ip=10.0.0.5/24,gw=10.0.0.1".to_string()
        )])
    );
    assert_eq!(
        tail[2],
        set(vec![VmOption::Nameserver("1.1.1.1 8.8.8.8".to_string())])
    );
}

#[tokio::test]
async fn test_settings_reach_create_call() {
    let fake = Arc::new(FakeHypervisor::standard());
    let settings = ProvisionSettings {
        bridge: "vmbr1".to_string(),
        cpu_model: "x86-64-v2-AES".to_string(),
        ..Default::default()
    };
    provision(&fake, settings, &request(NetworkMode::Dhcp))
        .await
        .unwrap();

    match &fake.calls()[0] {
        HypervisorCall::CreateVm(spec) => {
            assert_eq!(spec.cpu_model, "x86-64-v2-AES");
            assert_eq!(spec.net0(), "virtio,bridge=vmbr1,firewall=1");
        }
        other => panic!("unexpected first call: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_disk_id_rolls_back() {
    let fake = Arc::new(FakeHypervisor::standard().with_import_output("import failed"));
    let err = provision(&fake, ProvisionSettings::default(), &request(NetworkMode::Dhcp))
        .await
        .unwrap_err();

    match &err {
        ProvisionError::Aborted {
            step,
            completed,
            rolled_back,
            ..
        } => {
            assert_eq!(step, "import-disk");
            assert_eq!(completed, &vec!["create-vm".to_string()]);
            assert!(*rolled_back);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(err.root(), ProvisionError::DiskImport { vmid: 105, .. }));

    let calls = fake.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2], HypervisorCall::DestroyVm { vmid: 105 });
}

#[tokio::test]
async fn test_missing_disk_id_without_rollback() {
    let fake = Arc::new(FakeHypervisor::standard().with_import_output("import failed"));
    let settings = ProvisionSettings {
        rollback_on_failure: false,
        ..Default::default()
    };
    let err = provision(&fake, settings, &request(NetworkMode::Dhcp))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Aborted {
            rolled_back: false,
            ..
        }
    ));
    let calls = fake.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls
        .iter()
        .any(|call| matches!(call, HypervisorCall::DestroyVm { .. })));
}

#[tokio::test]
async fn test_failed_set_stops_sequence() {
    // Third set call is the cloud-init drive
    let fake = Arc::new(FakeHypervisor::standard().failing_on(FailOn::SetOptions(2)));
    let err = provision(&fake, ProvisionSettings::default(), &request(NetworkMode::Dhcp))
        .await
        .unwrap_err();

    match &err {
        ProvisionError::Aborted {
            step, completed, ..
        } => {
            assert_eq!(step, ProvisionStep::AttachCloudInit.name());
            assert_eq!(completed.len(), 4);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(err.root(), ProvisionError::Command { .. }));
    assert!(!fake
        .calls()
        .iter()
        .any(|call| matches!(call, HypervisorCall::ResizeDisk { .. })));
}

#[tokio::test]
async fn test_failed_rollback_keeps_original_error() {
    let fake = Arc::new(
        FakeHypervisor::standard()
            .with_import_output("nothing useful")
            .failing_on(FailOn::Destroy),
    );
    let err = provision(&fake, ProvisionSettings::default(), &request(NetworkMode::Dhcp))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Aborted {
            rolled_back: false,
            ..
        }
    ));
    assert!(matches!(err.root(), ProvisionError::DiskImport { .. }));
}

#[tokio::test]
async fn test_journal_lines() {
    let temp_dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeHypervisor::standard());
    let settings = ProvisionSettings {
        journal_dir: Some(temp_dir.path().join("journal")),
        ..Default::default()
    };

    let report = provision(&fake, settings, &request(NetworkMode::Dhcp))
        .await
        .unwrap();
    let path = report.journal.unwrap();
    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("105-"));
    assert!(file_name.ends_with(".log"));

    let content = std::fs::read_to_string(&path).unwrap();
    let entries: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    // created + one per step + completed
    assert_eq!(entries.len(), report.completed.len() + 2);
    assert_eq!(entries[0]["state"], "Created");
    assert_eq!(entries[1]["step"], "create-vm");
    assert_eq!(entries.last().unwrap()["state"], "Completed");
    assert!(!content.contains("secret"));
}
