//! Tests for host integration

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use pve_vm_core::fake::FakeHypervisor;
use pve_vm_core::{CreateVmSpec, HypervisorCall, HypervisorClient, ProvisionError, VmOption};
use pve_vm_types::HostCapabilities;

use crate::qm::{parse_node_status, parse_storage_list, parse_vm_list};
use crate::{DryRunClient, QmClient, ResourceDiscovery};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn test_parse_node_status() {
    let json = r#"{"memory":{"total":34359738368,"used":1024,"free":0},
                   "cpuinfo":{"cpus":12,"model":"AMD EPYC","sockets":1},
                   "uptime":1234}"#;
    let status = parse_node_status(json).unwrap();
    assert_eq!(status.memory_total_bytes, 34359738368);
    assert_eq!(status.cpus, 12);
}

#[test]
fn test_parse_node_status_rejects_garbage() {
    for json in [
        "",
        "not json",
        r#"{"cpuinfo":{"cpus":4}}"#,
        r#"{"memory":{"total":0},"cpuinfo":{"cpus":4}}"#,
        r#"{"memory":{"total":1024},"cpuinfo":{}}"#,
    ] {
        let err = parse_node_status(json).unwrap_err();
        assert!(
            matches!(err, ProvisionError::HostQuery { .. }),
            "unexpected error for {:?}: {}",
            json,
            err
        );
    }
}

#[test]
fn test_parse_storage_and_vm_lists() {
    let storages = parse_storage_list(
        r#"[{"storage":"local","type":"dir","active":1},
            {"storage":"local-lvm","type":"lvmthin","active":1}]"#,
    )
    .unwrap();
    assert_eq!(storages, vec!["local", "local-lvm"]);

    let vms = parse_vm_list(
        r#"[{"id":"qemu/100","vmid":100,"name":"web1","type":"qemu"},
            {"id":"lxc/101","vmid":101,"type":"lxc"},
            {"id":"node/pve","type":"node"}]"#,
    )
    .unwrap();
    assert_eq!(vms.len(), 2);
    assert_eq!(vms[0].name.as_deref(), Some("web1"));
    assert_eq!(vms[1].vmid, 101);
    assert!(vms[1].name.is_none());

    assert!(parse_vm_list("{}").is_err());
}

#[tokio::test]
async fn test_discovery_snapshot() {
    let fake = Arc::new(FakeHypervisor::standard());
    fake.add_vm(100, "web1");

    let caps = ResourceDiscovery::new(fake).discover().await.unwrap();
    assert_eq!(caps.node, "pve");
    assert_eq!(caps.max_ram_gb, 16);
    assert_eq!(caps.max_cores, 8);
    assert!(caps.has_storage("local-lvm"));
    assert_eq!(caps.vms.len(), 1);
}

#[tokio::test]
async fn test_discovery_fails_on_empty_host_data() {
    let fake = Arc::new(FakeHypervisor::new(HostCapabilities {
        node: "pve".to_string(),
        max_ram_gb: 0,
        max_cores: 4,
        storages: vec!["local".to_string()],
        vms: Vec::new(),
    }));
    let err = ResourceDiscovery::new(fake).discover().await.unwrap_err();
    assert!(matches!(err, ProvisionError::HostQuery { .. }));

    let fake = Arc::new(FakeHypervisor::new(HostCapabilities {
        node: "pve".to_string(),
        max_ram_gb: 8,
        max_cores: 4,
        storages: Vec::new(),
        vms: Vec::new(),
    }));
    let err = ResourceDiscovery::new(fake).discover().await.unwrap_err();
    assert!(err.to_string().contains("storage list"));
}

#[tokio::test]
async fn test_qm_client_runs_tools() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("qm.log");

    let qm = write_script(
        temp_dir.path(),
        "qm",
        &format!(
            r#"printf '%s|' "$@" >> {log}
echo >> {log}
case "$1" in
  importdisk) echo "Successfully imported disk as 'unused0:$4:vm-$2-disk-0'" ;;
  resize) echo "resize failed" >&2; exit 3 ;;
esac"#,
            log = log.display()
        ),
    );
    let pvesh = write_script(
        temp_dir.path(),
        "pvesh",
        r#"case "$2" in
  /cluster/resources) echo '[{"vmid":100,"name":"web1"}]' ;;
  */status) echo '{"memory":{"total":8589934592},"cpuinfo":{"cpus":4}}' ;;
  */storage) echo '[{"storage":"local-lvm"}]' ;;
  *) echo "no such path" >&2; exit 2 ;;
esac"#,
    );
    let hostname = write_script(temp_dir.path(), "hostname", "echo pve1");

    let client =
        QmClient::with_config(&qm, &pvesh, Duration::from_secs(10)).with_hostname_path(&hostname);

    assert_eq!(client.node_name().await.unwrap(), "pve1");
    assert_eq!(client.node_status("pve1").await.unwrap().cpus, 4);
    assert_eq!(client.list_storages("pve1").await.unwrap(), vec!["local-lvm"]);
    assert_eq!(client.list_vms().await.unwrap()[0].vmid, 100);

    let spec = CreateVmSpec {
        vmid: 105,
        name: "web1".to_string(),
        memory_mb: 4096,
        cores: 2,
        cpu_model: "host".to_string(),
        bridge: "vmbr0".to_string(),
        firewall: true,
    };
    client.create_vm(&spec).await.unwrap();

    let output = client
        .import_disk(105, Path::new("/tmp/noble.img"), "local-lvm")
        .await
        .unwrap();
    assert!(output.contains("unused0:local-lvm:vm-105-disk-0"));

    client
        .set_options(105, &[VmOption::Nameserver("1.1.1.1 8.8.8.8".to_string())])
        .await
        .unwrap();

    let err = client.resize_disk(105, "scsi0", "20G").await.unwrap_err();
    match err {
        ProvisionError::Command {
            exit_code, stderr, ..
        } => {
            assert_eq!(exit_code, Some(3));
            assert_eq!(stderr, "resize failed");
        }
        other => panic!("unexpected error: {}", other),
    }

    let logged = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = logged.lines().collect();
    assert_eq!(
        lines[0],
        "create|105|--name|web1|--memory|4096|--cores|2|--cpu|host|--net0|virtio,bridge=vmbr0,firewall=1|"
    );
    assert_eq!(lines[1], "importdisk|105|/tmp/noble.img|local-lvm|");
    // The nameserver list stays a single argument
    assert_eq!(lines[2], "set|105|--nameserver|1.1.1.1 8.8.8.8|");
    assert_eq!(lines[3], "resize|105|scsi0|20G|");
}

#[tokio::test]
async fn test_missing_tool_is_command_error() {
    let client = QmClient::with_config(
        "/nonexistent/qm",
        "/nonexistent/pvesh",
        Duration::from_secs(5),
    );
    let err = client.destroy_vm(105).await.unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Command {
            exit_code: None,
            ..
        }
    ));
    let err = client.list_vms().await.unwrap_err();
    assert!(matches!(err, ProvisionError::Command { .. }));
}

#[tokio::test]
async fn test_dry_run_records_without_mutating() {
    let fake = Arc::new(FakeHypervisor::standard());
    let dry_run = DryRunClient::new(fake.clone());

    assert_eq!(dry_run.list_storages("pve").await.unwrap().len(), 2);
    dry_run.destroy_vm(100).await.unwrap();
    let output = dry_run
        .import_disk(105, Path::new("/img"), "local-lvm")
        .await
        .unwrap();
    assert!(output.contains("unused0:local-lvm:vm-105-disk-0"));

    assert!(fake.calls().is_empty());
    let planned = dry_run.planned_calls();
    assert_eq!(planned.len(), 2);
    assert_eq!(planned[0], HypervisorCall::DestroyVm { vmid: 100 });
}
