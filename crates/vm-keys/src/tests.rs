//! Tests for the filesystem key store

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::TempDir;

use pve_vm_core::{KeyStore, ProvisionError};

use crate::FsKeyStore;

fn write_pair(root: &Path, name: &str, private: bool, public: bool) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    if private {
        fs::write(dir.join(format!("id_{}", name)), "PRIVATE").unwrap();
    }
    if public {
        fs::write(dir.join(format!("id_{}.pub", name)), "ssh-rsa AAAA").unwrap();
    }
}

#[test]
fn test_list_only_complete_pairs() {
    let temp_dir = TempDir::new().unwrap();
    write_pair(temp_dir.path(), "ops", true, true);
    write_pair(temp_dir.path(), "admin", true, true);
    write_pair(temp_dir.path(), "halfpub", false, true);
    write_pair(temp_dir.path(), "halfpriv", true, false);
    fs::write(temp_dir.path().join("stray-file"), "x").unwrap();

    let store = FsKeyStore::new(temp_dir.path());
    let names: Vec<String> = store
        .list_available_keys()
        .unwrap()
        .into_iter()
        .map(|record| record.name)
        .collect();
    assert_eq!(names, vec!["admin", "ops"]);

    assert!(store.find_key("ops").is_some());
    assert!(store.find_key("halfpub").is_none());
    assert!(store.entry_exists("halfpub"));
    assert!(!store.entry_exists("nobody"));
    assert_eq!(
        store.public_key_path("ops").unwrap(),
        temp_dir.path().join("ops").join("id_ops.pub")
    );
}

#[test]
fn test_missing_root_lists_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsKeyStore::new(temp_dir.path().join("keys"));
    assert!(store.list_available_keys().unwrap().is_empty());
}

#[test]
fn test_lookups_reject_path_names() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsKeyStore::new(temp_dir.path());
    assert!(store.find_key("../etc").is_none());
    assert!(store.find_key("..").is_none());

    // The root itself and its parent always exist on disk
    assert!(!store.entry_exists(".."));
    assert!(!store.entry_exists("."));
    assert!(!store.entry_exists(""));
}

#[tokio::test]
async fn test_generate_key_with_fake_keygen() {
    let temp_dir = TempDir::new().unwrap();
    let keygen = temp_dir.path().join("ssh-keygen");
    // Writes `<-f path>` and `<-f path>.pub` like the real tool
    fs::write(
        &keygen,
        r#"#!/bin/sh
while [ $# -gt 0 ]; do
  if [ "$1" = "-f" ]; then out="$2"; fi
  shift
done
echo PRIVATE > "$out"
echo "ssh-rsa AAAA" > "$out.pub"
"#,
    )
    .unwrap();
    fs::set_permissions(&keygen, fs::Permissions::from_mode(0o755)).unwrap();

    let root = temp_dir.path().join("keys");
    let store = FsKeyStore::with_keygen(&root, &keygen);

    let record = store.generate_key("deploy").await.unwrap();
    assert_eq!(record.dir, root.join("deploy"));
    assert!(record.private_key_path().is_file());
    assert!(record.public_key_path().is_file());
    assert_eq!(store.list_available_keys().unwrap(), vec![record]);

    let err = store.generate_key("deploy").await.unwrap_err();
    assert!(matches!(err, ProvisionError::KeyGeneration { .. }));
}

#[tokio::test]
async fn test_generate_key_failure_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsKeyStore::with_keygen(temp_dir.path(), "/nonexistent/ssh-keygen");

    let err = store.generate_key("deploy").await.unwrap_err();
    match err {
        ProvisionError::KeyGeneration { name, reason } => {
            assert_eq!(name, "deploy");
            assert!(reason.contains("/nonexistent/ssh-keygen"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!temp_dir.path().join("deploy").exists());
}

#[tokio::test]
async fn test_generate_key_rejects_bad_names() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsKeyStore::new(temp_dir.path());
    for name in ["", "a/b", ".."] {
        assert!(store.generate_key(name).await.is_err(), "{:?}", name);
    }
}
