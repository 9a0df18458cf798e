//! Tests for the image cache

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use pve_vm_core::ProvisionError;

use crate::fetch::MockImageFetcher;
use crate::{ImageCache, ImageManager};

const NOBLE_URL: &str =
    "https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img";

#[test]
fn test_resolve_image_url() {
    let manager = ImageManager::new("/tmp/unused", Arc::new(MockImageFetcher::new()));
    assert_eq!(manager.resolve_image_url("noble").unwrap(), NOBLE_URL);

    let err = manager.resolve_image_url("jammy").unwrap_err();
    match err {
        ProvisionError::UnsupportedOs { codename, supported } => {
            assert_eq!(codename, "jammy");
            assert_eq!(supported, "noble");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_download_happens_once() {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("images");

    let mut fetcher = MockImageFetcher::new();
    fetcher
        .expect_fetch()
        .withf(|url: &str, dest: &Path| {
            url == NOBLE_URL && dest.to_string_lossy().ends_with(".img.part")
        })
        .times(1)
        .returning(|_, dest| {
            fs::write(dest, b"qcow2").unwrap();
            Ok(5)
        });

    let manager = ImageManager::new(&cache_dir, Arc::new(fetcher));

    let first = manager.ensure_image_cached("noble").await.unwrap();
    assert_eq!(first, cache_dir.join("noble-server-cloudimg-amd64.img"));
    assert_eq!(fs::read(&first).unwrap(), b"qcow2");

    let second = manager.ensure_image_cached("noble").await.unwrap();
    assert_eq!(first, second);
    assert!(!cache_dir.join("noble-server-cloudimg-amd64.img.part").exists());
}

#[tokio::test]
async fn test_existing_file_is_trusted() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("noble-server-cloudimg-amd64.img"),
        b"anything",
    )
    .unwrap();

    let mut fetcher = MockImageFetcher::new();
    fetcher.expect_fetch().times(0);

    let manager = ImageManager::new(temp_dir.path(), Arc::new(fetcher));
    let path = manager.ensure_image_cached("noble").await.unwrap();
    assert_eq!(fs::read(path).unwrap(), b"anything");
}

#[tokio::test]
async fn test_failed_download_leaves_no_image() {
    let temp_dir = TempDir::new().unwrap();

    let mut fetcher = MockImageFetcher::new();
    fetcher.expect_fetch().times(1).returning(|url, dest| {
        fs::write(dest, b"partial").unwrap();
        Err(ProvisionError::Download {
            url: url.to_string(),
            reason: "connection reset".to_string(),
        })
    });

    let manager = ImageManager::new(temp_dir.path(), Arc::new(fetcher));
    let err = manager.ensure_image_cached("noble").await.unwrap_err();
    assert!(matches!(err, ProvisionError::Download { .. }));
    assert!(err.to_string().contains("connection reset"));

    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unsupported_codename_never_fetches() {
    let temp_dir = TempDir::new().unwrap();
    let mut fetcher = MockImageFetcher::new();
    fetcher.expect_fetch().times(0);

    let manager = ImageManager::new(temp_dir.path(), Arc::new(fetcher));
    let err = manager.ensure_image_cached("focal").await.unwrap_err();
    assert!(matches!(err, ProvisionError::UnsupportedOs { .. }));
}
