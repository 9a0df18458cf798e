//! Local cloud image cache
//!
//! Images are cached as `<cache_dir>/<file name of the download URL>`. A file
//! at that path is trusted as-is; no checksum is verified.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use tokio::fs;

use pve_vm_core::{ProvisionError, Result};
use pve_vm_types::SupportedOsImage;

use crate::fetch::ImageFetcher;

/// Resolves OS codenames to locally cached image files
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// Download URL of a supported codename
    fn resolve_image_url(&self, codename: &str) -> Result<String>;

    /// Path of the cached image, downloading it first if absent
    async fn ensure_image_cached(&self, codename: &str) -> Result<PathBuf>;
}

/// Filesystem backed image cache
pub struct ImageManager {
    cache_dir: PathBuf,
    fetcher: Arc<dyn ImageFetcher>,
}

impl ImageManager {
    pub fn new(cache_dir: impl Into<PathBuf>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn lookup(codename: &str) -> Result<&'static SupportedOsImage> {
        SupportedOsImage::lookup(codename).ok_or_else(|| ProvisionError::UnsupportedOs {
            codename: codename.to_string(),
            supported: SupportedOsImage::codenames().join(", "),
        })
    }
}

#[async_trait]
impl ImageCache for ImageManager {
    fn resolve_image_url(&self, codename: &str) -> Result<String> {
        Ok(Self::lookup(codename)?.download_url())
    }

    async fn ensure_image_cached(&self, codename: &str) -> Result<PathBuf> {
        let image = Self::lookup(codename)?;
        let url = image.download_url();
        let path = self.cache_dir.join(image.file_name());

        if fs::try_exists(&path).await? {
            info!("Image {} already exists, skipping download", path.display());
            return Ok(path);
        }

        fs::create_dir_all(&self.cache_dir).await?;

        let mut partial = path.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        match self.fetcher.fetch(&url, &partial).await {
            Ok(bytes) => {
                fs::rename(&partial, &path).await?;
                info!(
                    "Cached {} {} image ({} bytes) at {}",
                    image.codename,
                    image.version,
                    bytes,
                    path.display()
                );
                Ok(path)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            "Failed to remove partial download {}: {}",
                            partial.display(),
                            cleanup
                        );
                    }
                }
                Err(match e {
                    ProvisionError::Download { .. } => e,
                    other => ProvisionError::Download {
                        url,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}
