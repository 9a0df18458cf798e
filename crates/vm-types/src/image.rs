//! Supported cloud images

use serde::Serialize;

/// Cloud image release the tool knows how to download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupportedOsImage {
    /// Release codename used on the command line
    pub codename: &'static str,
    /// Human readable version label
    pub version: &'static str,
    /// Download URL template, `{codename}` is substituted
    pub url_template: &'static str,
}

/// Compiled-in table of supported releases
pub const SUPPORTED_OS_IMAGES: &[SupportedOsImage] = &[SupportedOsImage {
    codename: "noble",
    version: "24.04",
    url_template:
        "https://cloud-images.ubuntu.com/{codename}/current/{codename}-server-cloudimg-amd64.img",
}];

impl SupportedOsImage {
    /// Look up a codename in the supported table (exact match)
    pub fn lookup(codename: &str) -> Option<&'static SupportedOsImage> {
        SUPPORTED_OS_IMAGES
            .iter()
            .find(|image| image.codename == codename)
    }

    /// Codenames of every supported release
    pub fn codenames() -> Vec<&'static str> {
        SUPPORTED_OS_IMAGES.iter().map(|image| image.codename).collect()
    }

    pub fn download_url(&self) -> String {
        self.url_template.replace("{codename}", self.codename)
    }

    /// File name the image is cached under
    pub fn file_name(&self) -> String {
        let url = self.download_url();
        url.rsplit('/').next().unwrap_or(&url).to_string()
    }
}
