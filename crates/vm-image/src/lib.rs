//! Proxmox VE VM provisioning image manager
//!
//! Maps supported OS codenames to cloud image URLs and keeps a local cache
//! of downloaded images.

pub mod cache;
pub mod fetch;

#[cfg(test)]
mod tests;

pub use cache::{ImageCache, ImageManager};
pub use fetch::{HttpImageFetcher, ImageFetcher};
