pub mod host;
pub mod image;
pub mod keys;
pub mod request;

pub use host::{HostCapabilities, VmSummary};
pub use image::{SupportedOsImage, SUPPORTED_OS_IMAGES};
pub use keys::SshKeyRecord;
pub use request::{NetworkConfig, NetworkMode, VmRequest};

/// Lowest VM id the provisioning tool hands out
pub const MIN_VM_ID: u32 = 100;
/// Highest VM id the provisioning tool hands out
pub const MAX_VM_ID: u32 = 999;
