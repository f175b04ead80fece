//! The host as a scan device

use crate::runtime::Device;

/// The device behind [`CpuBackend`](super::CpuBackend).
///
/// Execution groups are emulated on host threads, so there is exactly one
/// such device and its id is always 0. The name reports whether groups run
/// in parallel.
#[derive(Clone, Debug, Default)]
pub struct CpuDevice {
    id: usize,
}

impl CpuDevice {
    /// The host device
    pub fn new() -> Self {
        Self::default()
    }
}

impl Device for CpuDevice {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> String {
        if cfg!(feature = "rayon") {
            "cpu (rayon groups)".to_string()
        } else {
            "cpu (sequential groups)".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_host_device() {
        let device = CpuDevice::new();
        assert_eq!(device.id(), 0);
        assert!(device.name().starts_with("cpu"));
    }
}
