//! Device capabilities and upload strategy selection.
//!
//! The backend probes its device once at startup and reports an immutable
//! [`GpuCapabilities`] value. Every capability decision in this crate goes
//! through [`UploadStrategy::select`], a pure function over that value, so
//! vendor and feature checks stay in one place instead of being scattered
//! across call sites.

/// GPU hardware vendor classification.
///
/// Persistent coherent mapping is gated per vendor: some drivers have shown
/// instability when a mapped region stays live across frames, so only a
/// known-good vendor is allowed onto the persistent path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    /// NVIDIA hardware.
    Nvidia,
    /// AMD hardware.
    Amd,
    /// Intel hardware.
    Intel,
    /// Anything else (software rasterizers, mobile parts, unknown).
    Other,
}

impl GpuVendor {
    /// Classify from a PCI vendor id (as reported by wgpu adapters).
    pub fn from_pci_id(id: u32) -> Self {
        match id {
            0x10de => Self::Nvidia,
            0x1002 | 0x1022 => Self::Amd,
            0x8086 => Self::Intel,
            _ => Self::Other,
        }
    }

    /// Classify from a driver vendor string (as reported by GL-style APIs).
    pub fn from_vendor_string(vendor: &str) -> Self {
        let lower = vendor.to_lowercase();
        if lower.contains("nvidia") {
            Self::Nvidia
        } else if lower.contains("amd") || lower.contains("ati") {
            Self::Amd
        } else if lower.contains("intel") {
            Self::Intel
        } else {
            Self::Other
        }
    }
}

/// Immutable description of the device features this crate cares about.
///
/// Computed once by the backend at startup and shared read-only by every
/// buffer afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuCapabilities {
    /// Whether the device supports keeping a buffer mapped for its lifetime.
    pub supports_persistent_mapping: bool,
    /// Vendor classification used for driver allow-listing.
    pub vendor: GpuVendor,
}

impl GpuCapabilities {
    /// Create a capabilities value.
    pub fn new(supports_persistent_mapping: bool, vendor: GpuVendor) -> Self {
        Self {
            supports_persistent_mapping,
            vendor,
        }
    }

    /// Log a one-line summary, typically once at startup.
    pub fn log_summary(&self) {
        log::info!(
            "GPU capabilities: vendor={:?}, persistent_mapping={}",
            self.vendor,
            self.supports_persistent_mapping
        );
    }
}

/// How mesh bytes travel from CPU to GPU storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStrategy {
    /// Persistent-mapped vertex/index rings with three segments rotated
    /// round-robin, gated by completion fences.
    PersistentTripleBuffered,
    /// Discard-and-respecify storage on every full upload. No fences; the
    /// device's own storage replacement serializes reuse.
    DynamicRespecify,
}

impl UploadStrategy {
    /// Pick the strategy for a device.
    ///
    /// The persistent path requires persistent mapping support AND a vendor on
    /// the allow-list. Only NVIDIA is currently allowed; AMD and Intel drivers
    /// have shown instability with persistent coherent mappings.
    pub fn select(caps: &GpuCapabilities) -> Self {
        if !caps.supports_persistent_mapping {
            return Self::DynamicRespecify;
        }
        match caps.vendor {
            GpuVendor::Nvidia => Self::PersistentTripleBuffered,
            GpuVendor::Amd | GpuVendor::Intel | GpuVendor::Other => Self::DynamicRespecify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(true, GpuVendor::Nvidia, UploadStrategy::PersistentTripleBuffered)]
    #[case(true, GpuVendor::Amd, UploadStrategy::DynamicRespecify)]
    #[case(true, GpuVendor::Intel, UploadStrategy::DynamicRespecify)]
    #[case(true, GpuVendor::Other, UploadStrategy::DynamicRespecify)]
    #[case(false, GpuVendor::Nvidia, UploadStrategy::DynamicRespecify)]
    #[case(false, GpuVendor::Other, UploadStrategy::DynamicRespecify)]
    fn test_strategy_selection(
        #[case] persistent: bool,
        #[case] vendor: GpuVendor,
        #[case] expected: UploadStrategy,
    ) {
        let caps = GpuCapabilities::new(persistent, vendor);
        assert_eq!(UploadStrategy::select(&caps), expected);
    }

    #[test]
    fn test_vendor_from_pci_id() {
        assert_eq!(GpuVendor::from_pci_id(0x10de), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_pci_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_pci_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_pci_id(0x1234), GpuVendor::Other);
    }

    #[test]
    fn test_vendor_from_string() {
        assert_eq!(
            GpuVendor::from_vendor_string("NVIDIA Corporation"),
            GpuVendor::Nvidia
        );
        assert_eq!(GpuVendor::from_vendor_string("ATI Technologies"), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_string("Intel Inc."), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_string("llvmpipe"), GpuVendor::Other);
    }
}
