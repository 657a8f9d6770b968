//! Dummy GPU backend for testing and development.
//!
//! This backend performs no real GPU work but keeps actual byte storage in
//! its buffers and records every operation, so the full upload path can be
//! exercised and verified without GPU hardware.
//!
//! Fence behavior is configurable: with auto-signal on (the default) every
//! fence is born signaled, matching a device that completes work instantly.
//! With auto-signal off, fences stay pending until signaled explicitly; an
//! unconditional [`wait_fence`] on a pending fence signals it and returns,
//! modeling the device eventually finishing, and the wait is recorded so
//! tests can assert which fences actually stalled the CPU.
//!
//! [`wait_fence`]: DummyBackend::wait_fence

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::capabilities::{GpuCapabilities, GpuVendor};
use crate::error::GraphicsError;
use crate::mesh::VertexLayout;

use super::{BufferDescriptor, GpuBackend, GpuBuffer, GpuFence};

/// One recorded indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    /// Number of indices drawn.
    pub index_count: u32,
    /// Byte offset into the index buffer.
    pub index_byte_offset: u64,
    /// Attribute base offset configured at draw time.
    pub attribute_base_offset: u64,
}

/// One recorded sub-range flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRecord {
    /// Id of the flushed buffer.
    pub buffer: usize,
    /// Byte offset of the flushed range.
    pub offset: u64,
    /// Byte size of the flushed range.
    pub size: u64,
}

#[derive(Default)]
struct DummyState {
    buffer_sizes: Vec<u64>,
    fences: Vec<Arc<AtomicBool>>,
    flushes: Vec<FlushRecord>,
    draws: Vec<DrawRecord>,
    attribute_base_offset: u64,
    waits: Vec<usize>,
}

/// Dummy GPU backend.
pub struct DummyBackend {
    capabilities: GpuCapabilities,
    auto_signal: AtomicBool,
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a dummy backend that reports a persistent-mapping-capable
    /// NVIDIA device, so the full streaming path is exercised by default.
    pub fn new() -> Self {
        Self::with_capabilities(GpuCapabilities::new(true, GpuVendor::Nvidia))
    }

    /// Create a dummy backend reporting the given capabilities.
    pub fn with_capabilities(capabilities: GpuCapabilities) -> Self {
        Self {
            capabilities,
            auto_signal: AtomicBool::new(true),
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Control whether new fences are born signaled (default: true).
    pub fn set_auto_signal(&self, enabled: bool) {
        self.auto_signal.store(enabled, Ordering::Release);
    }

    /// Signal the fence created `index`-th (in creation order).
    pub fn signal_fence_at(&self, index: usize) {
        if let Ok(state) = self.state.lock() {
            if let Some(flag) = state.fences.get(index) {
                flag.store(true, Ordering::Release);
            }
        }
    }

    /// Signal every fence created so far.
    pub fn signal_all_fences(&self) {
        if let Ok(state) = self.state.lock() {
            for flag in &state.fences {
                flag.store(true, Ordering::Release);
            }
        }
    }

    /// Number of buffers created so far.
    pub fn buffers_created(&self) -> usize {
        self.state.lock().map(|s| s.buffer_sizes.len()).unwrap_or(0)
    }

    /// Sizes of all buffers created so far, in creation order.
    pub fn buffer_sizes(&self) -> Vec<u64> {
        self.state.lock().map(|s| s.buffer_sizes.clone()).unwrap_or_default()
    }

    /// All recorded draws, in submission order.
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.lock().map(|s| s.draws.clone()).unwrap_or_default()
    }

    /// All recorded sub-range flushes.
    pub fn flushes(&self) -> Vec<FlushRecord> {
        self.state.lock().map(|s| s.flushes.clone()).unwrap_or_default()
    }

    /// Ids of fences the CPU actually stalled on, in stall order.
    pub fn waits(&self) -> Vec<usize> {
        self.state.lock().map(|s| s.waits.clone()).unwrap_or_default()
    }

    /// The most recently configured attribute base offset.
    pub fn attribute_base_offset(&self) -> u64 {
        self.state.lock().map(|s| s.attribute_base_offset).unwrap_or(0)
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn capabilities(&self) -> GpuCapabilities {
        self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );

        let id = match self.state.lock() {
            Ok(mut state) => {
                state.buffer_sizes.push(descriptor.size);
                state.buffer_sizes.len() - 1
            }
            Err(_) => 0,
        };

        Ok(GpuBuffer::Dummy {
            id,
            storage: Mutex::new(vec![0u8; descriptor.size as usize]),
        })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        let (id, storage) = match buffer {
            GpuBuffer::Dummy { id, storage } => (id, storage),
            #[cfg(feature = "wgpu-backend")]
            _ => {
                log::error!("DummyBackend: write_buffer on a foreign buffer handle");
                return;
            }
        };

        log::trace!(
            "DummyBackend: write_buffer id={} offset={} len={}",
            id,
            offset,
            data.len()
        );

        if let Ok(mut bytes) = storage.lock() {
            let start = offset as usize;
            let end = start + data.len();
            if end > bytes.len() {
                log::error!(
                    "DummyBackend: write of {} bytes at {} overruns buffer {} (size {})",
                    data.len(),
                    offset,
                    id,
                    bytes.len()
                );
                return;
            }
            bytes[start..end].copy_from_slice(data);
        }
    }

    fn flush_buffer_range(&self, buffer: &GpuBuffer, offset: u64, size: u64) {
        let id = match buffer {
            GpuBuffer::Dummy { id, .. } => id,
            #[cfg(feature = "wgpu-backend")]
            _ => return,
        };
        log::trace!(
            "DummyBackend: flush_buffer_range id={} offset={} size={}",
            id,
            offset,
            size
        );
        if let Ok(mut state) = self.state.lock() {
            state.flushes.push(FlushRecord {
                buffer: *id,
                offset,
                size,
            });
        }
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let storage = match buffer {
            GpuBuffer::Dummy { storage, .. } => storage,
            #[cfg(feature = "wgpu-backend")]
            _ => return vec![0u8; size as usize],
        };
        match storage.lock() {
            Ok(bytes) => {
                let start = (offset as usize).min(bytes.len());
                let end = (start + size as usize).min(bytes.len());
                let mut out = bytes[start..end].to_vec();
                out.resize(size as usize, 0);
                out
            }
            Err(_) => vec![0u8; size as usize],
        }
    }

    fn configure_attributes(&self, buffer: &GpuBuffer, layout: &VertexLayout, base_offset: u64) {
        log::trace!(
            "DummyBackend: configure_attributes layout={:?} base_offset={} buffer={:?}",
            layout.label,
            base_offset,
            buffer
        );
        if let Ok(mut state) = self.state.lock() {
            state.attribute_base_offset = base_offset;
        }
    }

    fn draw_indexed(
        &self,
        _vertex_buffer: &GpuBuffer,
        _index_buffer: &GpuBuffer,
        index_count: u32,
        index_byte_offset: u64,
    ) {
        if let Ok(mut state) = self.state.lock() {
            let attribute_base_offset = state.attribute_base_offset;
            state.draws.push(DrawRecord {
                index_count,
                index_byte_offset,
                attribute_base_offset,
            });
        }
    }

    fn create_fence(&self, signaled: bool) -> GpuFence {
        let born_signaled = signaled || self.auto_signal.load(Ordering::Acquire);
        let flag = Arc::new(AtomicBool::new(born_signaled));
        let id = match self.state.lock() {
            Ok(mut state) => {
                state.fences.push(Arc::clone(&flag));
                state.fences.len() - 1
            }
            Err(_) => 0,
        };
        GpuFence::Dummy { id, signaled: flag }
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        match fence {
            GpuFence::Dummy { signaled, .. } => signaled.load(Ordering::Acquire),
            #[cfg(feature = "wgpu-backend")]
            GpuFence::Wgpu { .. } => false,
        }
    }

    fn wait_fence_timeout(&self, fence: &GpuFence, timeout: Duration) -> bool {
        let signaled = match fence {
            GpuFence::Dummy { signaled, .. } => signaled,
            #[cfg(feature = "wgpu-backend")]
            _ => return false,
        };
        let start = Instant::now();
        while !signaled.load(Ordering::Acquire) {
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    fn wait_fence(&self, fence: &GpuFence) {
        let (id, signaled) = match fence {
            GpuFence::Dummy { id, signaled } => (id, signaled),
            #[cfg(feature = "wgpu-backend")]
            _ => return,
        };
        if signaled.load(Ordering::Acquire) {
            return;
        }
        // Pending fence: record the stall, then complete it as the device
        // eventually would.
        if let Ok(mut state) = self.state.lock() {
            state.waits.push(*id);
        }
        signaled.store(true, Ordering::Release);
    }

    fn signal_fence(&self, fence: &GpuFence) {
        match fence {
            GpuFence::Dummy { signaled, .. } => signaled.store(true, Ordering::Release),
            #[cfg(feature = "wgpu-backend")]
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BufferUsage;

    #[test]
    fn test_buffer_storage_roundtrip() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX).with_label("test"))
            .unwrap();

        backend.write_buffer(&buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.read_buffer(&buffer, 4, 4), vec![1, 2, 3, 4]);
        assert_eq!(backend.read_buffer(&buffer, 0, 4), vec![0, 0, 0, 0]);
        assert_eq!(buffer.size(), 16);
    }

    #[test]
    fn test_overrun_write_is_rejected() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(8, BufferUsage::VERTEX))
            .unwrap();

        backend.write_buffer(&buffer, 6, &[9, 9, 9, 9]);
        // Nothing was written.
        assert_eq!(backend.read_buffer(&buffer, 6, 2), vec![0, 0]);
    }

    #[test]
    fn test_fence_lifecycle() {
        let backend = DummyBackend::new();
        backend.set_auto_signal(false);

        let fence = backend.create_fence(false);
        assert!(!backend.is_fence_signaled(&fence));
        assert!(!backend.wait_fence_timeout(&fence, Duration::from_micros(100)));

        backend.signal_fence(&fence);
        assert!(backend.is_fence_signaled(&fence));
        assert!(backend.wait_fence_timeout(&fence, Duration::from_micros(100)));
        assert!(backend.waits().is_empty());
    }

    #[test]
    fn test_unconditional_wait_records_stall() {
        let backend = DummyBackend::new();
        backend.set_auto_signal(false);

        let fence = backend.create_fence(false);
        backend.wait_fence(&fence);
        assert!(backend.is_fence_signaled(&fence));
        assert_eq!(backend.waits(), vec![0]);

        // A signaled fence does not stall again.
        backend.wait_fence(&fence);
        assert_eq!(backend.waits(), vec![0]);
    }

    #[test]
    fn test_auto_signal_fences_are_born_signaled() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false);
        assert!(backend.is_fence_signaled(&fence));
    }
}
