//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction over the device operations
//! the streaming path needs: buffer storage, mapped-range writes and flushes,
//! completion fences, attribute binding, and indexed draws.
//!
//! # Available Backends
//!
//! - `dummy` (default): byte-accurate simulation for testing and development
//! - `wgpu-backend`: real-device backend using wgpu
//!
//! # Architecture
//!
//! Each backend implements the [`GpuBackend`] trait. Resource handles are
//! per-backend enums ([`GpuBuffer`], [`GpuFence`]) so callers never touch a
//! concrete API type. All operations are expected to be called from the one
//! thread that owns the graphics context; the handles themselves are
//! `Send + Sync` so buffers can be built off-thread and handed over.

pub mod dummy;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use dummy::DummyBackend;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bitflags::bitflags;

use crate::capabilities::GpuCapabilities;
use crate::error::GraphicsError;
use crate::mesh::VertexLayout;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 2;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 3;
        /// Buffer is mappable for CPU writes.
        const MAP_WRITE = 1 << 4;
        /// Buffer stays mapped for its whole lifetime.
        const PERSISTENT = 1 << 5;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Expected update frequency for a buffer's contents.
///
/// A hint only; backends may ignore it when their allocator has no matching
/// concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UsageHint {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten occasionally.
    Dynamic,
    /// Rewritten nearly every frame.
    Stream,
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Update-frequency hint.
    pub hint: UsageHint,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            hint: UsageHint::Static,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the update-frequency hint.
    pub fn with_hint(mut self, hint: UsageHint) -> Self {
        self.hint = hint;
        self
    }
}

/// Handle to a GPU buffer resource.
pub enum GpuBuffer {
    /// Dummy backend buffer with real byte storage so tests can verify
    /// uploaded content.
    Dummy {
        /// Creation-order id assigned by the dummy backend.
        id: usize,
        /// Backing bytes.
        storage: Mutex<Vec<u8>>,
    },
    /// wgpu backend buffer.
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Buffer>),
}

impl GpuBuffer {
    /// Size of the buffer in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy { storage, .. } => {
                storage.lock().map(|s| s.len() as u64).unwrap_or(0)
            }
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => buffer.size(),
        }
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id, .. } => f
                .debug_struct("GpuBuffer::Dummy")
                .field("id", id)
                .field("size", &self.size())
                .finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => f.debug_tuple("GpuBuffer::Wgpu").field(buffer).finish(),
        }
    }
}

/// Handle to a GPU fence for CPU-GPU synchronization.
pub enum GpuFence {
    /// Dummy backend fence.
    Dummy {
        /// Creation-order id assigned by the dummy backend.
        id: usize,
        /// Shared flag, also reachable from the backend's fence registry.
        signaled: Arc<AtomicBool>,
    },
    /// wgpu backend fence. The submission index is consumed by the first
    /// blocking wait; `None` means trivially signaled.
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        /// Index of the submission this fence tracks.
        submission_index: Mutex<Option<wgpu::SubmissionIndex>>,
    },
}

impl std::fmt::Debug for GpuFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id, signaled } => f
                .debug_struct("GpuFence::Dummy")
                .field("id", id)
                .field("signaled", signaled)
                .finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { .. } => f.debug_struct("GpuFence::Wgpu").finish_non_exhaustive(),
        }
    }
}

/// GPU backend trait for abstracting different device APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Get the device capabilities, probed once at backend creation.
    fn capabilities(&self) -> GpuCapabilities;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Write data into a buffer at a byte offset.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]);

    /// Flush a written sub-range of a mapped buffer.
    ///
    /// A no-op when the mapping is coherent or when the backend uploads
    /// through a queue.
    fn flush_buffer_range(&self, buffer: &GpuBuffer, offset: u64, size: u64);

    /// Read data back from a buffer.
    ///
    /// Blocking; waits for the device to finish.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8>;

    /// Configure vertex attribute pointers relative to `base_offset`.
    fn configure_attributes(&self, buffer: &GpuBuffer, layout: &VertexLayout, base_offset: u64);

    /// Issue one indexed draw reading `index_count` indices starting at
    /// `index_byte_offset`.
    fn draw_indexed(
        &self,
        vertex_buffer: &GpuBuffer,
        index_buffer: &GpuBuffer,
        index_count: u32,
        index_byte_offset: u64,
    );

    /// Create a fence tracking all device work submitted so far.
    fn create_fence(&self, signaled: bool) -> GpuFence;

    /// Check if a fence is signaled (non-blocking).
    fn is_fence_signaled(&self, fence: &GpuFence) -> bool;

    /// Wait for a fence with a timeout.
    ///
    /// Returns `true` if the fence signaled, `false` if the timeout elapsed.
    fn wait_fence_timeout(&self, fence: &GpuFence, timeout: Duration) -> bool;

    /// Wait for a fence unconditionally.
    fn wait_fence(&self, fence: &GpuFence);

    /// Signal a fence (for testing/dummy backend).
    fn signal_fence(&self, fence: &GpuFence);
}

/// Selects and creates the appropriate backend based on available features.
pub fn create_backend() -> Arc<dyn GpuBackend> {
    #[cfg(feature = "wgpu-backend")]
    {
        match wgpu_backend::WgpuBackend::new() {
            Ok(backend) => {
                log::info!("Using wgpu backend");
                return Arc::new(backend);
            }
            Err(e) => {
                log::warn!("Failed to create wgpu backend: {}", e);
            }
        }
    }

    log::info!("Using dummy backend");
    Arc::new(dummy::DummyBackend::new())
}

// Ensure handles can cross threads
static_assertions::assert_impl_all!(GpuBuffer: Send, Sync);
static_assertions::assert_impl_all!(GpuFence: Send, Sync);
