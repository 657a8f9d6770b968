//! # Meshstream
//!
//! Streaming upload of chunk triangle meshes into GPU-resident storage.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`ChunkMeshBuffer`] - per-chunk orchestrator: upload, partial update,
//!   draw, cleanup
//! - [`UploadStrategy`] - capability-driven choice between persistently
//!   mapped triple-buffered rings and a dynamic respecify fallback
//! - [`PersistentMeshRing`] / [`DynamicMeshStorage`] - the two storage shapes
//! - [`FenceSynchronizer`] - poll-then-block fence waits with bounded backoff
//! - [`GpuBackend`] - device seam with dummy (default) and wgpu backends
//!
//! ## Example
//!
//! ```ignore
//! use meshstream::{ChunkMeshBuffer, ChunkMesh, create_backend};
//!
//! let backend = create_backend();
//! let mut buffer = ChunkMeshBuffer::new(backend);
//!
//! let mesh = ChunkMesh::new(vertices, indices);
//! if buffer.needs_upload(version) {
//!     buffer.upload(&mesh, version)?;
//! }
//! buffer.render();
//! ```

pub mod backend;
pub mod capabilities;
pub mod chunk_buffer;
pub mod error;
pub mod mesh;
pub mod metrics;
pub mod resources;
pub mod sync;

// Re-export main types for convenience
pub use backend::{
    create_backend, BufferDescriptor, BufferUsage, DummyBackend, GpuBackend, GpuBuffer, GpuFence,
    UsageHint,
};
pub use capabilities::{GpuCapabilities, GpuVendor, UploadStrategy};
pub use chunk_buffer::{ChunkMeshBuffer, StreamConfig};
pub use error::GraphicsError;
pub use mesh::{
    AttributeBinder, ChunkMesh, PartialMeshUpdate, VertexAttribute, VertexAttributeFormat,
    VertexAttributeSemantic, VertexLayout,
};
pub use metrics::{MetricsSink, UploadCounter, UploadStats};
pub use resources::{DynamicMeshStorage, PersistentMeshRing, SegmentSlot};
pub use sync::{FenceStatus, FenceSynchronizer, WaitOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the streaming subsystem.
///
/// Optional; only logs the version so startup order is visible in traces.
pub fn init() {
    log::info!("meshstream v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_create_backend_falls_back_to_dummy() {
        let backend = create_backend();
        assert!(!backend.name().is_empty());
    }
}
