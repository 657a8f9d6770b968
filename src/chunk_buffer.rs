//! Per-chunk GPU mesh buffer.
//!
//! [`ChunkMeshBuffer`] owns everything one chunk needs to get its mesh onto
//! the device and drawn: the storage (ring or dynamic), the fence policy, the
//! attribute binder, and the draw bookkeeping. Device resources are created
//! lazily on the first upload; the upload strategy is selected once at that
//! point and cached for the buffer's lifetime.
//!
//! All methods must be called from the thread that owns the graphics context.
//! Different buffers (different chunks) are fully independent.
//!
//! # Example
//!
//! ```ignore
//! let backend = meshstream::create_backend();
//! let mut buffer = ChunkMeshBuffer::new(backend.clone());
//!
//! if buffer.needs_upload(mesh_version) {
//!     buffer.upload(&mesh, mesh_version)?;
//! }
//! buffer.render();
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{GpuBackend, GpuBuffer, UsageHint};
use crate::capabilities::UploadStrategy;
use crate::error::GraphicsError;
use crate::mesh::{AttributeBinder, ChunkMesh, PartialMeshUpdate, VertexLayout};
use crate::metrics::{MetricsSink, UploadStats};
use crate::resources::{DynamicMeshStorage, PersistentMeshRing, SegmentSlot};
use crate::sync::FenceSynchronizer;

/// Tunables for the streaming path.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Ring segments per buffer. Three tolerates two frames of device lag.
    pub segment_count: usize,
    /// Smallest vertex segment allocated, in bytes.
    pub min_vertex_segment: u64,
    /// Smallest index segment allocated, in bytes.
    pub min_index_segment: u64,
    /// Total polling time before a fence wait escalates to blocking.
    pub fence_budget: Duration,
    /// Maximum fence polls before escalating.
    pub fence_max_polls: u32,
    /// Update-frequency hint for dynamic-path buffers.
    pub usage_hint: UsageHint,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            segment_count: 3,
            min_vertex_segment: 8 * 1024,
            min_index_segment: 4 * 1024,
            fence_budget: FenceSynchronizer::DEFAULT_BUDGET,
            fence_max_polls: FenceSynchronizer::DEFAULT_MAX_POLLS,
            usage_hint: UsageHint::Static,
        }
    }
}

impl StreamConfig {
    /// Set the number of ring segments.
    pub fn with_segment_count(mut self, count: usize) -> Self {
        self.segment_count = count;
        self
    }

    /// Set the minimum vertex and index segment sizes in bytes.
    pub fn with_min_segments(mut self, vertex: u64, index: u64) -> Self {
        self.min_vertex_segment = vertex;
        self.min_index_segment = index;
        self
    }

    /// Set the fence polling budget.
    pub fn with_fence_budget(mut self, budget: Duration) -> Self {
        self.fence_budget = budget;
        self
    }

    /// Set the maximum fence polls.
    pub fn with_fence_max_polls(mut self, max_polls: u32) -> Self {
        self.fence_max_polls = max_polls;
        self
    }

    /// Set the dynamic-path usage hint.
    pub fn with_usage_hint(mut self, hint: UsageHint) -> Self {
        self.usage_hint = hint;
        self
    }
}

enum MeshStorage {
    Uninit,
    Persistent(PersistentMeshRing),
    Dynamic(DynamicMeshStorage),
}

/// GPU-resident mesh storage and draw state for one chunk.
pub struct ChunkMeshBuffer {
    backend: Arc<dyn GpuBackend>,
    config: StreamConfig,
    sync: FenceSynchronizer,
    binder: AttributeBinder,
    metrics: Option<Arc<dyn MetricsSink>>,
    storage: MeshStorage,
    strategy: Option<UploadStrategy>,
    uploaded_version: Option<u64>,
    index_count: u32,
    active_slot: Option<SegmentSlot>,
    stats: UploadStats,
}

impl ChunkMeshBuffer {
    /// Create a buffer with the default configuration.
    ///
    /// No device resources are allocated until the first [`upload`].
    ///
    /// [`upload`]: Self::upload
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self::with_config(backend, StreamConfig::default())
    }

    /// Create a buffer with an explicit configuration.
    pub fn with_config(backend: Arc<dyn GpuBackend>, config: StreamConfig) -> Self {
        let sync = FenceSynchronizer::new(Arc::clone(&backend))
            .with_budget(config.fence_budget)
            .with_max_polls(config.fence_max_polls);
        Self {
            backend,
            config,
            sync,
            binder: AttributeBinder::chunk(),
            metrics: None,
            storage: MeshStorage::Uninit,
            strategy: None,
            uploaded_version: None,
            index_count: 0,
            active_slot: None,
            stats: UploadStats::default(),
        }
    }

    /// Attach a metrics sink; uploaded byte counts are reported to it.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Use a vertex layout other than the standard chunk layout.
    pub fn with_layout(mut self, layout: Arc<VertexLayout>) -> Self {
        self.binder = AttributeBinder::new(layout);
        self
    }

    /// Upload a full mesh tagged with a monotonic version.
    ///
    /// An empty or degenerate mesh (no vertices or no indices) releases the
    /// buffer instead, leaving it empty rather than inconsistent. Versions
    /// already uploaded, or older than the uploaded one, are skipped.
    ///
    /// # Errors
    ///
    /// Device allocation failures propagate; they are fatal for this buffer
    /// and the caller decides what dies with it.
    pub fn upload(&mut self, mesh: &ChunkMesh, version: u64) -> Result<(), GraphicsError> {
        if mesh.is_empty() {
            self.cleanup();
            return Ok(());
        }

        if let Some(uploaded) = self.uploaded_version {
            if version <= uploaded {
                log::trace!(
                    "skipping upload of version {} (version {} already resident)",
                    version,
                    uploaded
                );
                return Ok(());
            }
        }

        let strategy = match self.strategy {
            Some(strategy) => strategy,
            None => {
                let caps = self.backend.capabilities();
                let strategy = UploadStrategy::select(&caps);
                log::debug!("selected {:?} for {:?}", strategy, caps);
                self.strategy = Some(strategy);
                strategy
            }
        };

        let vertex_bytes = mesh.vertex_bytes();
        let index_bytes = mesh.index_bytes();
        let start = Instant::now();

        match strategy {
            UploadStrategy::PersistentTripleBuffered => {
                if !matches!(self.storage, MeshStorage::Persistent(_)) {
                    self.storage = MeshStorage::Persistent(PersistentMeshRing::new(
                        Arc::clone(&self.backend),
                        &self.config,
                        vertex_bytes,
                        index_bytes,
                    )?);
                }
                if let MeshStorage::Persistent(ring) = &mut self.storage {
                    ring.ensure_capacity(vertex_bytes, index_bytes)?;
                    let slot = ring.begin_upload(&self.sync);
                    ring.upload(&slot, mesh.vertex_data(), mesh.index_data());
                    self.binder
                        .bind(self.backend.as_ref(), ring.vertex_buffer(), slot.vertex_offset);
                    ring.record_fence(&slot, &self.sync);
                    self.active_slot = Some(slot);
                }
            }
            UploadStrategy::DynamicRespecify => {
                if !matches!(self.storage, MeshStorage::Dynamic(_)) {
                    self.storage = MeshStorage::Dynamic(DynamicMeshStorage::new(
                        Arc::clone(&self.backend),
                        self.config.usage_hint,
                    ));
                }
                if let MeshStorage::Dynamic(storage) = &mut self.storage {
                    storage.upload(mesh.vertex_data(), mesh.index_data())?;
                    if let Some(vertex) = storage.vertex_buffer() {
                        self.binder.bind(self.backend.as_ref(), vertex, 0);
                    }
                    self.active_slot = None;
                }
            }
        }

        self.index_count = mesh.index_count() as u32;
        self.uploaded_version = Some(version);
        self.stats.record(start.elapsed());

        let bytes = vertex_bytes + index_bytes;
        if let Some(metrics) = &self.metrics {
            metrics.record_bytes_uploaded(bytes);
        }
        log::trace!("uploaded mesh version {} ({} bytes)", version, bytes);
        Ok(())
    }

    /// Apply a sub-range edit to the resident mesh.
    ///
    /// On the persistent path this writes into the currently bound segment
    /// (no rotation), after waiting out that segment's fence so an in-flight
    /// draw cannot observe the write; a fresh fence is recorded afterwards.
    /// On the dynamic path it writes in place when the range fits current
    /// capacity. A no-op before the first successful upload.
    pub fn update_partial(&mut self, update: &PartialMeshUpdate<'_>) -> Result<(), GraphicsError> {
        if update.is_noop() {
            return Ok(());
        }

        match &mut self.storage {
            MeshStorage::Uninit => return Ok(()),
            MeshStorage::Persistent(ring) => {
                let Some(slot) = self.active_slot else {
                    return Ok(());
                };
                ring.wait_segment(slot.segment, &self.sync);

                let mut written = Ok(());
                if let Some(data) = update.vertex_data {
                    let offset = (update.vertex_offset * std::mem::size_of::<f32>()) as u64;
                    written = ring.write_vertex_range(&slot, offset, bytemuck::cast_slice(data));
                }
                if written.is_ok() {
                    if let Some(data) = update.index_data {
                        let offset = (update.index_offset * std::mem::size_of::<u32>()) as u64;
                        written = ring.write_index_range(&slot, offset, bytemuck::cast_slice(data));
                    }
                }
                // The segment is bound again either way; keep it fenced.
                ring.record_fence(&slot, &self.sync);
                written?;
            }
            MeshStorage::Dynamic(storage) => {
                if let Some(data) = update.vertex_data {
                    let offset = (update.vertex_offset * std::mem::size_of::<f32>()) as u64;
                    storage.update_vertex_range(offset, bytemuck::cast_slice(data))?;
                }
                if let Some(data) = update.index_data {
                    let offset = (update.index_offset * std::mem::size_of::<u32>()) as u64;
                    storage.update_index_range(offset, bytemuck::cast_slice(data))?;
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_bytes_uploaded(update.byte_len());
        }
        Ok(())
    }

    /// Draw the resident mesh.
    ///
    /// A no-op when nothing was ever uploaded or the mesh is empty. The index
    /// count and offsets always come from the most recently completed upload.
    /// Drawing itself needs no fence; device command ordering serializes the
    /// draw against prior writes to the same segment.
    pub fn render(&self) {
        if self.index_count == 0 {
            return;
        }
        match &self.storage {
            MeshStorage::Uninit => {}
            MeshStorage::Persistent(ring) => {
                let Some(slot) = self.active_slot else {
                    return;
                };
                self.binder
                    .bind(self.backend.as_ref(), ring.vertex_buffer(), slot.vertex_offset);
                self.backend.draw_indexed(
                    ring.vertex_buffer(),
                    ring.index_buffer(),
                    self.index_count,
                    slot.index_offset,
                );
            }
            MeshStorage::Dynamic(storage) => {
                if let (Some(vertex), Some(index)) =
                    (storage.vertex_buffer(), storage.index_buffer())
                {
                    self.binder.bind(self.backend.as_ref(), vertex, 0);
                    self.backend
                        .draw_indexed(vertex, index, self.index_count, 0);
                }
            }
        }
    }

    /// Release all device resources.
    ///
    /// Idempotent; safe on a never-initialized buffer. Dropping the storage
    /// releases its buffers and any outstanding fences. The cached strategy
    /// and accumulated timing stats survive.
    pub fn cleanup(&mut self) {
        if !matches!(self.storage, MeshStorage::Uninit) {
            log::trace!("releasing chunk mesh storage");
        }
        self.storage = MeshStorage::Uninit;
        self.active_slot = None;
        self.index_count = 0;
        self.uploaded_version = None;
    }

    /// Whether `version` differs from the resident mesh version.
    pub fn needs_upload(&self, version: u64) -> bool {
        self.uploaded_version != Some(version)
    }

    /// Whether device resources currently exist.
    pub fn is_initialized(&self) -> bool {
        !matches!(self.storage, MeshStorage::Uninit)
    }

    /// Index count of the resident mesh (0 when empty).
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Byte offset the next draw reads indices from.
    pub fn draw_offset(&self) -> u64 {
        self.active_slot.map_or(0, |slot| slot.index_offset)
    }

    /// The cached upload strategy (`None` before the first upload).
    pub fn strategy(&self) -> Option<UploadStrategy> {
        self.strategy
    }

    /// Duration of the most recent upload.
    pub fn last_upload_duration(&self) -> Duration {
        self.stats.last_upload_duration()
    }

    /// Accumulated duration of all uploads.
    pub fn total_upload_duration(&self) -> Duration {
        self.stats.total_upload_duration()
    }

    /// Number of completed uploads.
    pub fn upload_count(&self) -> u64 {
        self.stats.upload_count()
    }

    /// The resident vertex buffer, if any.
    pub fn vertex_buffer(&self) -> Option<&GpuBuffer> {
        match &self.storage {
            MeshStorage::Uninit => None,
            MeshStorage::Persistent(ring) => Some(ring.vertex_buffer()),
            MeshStorage::Dynamic(storage) => storage.vertex_buffer(),
        }
    }

    /// The resident index buffer, if any.
    pub fn index_buffer(&self) -> Option<&GpuBuffer> {
        match &self.storage {
            MeshStorage::Uninit => None,
            MeshStorage::Persistent(ring) => Some(ring.index_buffer()),
            MeshStorage::Dynamic(storage) => storage.index_buffer(),
        }
    }
}

impl std::fmt::Debug for ChunkMeshBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkMeshBuffer")
            .field("strategy", &self.strategy)
            .field("uploaded_version", &self.uploaded_version)
            .field("index_count", &self.index_count)
            .field("active_slot", &self.active_slot)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.segment_count, 3);
        assert_eq!(config.min_vertex_segment, 8 * 1024);
        assert_eq!(config.min_index_segment, 4 * 1024);
    }

    #[test]
    fn test_config_builders() {
        let config = StreamConfig::default()
            .with_segment_count(4)
            .with_min_segments(512, 256)
            .with_fence_budget(Duration::from_millis(1))
            .with_fence_max_polls(8)
            .with_usage_hint(UsageHint::Stream);
        assert_eq!(config.segment_count, 4);
        assert_eq!(config.min_vertex_segment, 512);
        assert_eq!(config.min_index_segment, 256);
        assert_eq!(config.fence_budget, Duration::from_millis(1));
        assert_eq!(config.fence_max_polls, 8);
        assert_eq!(config.usage_hint, UsageHint::Stream);
    }
}
