//! Persistently mapped streaming rings for chunk meshes.
//!
//! One vertex ring and one index ring, each split into `segment_count` equal
//! segments used round-robin. The CPU writes the next segment while the
//! device may still be reading previous ones; a completion fence per segment
//! keeps writes from landing on bytes still in flight. With three segments
//! the CPU tolerates up to two frames of device lag before a rotation has to
//! wait.
//!
//! Segments are sized to the next power of two of the requested upload (with
//! a floor), so steady-state uploads never reallocate. When an upload does
//! exceed the current segment size, both rings are torn down and recreated at
//! the new size; every outstanding fence is released unconditionally, since a
//! fence is meaningless once its backing storage is gone. Capacity never
//! shrinks.

use std::sync::Arc;

use crate::backend::{BufferDescriptor, BufferUsage, GpuBackend, GpuBuffer, GpuFence, UsageHint};
use crate::chunk_buffer::StreamConfig;
use crate::error::GraphicsError;
use crate::sync::FenceSynchronizer;

/// The active segment of both rings, produced by a rotation.
///
/// Carries the byte offsets every later step needs: the vertex offset for
/// attribute binding and the index offset for the draw. Threading this one
/// value through upload, bind, and render keeps the write target and the draw
/// source in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSlot {
    /// Segment index in `0..segment_count`.
    pub segment: usize,
    /// Byte offset of the segment in the vertex ring.
    pub vertex_offset: u64,
    /// Byte offset of the segment in the index ring.
    pub index_offset: u64,
}

struct RingHalf {
    buffer: GpuBuffer,
    segment_size: u64,
}

impl RingHalf {
    fn create(
        backend: &Arc<dyn GpuBackend>,
        label: &str,
        usage: BufferUsage,
        segment_size: u64,
        segment_count: usize,
    ) -> Result<Self, GraphicsError> {
        let total = segment_size * segment_count as u64;
        let descriptor = BufferDescriptor::new(
            total,
            usage | BufferUsage::MAP_WRITE | BufferUsage::PERSISTENT,
        )
        .with_label(label)
        .with_hint(UsageHint::Stream);
        let buffer = backend.create_buffer(&descriptor)?;
        Ok(Self {
            buffer,
            segment_size,
        })
    }
}

/// Triple-buffered (by default) persistent storage for one chunk's mesh.
pub struct PersistentMeshRing {
    backend: Arc<dyn GpuBackend>,
    segment_count: usize,
    min_vertex_segment: u64,
    min_index_segment: u64,
    vertex: RingHalf,
    index: RingHalf,
    fences: Vec<Option<GpuFence>>,
    current_segment: Option<usize>,
}

impl PersistentMeshRing {
    /// Create rings sized for an initial upload of the given byte sizes.
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        config: &StreamConfig,
        vertex_bytes: u64,
        index_bytes: u64,
    ) -> Result<Self, GraphicsError> {
        let segment_count = config.segment_count;
        if segment_count < 2 {
            return Err(GraphicsError::InvalidParameter(format!(
                "segment count must be at least 2, got {segment_count}"
            )));
        }

        let vertex_segment = segment_size_for(vertex_bytes, config.min_vertex_segment);
        let index_segment = segment_size_for(index_bytes, config.min_index_segment);
        let vertex = RingHalf::create(
            &backend,
            "chunk_vertex_ring",
            BufferUsage::VERTEX,
            vertex_segment,
            segment_count,
        )?;
        let index = RingHalf::create(
            &backend,
            "chunk_index_ring",
            BufferUsage::INDEX,
            index_segment,
            segment_count,
        )?;

        Ok(Self {
            backend,
            segment_count,
            min_vertex_segment: config.min_vertex_segment,
            min_index_segment: config.min_index_segment,
            vertex,
            index,
            fences: (0..segment_count).map(|_| None).collect(),
            current_segment: None,
        })
    }

    /// Grow the rings if the requested upload does not fit a segment.
    ///
    /// Returns `true` when the rings were recreated. Growth replaces both
    /// rings wholesale and releases every outstanding fence.
    pub fn ensure_capacity(
        &mut self,
        vertex_bytes: u64,
        index_bytes: u64,
    ) -> Result<bool, GraphicsError> {
        let desired_vertex = segment_size_for(vertex_bytes, self.min_vertex_segment);
        let desired_index = segment_size_for(index_bytes, self.min_index_segment);
        if desired_vertex <= self.vertex.segment_size && desired_index <= self.index.segment_size {
            return Ok(false);
        }

        // Capacity only grows.
        let new_vertex = desired_vertex.max(self.vertex.segment_size);
        let new_index = desired_index.max(self.index.segment_size);
        log::debug!(
            "growing mesh rings: vertex segment {} -> {}, index segment {} -> {}",
            self.vertex.segment_size,
            new_vertex,
            self.index.segment_size,
            new_index
        );

        // Fences guard storage that is about to be replaced; they no longer
        // mean anything.
        for fence in &mut self.fences {
            *fence = None;
        }
        self.current_segment = None;

        self.vertex = RingHalf::create(
            &self.backend,
            "chunk_vertex_ring",
            BufferUsage::VERTEX,
            new_vertex,
            self.segment_count,
        )?;
        self.index = RingHalf::create(
            &self.backend,
            "chunk_index_ring",
            BufferUsage::INDEX,
            new_index,
            self.segment_count,
        )?;
        Ok(true)
    }

    /// Rotate to the next segment, waiting out its pending fence if any.
    pub fn begin_upload(&mut self, sync: &FenceSynchronizer) -> SegmentSlot {
        let next = match self.current_segment {
            Some(current) => (current + 1) % self.segment_count,
            None => 0,
        };
        self.current_segment = Some(next);
        self.wait_segment(next, sync);
        self.slot(next)
    }

    /// Block until the given segment's pending fence resolves, then clear it.
    ///
    /// No-op when the segment has no fence.
    pub fn wait_segment(&mut self, segment: usize, sync: &FenceSynchronizer) {
        if let Some(fence) = self.fences[segment].take() {
            let outcome = sync.wait(&fence);
            log::trace!("segment {} fence resolved: {:?}", segment, outcome);
            sync.release(fence);
        }
    }

    /// Write a full mesh into the slot's segments and flush the written
    /// sub-ranges.
    pub fn upload(&self, slot: &SegmentSlot, vertex_data: &[u8], index_data: &[u8]) {
        debug_assert!(vertex_data.len() as u64 <= self.vertex.segment_size);
        debug_assert!(index_data.len() as u64 <= self.index.segment_size);

        self.backend
            .write_buffer(&self.vertex.buffer, slot.vertex_offset, vertex_data);
        self.backend.flush_buffer_range(
            &self.vertex.buffer,
            slot.vertex_offset,
            vertex_data.len() as u64,
        );

        self.backend
            .write_buffer(&self.index.buffer, slot.index_offset, index_data);
        self.backend.flush_buffer_range(
            &self.index.buffer,
            slot.index_offset,
            index_data.len() as u64,
        );
    }

    /// Write vertex bytes at an offset within the slot's vertex segment.
    pub fn write_vertex_range(
        &self,
        slot: &SegmentSlot,
        offset_bytes: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if offset_bytes + data.len() as u64 > self.vertex.segment_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "vertex range {}..{} exceeds segment size {}",
                offset_bytes,
                offset_bytes + data.len() as u64,
                self.vertex.segment_size
            )));
        }
        let absolute = slot.vertex_offset + offset_bytes;
        self.backend.write_buffer(&self.vertex.buffer, absolute, data);
        self.backend
            .flush_buffer_range(&self.vertex.buffer, absolute, data.len() as u64);
        Ok(())
    }

    /// Write index bytes at an offset within the slot's index segment.
    pub fn write_index_range(
        &self,
        slot: &SegmentSlot,
        offset_bytes: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if offset_bytes + data.len() as u64 > self.index.segment_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "index range {}..{} exceeds segment size {}",
                offset_bytes,
                offset_bytes + data.len() as u64,
                self.index.segment_size
            )));
        }
        let absolute = slot.index_offset + offset_bytes;
        self.backend.write_buffer(&self.index.buffer, absolute, data);
        self.backend
            .flush_buffer_range(&self.index.buffer, absolute, data.len() as u64);
        Ok(())
    }

    /// Record a completion fence on the slot's segment.
    ///
    /// The segment must not hold a live fence; rotation and partial updates
    /// always take the old fence before recording a new one.
    pub fn record_fence(&mut self, slot: &SegmentSlot, sync: &FenceSynchronizer) {
        debug_assert!(
            self.fences[slot.segment].is_none(),
            "segment {} already holds a fence",
            slot.segment
        );
        self.fences[slot.segment] = Some(sync.record());
    }

    /// Whether a segment holds an unresolved fence.
    pub fn has_pending_fence(&self, segment: usize) -> bool {
        self.fences[segment].is_some()
    }

    /// The vertex ring buffer.
    pub fn vertex_buffer(&self) -> &GpuBuffer {
        &self.vertex.buffer
    }

    /// The index ring buffer.
    pub fn index_buffer(&self) -> &GpuBuffer {
        &self.index.buffer
    }

    /// Per-segment vertex capacity in bytes.
    pub fn vertex_segment_size(&self) -> u64 {
        self.vertex.segment_size
    }

    /// Per-segment index capacity in bytes.
    pub fn index_segment_size(&self) -> u64 {
        self.index.segment_size
    }

    /// Number of segments per ring.
    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    fn slot(&self, segment: usize) -> SegmentSlot {
        SegmentSlot {
            segment,
            vertex_offset: segment as u64 * self.vertex.segment_size,
            index_offset: segment as u64 * self.index.segment_size,
        }
    }
}

impl std::fmt::Debug for PersistentMeshRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentMeshRing")
            .field("segment_count", &self.segment_count)
            .field("vertex_segment_size", &self.vertex.segment_size)
            .field("index_segment_size", &self.index.segment_size)
            .field("current_segment", &self.current_segment)
            .finish()
    }
}

fn segment_size_for(requested: u64, floor: u64) -> u64 {
    requested.max(1).next_power_of_two().max(floor)
}
