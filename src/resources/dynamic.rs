//! Dynamic respecify storage, the fallback upload path.
//!
//! Used when persistent mapping is unavailable or disallowed for the device.
//! Every full upload discards the prior buffers and allocates fresh ones
//! sized exactly to the incoming mesh; the device's own storage replacement
//! serializes reuse, so no fences are needed. Partial updates write in place
//! when the range fits the current capacity.

use std::sync::Arc;

use crate::backend::{BufferDescriptor, BufferUsage, GpuBackend, GpuBuffer, UsageHint};
use crate::error::GraphicsError;

struct SizedBuffer {
    buffer: GpuBuffer,
    capacity: u64,
}

/// Exact-size vertex/index storage respecified on every full upload.
pub struct DynamicMeshStorage {
    backend: Arc<dyn GpuBackend>,
    hint: UsageHint,
    vertex: Option<SizedBuffer>,
    index: Option<SizedBuffer>,
}

impl DynamicMeshStorage {
    /// Create empty storage; buffers are allocated by the first upload.
    pub fn new(backend: Arc<dyn GpuBackend>, hint: UsageHint) -> Self {
        Self {
            backend,
            hint,
            vertex: None,
            index: None,
        }
    }

    /// Replace all storage with fresh buffers holding the given payloads.
    pub fn upload(&mut self, vertex_data: &[u8], index_data: &[u8]) -> Result<(), GraphicsError> {
        let vertex = self.create_filled(vertex_data, BufferUsage::VERTEX, "chunk_vertices")?;
        let index = self.create_filled(index_data, BufferUsage::INDEX, "chunk_indices")?;
        self.vertex = Some(vertex);
        self.index = Some(index);
        Ok(())
    }

    /// Overwrite vertex bytes in place.
    ///
    /// Fails when the range exceeds the current capacity; a larger edit needs
    /// a full upload.
    pub fn update_vertex_range(&self, offset_bytes: u64, data: &[u8]) -> Result<(), GraphicsError> {
        Self::update_range(&self.backend, self.vertex.as_ref(), offset_bytes, data, "vertex")
    }

    /// Overwrite index bytes in place.
    pub fn update_index_range(&self, offset_bytes: u64, data: &[u8]) -> Result<(), GraphicsError> {
        Self::update_range(&self.backend, self.index.as_ref(), offset_bytes, data, "index")
    }

    /// The vertex buffer, once uploaded.
    pub fn vertex_buffer(&self) -> Option<&GpuBuffer> {
        self.vertex.as_ref().map(|b| &b.buffer)
    }

    /// The index buffer, once uploaded.
    pub fn index_buffer(&self) -> Option<&GpuBuffer> {
        self.index.as_ref().map(|b| &b.buffer)
    }

    /// Current vertex capacity in bytes (0 before the first upload).
    pub fn vertex_capacity(&self) -> u64 {
        self.vertex.as_ref().map_or(0, |b| b.capacity)
    }

    /// Current index capacity in bytes (0 before the first upload).
    pub fn index_capacity(&self) -> u64 {
        self.index.as_ref().map_or(0, |b| b.capacity)
    }

    fn create_filled(
        &self,
        data: &[u8],
        usage: BufferUsage,
        label: &str,
    ) -> Result<SizedBuffer, GraphicsError> {
        let descriptor = BufferDescriptor::new(data.len() as u64, usage | BufferUsage::COPY_DST)
            .with_label(label)
            .with_hint(self.hint);
        let buffer = self.backend.create_buffer(&descriptor)?;
        self.backend.write_buffer(&buffer, 0, data);
        Ok(SizedBuffer {
            buffer,
            capacity: data.len() as u64,
        })
    }

    fn update_range(
        backend: &Arc<dyn GpuBackend>,
        target: Option<&SizedBuffer>,
        offset_bytes: u64,
        data: &[u8],
        what: &str,
    ) -> Result<(), GraphicsError> {
        let Some(target) = target else {
            return Err(GraphicsError::InvalidParameter(format!(
                "{what} update before any full upload"
            )));
        };
        if offset_bytes + data.len() as u64 > target.capacity {
            return Err(GraphicsError::InvalidParameter(format!(
                "{what} range {}..{} exceeds capacity {}",
                offset_bytes,
                offset_bytes + data.len() as u64,
                target.capacity
            )));
        }
        backend.write_buffer(&target.buffer, offset_bytes, data);
        Ok(())
    }
}

impl std::fmt::Debug for DynamicMeshStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicMeshStorage")
            .field("vertex_capacity", &self.vertex_capacity())
            .field("index_capacity", &self.index_capacity())
            .field("hint", &self.hint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn setup() -> (Arc<DummyBackend>, DynamicMeshStorage) {
        let backend = Arc::new(DummyBackend::new());
        let storage =
            DynamicMeshStorage::new(backend.clone() as Arc<dyn GpuBackend>, UsageHint::Static);
        (backend, storage)
    }

    #[test]
    fn test_upload_respecifies_exact_sizes() {
        let (backend, mut storage) = setup();
        storage.upload(&[1u8; 96], &[2u8; 24]).unwrap();
        assert_eq!(storage.vertex_capacity(), 96);
        assert_eq!(storage.index_capacity(), 24);
        assert_eq!(backend.buffer_sizes(), vec![96, 24]);

        // A second upload discards and reallocates at the new exact size.
        storage.upload(&[3u8; 48], &[4u8; 12]).unwrap();
        assert_eq!(storage.vertex_capacity(), 48);
        assert_eq!(backend.buffers_created(), 4);
        let vertex = storage.vertex_buffer().unwrap();
        assert_eq!(backend.read_buffer(vertex, 0, 48), vec![3u8; 48]);
    }

    #[test]
    fn test_partial_update_in_place() {
        let (backend, mut storage) = setup();
        storage.upload(&[0u8; 64], &[0u8; 16]).unwrap();

        storage.update_vertex_range(8, &[7u8; 4]).unwrap();
        let vertex = storage.vertex_buffer().unwrap();
        assert_eq!(backend.read_buffer(vertex, 8, 4), vec![7u8; 4]);
        // No reallocation happened.
        assert_eq!(backend.buffers_created(), 2);
    }

    #[test]
    fn test_partial_update_bounds() {
        let (_backend, mut storage) = setup();
        assert!(storage.update_vertex_range(0, &[0u8; 4]).is_err());

        storage.upload(&[0u8; 64], &[0u8; 16]).unwrap();
        assert!(storage.update_vertex_range(60, &[0u8; 4]).is_ok());
        assert!(storage.update_vertex_range(61, &[0u8; 4]).is_err());
        assert!(storage.update_index_range(12, &[0u8; 4]).is_ok());
        assert!(storage.update_index_range(13, &[0u8; 4]).is_err());
    }
}
