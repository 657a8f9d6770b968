//! CPU-side chunk mesh data.
//!
//! A [`ChunkMesh`] is the handoff value between mesh construction and the
//! upload path: interleaved vertex floats plus a `u32` triangle index list.
//! Building the mesh (face culling, greedy merging) happens elsewhere; this
//! type only carries the result.

/// Floats per interleaved vertex: position (3) + texcoord (2) + normal (3).
pub const FLOATS_PER_VERTEX: usize = 8;

/// Byte stride of one interleaved vertex.
pub const VERTEX_STRIDE_BYTES: u32 = (FLOATS_PER_VERTEX * std::mem::size_of::<f32>()) as u32;

/// CPU-side mesh for a single chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMesh {
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl ChunkMesh {
    /// Create a mesh from interleaved vertex floats and a triangle index list.
    pub fn new(vertices: Vec<f32>, indices: Vec<u32>) -> Self {
        debug_assert_eq!(
            vertices.len() % FLOATS_PER_VERTEX,
            0,
            "vertex data must be a whole number of interleaved vertices"
        );
        Self { vertices, indices }
    }

    /// A mesh with no geometry, used for chunks that are entirely air.
    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Raw interleaved vertex floats.
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    /// Triangle index list.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / FLOATS_PER_VERTEX
    }

    /// Number of indices.
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// True when the mesh has no drawable geometry.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Vertex payload size in bytes.
    pub fn vertex_bytes(&self) -> u64 {
        (self.vertices.len() * std::mem::size_of::<f32>()) as u64
    }

    /// Index payload size in bytes.
    pub fn index_bytes(&self) -> u64 {
        (self.indices.len() * std::mem::size_of::<u32>()) as u64
    }

    /// Vertex payload as bytes, ready for upload.
    pub fn vertex_data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index payload as bytes, ready for upload.
    pub fn index_data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// A sub-range edit of an already-uploaded mesh.
///
/// Offsets are in elements (floats for vertex data, indices for index data),
/// relative to the start of the mesh. Lengths are implied by the slices.
/// Used for small frequent edits, e.g. swapping the texture coordinates of a
/// single decoration face, without resubmitting the whole mesh.
///
/// # Example
///
/// ```ignore
/// let patch = [0.0f32; 8];
/// let update = PartialMeshUpdate::new().with_vertices(16, &patch);
/// buffer.update_partial(&update)?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialMeshUpdate<'a> {
    /// Replacement vertex floats, if any.
    pub vertex_data: Option<&'a [f32]>,
    /// Element offset of the vertex replacement (in floats).
    pub vertex_offset: usize,
    /// Replacement indices, if any.
    pub index_data: Option<&'a [u32]>,
    /// Element offset of the index replacement (in indices).
    pub index_offset: usize,
}

impl<'a> PartialMeshUpdate<'a> {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `data.len()` vertex floats starting at float `offset`.
    pub fn with_vertices(mut self, offset: usize, data: &'a [f32]) -> Self {
        self.vertex_offset = offset;
        self.vertex_data = Some(data);
        self
    }

    /// Replace `data.len()` indices starting at index `offset`.
    pub fn with_indices(mut self, offset: usize, data: &'a [u32]) -> Self {
        self.index_offset = offset;
        self.index_data = Some(data);
        self
    }

    /// True when the update carries no data.
    pub fn is_noop(&self) -> bool {
        self.vertex_data.map_or(true, <[f32]>::is_empty)
            && self.index_data.map_or(true, <[u32]>::is_empty)
    }

    /// Total payload size in bytes.
    pub fn byte_len(&self) -> u64 {
        let vertex = self.vertex_data.map_or(0, |d| d.len() * std::mem::size_of::<f32>());
        let index = self.index_data.map_or(0, |d| d.len() * std::mem::size_of::<u32>());
        (vertex + index) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> ChunkMesh {
        ChunkMesh::new(vec![0.5; 4 * FLOATS_PER_VERTEX], vec![0, 1, 2, 2, 3, 0])
    }

    #[test]
    fn test_counts() {
        let mesh = quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.index_count(), 6);
        assert_eq!(mesh.vertex_bytes(), (4 * FLOATS_PER_VERTEX * 4) as u64);
        assert_eq!(mesh.index_bytes(), 24);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn test_empty() {
        assert!(ChunkMesh::empty().is_empty());
        // Vertices without indices are not drawable either.
        let no_indices = ChunkMesh::new(vec![0.0; FLOATS_PER_VERTEX], Vec::new());
        assert!(no_indices.is_empty());
    }

    #[test]
    fn test_byte_views() {
        let mesh = quad();
        assert_eq!(mesh.vertex_data().len() as u64, mesh.vertex_bytes());
        assert_eq!(mesh.index_data().len() as u64, mesh.index_bytes());
        // Little-endian check on the first index (0u32).
        assert_eq!(&mesh.index_data()[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_partial_update() {
        let patch = [1.0f32, 2.0];
        let update = PartialMeshUpdate::new().with_vertices(8, &patch);
        assert!(!update.is_noop());
        assert_eq!(update.byte_len(), 8);
        assert_eq!(update.vertex_offset, 8);

        assert!(PartialMeshUpdate::new().is_noop());
        let empty: [u32; 0] = [];
        assert!(PartialMeshUpdate::new().with_indices(4, &empty).is_noop());
    }
}
