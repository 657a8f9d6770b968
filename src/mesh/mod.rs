//! Mesh types for chunk geometry.
//!
//! This module provides the CPU-side mesh representation and the vertex
//! layout machinery used to bind it:
//!
//! - [`ChunkMesh`] - interleaved vertex floats plus a triangle index list
//! - [`PartialMeshUpdate`] - sub-range edit applied without a full upload
//! - [`VertexLayout`] - attribute layout (shared via `Arc`)
//! - [`AttributeBinder`] - re-binds the layout at a segment's base offset

mod data;
mod layout;

pub use data::{ChunkMesh, PartialMeshUpdate, FLOATS_PER_VERTEX, VERTEX_STRIDE_BYTES};
pub use layout::{
    AttributeBinder, VertexAttribute, VertexAttributeFormat, VertexAttributeSemantic, VertexLayout,
};
