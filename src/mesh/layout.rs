//! Vertex layout definitions and attribute binding.
//!
//! Chunk meshes use a single interleaved vertex buffer, so a layout here is a
//! stride plus a list of attributes at byte offsets within that stride.
//! Layouts are shared via `Arc` since every chunk uses the same one.
//!
//! Binding is offset-relative: on the persistent path the same layout is
//! re-bound every upload with the active ring segment's base offset, so the
//! draw reads from the segment that was just written.

use std::sync::Arc;

use crate::backend::{GpuBackend, GpuBuffer};
use crate::mesh::data::VERTEX_STRIDE_BYTES;

/// Semantic meaning of a vertex attribute.
///
/// Semantics map to fixed shader locations so the same program works for
/// every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeSemantic {
    /// Vertex position (float3).
    Position,
    /// Texture coordinates (float2).
    TexCoord0,
    /// Face normal (float3).
    Normal,
}

impl VertexAttributeSemantic {
    /// Shader attribute location for this semantic.
    pub fn location(&self) -> u32 {
        match self {
            Self::Position => 0,
            Self::TexCoord0 => 1,
            Self::Normal => 2,
        }
    }
}

/// Format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
}

impl VertexAttributeFormat {
    /// Size in bytes of this format.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
        }
    }
}

/// A single vertex attribute description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Semantic meaning of this attribute.
    pub semantic: VertexAttributeSemantic,
    /// Data format of this attribute.
    pub format: VertexAttributeFormat,
    /// Byte offset within the vertex.
    pub offset: u32,
}

impl VertexAttribute {
    /// Create a new vertex attribute.
    pub fn new(semantic: VertexAttributeSemantic, format: VertexAttributeFormat, offset: u32) -> Self {
        Self {
            semantic,
            format,
            offset,
        }
    }

    /// Create a position attribute (float3).
    pub fn position(offset: u32) -> Self {
        Self::new(
            VertexAttributeSemantic::Position,
            VertexAttributeFormat::Float3,
            offset,
        )
    }

    /// Create a texcoord attribute (float2).
    pub fn texcoord0(offset: u32) -> Self {
        Self::new(
            VertexAttributeSemantic::TexCoord0,
            VertexAttributeFormat::Float2,
            offset,
        )
    }

    /// Create a normal attribute (float3).
    pub fn normal(offset: u32) -> Self {
        Self::new(
            VertexAttributeSemantic::Normal,
            VertexAttributeFormat::Float3,
            offset,
        )
    }
}

/// Describes the interleaved layout of a vertex buffer.
///
/// Typically wrapped in `Arc` and shared between buffers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Stride in bytes between consecutive vertices.
    pub stride: u32,
    /// The vertex attributes, each at a byte offset within the stride.
    pub attributes: Vec<VertexAttribute>,
    /// Optional label for debugging.
    pub label: Option<String>,
}

impl VertexLayout {
    /// Create a new empty layout with the given stride.
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            attributes: Vec::new(),
            label: None,
        }
    }

    /// Add a vertex attribute.
    pub fn with_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Check if this layout has a specific semantic.
    pub fn has_semantic(&self, semantic: VertexAttributeSemantic) -> bool {
        self.attributes.iter().any(|attr| attr.semantic == semantic)
    }

    /// Get an attribute by semantic.
    pub fn get_attribute(&self, semantic: VertexAttributeSemantic) -> Option<&VertexAttribute> {
        self.attributes
            .iter()
            .find(|attr| attr.semantic == semantic)
    }

    /// Validate that every attribute fits inside the stride.
    pub fn validate(&self) -> Result<(), String> {
        for attr in &self.attributes {
            if attr.offset + attr.format.size() > self.stride {
                return Err(format!(
                    "attribute {:?} at offset {} overruns stride {}",
                    attr.semantic, attr.offset, self.stride
                ));
            }
        }
        Ok(())
    }

    /// The interleaved chunk vertex layout: position, texcoord, normal.
    pub fn chunk() -> Arc<Self> {
        Arc::new(
            Self::new(VERTEX_STRIDE_BYTES)
                .with_attribute(VertexAttribute::position(0))
                .with_attribute(VertexAttribute::texcoord0(12))
                .with_attribute(VertexAttribute::normal(20))
                .with_label("chunk"),
        )
    }
}

/// Re-binds a vertex layout at a moving base offset.
///
/// Segment rotation changes where in the ring the current mesh lives, so the
/// attribute pointers must be re-configured relative to the active segment's
/// base before each draw can read the right bytes.
#[derive(Debug, Clone)]
pub struct AttributeBinder {
    layout: Arc<VertexLayout>,
}

impl AttributeBinder {
    /// Create a binder for the given layout.
    pub fn new(layout: Arc<VertexLayout>) -> Self {
        debug_assert!(layout.validate().is_ok(), "invalid vertex layout");
        Self { layout }
    }

    /// Create a binder for the standard chunk layout.
    pub fn chunk() -> Self {
        Self::new(VertexLayout::chunk())
    }

    /// Get the layout.
    pub fn layout(&self) -> &Arc<VertexLayout> {
        &self.layout
    }

    /// Configure attribute pointers on `buffer` relative to `base_offset`.
    pub fn bind(&self, backend: &dyn GpuBackend, buffer: &GpuBuffer, base_offset: u64) {
        backend.configure_attributes(buffer, &self.layout, base_offset);
    }
}
