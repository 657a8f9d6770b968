//! GPU-resident mesh storage.
//!
//! Two storage shapes, one per upload strategy:
//!
//! - [`PersistentMeshRing`] - persistently mapped vertex/index rings split
//!   into equal segments rotated round-robin, gated by completion fences
//! - [`DynamicMeshStorage`] - exact-size buffers respecified on every full
//!   upload, for devices without (or disallowed from) persistent mapping
//!
//! [`SegmentSlot`] is the segment descriptor threaded from upload through
//! attribute binding to the draw, so the write target and the draw source can
//! never disagree.

mod dynamic;
mod ring;

pub use dynamic::DynamicMeshStorage;
pub use ring::{PersistentMeshRing, SegmentSlot};
