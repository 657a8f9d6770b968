//! End-to-end streaming behavior over the dummy backend.
//!
//! These tests drive [`ChunkMeshBuffer`] the way a chunk renderer would:
//! build a mesh, upload it under a version, draw, edit, grow, and tear down,
//! verifying the bytes that land in device storage and the draws that come
//! back out.

use std::sync::Arc;
use std::time::Duration;

use meshstream::{
    ChunkMesh, ChunkMeshBuffer, DummyBackend, GpuBackend, GpuCapabilities, GpuVendor,
    PartialMeshUpdate, StreamConfig, UploadCounter, UploadStrategy,
};
use rstest::rstest;

const FLOATS_PER_VERTEX: usize = 8;

/// A mesh of `quads` textured quads with a recognizable per-float pattern.
fn test_mesh(quads: u32, seed: f32) -> ChunkMesh {
    let vertex_count = quads as usize * 4;
    let vertices: Vec<f32> = (0..vertex_count * FLOATS_PER_VERTEX)
        .map(|i| seed + i as f32)
        .collect();
    let indices: Vec<u32> = (0..quads)
        .flat_map(|q| {
            let base = q * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect();
    ChunkMesh::new(vertices, indices)
}

fn persistent_backend() -> Arc<DummyBackend> {
    Arc::new(DummyBackend::new())
}

fn dynamic_backend() -> Arc<DummyBackend> {
    Arc::new(DummyBackend::with_capabilities(GpuCapabilities::new(
        false,
        GpuVendor::Other,
    )))
}

/// Small segments and a short fence budget keep growth and stall tests fast.
fn test_config() -> StreamConfig {
    StreamConfig::default()
        .with_min_segments(1024, 256)
        .with_fence_budget(Duration::from_millis(1))
        .with_fence_max_polls(4)
}

fn buffer(backend: &Arc<DummyBackend>) -> ChunkMeshBuffer {
    ChunkMeshBuffer::with_config(backend.clone() as Arc<dyn GpuBackend>, test_config())
}

#[test]
fn upload_makes_mesh_resident() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);

    let mesh = test_mesh(4, 0.0);
    assert!(buf.needs_upload(1));
    buf.upload(&mesh, 1).unwrap();

    assert!(!buf.needs_upload(1));
    assert!(buf.needs_upload(2));
    assert!(buf.is_initialized());
    assert_eq!(buf.index_count() as usize, mesh.index_count());
    assert_eq!(buf.strategy(), Some(UploadStrategy::PersistentTripleBuffered));
    assert_eq!(buf.upload_count(), 1);
}

#[rstest]
#[case::no_vertices(ChunkMesh::new(Vec::new(), vec![0, 1, 2]))]
#[case::no_indices(ChunkMesh::new(vec![0.0; FLOATS_PER_VERTEX * 3], Vec::new()))]
#[case::empty(ChunkMesh::empty())]
fn degenerate_mesh_releases_the_buffer(#[case] mesh: ChunkMesh) {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);

    // Degenerate upload on a fresh buffer stays uninitialized.
    buf.upload(&mesh, 1).unwrap();
    assert_eq!(buf.index_count(), 0);
    assert!(!buf.is_initialized());

    // Degenerate upload over a resident mesh tears it down.
    buf.upload(&test_mesh(2, 0.0), 2).unwrap();
    assert!(buf.is_initialized());
    buf.upload(&mesh, 3).unwrap();
    assert_eq!(buf.index_count(), 0);
    assert!(!buf.is_initialized());
    buf.render();
    assert!(backend.draws().is_empty());
}

#[test]
fn repeated_upload_of_same_version_is_skipped() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);
    let mesh = test_mesh(4, 0.0);

    buf.upload(&mesh, 1).unwrap();
    let draw_offset = buf.draw_offset();

    buf.upload(&mesh, 1).unwrap();
    assert_eq!(buf.index_count() as usize, mesh.index_count());
    assert_eq!(buf.draw_offset(), draw_offset);
    // The second call did not rotate a segment or re-upload.
    assert_eq!(buf.upload_count(), 1);
}

#[test]
fn stale_version_never_replaces_newer_mesh() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);

    buf.upload(&test_mesh(6, 0.0), 5).unwrap();
    let resident = buf.index_count();

    buf.upload(&test_mesh(1, 9.0), 3).unwrap();
    assert_eq!(buf.index_count(), resident);
    assert!(!buf.needs_upload(5));
}

#[test]
fn ring_rotation_waits_on_the_displaced_fence() {
    let backend = persistent_backend();
    backend.set_auto_signal(false);
    let mut buf = buffer(&backend);
    let mesh = test_mesh(2, 0.0);

    // Three uploads fill the ring without stalling.
    for version in 1..=3 {
        buf.upload(&mesh, version).unwrap();
    }
    assert!(backend.waits().is_empty());

    // The fourth rotates back onto segment 0 and must wait for the fence
    // recorded by upload 1 (the first fence created).
    buf.upload(&mesh, 4).unwrap();
    assert_eq!(backend.waits(), vec![0]);
    assert_eq!(buf.draw_offset(), 0);

    // The fifth displaces upload 2's fence.
    buf.upload(&mesh, 5).unwrap();
    assert_eq!(backend.waits(), vec![0, 1]);
}

#[test]
fn signaled_fences_never_stall_rotation() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);
    let mesh = test_mesh(2, 0.0);

    for version in 1..=9 {
        buf.upload(&mesh, version).unwrap();
    }
    assert!(backend.waits().is_empty());
}

#[test]
fn growth_reallocates_exactly_once_and_preserves_data() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);

    // Fits the 1024-byte vertex segments.
    buf.upload(&test_mesh(2, 0.0), 1).unwrap();
    assert_eq!(backend.buffers_created(), 2);

    // 10 quads = 1280 vertex bytes: exceeds the segment, one teardown+rebuild.
    let big = test_mesh(10, 100.0);
    buf.upload(&big, 2).unwrap();
    assert_eq!(backend.buffers_created(), 4);

    // An equal-or-smaller mesh afterwards reuses the grown ring.
    let smaller = test_mesh(9, 200.0);
    buf.upload(&smaller, 3).unwrap();
    assert_eq!(backend.buffers_created(), 4);

    // The resident bytes are the latest mesh, intact.
    let draws_before = backend.draws().len();
    buf.render();
    let draws = backend.draws();
    assert_eq!(draws.len(), draws_before + 1);
    let last = draws[draws.len() - 1];
    assert_eq!(last.index_count as usize, smaller.index_count());
    let vertex_bytes = backend.read_buffer(
        buf.vertex_buffer().unwrap(),
        last.attribute_base_offset,
        smaller.vertex_bytes(),
    );
    assert_eq!(vertex_bytes, smaller.vertex_data());
}

#[test]
fn cleanup_twice_releases_once() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);

    buf.upload(&test_mesh(2, 0.0), 1).unwrap();
    assert!(buf.is_initialized());

    buf.cleanup();
    assert!(!buf.is_initialized());
    assert_eq!(buf.index_count(), 0);
    assert!(buf.needs_upload(1));

    // Second cleanup is a no-op, not a double release.
    buf.cleanup();
    assert!(!buf.is_initialized());

    // Cleanup on a never-initialized buffer is also safe.
    let mut fresh = buffer(&backend);
    fresh.cleanup();
    fresh.cleanup();
}

#[test]
fn render_draws_the_latest_mesh_only() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);

    let mesh_a = test_mesh(25, 0.0); // 100 vertices
    let mesh_b = test_mesh(13, 50.0); // 52 vertices
    buf.upload(&mesh_a, 1).unwrap();
    buf.upload(&mesh_b, 2).unwrap();

    buf.render();
    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].index_count as usize, mesh_b.index_count());
    assert_eq!(draws[0].index_byte_offset, buf.draw_offset());
}

#[test]
fn render_before_upload_is_a_noop() {
    let backend = persistent_backend();
    let buf = buffer(&backend);
    buf.render();
    assert!(backend.draws().is_empty());
}

#[rstest]
#[case::persistent(persistent_backend(), UploadStrategy::PersistentTripleBuffered)]
#[case::dynamic(dynamic_backend(), UploadStrategy::DynamicRespecify)]
fn both_paths_draw_identical_geometry(
    #[case] backend: Arc<DummyBackend>,
    #[case] expected: UploadStrategy,
) {
    let mut buf = buffer(&backend);
    let mesh = test_mesh(5, 7.0);

    buf.upload(&mesh, 1).unwrap();
    assert_eq!(buf.strategy(), Some(expected));
    assert_eq!(buf.index_count() as usize, mesh.index_count());

    buf.render();
    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].index_count as usize, mesh.index_count());

    // The bytes the draw reads are the mesh, regardless of path.
    let vertex = backend.read_buffer(
        buf.vertex_buffer().unwrap(),
        draws[0].attribute_base_offset,
        mesh.vertex_bytes(),
    );
    let index = backend.read_buffer(
        buf.index_buffer().unwrap(),
        draws[0].index_byte_offset,
        mesh.index_bytes(),
    );
    assert_eq!(vertex, mesh.vertex_data());
    assert_eq!(index, mesh.index_data());
}

#[test]
fn partial_update_rewrites_bound_segment_in_place() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);
    let mesh = test_mesh(4, 0.0);

    buf.upload(&mesh, 1).unwrap();
    let buffers_after_upload = backend.buffers_created();

    let patch = [-1.0f32; 8];
    let update = PartialMeshUpdate::new().with_vertices(8, &patch);
    buf.update_partial(&update).unwrap();

    // No rotation, no reallocation; the bound segment was edited in place.
    assert_eq!(backend.buffers_created(), buffers_after_upload);
    let base = backend.attribute_base_offset();
    let bytes = backend.read_buffer(buf.vertex_buffer().unwrap(), base + 8 * 4, 8 * 4);
    assert_eq!(bytes, bytemuck::cast_slice::<f32, u8>(&patch));

    // The untouched prefix is still the original mesh.
    let prefix = backend.read_buffer(buf.vertex_buffer().unwrap(), base, 8 * 4);
    assert_eq!(prefix, &mesh.vertex_data()[..32]);
}

#[test]
fn partial_update_waits_on_the_bound_segments_fence() {
    let backend = persistent_backend();
    backend.set_auto_signal(false);
    let mut buf = buffer(&backend);

    buf.upload(&test_mesh(4, 0.0), 1).unwrap();
    assert!(backend.waits().is_empty());

    let patch = [0.5f32; 4];
    buf.update_partial(&PartialMeshUpdate::new().with_vertices(0, &patch))
        .unwrap();
    // The fence recorded by the upload had to resolve before the write.
    assert_eq!(backend.waits(), vec![0]);

    // And the segment is fenced again afterwards: a second edit stalls on
    // the fence the first edit recorded.
    buf.update_partial(&PartialMeshUpdate::new().with_vertices(0, &patch))
        .unwrap();
    assert_eq!(backend.waits(), vec![0, 1]);
}

#[test]
fn partial_update_on_dynamic_path_writes_in_place() {
    let backend = dynamic_backend();
    let mut buf = buffer(&backend);
    let mesh = test_mesh(4, 0.0);

    buf.upload(&mesh, 1).unwrap();
    let buffers_after_upload = backend.buffers_created();

    let patch = [2.5f32; 8];
    let indices = [3u32, 2, 1];
    let update = PartialMeshUpdate::new()
        .with_vertices(16, &patch)
        .with_indices(0, &indices);
    buf.update_partial(&update).unwrap();

    assert_eq!(backend.buffers_created(), buffers_after_upload);
    let vertex = backend.read_buffer(buf.vertex_buffer().unwrap(), 16 * 4, 8 * 4);
    assert_eq!(vertex, bytemuck::cast_slice::<f32, u8>(&patch));
    let index = backend.read_buffer(buf.index_buffer().unwrap(), 0, 12);
    assert_eq!(index, bytemuck::cast_slice::<u32, u8>(&indices));
}

#[test]
fn partial_update_beyond_dynamic_capacity_is_rejected() {
    let backend = dynamic_backend();
    let mut buf = buffer(&backend);
    let mesh = test_mesh(1, 0.0); // 4 vertices, 128 vertex bytes

    buf.upload(&mesh, 1).unwrap();
    let patch = [0.0f32; 40];
    let result = buf.update_partial(&PartialMeshUpdate::new().with_vertices(0, &patch));
    assert!(result.is_err());
}

#[test]
fn partial_update_before_upload_is_a_noop() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);
    let patch = [1.0f32; 4];
    buf.update_partial(&PartialMeshUpdate::new().with_vertices(0, &patch))
        .unwrap();
    assert_eq!(backend.buffers_created(), 0);
}

#[test]
fn metrics_sink_sees_full_and_partial_traffic() {
    let backend = persistent_backend();
    let counter = Arc::new(UploadCounter::new());
    let mut buf = buffer(&backend).with_metrics(counter.clone());

    let mesh = test_mesh(2, 0.0);
    buf.upload(&mesh, 1).unwrap();
    assert_eq!(counter.uploads(), 1);
    assert_eq!(counter.bytes(), mesh.vertex_bytes() + mesh.index_bytes());

    let patch = [0.0f32; 4];
    buf.update_partial(&PartialMeshUpdate::new().with_vertices(0, &patch))
        .unwrap();
    assert_eq!(counter.uploads(), 2);
    assert_eq!(counter.bytes(), mesh.vertex_bytes() + mesh.index_bytes() + 16);
}

#[test]
fn upload_timing_accumulates() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);

    buf.upload(&test_mesh(2, 0.0), 1).unwrap();
    buf.upload(&test_mesh(2, 1.0), 2).unwrap();

    assert_eq!(buf.upload_count(), 2);
    assert!(buf.total_upload_duration() >= buf.last_upload_duration());
}

#[test]
fn strategy_survives_cleanup() {
    let backend = persistent_backend();
    let mut buf = buffer(&backend);

    buf.upload(&test_mesh(2, 0.0), 1).unwrap();
    assert_eq!(buf.strategy(), Some(UploadStrategy::PersistentTripleBuffered));

    buf.cleanup();
    assert_eq!(buf.strategy(), Some(UploadStrategy::PersistentTripleBuffered));

    // A later upload reuses the cached decision and works end to end.
    buf.upload(&test_mesh(3, 4.0), 2).unwrap();
    assert_eq!(buf.index_count() as usize, test_mesh(3, 4.0).index_count());
}
