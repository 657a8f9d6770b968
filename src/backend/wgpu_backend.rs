//! wgpu GPU backend implementation.
//!
//! Cross-platform real-device backend. wgpu has no persistent mapping, so
//! this backend reports `supports_persistent_mapping = false` and buffers
//! always travel the dynamic respecify path; writes go through the queue and
//! flushes are no-ops. Fences map to submission indices: a fence tracks the
//! queue position at its creation and counts as signaled once the device has
//! drained past it.
//!
//! Attribute binding and the indexed draw are recorded by the surrounding
//! render pass, which owns pipelines and pass encoding; this backend only
//! moves bytes and exposes the buffer handles for the pass to bind.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::capabilities::{GpuCapabilities, GpuVendor};
use crate::error::GraphicsError;
use crate::mesh::VertexLayout;

use super::{BufferDescriptor, BufferUsage, GpuBackend, GpuBuffer, GpuFence};

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    capabilities: GpuCapabilities,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .finish_non_exhaustive()
    }
}

impl WgpuBackend {
    /// Create a new wgpu backend on the first available adapter.
    pub fn new() -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| {
            GraphicsError::InitializationFailed("no compatible GPU adapter".to_string())
        })?;

        let info = adapter.get_info();
        log::info!("wgpu adapter: {:?}", info);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("meshstream device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("device creation failed: {e}"))
        })?;

        let capabilities = GpuCapabilities::new(false, GpuVendor::from_pci_id(info.vendor));
        capabilities.log_summary();

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            capabilities,
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn capabilities(&self) -> GpuCapabilities {
        self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            usage: convert_buffer_usage(descriptor.usage),
            mapped_at_creation: false,
        });

        Ok(GpuBuffer::Wgpu(Arc::new(buffer)))
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        let GpuBuffer::Wgpu(buffer) = buffer else {
            log::error!("WgpuBackend: write_buffer on a foreign buffer handle");
            return;
        };
        self.queue.write_buffer(buffer, offset, data);
    }

    fn flush_buffer_range(&self, _buffer: &GpuBuffer, _offset: u64, _size: u64) {
        // Queue writes are made visible by submission; nothing to flush.
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let GpuBuffer::Wgpu(source) = buffer else {
            return vec![0u8; size as usize];
        };

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("meshstream readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_buffer_to_buffer(source, offset, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => slice.get_mapped_range().to_vec(),
            _ => {
                log::error!("WgpuBackend: readback mapping failed");
                vec![0u8; size as usize]
            }
        }
    }

    fn configure_attributes(&self, _buffer: &GpuBuffer, layout: &VertexLayout, base_offset: u64) {
        // Vertex state lives in the caller's pipeline; binding happens when
        // the render pass sets the buffer with this offset.
        log::trace!(
            "WgpuBackend: configure_attributes layout={:?} base_offset={}",
            layout.label,
            base_offset
        );
    }

    fn draw_indexed(
        &self,
        _vertex_buffer: &GpuBuffer,
        _index_buffer: &GpuBuffer,
        index_count: u32,
        index_byte_offset: u64,
    ) {
        // Draws are recorded by the caller's render pass.
        log::trace!(
            "WgpuBackend: draw_indexed count={} offset={}",
            index_count,
            index_byte_offset
        );
    }

    fn create_fence(&self, signaled: bool) -> GpuFence {
        let submission_index = if signaled {
            None
        } else {
            // An empty submission marks the current queue position.
            Some(self.queue.submit(std::iter::empty::<wgpu::CommandBuffer>()))
        };
        GpuFence::Wgpu {
            submission_index: Mutex::new(submission_index),
        }
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        let GpuFence::Wgpu { submission_index } = fence else {
            return false;
        };
        if let Ok(guard) = submission_index.lock() {
            if guard.is_none() {
                return true;
            }
        }
        // An empty queue means every submission, including this one, drained.
        self.device.poll(wgpu::Maintain::Poll).is_queue_empty()
    }

    fn wait_fence_timeout(&self, fence: &GpuFence, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.is_fence_signaled(fence) {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::yield_now();
        }
    }

    fn wait_fence(&self, fence: &GpuFence) {
        let GpuFence::Wgpu { submission_index } = fence else {
            return;
        };
        let index = match submission_index.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(index) = index {
            let _ = self
                .device
                .poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }
    }

    fn signal_fence(&self, _fence: &GpuFence) {
        // Fences signal when the device drains past their submission.
    }
}

fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    // Every upload goes through the queue, so COPY_DST is always required;
    // COPY_SRC keeps readback possible. MAP_WRITE/PERSISTENT have no direct
    // equivalent here.
    let mut out = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
    if usage.contains(BufferUsage::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    out
}
