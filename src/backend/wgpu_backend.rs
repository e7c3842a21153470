//! wgpu backend implementation
//!
//! Headless wgpu device. Buffer writes go through the queue; readback
//! copies into a mappable staging buffer and blocks on the map.

use std::collections::HashMap;

use crate::backend::types::BufferDescriptor;
use crate::backend::{BufferHandle, DeviceBackend};
use crate::error::{DeviceError, DeviceResult};

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    buffers: HashMap<u64, wgpu::Buffer>,
    next_buffer_id: u64,
}

impl WgpuBackend {
    pub fn new() -> DeviceResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DeviceError::InitializationFailed("no compatible GPU adapter".into()))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Vertex Storage Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| DeviceError::InitializationFailed(e.to_string()))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            buffers: HashMap::new(),
            next_buffer_id: 0,
        })
    }
}

impl DeviceBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> DeviceResult<BufferHandle> {
        // Both usage hints get the copy usages: static uploads and
        // readback both go through the copy path.
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, buffer);
        log::trace!("WgpuBackend: created buffer {} ({} bytes)", id, desc.size);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buf) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, offset, data);
        }
    }

    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Vec<u8> {
        let Some(buf) = self.buffers.get(&buffer.0) else {
            return Vec::new();
        };

        // Copy offsets and sizes must be 4-byte aligned; widen the copy
        // and trim the mapped view back to the requested range.
        let aligned_offset = offset & !3;
        let lead = (offset - aligned_offset) as usize;
        let copy_size = (lead as u64 + size + 3) & !3;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: copy_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(buf, aligned_offset, &staging, 0, copy_size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match receiver.recv() {
            Ok(Ok(())) => {
                let data = {
                    let view = slice.get_mapped_range();
                    view[lead..lead + size as usize].to_vec()
                };
                staging.unmap();
                data
            }
            _ => Vec::new(),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.buffers.remove(&buffer.0) {
            buf.destroy();
            log::trace!("WgpuBackend: destroyed buffer {}", buffer.0);
        }
    }
}
