//! Vulkan backend implementation using ash
//!
//! Headless Vulkan device. Buffers live in CpuToGpu memory and are
//! written through persistently mapped allocations, which matches the
//! lock/memcpy/unlock write pattern the storage layer expects.

use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::backend::types::BufferDescriptor;
use crate::backend::{BufferHandle, DeviceBackend};
use crate::error::{DeviceError, DeviceResult};

struct VkBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

/// Vulkan backend implementation
pub struct VulkanBackend {
    _entry: ash::Entry,
    instance: ash::Instance,
    #[allow(dead_code)]
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    #[allow(dead_code)]
    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    allocator: Option<Arc<Mutex<Allocator>>>,

    buffers: HashMap<u64, VkBuffer>,
    next_buffer_id: u64,
}

impl VulkanBackend {
    pub fn new() -> DeviceResult<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| DeviceError::InitializationFailed(e.to_string()))?;

            let app_name = CStr::from_bytes_with_nul(b"Vertex Storage\0").unwrap();
            let engine_name = CStr::from_bytes_with_nul(b"Vertex Storage\0").unwrap();

            let app_info = vk::ApplicationInfo {
                p_application_name: app_name.as_ptr(),
                application_version: vk::make_api_version(0, 1, 0, 0),
                p_engine_name: engine_name.as_ptr(),
                engine_version: vk::make_api_version(0, 1, 0, 0),
                api_version: vk::API_VERSION_1_2,
                ..Default::default()
            };

            // Offscreen storage only: no surface or swapchain extensions.
            let instance_info = vk::InstanceCreateInfo {
                p_application_info: &app_info,
                ..Default::default()
            };

            let instance = entry
                .create_instance(&instance_info, None)
                .map_err(|e| DeviceError::InitializationFailed(e.to_string()))?;

            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| DeviceError::InitializationFailed(e.to_string()))?;

            let (physical_device, graphics_queue_family) = physical_devices
                .into_iter()
                .find_map(|pd| Self::find_queue_family(&instance, pd).map(|qf| (pd, qf)))
                .ok_or_else(|| {
                    DeviceError::InitializationFailed("No suitable physical device".into())
                })?;

            let queue_priorities = [1.0f32];
            let queue_info = vk::DeviceQueueCreateInfo {
                queue_family_index: graphics_queue_family,
                queue_count: 1,
                p_queue_priorities: queue_priorities.as_ptr(),
                ..Default::default()
            };

            let device_features = vk::PhysicalDeviceFeatures::default();
            let device_info = vk::DeviceCreateInfo {
                queue_create_info_count: 1,
                p_queue_create_infos: &queue_info,
                p_enabled_features: &device_features,
                ..Default::default()
            };

            let device = instance
                .create_device(physical_device, &device_info, None)
                .map_err(|e| DeviceError::InitializationFailed(e.to_string()))?;

            let graphics_queue = device.get_device_queue(graphics_queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| DeviceError::InitializationFailed(e.to_string()))?;

            log::info!(
                "Vulkan device ready (queue family {})",
                graphics_queue_family
            );

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                graphics_queue,
                graphics_queue_family,
                allocator: Some(Arc::new(Mutex::new(allocator))),
                buffers: HashMap::new(),
                next_buffer_id: 0,
            })
        }
    }

    /// Queue family used for buffer ownership.
    pub fn queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    fn find_queue_family(instance: &ash::Instance, pd: vk::PhysicalDevice) -> Option<u32> {
        let props = unsafe { instance.get_physical_device_queue_family_properties(pd) };
        props
            .iter()
            .enumerate()
            .find(|(_, p)| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|(index, _)| index as u32)
    }
}

impl DeviceBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend"
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> DeviceResult<BufferHandle> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo {
                size: desc.size,
                usage: vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_SRC
                    | vk::BufferUsageFlags::TRANSFER_DST,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };

            let buffer = self
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| DeviceError::BufferCreationFailed(e.to_string()))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);

            // CpuToGpu keeps the allocation persistently mapped, so
            // every write is a plain memcpy.
            let allocation = self
                .allocator
                .as_ref()
                .ok_or_else(|| DeviceError::BufferCreationFailed("Allocator not available".into()))?
                .lock()
                .allocate(&AllocationCreateDesc {
                    name: desc.label.as_deref().unwrap_or("vertex buffer"),
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| DeviceError::BufferCreationFailed(e.to_string()))?;

            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| DeviceError::BufferCreationFailed(e.to_string()))?;

            let id = self.next_buffer_id;
            self.next_buffer_id += 1;
            self.buffers.insert(
                id,
                VkBuffer {
                    buffer,
                    allocation,
                    size: desc.size,
                },
            );

            log::trace!("VulkanBackend: created buffer {} ({} bytes)", id, desc.size);
            Ok(BufferHandle(id))
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(vk_buffer) = self.buffers.get_mut(&buffer.0) {
            if let Some(mapped) = vk_buffer.allocation.mapped_slice_mut() {
                let start = offset as usize;
                let end = start + data.len();
                if end <= mapped.len() {
                    mapped[start..end].copy_from_slice(data);
                }
            }
        }
    }

    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Vec<u8> {
        if let Some(vk_buffer) = self.buffers.get(&buffer.0) {
            if let Some(mapped) = vk_buffer.allocation.mapped_slice() {
                let start = (offset as usize).min(mapped.len());
                let end = (start + size as usize).min(mapped.len());
                return mapped[start..end].to_vec();
            }
        }
        Vec::new()
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(vk_buffer) = self.buffers.remove(&buffer.0) {
            unsafe {
                self.device.destroy_buffer(vk_buffer.buffer, None);
            }
            if let Some(ref allocator) = self.allocator {
                let _ = allocator.lock().free(vk_buffer.allocation);
            }
            log::trace!(
                "VulkanBackend: destroyed buffer {} ({} bytes)",
                buffer.0,
                vk_buffer.size
            );
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            if let Some(ref allocator) = self.allocator {
                for (_, vk_buffer) in self.buffers.drain() {
                    self.device.destroy_buffer(vk_buffer.buffer, None);
                    let _ = allocator.lock().free(vk_buffer.allocation);
                }
            }

            // The allocator must go before the device it allocates from.
            drop(self.allocator.take());

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
