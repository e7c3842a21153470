//! Backend abstraction layer
//!
//! Provides the buffer-object contract that the wgpu and Vulkan backends
//! implement. The null backend is always compiled and backs tests and
//! headless tools.

pub mod null;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use crate::error::DeviceResult;
use types::BufferDescriptor;

/// Handle to a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Uniform capability set over the supported buffer-object APIs.
///
/// Buffer contents are written through whatever path the backend favors
/// (queue writes, persistently mapped memory); callers only see byte
/// ranges.
pub trait DeviceBackend {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a device buffer.
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> DeviceResult<BufferHandle>;

    /// Create a device buffer with initial contents.
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> DeviceResult<BufferHandle> {
        let handle = self.create_buffer(desc)?;
        self.write_buffer(handle, 0, data);
        Ok(handle)
    }

    /// Write a byte range into a buffer.
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Read a byte range back from a buffer.
    ///
    /// This is a blocking operation that waits for the device to finish.
    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Vec<u8>;

    /// Destroy a buffer.
    fn destroy_buffer(&mut self, buffer: BufferHandle);
}

/// Selects and creates a backend based on available features.
///
/// Tries Vulkan first, then wgpu, then falls back to the null backend.
pub fn create_backend() -> DeviceResult<Box<dyn DeviceBackend>> {
    #[cfg(feature = "vulkan-backend")]
    {
        match vulkan::VulkanBackend::new() {
            Ok(backend) => {
                log::info!("Using Vulkan backend (ash)");
                return Ok(Box::new(backend));
            }
            Err(e) => {
                log::warn!("Failed to create Vulkan backend: {}", e);
            }
        }
    }

    #[cfg(feature = "wgpu-backend")]
    {
        match wgpu_backend::WgpuBackend::new() {
            Ok(backend) => {
                log::info!("Using wgpu backend");
                return Ok(Box::new(backend));
            }
            Err(e) => {
                log::warn!("Failed to create wgpu backend: {}", e);
            }
        }
    }

    log::info!("Using null backend");
    Ok(Box::new(null::NullBackend::new()))
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(any(feature = "vulkan-backend", feature = "wgpu-backend"))
}
