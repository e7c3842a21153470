//! GPU-resident vertex storage for a real-time renderer.
//!
//! Vertex data lives in device buffers managed behind one backend
//! contract with two native implementations:
//! - **wgpu**: cross-platform GPU abstraction
//! - **Vulkan**: direct Vulkan API via ash
//!
//! Small immutable vertex sets are batched into shared device buffers so
//! buffer-object counts stay low and indexed draws stay within the
//! 16-bit index range; dynamic buffers get private storage and may be
//! rewritten across frames through a lock/unlock write path. All writes
//! are deferred: they queue as owned payloads and reach the device on an
//! explicit upload.
//!
//! ```no_run
//! use vertex_storage::{BackendType, RenderDevice, VertexBuffer, VertexLayout};
//!
//! # fn main() -> vertex_storage::DeviceResult<()> {
//! let mut device = RenderDevice::new(BackendType::Null)?;
//! let quad = VertexBuffer::new(&mut device, 4, None, false, VertexLayout::PosTex)?;
//! quad.upload(&mut device)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod buffer;
pub mod device;
pub mod error;

pub use backend::types::{
    BufferDescriptor, BufferUsage, TexelVertex, Vertex3D, VertexAttribute, VertexFormat,
    VertexLayout,
};
pub use backend::{create_backend, has_gpu_backend, BufferHandle, DeviceBackend};
pub use batch::MAX_SHARED_VERTEX_COUNT;
pub use buffer::{PhysicalBuffer, VertexBuffer, VertexWriteGuard};
pub use device::RenderDevice;
pub use error::{DeviceError, DeviceResult};

/// Backend selection for the render device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// In-memory backend for tests and headless tools
    #[default]
    Null,
    /// wgpu backend - cross-platform, easier to use
    #[cfg(feature = "wgpu-backend")]
    Wgpu,
    /// Vulkan backend via ash - maximum control (native only)
    #[cfg(feature = "vulkan-backend")]
    Vulkan,
}
