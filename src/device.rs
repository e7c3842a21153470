//! Render device: backend ownership, the batching context and the
//! profiling write-lock counter.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::types::{BufferDescriptor, BufferUsage};
use crate::backend::{create_backend, null::NullBackend, BufferHandle, DeviceBackend};
use crate::batch::BatchingContext;
use crate::buffer::{BufferInner, PhysicalBuffer};
use crate::error::DeviceResult;
use crate::BackendType;

/// Backend shared between the device and the physical buffer handles it
/// hands out, so a buffer outliving the device can still release itself.
pub(crate) type SharedBackend = Rc<RefCell<Box<dyn DeviceBackend>>>;

/// Owner of one graphics backend and the vertex-storage state layered
/// on top of it.
pub struct RenderDevice {
    backend: SharedBackend,
    batch: BatchingContext,
    lock_calls: u32,
}

impl RenderDevice {
    /// Create a device over a specific backend.
    pub fn new(backend_type: BackendType) -> DeviceResult<Self> {
        let backend: Box<dyn DeviceBackend> = match backend_type {
            BackendType::Null => Box::new(NullBackend::new()),
            #[cfg(feature = "wgpu-backend")]
            BackendType::Wgpu => Box::new(crate::backend::wgpu_backend::WgpuBackend::new()?),
            #[cfg(feature = "vulkan-backend")]
            BackendType::Vulkan => Box::new(crate::backend::vulkan::VulkanBackend::new()?),
        };
        Ok(Self::with_backend(backend))
    }

    /// Create a device with automatic backend selection: Vulkan, then
    /// wgpu, then the null backend.
    pub fn with_default_backend() -> DeviceResult<Self> {
        Ok(Self::with_backend(create_backend()?))
    }

    /// Wrap an already constructed backend.
    pub fn with_backend(backend: Box<dyn DeviceBackend>) -> Self {
        Self {
            backend: Rc::new(RefCell::new(backend)),
            batch: BatchingContext::new(),
            lock_calls: 0,
        }
    }

    /// Backend name, for diagnostics.
    pub fn backend_name(&self) -> &'static str {
        self.backend.borrow().name()
    }

    /// Number of write-lock acquisitions since construction. Profiling
    /// only.
    pub fn lock_calls(&self) -> u32 {
        self.lock_calls
    }

    pub(crate) fn count_lock_call(&mut self) {
        self.lock_calls += 1;
    }

    /// Number of static buffers still awaiting their shared device
    /// buffer.
    pub fn pending_static_buffers(&self) -> usize {
        self.batch.pending_len()
    }

    /// Realize the pending static-buffer batch now.
    ///
    /// Frame setup code calls this once after scene construction;
    /// [`crate::VertexBuffer::upload`] also triggers it on demand.
    pub fn flush_pending(&mut self) -> DeviceResult<()> {
        self.batch.flush(&self.backend)
    }

    /// Blocking readback of a device buffer range, for verification and
    /// capture tooling.
    pub fn read_buffer(&mut self, handle: BufferHandle, offset: u64, size: u64) -> Vec<u8> {
        self.backend.borrow_mut().read_buffer(handle, offset, size)
    }

    pub(crate) fn admit_static(&mut self, inner: &Rc<RefCell<BufferInner>>) -> DeviceResult<()> {
        self.batch.admit(&self.backend, inner)
    }

    pub(crate) fn remove_pending(&mut self, inner: &Rc<RefCell<BufferInner>>) {
        self.batch.remove(inner);
    }

    pub(crate) fn allocate_private_buffer(&mut self, size: u64) -> DeviceResult<PhysicalBuffer> {
        let handle = self.backend.borrow_mut().create_buffer(&BufferDescriptor {
            label: Some("dynamic vertex buffer".to_string()),
            size,
            usage: BufferUsage::Dynamic,
        })?;
        Ok(PhysicalBuffer::new(Rc::clone(&self.backend), handle))
    }

    pub(crate) fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) {
        self.backend.borrow_mut().write_buffer(handle, offset, data);
    }
}
