//! Logical vertex buffers and deferred device writes.
//!
//! A [`VertexBuffer`] represents one call site's vertex set. Static
//! buffers are immutable after their first upload and share device
//! storage with other static buffers admitted around the same time (see
//! [`crate::batch`]); dynamic buffers get a private device buffer at
//! construction and may be rewritten every frame.
//!
//! Writes never reach the device directly: they are staged as owned
//! payloads in a per-buffer queue and pushed by [`VertexBuffer::upload`].

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::backend::types::VertexLayout;
use crate::backend::BufferHandle;
use crate::device::{RenderDevice, SharedBackend};
use crate::error::DeviceResult;

/// One queued write: an owned payload destined for `offset` bytes into
/// the logical buffer's range. The payload length is the write size.
#[derive(Debug)]
pub(crate) struct PendingUpload {
    pub(crate) offset: u32,
    pub(crate) data: Vec<u8>,
}

/// Device buffer shared by every logical buffer realized from one batch
/// flush (or owned exclusively, for dynamic buffers).
///
/// Dropping the last referencing handle destroys the device resource.
pub struct PhysicalBuffer {
    backend: SharedBackend,
    handle: BufferHandle,
}

impl PhysicalBuffer {
    pub(crate) fn new(backend: SharedBackend, handle: BufferHandle) -> Self {
        Self { backend, handle }
    }

    /// Backend identity of the device buffer, for binding at draw time.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }
}

impl Drop for PhysicalBuffer {
    fn drop(&mut self) {
        self.backend.borrow_mut().destroy_buffer(self.handle);
    }
}

pub(crate) struct BufferInner {
    pub(crate) vertex_count: u32,
    pub(crate) layout: VertexLayout,
    pub(crate) bytes_per_vertex: u32,
    pub(crate) total_bytes: u32,
    pub(crate) is_static: bool,
    pub(crate) byte_offset: u32,
    pub(crate) vertex_offset: u32,
    pub(crate) physical: Option<Rc<PhysicalBuffer>>,
    pub(crate) pending_uploads: Vec<PendingUpload>,
    pub(crate) uploaded: bool,
    pub(crate) locked: bool,
    pub(crate) destroyed: bool,
}

/// One call site's vertex set.
pub struct VertexBuffer {
    inner: Rc<RefCell<BufferInner>>,
}

impl VertexBuffer {
    /// Create a logical vertex buffer.
    ///
    /// Static buffers (the default) are admitted to the device's batching
    /// context and get no device storage until a flush; dynamic buffers
    /// allocate a private device buffer immediately. Initial `data`, when
    /// provided, must be exactly `vertex_count * layout.stride()` bytes
    /// and is queued as a pending upload at offset 0.
    pub fn new(
        device: &mut RenderDevice,
        vertex_count: u32,
        data: Option<&[u8]>,
        dynamic: bool,
        layout: VertexLayout,
    ) -> DeviceResult<Self> {
        let bytes_per_vertex = layout.stride();
        let total_bytes = vertex_count * bytes_per_vertex;
        let inner = Rc::new(RefCell::new(BufferInner {
            vertex_count,
            layout,
            bytes_per_vertex,
            total_bytes,
            is_static: !dynamic,
            byte_offset: 0,
            vertex_offset: 0,
            physical: None,
            pending_uploads: Vec::new(),
            uploaded: false,
            locked: false,
            destroyed: false,
        }));

        if dynamic {
            let physical = device.allocate_private_buffer(total_bytes as u64)?;
            inner.borrow_mut().physical = Some(Rc::new(physical));
        } else {
            device.admit_static(&inner)?;
        }

        if let Some(bytes) = data {
            assert_eq!(
                bytes.len() as u32,
                total_bytes,
                "initial data length must match vertex count and layout stride"
            );
            inner.borrow_mut().pending_uploads.push(PendingUpload {
                offset: 0,
                data: bytes.to_vec(),
            });
        }

        Ok(Self { inner })
    }

    /// Acquire a write lock over `size` bytes starting at `offset`.
    ///
    /// A `size` of 0 locks the whole buffer. The returned guard derefs to
    /// the payload bytes; dropping it queues the payload as a pending
    /// upload. Locking is not re-entrant, and a static buffer that has
    /// already been uploaded can no longer be locked (fatal assertions).
    pub fn lock(&self, device: &mut RenderDevice, offset: u32, size: u32) -> VertexWriteGuard {
        let size = {
            let mut inner = self.inner.borrow_mut();
            assert!(!inner.destroyed, "vertex buffer used after destroy");
            assert!(
                !inner.is_static || !inner.uploaded,
                "static vertex buffers are immutable once uploaded"
            );
            assert!(!inner.locked, "vertex buffer write lock is not reentrant");
            inner.locked = true;
            if size == 0 {
                inner.total_bytes
            } else {
                size
            }
        };
        device.count_lock_call();

        VertexWriteGuard {
            inner: Rc::clone(&self.inner),
            offset,
            data: vec![0u8; size as usize],
        }
    }

    /// Queue a write of `data` at `offset`, a lock/fill/unlock in one
    /// call.
    pub fn write(&self, device: &mut RenderDevice, offset: u32, data: &[u8]) {
        let mut guard = self.lock(device, offset, data.len() as u32);
        guard.copy_from_slice(data);
    }

    /// Push every queued write to the device.
    ///
    /// A buffer still awaiting its shared device buffer first triggers a
    /// flush of the whole pending batch, realizing its batch-mates along
    /// with it.
    pub fn upload(&self, device: &mut RenderDevice) -> DeviceResult<()> {
        {
            let inner = self.inner.borrow();
            assert!(!inner.destroyed, "vertex buffer used after destroy");
            if inner.physical.is_none() {
                drop(inner);
                device.flush_pending()?;
            }
        }

        let mut inner = self.inner.borrow_mut();
        if inner.pending_uploads.is_empty() {
            return Ok(());
        }

        let handle = inner
            .physical
            .as_ref()
            .expect("batch flush must have realized this buffer")
            .handle();
        let base = inner.byte_offset;
        for upload in inner.pending_uploads.drain(..) {
            device.write_buffer(handle, (base + upload.offset) as u64, &upload.data);
        }
        inner.uploaded = true;
        Ok(())
    }

    /// Release this buffer's claim on device storage.
    ///
    /// A buffer still awaiting its batch just leaves the registry, with
    /// no device effect. Once physical, the shared device buffer is
    /// destroyed when its last referencing logical buffer is destroyed.
    /// Destroying twice is a fatal assertion.
    pub fn destroy(&mut self, device: &mut RenderDevice) {
        let mut inner = self.inner.borrow_mut();
        assert!(!inner.destroyed, "vertex buffer destroyed twice");
        if inner.physical.is_none() && inner.is_static {
            device.remove_pending(&self.inner);
        }
        inner.pending_uploads.clear();
        inner.physical = None;
        inner.destroyed = true;
    }

    pub fn vertex_count(&self) -> u32 {
        self.inner.borrow().vertex_count
    }

    pub fn layout(&self) -> VertexLayout {
        self.inner.borrow().layout
    }

    pub fn bytes_per_vertex(&self) -> u32 {
        self.inner.borrow().bytes_per_vertex
    }

    pub fn total_bytes(&self) -> u32 {
        self.inner.borrow().total_bytes
    }

    pub fn is_static(&self) -> bool {
        self.inner.borrow().is_static
    }

    /// Byte position of this buffer's data within its device buffer.
    pub fn byte_offset(&self) -> u32 {
        self.inner.borrow().byte_offset
    }

    /// Base vertex within the device buffer, for indexed draws.
    pub fn vertex_offset(&self) -> u32 {
        self.inner.borrow().vertex_offset
    }

    /// Whether device storage exists for this buffer yet.
    pub fn is_created(&self) -> bool {
        self.inner.borrow().physical.is_some()
    }

    /// Whether at least one upload has pushed bytes to the device.
    pub fn is_uploaded(&self) -> bool {
        self.inner.borrow().uploaded
    }

    /// Backend identity of the device buffer, once created.
    pub fn physical_handle(&self) -> Option<BufferHandle> {
        self.inner.borrow().physical.as_ref().map(|p| p.handle())
    }

    /// Shared device buffer, once created.
    pub fn physical(&self) -> Option<Rc<PhysicalBuffer>> {
        self.inner.borrow().physical.clone()
    }

    /// Number of logical buffers currently sharing this buffer's device
    /// storage (zero before the storage exists).
    pub fn shared_ref_count(&self) -> usize {
        self.inner
            .borrow()
            .physical
            .as_ref()
            .map(Rc::strong_count)
            .unwrap_or(0)
    }

    /// Number of writes queued and not yet pushed to the device.
    pub fn pending_upload_count(&self) -> usize {
        self.inner.borrow().pending_uploads.len()
    }
}

/// Write acquisition over a byte range of a vertex buffer.
///
/// Derefs to the payload bytes for the caller to fill. Dropping the
/// guard moves the payload into the buffer's pending-upload queue.
pub struct VertexWriteGuard {
    inner: Rc<RefCell<BufferInner>>,
    offset: u32,
    data: Vec<u8>,
}

impl Deref for VertexWriteGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for VertexWriteGuard {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for VertexWriteGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.pending_uploads.push(PendingUpload {
            offset: self.offset,
            data: std::mem::take(&mut self.data),
        });
        inner.locked = false;
    }
}
