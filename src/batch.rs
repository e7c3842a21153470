//! Static-buffer batching.
//!
//! Static vertex buffers get no device storage at construction. They are
//! collected here and realized together into one shared device buffer,
//! which keeps buffer-object counts low and caps any one buffer's vertex
//! count so indexed draws stay addressable with 16-bit indices.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::types::{BufferDescriptor, BufferUsage};
use crate::buffer::{BufferInner, PhysicalBuffer};
use crate::device::SharedBackend;
use crate::error::DeviceResult;

/// Highest aggregate vertex count a shared buffer may hold, so a 16-bit
/// index buffer can still address every vertex.
pub const MAX_SHARED_VERTEX_COUNT: u32 = 65535;

/// Registry of static buffers awaiting their shared device buffer.
///
/// Owned by the render device and handed to buffer construction,
/// destruction and upload calls; all members share one vertex layout.
#[derive(Default)]
pub(crate) struct BatchingContext {
    pending: Vec<Rc<RefCell<BufferInner>>>,
}

impl BatchingContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Aggregate vertex count over all pending members.
    fn pending_vertex_count(&self) -> u32 {
        self.pending.iter().map(|b| b.borrow().vertex_count).sum()
    }

    /// Register a new static buffer.
    ///
    /// The current registry is flushed first when the newcomer's layout
    /// differs from the registry's layout or admitting it would push the
    /// aggregate vertex count past [`MAX_SHARED_VERTEX_COUNT`]. Offsets
    /// are assigned from the aggregate size before the append, so members
    /// are laid out contiguously in admission order.
    pub(crate) fn admit(
        &mut self,
        backend: &SharedBackend,
        inner: &Rc<RefCell<BufferInner>>,
    ) -> DeviceResult<()> {
        let (layout, vertex_count, stride) = {
            let b = inner.borrow();
            (b.layout, b.vertex_count, b.bytes_per_vertex)
        };

        if let Some(first) = self.pending.first() {
            let split = first.borrow().layout != layout
                || self.pending_vertex_count() + vertex_count > MAX_SHARED_VERTEX_COUNT;
            if split {
                self.flush(backend)?;
            }
        }

        let base_vertex = self.pending_vertex_count();
        {
            let mut b = inner.borrow_mut();
            b.vertex_offset = base_vertex;
            b.byte_offset = base_vertex * stride;
        }
        self.pending.push(Rc::clone(inner));
        Ok(())
    }

    /// Realize the registry into one shared device buffer.
    ///
    /// Every member's pending uploads are assembled into a single staging
    /// image of the buffer and consumed; members come out `uploaded`,
    /// sharing one counted [`PhysicalBuffer`] handle. No-op when empty.
    pub(crate) fn flush(&mut self, backend: &SharedBackend) -> DeviceResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        // Sized to the highest member end rather than the aggregate, so
        // gaps left by members destroyed while pending stay addressable
        // for the survivors.
        let size = self
            .pending
            .iter()
            .map(|b| {
                let b = b.borrow();
                b.byte_offset + b.total_bytes
            })
            .max()
            .unwrap_or(0);

        let mut staging = vec![0u8; size as usize];
        for member in &self.pending {
            let mut member = member.borrow_mut();
            let base = member.byte_offset as usize;
            for upload in member.pending_uploads.drain(..) {
                let start = base + upload.offset as usize;
                staging[start..start + upload.data.len()].copy_from_slice(&upload.data);
            }
            member.uploaded = true;
        }

        let handle = backend.borrow_mut().create_buffer_init(
            &BufferDescriptor {
                label: Some("shared static vertex buffer".to_string()),
                size: size as u64,
                usage: BufferUsage::Static,
            },
            &staging,
        )?;

        log::trace!(
            "flushed {} static vertex buffers into one {} byte device buffer",
            self.pending.len(),
            size
        );

        let physical = Rc::new(PhysicalBuffer::new(Rc::clone(backend), handle));
        for member in &self.pending {
            member.borrow_mut().physical = Some(Rc::clone(&physical));
        }
        self.pending.clear();
        Ok(())
    }

    /// Drop one member from the registry. Sibling offsets stay as
    /// assigned at admission; they are not recomputed.
    pub(crate) fn remove(&mut self, inner: &Rc<RefCell<BufferInner>>) {
        if let Some(position) = self.pending.iter().position(|b| Rc::ptr_eq(b, inner)) {
            self.pending.remove(position);
        }
    }
}
