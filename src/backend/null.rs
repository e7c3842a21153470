//! Null backend for testing and headless tools.
//!
//! Performs no GPU work: every buffer is a plain byte vector with exact
//! write/read semantics, which makes batching and upload behavior fully
//! observable from tests without GPU hardware.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::types::BufferDescriptor;
use crate::backend::{BufferHandle, DeviceBackend};
use crate::error::DeviceResult;

#[derive(Debug, Default)]
struct Stats {
    buffers_created: u64,
    buffers_destroyed: u64,
    buffer_writes: u64,
}

/// Operation counters for the null backend, shared with tests.
///
/// Clones observe the same counters, so a handle taken before the
/// backend is boxed into a device keeps reporting.
#[derive(Debug, Clone, Default)]
pub struct NullBackendStats {
    inner: Rc<RefCell<Stats>>,
}

impl NullBackendStats {
    /// Total buffers created since construction.
    pub fn buffers_created(&self) -> u64 {
        self.inner.borrow().buffers_created
    }

    /// Total buffers destroyed since construction.
    pub fn buffers_destroyed(&self) -> u64 {
        self.inner.borrow().buffers_destroyed
    }

    /// Total byte-range writes issued.
    pub fn buffer_writes(&self) -> u64 {
        self.inner.borrow().buffer_writes
    }
}

/// Null backend
#[derive(Debug, Default)]
pub struct NullBackend {
    buffers: HashMap<u64, Vec<u8>>,
    next_buffer_id: u64,
    stats: NullBackendStats,
}

impl NullBackend {
    /// Create a new null backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter handle for inspecting backend activity.
    pub fn stats(&self) -> NullBackendStats {
        self.stats.clone()
    }

    /// Number of buffers currently alive.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Size in bytes of one buffer, if alive.
    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer.0).map(|b| b.len() as u64)
    }
}

impl DeviceBackend for NullBackend {
    fn name(&self) -> &'static str {
        "Null Backend"
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> DeviceResult<BufferHandle> {
        log::trace!(
            "NullBackend: creating buffer {:?} (size: {}, usage: {:?})",
            desc.label,
            desc.size,
            desc.usage
        );
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, vec![0u8; desc.size as usize]);
        self.stats.inner.borrow_mut().buffers_created += 1;
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.stats.inner.borrow_mut().buffer_writes += 1;
        if let Some(bytes) = self.buffers.get_mut(&buffer.0) {
            let start = offset as usize;
            let end = start + data.len();
            if end <= bytes.len() {
                bytes[start..end].copy_from_slice(data);
            }
        }
    }

    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Vec<u8> {
        match self.buffers.get(&buffer.0) {
            Some(bytes) => {
                let start = (offset as usize).min(bytes.len());
                let end = (start + size as usize).min(bytes.len());
                bytes[start..end].to_vec()
            }
            None => Vec::new(),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_some() {
            log::trace!("NullBackend: destroyed buffer {}", buffer.0);
            self.stats.inner.borrow_mut().buffers_destroyed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::BufferUsage;

    #[test]
    fn test_write_read_roundtrip() {
        let mut backend = NullBackend::new();
        let handle = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 64,
                usage: BufferUsage::Dynamic,
            })
            .unwrap();

        backend.write_buffer(handle, 16, &[1, 2, 3, 4]);
        assert_eq!(backend.read_buffer(handle, 16, 4), vec![1, 2, 3, 4]);
        assert_eq!(backend.read_buffer(handle, 0, 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_stats_track_lifecycle() {
        let mut backend = NullBackend::new();
        let stats = backend.stats();
        let handle = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: BufferUsage::Static,
            })
            .unwrap();
        backend.destroy_buffer(handle);
        // Destroying an already removed buffer is not counted twice.
        backend.destroy_buffer(handle);

        assert_eq!(stats.buffers_created(), 1);
        assert_eq!(stats.buffers_destroyed(), 1);
    }
}
