//! Batching and upload behavior tests.
//!
//! Most tests run against the null backend, whose byte-exact buffer
//! storage makes offsets, staging layout and destroy counts observable
//! without GPU hardware. The write/read round-trip is additionally
//! parameterized over the real backends and skips when no GPU is
//! available.

use rstest::rstest;

use vertex_storage::backend::null::{NullBackend, NullBackendStats};
use vertex_storage::{
    BackendType, RenderDevice, VertexBuffer, VertexLayout, MAX_SHARED_VERTEX_COUNT,
};

/// Available backends for parameterized tests.
#[derive(Debug, Clone, Copy)]
enum Backend {
    Null,
    Wgpu,
    Vulkan,
}

fn make_device(backend: Backend) -> Option<RenderDevice> {
    match backend {
        Backend::Null => RenderDevice::new(BackendType::Null).ok(),
        #[cfg(feature = "wgpu-backend")]
        Backend::Wgpu => RenderDevice::new(BackendType::Wgpu).ok(),
        #[cfg(feature = "vulkan-backend")]
        Backend::Vulkan => RenderDevice::new(BackendType::Vulkan).ok(),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn null_device() -> (RenderDevice, NullBackendStats) {
    let backend = NullBackend::new();
    let stats = backend.stats();
    (RenderDevice::with_backend(Box::new(backend)), stats)
}

fn test_pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

// ============================================================================
// Batch admission and offsets
// ============================================================================

#[test]
fn test_contiguous_offsets_and_shared_handle() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut device, stats) = null_device();
    let stride = VertexLayout::PosNormalTex.stride();

    let data1 = test_pattern(10 * stride as usize, 1);
    let data2 = test_pattern(20 * stride as usize, 2);
    let data3 = test_pattern(5 * stride as usize, 3);

    let b1 = VertexBuffer::new(&mut device, 10, Some(&data1), false, VertexLayout::PosNormalTex)
        .unwrap();
    let b2 = VertexBuffer::new(&mut device, 20, Some(&data2), false, VertexLayout::PosNormalTex)
        .unwrap();
    let b3 = VertexBuffer::new(&mut device, 5, Some(&data3), false, VertexLayout::PosNormalTex)
        .unwrap();

    // No device storage until the batch is realized.
    assert!(!b1.is_created() && !b2.is_created() && !b3.is_created());
    assert_eq!(device.pending_static_buffers(), 3);
    assert_eq!(stats.buffers_created(), 0);

    // Offsets are assigned contiguously in admission order.
    assert_eq!(b1.byte_offset(), 0);
    assert_eq!(b2.byte_offset(), 10 * stride);
    assert_eq!(b3.byte_offset(), 30 * stride);
    assert_eq!(b3.vertex_offset(), 30);

    b1.upload(&mut device).unwrap();

    // One device buffer shared by all three members.
    assert_eq!(stats.buffers_created(), 1);
    assert_eq!(device.pending_static_buffers(), 0);
    assert!(b1.is_uploaded() && b2.is_uploaded() && b3.is_uploaded());
    let handle = b1.physical_handle().unwrap();
    assert_eq!(b2.physical_handle(), Some(handle));
    assert_eq!(b3.physical_handle(), Some(handle));
    assert_eq!(b1.shared_ref_count(), 3);

    // The shared buffer holds every member's bytes at its offset.
    let contents = device.read_buffer(handle, 0, u64::from(35 * stride));
    assert_eq!(contents.len(), 35 * stride as usize);
    assert_eq!(&contents[..data1.len()], &data1[..]);
    assert_eq!(
        &contents[b2.byte_offset() as usize..b2.byte_offset() as usize + data2.len()],
        &data2[..]
    );
    assert_eq!(
        &contents[b3.byte_offset() as usize..b3.byte_offset() as usize + data3.len()],
        &data3[..]
    );
}

#[test]
fn test_layout_change_flushes_registry() {
    let (mut device, stats) = null_device();

    let b1 = VertexBuffer::new(&mut device, 12, None, false, VertexLayout::PosNormalTex).unwrap();
    assert_eq!(device.pending_static_buffers(), 1);

    let b2 = VertexBuffer::new(&mut device, 8, None, false, VertexLayout::PosTex).unwrap();

    // The layout change realized the first registry before admission.
    assert!(b1.is_created());
    assert_eq!(stats.buffers_created(), 1);
    assert_eq!(device.pending_static_buffers(), 1);
    assert!(!b2.is_created());
    assert_eq!(b2.byte_offset(), 0);
    assert_eq!(b2.vertex_offset(), 0);
}

#[test]
fn test_vertex_limit_flushes_registry() {
    let (mut device, stats) = null_device();

    let b1 = VertexBuffer::new(&mut device, 40_000, None, false, VertexLayout::PosTex).unwrap();
    let b2 = VertexBuffer::new(&mut device, 30_000, None, false, VertexLayout::PosTex).unwrap();
    assert!(40_000 + 30_000 > MAX_SHARED_VERTEX_COUNT);

    // Admitting b2 would exceed the 16-bit index limit, so b1's registry
    // was flushed first and b2 starts a fresh one at offset 0.
    assert!(b1.is_created());
    assert_eq!(stats.buffers_created(), 1);
    assert!(!b2.is_created());
    assert_eq!(b2.byte_offset(), 0);
    assert_eq!(device.pending_static_buffers(), 1);
}

#[test]
fn test_flush_with_empty_registry_is_noop() {
    let (mut device, stats) = null_device();
    device.flush_pending().unwrap();
    assert_eq!(stats.buffers_created(), 0);
}

// ============================================================================
// Write path
// ============================================================================

#[rstest]
#[case::null(Backend::Null)]
#[case::wgpu(Backend::Wgpu)]
#[case::vulkan(Backend::Vulkan)]
fn test_dynamic_write_roundtrip(#[case] backend: Backend) {
    let _ = env_logger::builder().is_test(true).try_init();
    let Some(mut device) = make_device(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let vb = VertexBuffer::new(&mut device, 16, None, true, VertexLayout::PosTex).unwrap();
    assert!(vb.is_created());
    assert_eq!(vb.byte_offset(), 0);

    let payload = test_pattern(80, 7);
    {
        let mut guard = vb.lock(&mut device, 40, 80);
        guard.copy_from_slice(&payload);
    }
    assert_eq!(vb.pending_upload_count(), 1);

    vb.upload(&mut device).unwrap();
    assert!(vb.is_uploaded());
    assert_eq!(vb.pending_upload_count(), 0);

    let handle = vb.physical_handle().unwrap();
    let read = device.read_buffer(handle, u64::from(vb.byte_offset()) + 40, 80);
    assert_eq!(read, payload);
}

#[test]
fn test_overlapping_writes_apply_in_order() {
    let (mut device, _stats) = null_device();
    let vb = VertexBuffer::new(&mut device, 4, None, true, VertexLayout::PosTex).unwrap();

    vb.write(&mut device, 0, &[0xAA; 16]);
    vb.write(&mut device, 8, &[0xBB; 16]);
    vb.upload(&mut device).unwrap();

    // Later writes win on the overlapping range.
    let handle = vb.physical_handle().unwrap();
    let read = device.read_buffer(handle, 0, 24);
    assert_eq!(&read[..8], &[0xAA; 8]);
    assert_eq!(&read[8..24], &[0xBB; 16]);
}

#[test]
fn test_lock_with_zero_size_covers_whole_buffer() {
    let (mut device, _stats) = null_device();
    let vb = VertexBuffer::new(&mut device, 4, None, true, VertexLayout::PosTex).unwrap();

    {
        let mut guard = vb.lock(&mut device, 0, 0);
        assert_eq!(guard.len(), vb.total_bytes() as usize);
        guard.fill(0x5C);
    }
    vb.upload(&mut device).unwrap();

    let handle = vb.physical_handle().unwrap();
    let read = device.read_buffer(handle, 0, u64::from(vb.total_bytes()));
    assert!(read.iter().all(|&b| b == 0x5C));
}

#[test]
fn test_lock_calls_are_counted() {
    let (mut device, _stats) = null_device();
    let vb = VertexBuffer::new(&mut device, 8, None, true, VertexLayout::PosTex).unwrap();

    vb.write(&mut device, 0, &[1; 20]);
    vb.write(&mut device, 20, &[2; 20]);
    assert_eq!(device.lock_calls(), 2);
}

#[test]
fn test_initial_data_is_queued_and_uploaded() {
    let (mut device, _stats) = null_device();
    let data = test_pattern(6 * VertexLayout::PosNormalTex.stride() as usize, 9);

    let vb =
        VertexBuffer::new(&mut device, 6, Some(&data), false, VertexLayout::PosNormalTex).unwrap();
    assert_eq!(vb.pending_upload_count(), 1);

    vb.upload(&mut device).unwrap();
    let handle = vb.physical_handle().unwrap();
    assert_eq!(device.read_buffer(handle, 0, data.len() as u64), data);
}

#[test]
fn test_upload_with_empty_queue_leaves_dynamic_buffer_unmarked() {
    let (mut device, _stats) = null_device();
    let vb = VertexBuffer::new(&mut device, 4, None, true, VertexLayout::PosTex).unwrap();

    vb.upload(&mut device).unwrap();
    assert!(!vb.is_uploaded());
}

// ============================================================================
// Destruction and shared lifetime
// ============================================================================

#[test]
fn test_destroy_pending_keeps_sibling_offsets() {
    let (mut device, stats) = null_device();
    let stride = VertexLayout::PosNormalTex.stride();
    let data3 = test_pattern(5 * stride as usize, 4);

    let b1 = VertexBuffer::new(&mut device, 10, None, false, VertexLayout::PosNormalTex).unwrap();
    let mut b2 =
        VertexBuffer::new(&mut device, 20, None, false, VertexLayout::PosNormalTex).unwrap();
    let b3 = VertexBuffer::new(&mut device, 5, Some(&data3), false, VertexLayout::PosNormalTex)
        .unwrap();

    b2.destroy(&mut device);
    assert_eq!(device.pending_static_buffers(), 2);
    assert_eq!(stats.buffers_destroyed(), 0);

    // Survivors keep the offsets assigned at admission; the flushed
    // buffer covers the gap left by the destroyed member.
    assert_eq!(b1.byte_offset(), 0);
    assert_eq!(b3.byte_offset(), 30 * stride);

    b1.upload(&mut device).unwrap();
    assert_eq!(stats.buffers_created(), 1);
    assert_eq!(b1.shared_ref_count(), 2);

    let handle = b3.physical_handle().unwrap();
    let read = device.read_buffer(handle, u64::from(b3.byte_offset()), data3.len() as u64);
    assert_eq!(read, data3);
}

#[test]
fn test_shared_buffer_destroyed_exactly_once() {
    let (mut device, stats) = null_device();

    let mut buffers: Vec<VertexBuffer> = (0..3)
        .map(|_| {
            VertexBuffer::new(&mut device, 10, None, false, VertexLayout::PosTex).unwrap()
        })
        .collect();
    buffers[0].upload(&mut device).unwrap();
    assert_eq!(stats.buffers_created(), 1);
    assert_eq!(buffers[0].shared_ref_count(), 3);

    let mut b3 = buffers.pop().unwrap();
    let mut b2 = buffers.pop().unwrap();
    let mut b1 = buffers.pop().unwrap();

    b1.destroy(&mut device);
    assert_eq!(stats.buffers_destroyed(), 0);
    b2.destroy(&mut device);
    assert_eq!(stats.buffers_destroyed(), 0);
    assert_eq!(b3.shared_ref_count(), 1);

    // The Nth destroy releases the device buffer.
    b3.destroy(&mut device);
    assert_eq!(stats.buffers_destroyed(), 1);
}

#[test]
fn test_destroy_dynamic_releases_private_buffer() {
    let (mut device, stats) = null_device();
    let mut vb = VertexBuffer::new(&mut device, 8, None, true, VertexLayout::PosTex).unwrap();
    assert_eq!(stats.buffers_created(), 1);

    vb.destroy(&mut device);
    assert_eq!(stats.buffers_destroyed(), 1);
}

// ============================================================================
// Contract violations
// ============================================================================

#[test]
#[should_panic(expected = "not reentrant")]
fn test_reentrant_lock_panics() {
    let (mut device, _stats) = null_device();
    let vb = VertexBuffer::new(&mut device, 4, None, true, VertexLayout::PosTex).unwrap();

    let _guard = vb.lock(&mut device, 0, 16);
    let _second = vb.lock(&mut device, 16, 16);
}

#[test]
#[should_panic(expected = "immutable once uploaded")]
fn test_write_after_upload_of_static_buffer_panics() {
    let (mut device, _stats) = null_device();
    let data = vec![0u8; 4 * VertexLayout::PosTex.stride() as usize];
    let vb = VertexBuffer::new(&mut device, 4, Some(&data), false, VertexLayout::PosTex).unwrap();
    vb.upload(&mut device).unwrap();

    let _guard = vb.lock(&mut device, 0, 16);
}

#[test]
#[should_panic(expected = "destroyed twice")]
fn test_double_destroy_panics() {
    let (mut device, _stats) = null_device();
    let mut vb = VertexBuffer::new(&mut device, 4, None, true, VertexLayout::PosTex).unwrap();

    vb.destroy(&mut device);
    vb.destroy(&mut device);
}
