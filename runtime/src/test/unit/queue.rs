use std::sync::Arc;

use argos_device::MemObject;
use test_case::test_case;

use crate::event::CommandStatus;
use crate::queue::{CommandQueue, ExecutionOrder, QueueProperties};
use crate::test::support::TestRig;

fn rig_and_queue(profiling: bool) -> (TestRig, Arc<CommandQueue>) {
    let rig = TestRig::with_hosts(1);
    let queue =
        CommandQueue::new(rig.device(0), QueueProperties { profiling, order: ExecutionOrder::InOrder });
    (rig, queue)
}

#[test]
fn test_write_then_read_roundtrip() {
    let (rig, queue) = rig_and_queue(false);
    let buffer = MemObject::buffer(&rig.registry, 64, None).unwrap();

    let payload: Vec<u8> = (0..32).collect();
    let write = queue.enqueue_write_buffer(&buffer, 16, &payload, &[]).unwrap();
    assert_eq!(write.status(), CommandStatus::Complete);

    let mut readback = vec![0u8; 32];
    let read = queue.enqueue_read_buffer(&buffer, 16, &mut readback, &[Arc::clone(&write)]).unwrap();
    assert_eq!(read.status(), CommandStatus::Complete);
    assert_eq!(readback, payload);
}

#[test]
fn test_fill_buffer_tiles_pattern() {
    let (rig, queue) = rig_and_queue(false);
    let buffer = MemObject::buffer(&rig.registry, 16, None).unwrap();

    queue.enqueue_fill_buffer(&buffer, &[0xAB, 0xCD], 4, 8, &[]).unwrap();

    let mut readback = vec![0u8; 16];
    queue.enqueue_read_buffer(&buffer, 0, &mut readback, &[]).unwrap();
    assert_eq!(&readback[..4], &[0; 4]);
    assert_eq!(&readback[4..12], &[0xAB, 0xCD, 0xAB, 0xCD, 0xAB, 0xCD, 0xAB, 0xCD]);
    assert_eq!(&readback[12..], &[0; 4]);
}

// Pattern sizes must be powers of two within 1..=128; a rejected fill
// leaves the buffer untouched.
#[test_case(3; "three bytes")]
#[test_case(6; "six bytes")]
#[test_case(0; "empty pattern")]
fn test_fill_buffer_rejects_bad_pattern_sizes(pattern_size: usize) {
    let (rig, queue) = rig_and_queue(false);
    let buffer = MemObject::buffer(&rig.registry, 64, Some(&[0x11; 64])).unwrap();

    let pattern = vec![0xFF; pattern_size];
    let result = queue.enqueue_fill_buffer(&buffer, &pattern, 0, 48, &[]);
    assert!(matches!(result, Err(crate::Error::InvalidValue { .. })));

    // No device-side effect.
    let mut readback = vec![0u8; 64];
    queue.enqueue_read_buffer(&buffer, 0, &mut readback, &[]).unwrap();
    assert_eq!(readback, vec![0x11; 64]);
}

#[test]
fn test_fill_buffer_rejects_misaligned_range() {
    let (rig, queue) = rig_and_queue(false);
    let buffer = MemObject::buffer(&rig.registry, 64, None).unwrap();

    assert!(matches!(
        queue.enqueue_fill_buffer(&buffer, &[0; 4], 2, 8, &[]),
        Err(crate::Error::InvalidValue { .. })
    ));
    assert!(matches!(
        queue.enqueue_fill_buffer(&buffer, &[0; 4], 0, 6, &[]),
        Err(crate::Error::InvalidValue { .. })
    ));
}

#[test]
fn test_buffer_range_validation() {
    let (rig, queue) = rig_and_queue(false);
    let buffer = MemObject::buffer(&rig.registry, 16, None).unwrap();

    let mut dst = vec![0u8; 32];
    assert!(matches!(
        queue.enqueue_read_buffer(&buffer, 0, &mut dst, &[]),
        Err(crate::Error::InvalidValue { .. })
    ));
    assert!(matches!(
        queue.enqueue_write_buffer(&buffer, 12, &[0; 8], &[]),
        Err(crate::Error::InvalidValue { .. })
    ));
}

#[test]
fn test_buffer_ops_reject_images() {
    let (rig, queue) = rig_and_queue(false);
    let image = MemObject::image(&rig.registry, argos_device::ImageLayout::new(4, 4, 1, 4), None).unwrap();

    let mut dst = vec![0u8; 16];
    assert!(matches!(
        queue.enqueue_read_buffer(&image, 0, &mut dst, &[]),
        Err(crate::Error::InvalidMemObject { .. })
    ));
}

#[test]
fn test_read_image_region() {
    let (rig, queue) = rig_and_queue(false);

    // 8x4 single-slice image, one byte per element, seeded row-major.
    let layout = argos_device::ImageLayout::new(8, 4, 1, 1);
    let seed: Vec<u8> = (0..32).collect();
    let image = MemObject::image(&rig.registry, layout, Some(&seed)).unwrap();

    // 3x2 region at x=2, y=1.
    let mut dst = vec![0u8; 6];
    let event = queue.enqueue_read_image(&image, [2, 1, 0], [3, 2, 1], 0, 0, &mut dst, &[]).unwrap();
    assert_eq!(event.status(), CommandStatus::Complete);
    assert_eq!(dst, vec![10, 11, 12, 18, 19, 20]);
}

#[test]
fn test_read_image_rejects_out_of_bounds_region() {
    let (rig, queue) = rig_and_queue(false);
    let image = MemObject::image(&rig.registry, argos_device::ImageLayout::new(8, 4, 1, 1), None).unwrap();

    let mut dst = vec![0u8; 64];
    assert!(matches!(
        queue.enqueue_read_image(&image, [6, 0, 0], [4, 1, 1], 0, 0, &mut dst, &[]),
        Err(crate::Error::InvalidValue { .. })
    ));
}

#[test]
fn test_read_image_rejects_plain_buffer() {
    let (rig, queue) = rig_and_queue(false);
    let buffer = MemObject::buffer(&rig.registry, 64, None).unwrap();

    let mut dst = vec![0u8; 64];
    assert!(matches!(
        queue.enqueue_read_image(&buffer, [0, 0, 0], [1, 1, 1], 0, 0, &mut dst, &[]),
        Err(crate::Error::InvalidMemObject { .. })
    ));
}

#[test]
fn test_in_order_completion() {
    let (rig, queue) = rig_and_queue(false);
    let buffer = MemObject::buffer(&rig.registry, 32, None).unwrap();

    // Each command's event is complete before the next enqueue is issued:
    // enqueue order == execution order == completion order.
    let a = queue.enqueue_write_buffer(&buffer, 0, &[1; 32], &[]).unwrap();
    assert_eq!(a.status(), CommandStatus::Complete);
    let b = queue.enqueue_fill_buffer(&buffer, &[2; 4], 0, 16, &[]).unwrap();
    assert_eq!(b.status(), CommandStatus::Complete);
    let mut dst = vec![0u8; 32];
    let c = queue.enqueue_read_buffer(&buffer, 0, &mut dst, &[]).unwrap();
    assert_eq!(c.status(), CommandStatus::Complete);

    assert_eq!(&dst[..16], &[2; 16]);
    assert_eq!(&dst[16..], &[1; 16]);
    queue.finish().unwrap();
}

#[test]
#[should_panic(expected = "out-of-order queue execution")]
fn test_out_of_order_enqueue_aborts() {
    let (rig, _) = rig_and_queue(false);
    let queue = CommandQueue::new(
        rig.device(0),
        QueueProperties { profiling: false, order: ExecutionOrder::OutOfOrder },
    );
    let buffer = MemObject::buffer(&rig.registry, 16, None).unwrap();

    let _ = queue.enqueue_write_buffer(&buffer, 0, &[0; 16], &[]);
}

#[test]
fn test_profiling_timestamps() {
    let (rig, queue) = rig_and_queue(true);
    let buffer = MemObject::buffer(&rig.registry, 16, None).unwrap();

    let event = queue.enqueue_write_buffer(&buffer, 0, &[0; 16], &[]).unwrap();
    let profile = event.profile().unwrap();
    assert!(profile.queued_ns <= profile.submitted_ns);
    assert!(profile.submitted_ns <= profile.running_ns);
    assert!(profile.running_ns <= profile.complete_ns);
}

#[test]
fn test_no_profiling_without_queue_property() {
    let (rig, queue) = rig_and_queue(false);
    let buffer = MemObject::buffer(&rig.registry, 16, None).unwrap();

    let event = queue.enqueue_write_buffer(&buffer, 0, &[0; 16], &[]).unwrap();
    assert!(event.profile().is_none());
}

#[test]
fn test_enqueue_retains_memory_object_until_complete() {
    let (rig, queue) = rig_and_queue(false);
    let allocator = Arc::clone(rig.device(0).backend().global_allocator());

    let buffer = MemObject::buffer(&rig.registry, 32, None).unwrap();
    assert_eq!(allocator.outstanding(), 1);

    // The command retains the buffer while in flight; releasing the
    // caller's handle right after enqueue must not free it earlier than
    // the command's completion.
    let event = queue.enqueue_fill_buffer(&buffer, &[7; 4], 0, 32, &[]).unwrap();
    drop(buffer);
    assert_eq!(event.status(), CommandStatus::Complete);
    assert_eq!(allocator.outstanding(), 0);
}
