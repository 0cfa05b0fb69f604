use std::sync::Arc;

use crate::ring::{LaunchPacket, SubmissionRing};
use crate::signal::CompletionSignal;

fn packet(entry_handle: u64) -> LaunchPacket {
    LaunchPacket {
        work_dim: 1,
        workgroup_size: [1, 1, 1],
        grid_size: [1, 1, 1],
        group_segment_size: 0,
        private_segment_size: 0,
        entry_handle,
        kernarg_address: 0,
        completion: Arc::new(CompletionSignal::new(1)),
    }
}

#[test]
fn test_reserve_write_publish_pop() {
    let ring = SubmissionRing::with_capacity(8);

    let index = ring.reserve().unwrap();
    assert_eq!(index, 0);
    ring.write(index, packet(42));

    // Not visible to the consumer until published.
    assert!(ring.pop().is_none());

    ring.publish(index);
    assert_eq!(ring.doorbell_index(), 1);

    let consumed = ring.pop().unwrap();
    assert_eq!(consumed.entry_handle, 42);
    assert!(ring.pop().is_none());
}

#[test]
fn test_capacity_rounded_to_power_of_two() {
    let ring = SubmissionRing::with_capacity(5);
    assert_eq!(ring.capacity(), 8);
}

#[test]
fn test_wraparound() {
    let ring = SubmissionRing::with_capacity(4);

    // Cycle more packets than the capacity through the ring.
    for entry in 0..10u64 {
        let index = ring.reserve().unwrap();
        ring.write(index, packet(entry));
        ring.publish(index);

        let consumed = ring.pop().unwrap();
        assert_eq!(consumed.entry_handle, entry);
    }
    assert!(ring.is_empty());
}

#[test]
fn test_reserve_fails_when_full() {
    let ring = SubmissionRing::with_capacity(4);

    for _ in 0..4 {
        let index = ring.reserve().unwrap();
        ring.write(index, packet(0));
        ring.publish(index);
    }

    assert!(matches!(ring.reserve(), Err(crate::Error::RingFull { capacity: 4 })));

    // Draining one slot frees a reservation.
    ring.pop().unwrap();
    ring.reserve().unwrap();
}

#[test]
fn test_reservation_indices_are_monotonic() {
    let ring = SubmissionRing::with_capacity(8);
    let first = ring.reserve().unwrap();
    let second = ring.reserve().unwrap();
    let third = ring.reserve().unwrap();
    assert_eq!((first, second, third), (0, 1, 2));
    assert_eq!(ring.len(), 3);
}
