//! Hardware submission ring.
//!
//! Each device queue exposes a single bounded ring of launch packets with a
//! monotonic write index. Producers follow a three-step protocol:
//!
//! ```ignore
//! let index = ring.reserve()?;          // atomic reservation
//! ring.write(index, packet);            // fill the slot at index & mask
//! ring.publish(index);                  // move the doorbell past the slot
//! backend.doorbell(index);              // notify the device
//! ```
//!
//! The reservation counter is advanced with a compare-exchange loop, so the
//! protocol stays correct even if multiple host threads end up sharing one
//! queue. The consumer side (`pop`) assumes a single consumer: the device
//! backend draining packets up to the doorbell.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use snafu::ensure;

use crate::error::{Result, RingFullSnafu};
use crate::signal::CompletionSignal;

/// Device-native launch descriptor written into the submission ring.
#[derive(Debug, Clone)]
pub struct LaunchPacket {
    /// Work dimensionality (1..=3).
    pub work_dim: u16,
    /// Work-group size per dimension.
    pub workgroup_size: [u32; 3],
    /// Total grid size per dimension.
    pub grid_size: [u32; 3],
    /// Group-local memory footprint in bytes (fixed usage plus all
    /// per-dispatch local allocations).
    pub group_segment_size: u32,
    /// Per-work-item private memory footprint in bytes.
    pub private_segment_size: u32,
    /// Native entry point handle from the compiled artifact.
    pub entry_handle: u64,
    /// Device-visible address of the marshaled kernel argument buffer.
    pub kernarg_address: u64,
    /// Signal the device drives to zero (or negative on fault) when the
    /// launch retires.
    pub completion: Arc<CompletionSignal>,
}

/// Bounded single-consumer submission ring with an atomic write index.
///
/// Capacity is rounded up to the next power of two so slot addressing is a
/// mask of the monotonic index.
#[derive(Debug)]
pub struct SubmissionRing {
    /// Ring slot storage.
    slots: Box<[Mutex<Option<LaunchPacket>>]>,
    /// Capacity (power of two).
    capacity: u64,
    /// Mask for index wrapping.
    mask: u64,
    /// Monotonic producer reservation counter.
    write_index: AtomicU64,
    /// Next index the consumer will take.
    read_index: AtomicU64,
    /// Packets below this index are published and visible to the device.
    doorbell: AtomicU64,
}

impl SubmissionRing {
    /// Create a ring with the given capacity (rounded up to a power of two).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two() as u64;
        let slots = (0..capacity).map(|_| Mutex::new(None)).collect::<Vec<_>>().into_boxed_slice();
        Self {
            slots,
            capacity,
            mask: capacity - 1,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            doorbell: AtomicU64::new(0),
        }
    }

    /// Reserve the next slot index.
    ///
    /// Fails with [`Error::RingFull`](crate::Error::RingFull) when all
    /// slots hold unconsumed packets.
    pub fn reserve(&self) -> Result<u64> {
        let mut index = self.write_index.load(Ordering::Relaxed);
        loop {
            let read = self.read_index.load(Ordering::Acquire);
            ensure!(index.wrapping_sub(read) < self.capacity, RingFullSnafu { capacity: self.capacity as usize });

            match self.write_index.compare_exchange_weak(index, index + 1, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Ok(index),
                Err(current) => index = current,
            }
        }
    }

    /// Write a packet into the reserved slot.
    pub fn write(&self, index: u64, packet: LaunchPacket) {
        *self.slots[(index & self.mask) as usize].lock() = Some(packet);
    }

    /// Publish the slot: the doorbell moves past `index`, making the packet
    /// visible to the consumer.
    pub fn publish(&self, index: u64) {
        self.doorbell.fetch_max(index + 1, Ordering::AcqRel);
    }

    /// Take the next published packet, if any.
    ///
    /// Consumer side; assumes a single consumer.
    pub fn pop(&self) -> Option<LaunchPacket> {
        let read = self.read_index.load(Ordering::Acquire);
        if read >= self.doorbell.load(Ordering::Acquire) {
            return None;
        }

        let packet = self.slots[(read & self.mask) as usize].lock().take();
        self.read_index.store(read + 1, Ordering::Release);
        packet
    }

    /// Ring capacity.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Number of reserved-but-unconsumed slots.
    pub fn len(&self) -> usize {
        let write = self.write_index.load(Ordering::Acquire);
        let read = self.read_index.load(Ordering::Acquire);
        write.wrapping_sub(read) as usize
    }

    /// Whether the ring holds no pending packets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current doorbell position (packets below it are published).
    pub fn doorbell_index(&self) -> u64 {
        self.doorbell.load(Ordering::Acquire)
    }
}
