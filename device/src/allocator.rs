//! Device memory allocators.
//!
//! Backends expose two allocator instances: a general one for buffers and
//! images, and one tagged for kernel-argument regions (some accelerators
//! require kernarg memory to come from a dedicated region).

use std::collections::HashMap;

use parking_lot::Mutex;
use snafu::ensure;

use crate::error::{InvalidBufferSizeSnafu, Result};

/// Allocates device-resident memory addressed by opaque 64-bit addresses.
pub trait Allocator: Send + Sync + std::fmt::Debug {
    /// Allocate `size` zero-initialized bytes, returning the resident address.
    fn alloc(&self, size: usize) -> Result<u64>;

    /// Free a previously allocated region.
    fn free(&self, addr: u64);

    /// Allocator name for diagnostics.
    fn name(&self) -> &str;

    /// Number of live allocations (for leak checks).
    fn outstanding(&self) -> usize;
}

/// Host-memory allocator backing the reference device.
///
/// Resident addresses are real host pointers into owned, pinned boxes; the
/// backing storage lives in the region table until freed, so an address
/// handed out by [`alloc`](Allocator::alloc) stays valid until the matching
/// [`free`](Allocator::free).
#[derive(Debug)]
pub struct HostAllocator {
    name: &'static str,
    regions: Mutex<HashMap<u64, Box<[u8]>>>,
}

impl HostAllocator {
    pub fn new(name: &'static str) -> Self {
        Self { name, regions: Mutex::new(HashMap::new()) }
    }
}

impl Allocator for HostAllocator {
    fn alloc(&self, size: usize) -> Result<u64> {
        ensure!(size > 0, InvalidBufferSizeSnafu { size });

        let region = vec![0u8; size].into_boxed_slice();
        let addr = region.as_ptr() as u64;
        self.regions.lock().insert(addr, region);
        Ok(addr)
    }

    fn free(&self, addr: u64) {
        self.regions.lock().remove(&addr);
    }

    fn name(&self) -> &str {
        self.name
    }

    fn outstanding(&self) -> usize {
        self.regions.lock().len()
    }
}
