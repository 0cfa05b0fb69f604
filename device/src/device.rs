//! Device abstraction: the capability surface the dispatch core consumes.
//!
//! A [`DeviceBackend`] supplies raw memory, a submission ring, completion
//! signalling, and data movement over resident addresses. The dispatch core
//! consumes these capabilities; it never reimplements them.
//!
//! [`HostBackend`] is the in-tree reference implementation: it executes
//! published launch packets synchronously when the doorbell rings, through
//! an injectable launch hook. Tests use the hook to observe marshaled
//! packets and to inject device-side execution faults.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::allocator::{Allocator, HostAllocator};
use crate::registry::DeviceSpec;
use crate::ring::{LaunchPacket, SubmissionRing};
use crate::signal::CompletionSignal;

/// Raw accelerator capability surface.
///
/// The data-movement methods operate on resident addresses handed out by
/// this backend's allocators.
pub trait DeviceBackend: Send + Sync + std::fmt::Debug {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// General-purpose device memory allocator.
    fn global_allocator(&self) -> &Arc<dyn Allocator>;

    /// Allocator tagged for kernel-argument regions.
    fn kernarg_allocator(&self) -> &Arc<dyn Allocator>;

    /// The device's submission ring.
    fn ring(&self) -> &SubmissionRing;

    /// Ring the doorbell: notify the device that packets up to the ring's
    /// published index are ready.
    fn doorbell(&self, index: u64);

    /// Create a completion signal with the given initial value.
    fn create_signal(&self, initial: i64) -> Arc<CompletionSignal>;

    /// Monotonic device timer in nanoseconds (profiling timestamps).
    fn timer_ns(&self) -> u64;

    /// Copy `len` bytes from a resident address to host memory.
    ///
    /// # Safety
    ///
    /// `src_addr` must be a live resident address with at least `len`
    /// addressable bytes, and `dst` must be valid for `len` writes.
    unsafe fn read(&self, src_addr: u64, dst: *mut u8, len: usize);

    /// Copy `len` bytes from host memory to a resident address.
    ///
    /// # Safety
    ///
    /// `src` must be valid for `len` reads, and `dst_addr` must be a live
    /// resident address with at least `len` addressable bytes.
    unsafe fn write(&self, src: *const u8, dst_addr: u64, len: usize);

    /// Tile `pattern` over `len` bytes at a resident address.
    ///
    /// # Safety
    ///
    /// `dst_addr` must be a live resident address with at least `len`
    /// addressable bytes; `len` must be a multiple of the pattern size.
    unsafe fn fill(&self, pattern: &[u8], dst_addr: u64, len: usize);

    /// Copy a three-dimensional region from a resident address to host
    /// memory, honoring row and slice pitches on both sides.
    ///
    /// # Safety
    ///
    /// Both the source region (resident) and the destination region (host)
    /// must be fully addressable under the given origins, region and
    /// pitches.
    #[allow(clippy::too_many_arguments)]
    unsafe fn read_rect(
        &self,
        src_addr: u64,
        dst: *mut u8,
        src_origin: [usize; 3],
        dst_origin: [usize; 3],
        region: [usize; 3],
        src_row_pitch: usize,
        src_slice_pitch: usize,
        dst_row_pitch: usize,
        dst_slice_pitch: usize,
    );
}

/// One opened device instance.
///
/// The instance index is the device's position in its registry and is the
/// key for resolving per-device resident addresses of memory objects.
#[derive(Debug, Clone)]
pub struct Device {
    spec: DeviceSpec,
    instance: usize,
    backend: Arc<dyn DeviceBackend>,
}

impl Device {
    pub(crate) fn new(spec: DeviceSpec, instance: usize, backend: Arc<dyn DeviceBackend>) -> Self {
        Self { spec, instance, backend }
    }

    /// Device specification this instance was opened from.
    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    /// Registry-wide instance index.
    pub fn instance(&self) -> usize {
        self.instance
    }

    /// The raw capability surface.
    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }
}

/// Outcome hook invoked by [`HostBackend`] for every consumed packet.
///
/// Returning `Err` marks the packet's completion signal as faulted, which
/// the dispatch engine treats as a fatal post-submission failure.
pub type LaunchHook = Box<dyn Fn(&LaunchPacket) -> Result<(), String> + Send + Sync>;

/// Host reference backend.
///
/// Consumes published packets synchronously when the doorbell rings. The
/// launch hook stands in for actual kernel execution; without one, every
/// launch retires successfully.
pub struct HostBackend {
    global: Arc<dyn Allocator>,
    kernarg: Arc<dyn Allocator>,
    ring: SubmissionRing,
    origin: Instant,
    hook: RwLock<Option<LaunchHook>>,
}

impl std::fmt::Debug for HostBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBackend").field("ring_depth", &self.ring.len()).finish()
    }
}

impl HostBackend {
    /// Default submission ring capacity.
    const RING_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self {
            global: Arc::new(HostAllocator::new("host")),
            kernarg: Arc::new(HostAllocator::new("host-kernarg")),
            ring: SubmissionRing::with_capacity(Self::RING_CAPACITY),
            origin: Instant::now(),
            hook: RwLock::new(None),
        }
    }

    /// Install a launch hook observing (or failing) consumed packets.
    pub fn set_launch_hook(&self, hook: LaunchHook) {
        *self.hook.write() = Some(hook);
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn global_allocator(&self) -> &Arc<dyn Allocator> {
        &self.global
    }

    fn kernarg_allocator(&self) -> &Arc<dyn Allocator> {
        &self.kernarg
    }

    fn ring(&self) -> &SubmissionRing {
        &self.ring
    }

    fn doorbell(&self, _index: u64) {
        // Drain every published packet; the host device retires work
        // synchronously.
        while let Some(packet) = self.ring.pop() {
            let outcome = match self.hook.read().as_ref() {
                Some(hook) => hook(&packet),
                None => Ok(()),
            };

            match outcome {
                Ok(()) => packet.completion.subtract(1),
                Err(reason) => {
                    tracing::error!(launch.entry = packet.entry_handle, %reason, "host launch faulted");
                    packet.completion.set(-1);
                }
            }
        }
    }

    fn create_signal(&self, initial: i64) -> Arc<CompletionSignal> {
        Arc::new(CompletionSignal::new(initial))
    }

    fn timer_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    unsafe fn read(&self, src_addr: u64, dst: *mut u8, len: usize) {
        let src = src_addr as *const u8;
        if std::ptr::eq(src, dst.cast_const()) {
            return;
        }
        // SAFETY: caller guarantees both regions are addressable for `len`.
        unsafe { std::ptr::copy_nonoverlapping(src, dst, len) }
    }

    unsafe fn write(&self, src: *const u8, dst_addr: u64, len: usize) {
        let dst = dst_addr as *mut u8;
        if std::ptr::eq(src, dst.cast_const()) {
            return;
        }
        // SAFETY: caller guarantees both regions are addressable for `len`.
        unsafe { std::ptr::copy_nonoverlapping(src, dst, len) }
    }

    unsafe fn fill(&self, pattern: &[u8], dst_addr: u64, len: usize) {
        let mut dst = dst_addr as *mut u8;
        for _ in 0..len / pattern.len() {
            // SAFETY: caller guarantees `len` addressable bytes at `dst_addr`
            // and `len % pattern.len() == 0`.
            unsafe {
                std::ptr::copy_nonoverlapping(pattern.as_ptr(), dst, pattern.len());
                dst = dst.add(pattern.len());
            }
        }
    }

    unsafe fn read_rect(
        &self,
        src_addr: u64,
        dst: *mut u8,
        src_origin: [usize; 3],
        dst_origin: [usize; 3],
        region: [usize; 3],
        src_row_pitch: usize,
        src_slice_pitch: usize,
        dst_row_pitch: usize,
        dst_slice_pitch: usize,
    ) {
        let src = src_addr as *const u8;
        let src_base = src_origin[0] + src_row_pitch * src_origin[1] + src_slice_pitch * src_origin[2];
        let dst_base = dst_origin[0] + dst_row_pitch * dst_origin[1] + dst_slice_pitch * dst_origin[2];

        for slice in 0..region[2] {
            for row in 0..region[1] {
                // SAFETY: caller guarantees both regions are addressable
                // under the given origins, region and pitches.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        src.add(src_base + src_row_pitch * row + src_slice_pitch * slice),
                        dst.add(dst_base + dst_row_pitch * row + dst_slice_pitch * slice),
                        region[0],
                    );
                }
            }
        }
    }
}
