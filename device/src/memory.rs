//! Reference-counted memory objects with per-device residency.
//!
//! A [`MemObject`] owns one resident allocation per device opened in its
//! registry at creation time; the allocation for a given device is resolved
//! through the device's instance index. Handles are shared (`Arc`), and the
//! underlying allocations are freed only when the last handle drops — a
//! queue or the dispatch engine retaining a handle keeps the object alive
//! for the duration of an in-flight operation even if the application
//! releases its own handle.

use std::sync::Arc;

use smallvec::SmallVec;
use snafu::ensure;

use crate::allocator::Allocator;
use crate::error::{
    InvalidBufferSizeSnafu, InvalidImageLayoutSnafu, NotAnImageSnafu, NotResidentSnafu, Result,
    SizeMismatchSnafu,
};
use crate::registry::DeviceRegistry;

/// Image dimensions and addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayout {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    /// Bytes per element (all channels).
    pub elem_size: usize,
    /// Bytes per row.
    pub row_pitch: usize,
    /// Bytes per slice.
    pub slice_pitch: usize,
}

impl ImageLayout {
    /// Layout with tight pitches derived from the dimensions.
    pub fn new(width: usize, height: usize, depth: usize, elem_size: usize) -> Self {
        let row_pitch = width * elem_size;
        let slice_pitch = row_pitch * height;
        Self { width, height, depth, elem_size, row_pitch, slice_pitch }
    }

    /// Total byte size of the image.
    pub fn bytes(&self) -> usize {
        self.slice_pitch * self.depth
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.width > 0 && self.height > 0 && self.depth > 0 && self.elem_size > 0,
            InvalidImageLayoutSnafu { reason: format!("zero dimension in {self:?}") }
        );
        ensure!(
            self.row_pitch >= self.width * self.elem_size,
            InvalidImageLayoutSnafu {
                reason: format!("row pitch {} below row size {}", self.row_pitch, self.width * self.elem_size)
            }
        );
        ensure!(
            self.slice_pitch >= self.row_pitch * self.height,
            InvalidImageLayoutSnafu {
                reason: format!(
                    "slice pitch {} below slice size {}",
                    self.slice_pitch,
                    self.row_pitch * self.height
                )
            }
        );
        Ok(())
    }
}

#[derive(Debug)]
enum MemKind {
    Buffer,
    Image { layout: ImageLayout },
}

/// One per-device resident allocation, freed on drop.
///
/// Freeing here rather than in `MemObject` also rolls back the
/// allocations of earlier devices when a later device's allocation fails
/// mid-creation.
#[derive(Debug)]
struct Resident {
    addr: u64,
    allocator: Arc<dyn Allocator>,
}

impl Drop for Resident {
    fn drop(&mut self) {
        self.allocator.free(self.addr);
    }
}

/// Device memory object (buffer or image).
#[derive(Debug)]
pub struct MemObject {
    kind: MemKind,
    size: usize,
    /// Indexed by device instance (stack-allocated for 1-2 device systems).
    resident: SmallVec<[Resident; 2]>,
}

impl MemObject {
    /// Create a buffer resident on every device in the registry.
    ///
    /// `init` optionally seeds the contents from host memory on every
    /// device (it must match the buffer size exactly).
    pub fn buffer(registry: &DeviceRegistry, size: usize, init: Option<&[u8]>) -> Result<Arc<Self>> {
        ensure!(size > 0, InvalidBufferSizeSnafu { size });
        Self::allocate(registry, MemKind::Buffer, size, init)
    }

    /// Create an image resident on every device in the registry.
    pub fn image(registry: &DeviceRegistry, layout: ImageLayout, init: Option<&[u8]>) -> Result<Arc<Self>> {
        layout.validate()?;
        let size = layout.bytes();
        Self::allocate(registry, MemKind::Image { layout }, size, init)
    }

    fn allocate(registry: &DeviceRegistry, kind: MemKind, size: usize, init: Option<&[u8]>) -> Result<Arc<Self>> {
        if let Some(init) = init {
            ensure!(init.len() == size, SizeMismatchSnafu { expected: size, actual: init.len() });
        }

        let devices = registry.devices();
        let mut resident = SmallVec::with_capacity(devices.len());
        for device in &devices {
            let allocator = Arc::clone(device.backend().global_allocator());
            let addr = allocator.alloc(size)?;
            if let Some(init) = init {
                // SAFETY: `addr` was just allocated with `size` bytes and
                // `init.len() == size`.
                unsafe { device.backend().write(init.as_ptr(), addr, size) }
            }
            resident.push(Resident { addr, allocator });
        }

        Ok(Arc::new(Self { kind, size, resident }))
    }

    /// Byte size of the object.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this object is an image.
    pub fn is_image(&self) -> bool {
        matches!(self.kind, MemKind::Image { .. })
    }

    /// Image layout, if this object is an image.
    pub fn layout(&self) -> Option<&ImageLayout> {
        match &self.kind {
            MemKind::Image { layout } => Some(layout),
            MemKind::Buffer => None,
        }
    }

    /// Resident address of this object on the given device instance.
    pub fn resident_addr(&self, instance: usize) -> Result<u64> {
        self.resident.get(instance).map(|r| r.addr).ok_or_else(|| NotResidentSnafu { instance }.build())
    }

    /// Opaque 64-bit image handle for the given device instance.
    ///
    /// On the host backend the handle is the resident address.
    pub fn image_handle(&self, instance: usize) -> Result<u64> {
        ensure!(self.is_image(), NotAnImageSnafu);
        self.resident_addr(instance)
    }
}

