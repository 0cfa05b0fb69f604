//! Ordered per-device command queues.
//!
//! A [`CommandQueue`] is an append-only list of command nodes consumed
//! strictly from the front. In-order semantics are end-to-end: a command
//! does not begin executing until every previously enqueued command's
//! event is complete, and the issuing thread blocks at the device
//! completion wait before the queue advances.
//!
//! Out-of-order execution is a recognized but unimplemented mode:
//! enqueuing under it aborts, distinguishing "not yet built" from "will
//! silently misorder".
//!
//! Every enqueue that references a memory object retains a handle inside
//! the command node before appending it, and drops that handle only after
//! the operation completes, so the object cannot be destroyed while the
//! command is in flight even if the caller releases its own handle right
//! after enqueuing.

use std::collections::VecDeque;
use std::sync::Arc;

use argos_device::{Device, MemObject};
use parking_lot::Mutex;
use smallvec::SmallVec;
use snafu::ensure;

use crate::dispatch::{LaunchGeometry, dispatch_run};
use crate::error::{InvalidMemObjectSnafu, InvalidValueSnafu, Result};
use crate::event::{CommandKind, CommandStatus, Event};
use crate::kernel::Kernel;

/// Queue execution-order mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionOrder {
    /// Commands execute and complete in enqueue order.
    #[default]
    InOrder,
    /// Recognized but unimplemented; enqueuing under it aborts.
    OutOfOrder,
}

/// Queue-level properties fixed at creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueProperties {
    /// Capture per-event timestamps from the device timer.
    pub profiling: bool,
    pub order: ExecutionOrder,
}

/// Pending operation payload.
enum CommandOp {
    ReadBuffer { mem: Arc<MemObject>, offset: usize, len: usize, dst: *mut u8 },
    WriteBuffer { mem: Arc<MemObject>, offset: usize, len: usize, src: *const u8 },
    FillBuffer { mem: Arc<MemObject>, pattern: SmallVec<[u8; 16]>, offset: usize, len: usize },
    ReadImage {
        image: Arc<MemObject>,
        origin: [usize; 3],
        region: [usize; 3],
        dst_row_pitch: usize,
        dst_slice_pitch: usize,
        dst: *mut u8,
    },
    Run { kernel: Arc<Kernel>, geometry: LaunchGeometry },
}

/// One enqueued command: the payload plus its owned event.
struct CommandNode {
    event: Arc<Event>,
    op: CommandOp,
}

// SAFETY: the raw host pointers inside CommandOp come from caller slices
// that outlive the enqueue call, and in-order queues drain every node
// before the enqueue call returns.
unsafe impl Send for CommandNode {}

/// Ordered, append-only command queue bound to one device.
pub struct CommandQueue {
    device: Arc<Device>,
    properties: QueueProperties,
    pending: Mutex<VecDeque<CommandNode>>,
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("device", self.device.spec())
            .field("properties", &self.properties)
            .finish()
    }
}

impl CommandQueue {
    pub fn new(device: Arc<Device>, properties: QueueProperties) -> Arc<Self> {
        Arc::new(Self { device, properties, pending: Mutex::new(VecDeque::new()) })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn properties(&self) -> QueueProperties {
        self.properties
    }

    /// Copy from a buffer object into host memory.
    pub fn enqueue_read_buffer(
        &self,
        mem: &Arc<MemObject>,
        offset: usize,
        dst: &mut [u8],
        wait_list: &[Arc<Event>],
    ) -> Result<Arc<Event>> {
        self.validate_buffer_range(mem, offset, dst.len())?;
        let op = CommandOp::ReadBuffer { mem: Arc::clone(mem), offset, len: dst.len(), dst: dst.as_mut_ptr() };
        self.submit(CommandKind::ReadBuffer, op, wait_list)
    }

    /// Copy from host memory into a buffer object.
    pub fn enqueue_write_buffer(
        &self,
        mem: &Arc<MemObject>,
        offset: usize,
        src: &[u8],
        wait_list: &[Arc<Event>],
    ) -> Result<Arc<Event>> {
        self.validate_buffer_range(mem, offset, src.len())?;
        let op = CommandOp::WriteBuffer { mem: Arc::clone(mem), offset, len: src.len(), src: src.as_ptr() };
        self.submit(CommandKind::WriteBuffer, op, wait_list)
    }

    /// Tile a pattern over a buffer range.
    ///
    /// The pattern size must be a power of two in 1..=128, and both the
    /// offset and the filled length must be multiples of it.
    pub fn enqueue_fill_buffer(
        &self,
        mem: &Arc<MemObject>,
        pattern: &[u8],
        offset: usize,
        len: usize,
        wait_list: &[Arc<Event>],
    ) -> Result<Arc<Event>> {
        let pattern_size = pattern.len();
        ensure!(
            (1..=128).contains(&pattern_size) && pattern_size.is_power_of_two(),
            InvalidValueSnafu { reason: format!("fill pattern size {pattern_size} is not a power of two in 1..=128") }
        );
        ensure!(
            offset % pattern_size == 0 && len % pattern_size == 0,
            InvalidValueSnafu {
                reason: format!("fill offset {offset} and length {len} must be multiples of the pattern size")
            }
        );
        self.validate_buffer_range(mem, offset, len)?;

        let op = CommandOp::FillBuffer {
            mem: Arc::clone(mem),
            pattern: SmallVec::from_slice(pattern),
            offset,
            len,
        };
        self.submit(CommandKind::FillBuffer, op, wait_list)
    }

    /// Copy an image region into host memory.
    ///
    /// `dst_row_pitch` / `dst_slice_pitch` of zero default to tight host
    /// packing of the region.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue_read_image(
        &self,
        image: &Arc<MemObject>,
        origin: [usize; 3],
        region: [usize; 3],
        dst_row_pitch: usize,
        dst_slice_pitch: usize,
        dst: &mut [u8],
        wait_list: &[Arc<Event>],
    ) -> Result<Arc<Event>> {
        let layout = image
            .layout()
            .ok_or_else(|| InvalidMemObjectSnafu { reason: "read-image on a plain buffer".to_string() }.build())?;

        ensure!(
            region.iter().all(|&r| r > 0),
            InvalidValueSnafu { reason: format!("empty image region {region:?}") }
        );
        let extent = [layout.width, layout.height, layout.depth];
        for dim in 0..3 {
            ensure!(
                origin[dim] + region[dim] <= extent[dim],
                InvalidValueSnafu {
                    reason: format!("image region {region:?} at origin {origin:?} exceeds extent {extent:?}")
                }
            );
        }

        let row_bytes = region[0] * layout.elem_size;
        let dst_row_pitch = if dst_row_pitch == 0 { row_bytes } else { dst_row_pitch };
        let dst_slice_pitch = if dst_slice_pitch == 0 { dst_row_pitch * region[1] } else { dst_slice_pitch };
        ensure!(
            dst_row_pitch >= row_bytes && dst_slice_pitch >= dst_row_pitch * region[1],
            InvalidValueSnafu { reason: "destination pitches below the region size".to_string() }
        );
        let needed = dst_slice_pitch * region[2];
        ensure!(
            dst.len() >= needed,
            InvalidValueSnafu { reason: format!("destination holds {} bytes, region needs {needed}", dst.len()) }
        );

        let op = CommandOp::ReadImage {
            image: Arc::clone(image),
            origin,
            region,
            dst_row_pitch,
            dst_slice_pitch,
            dst: dst.as_mut_ptr(),
        };
        self.submit(CommandKind::ReadImage, op, wait_list)
    }

    /// Dispatch a kernel with the given launch geometry.
    pub fn enqueue_run(
        &self,
        kernel: &Arc<Kernel>,
        geometry: LaunchGeometry,
        wait_list: &[Arc<Event>],
    ) -> Result<Arc<Event>> {
        ensure!(
            kernel.instance_for(&self.device).is_some(),
            crate::error::InvalidCommandQueueSnafu {
                reason: format!("kernel '{}' does not target device {}", kernel.name(), self.device.spec())
            }
        );
        let op = CommandOp::Run { kernel: Arc::clone(kernel), geometry };
        self.submit(CommandKind::Run, op, wait_list)
    }

    /// Block until every enqueued command has completed.
    pub fn finish(&self) -> Result<()> {
        self.drain()
    }

    fn validate_buffer_range(&self, mem: &MemObject, offset: usize, len: usize) -> Result<()> {
        ensure!(
            !mem.is_image(),
            InvalidMemObjectSnafu { reason: "buffer operation on an image object".to_string() }
        );
        ensure!(len > 0, InvalidValueSnafu { reason: "zero-length buffer operation".to_string() });
        ensure!(
            offset + len <= mem.size(),
            InvalidValueSnafu {
                reason: format!("range {offset}..{} exceeds buffer size {}", offset + len, mem.size())
            }
        );
        Ok(())
    }

    fn timestamp(&self) -> Option<u64> {
        self.properties.profiling.then(|| self.device.backend().timer_ns())
    }

    /// Common enqueue path: order check, wait list, event creation, append,
    /// drain.
    fn submit(&self, kind: CommandKind, op: CommandOp, wait_list: &[Arc<Event>]) -> Result<Arc<Event>> {
        if self.properties.order == ExecutionOrder::OutOfOrder {
            unimplemented!("out-of-order queue execution");
        }

        for event in wait_list {
            event.wait();
        }

        let event = Arc::new(Event::new(kind, self.timestamp()));
        self.pending.lock().push_back(CommandNode { event: Arc::clone(&event), op });
        self.drain()?;
        Ok(event)
    }

    /// Consume pending nodes from the front, one at a time.
    fn drain(&self) -> Result<()> {
        loop {
            let node = match self.pending.lock().pop_front() {
                Some(node) => node,
                None => return Ok(()),
            };

            node.event.advance(CommandStatus::Submitted, self.timestamp());
            node.event.advance(CommandStatus::Running, self.timestamp());
            self.execute(&node.op)?;
            node.event.advance(CommandStatus::Complete, self.timestamp());
            // Dropping the node here releases the memory objects it
            // retained.
        }
    }

    fn execute(&self, op: &CommandOp) -> Result<()> {
        let backend = self.device.backend();
        let instance = self.device.instance();

        match op {
            CommandOp::ReadBuffer { mem, offset, len, dst } => {
                let addr = mem.resident_addr(instance).map_err(|e| crate::Error::Device { source: e })?;
                // SAFETY: range validated at enqueue; `dst` outlives the
                // enqueue call that drains this node.
                unsafe { backend.read(addr + *offset as u64, *dst, *len) }
            }
            CommandOp::WriteBuffer { mem, offset, len, src } => {
                let addr = mem.resident_addr(instance).map_err(|e| crate::Error::Device { source: e })?;
                // SAFETY: range validated at enqueue; `src` outlives the
                // enqueue call that drains this node.
                unsafe { backend.write(*src, addr + *offset as u64, *len) }
            }
            CommandOp::FillBuffer { mem, pattern, offset, len } => {
                let addr = mem.resident_addr(instance).map_err(|e| crate::Error::Device { source: e })?;
                // SAFETY: range and pattern multiples validated at enqueue.
                unsafe { backend.fill(pattern, addr + *offset as u64, *len) }
            }
            CommandOp::ReadImage { image, origin, region, dst_row_pitch, dst_slice_pitch, dst } => {
                let layout = image.layout().expect("validated as an image at enqueue");
                let addr = image.resident_addr(instance).map_err(|e| crate::Error::Device { source: e })?;
                // SAFETY: origin/region validated against the layout and
                // the destination length at enqueue.
                unsafe {
                    backend.read_rect(
                        addr,
                        *dst,
                        [origin[0] * layout.elem_size, origin[1], origin[2]],
                        [0, 0, 0],
                        [region[0] * layout.elem_size, region[1], region[2]],
                        layout.row_pitch,
                        layout.slice_pitch,
                        *dst_row_pitch,
                        *dst_slice_pitch,
                    )
                }
            }
            CommandOp::Run { kernel, geometry } => {
                dispatch_run(&self.device, kernel, geometry)?;
            }
        }
        Ok(())
    }
}
