//! Dispatch engine: argument marshaling and launch submission.
//!
//! Given a kernel instance and a launch geometry, the engine assembles the
//! device-native argument segment per the signature's layout rules,
//! acquires a kernarg region, reserves and publishes a slot in the
//! device's submission ring, and blocks until the device signals
//! completion.
//!
//! Failures before submission are local and recoverable (returned as
//! errors, nothing launched). Once the packet is published, failures are
//! fatal: device-side effects on shared buffers may already be visible, so
//! the process aborts rather than pretending to unwind.

use argos_device::{Device, LaunchPacket};
use snafu::ensure;

use crate::error::{InvalidKernelArgsSnafu, InvalidValueSnafu, Result};
use crate::kernel::{ArgValue, ArgumentStore, Kernel};
use crate::marshal::ArgWriter;
use crate::signature::{ArgumentKind, KernelSignature};

/// Work geometry of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    /// Work dimensionality (1..=3).
    pub work_dim: u32,
    /// Total work items per dimension.
    pub global_size: [usize; 3],
    /// Work-group size per dimension.
    pub local_size: [usize; 3],
}

impl LaunchGeometry {
    /// 1D launch.
    pub fn new_1d(global: usize, local: usize) -> Self {
        Self { work_dim: 1, global_size: [global, 1, 1], local_size: [local, 1, 1] }
    }

    /// 2D launch.
    pub fn new_2d(global: [usize; 2], local: [usize; 2]) -> Self {
        Self { work_dim: 2, global_size: [global[0], global[1], 1], local_size: [local[0], local[1], 1] }
    }

    /// 3D launch.
    pub fn new_3d(global: [usize; 3], local: [usize; 3]) -> Self {
        Self { work_dim: 3, global_size: global, local_size: local }
    }

    pub(crate) fn validate(&self, signature: &KernelSignature) -> Result<()> {
        ensure!(
            (1..=3).contains(&self.work_dim),
            InvalidValueSnafu { reason: format!("work dimensionality {} not in 1..=3", self.work_dim) }
        );
        for dim in 0..self.work_dim as usize {
            ensure!(
                self.global_size[dim] > 0 && self.local_size[dim] > 0,
                InvalidValueSnafu { reason: format!("zero work size in dimension {dim}") }
            );
            ensure!(
                self.global_size[dim] % self.local_size[dim] == 0,
                InvalidValueSnafu {
                    reason: format!(
                        "global size {} not divisible by local size {} in dimension {dim}",
                        self.global_size[dim], self.local_size[dim]
                    )
                }
            );
        }

        let reqd = signature.required_work_group_size;
        if reqd != [0; 3] {
            ensure!(
                self.local_size == reqd,
                InvalidValueSnafu {
                    reason: format!("local size {:?} differs from required work-group size {reqd:?}", self.local_size)
                }
            );
        }
        Ok(())
    }
}

/// Marshaled argument segment plus the local footprint it accumulated.
pub(crate) struct MarshaledArgs {
    pub(crate) segment: Vec<u8>,
    pub(crate) group_segment_size: usize,
}

/// Assemble the argument segment for one dispatch on one device.
///
/// Layout rules per argument kind:
/// - LocalPointer: 8-aligned; the encoded value is the current local-memory
///   offset, and the bound size grows both the offset cursor and the
///   running group-segment total.
/// - GlobalPointer: 8-aligned; null handle when unbound, otherwise the
///   object's resident address on the dispatching device instance (or a
///   verbatim raw host pointer).
/// - Image: 8-aligned opaque 64-bit image handle.
/// - Sampler/Scalar: raw bytes, packed with no forced alignment.
/// - Aggregate: 8-aligned 64-bit handle to the bound copy (indirect ABI).
/// Automatic locals follow the explicit arguments, processed like
/// LocalPointer with artifact-declared sizes.
pub(crate) fn marshal(signature: &KernelSignature, store: &ArgumentStore, device: &Device) -> Result<MarshaledArgs> {
    // The artifact's own argument count must agree with the recovered kind
    // list; disagreement means the signature is wrong and any layout we
    // produce would corrupt the launch.
    assert!(
        signature.declared_arg_count == signature.argument_count(),
        "kernel ABI inconsistency: artifact declares {} arguments, signature recovered {}",
        signature.declared_arg_count,
        signature.argument_count()
    );

    let mut writer = ArgWriter::with_capacity(signature.kernarg_segment_size);
    let mut local_offset = 0u64;
    let mut group_segment_size = signature.group_segment_size;

    for (index, kind) in signature.kinds.iter().enumerate() {
        let slot = store.slot(index);
        match kind {
            ArgumentKind::LocalPointer => {
                ensure!(
                    slot.value.is_none() && slot.size > 0,
                    InvalidKernelArgsSnafu {
                        reason: format!("argument {index} is a local pointer but has no local size bound")
                    }
                );
                writer.align_to(8);
                writer.put_u64(local_offset);
                local_offset += slot.size as u64;
                group_segment_size += slot.size;
            }
            ArgumentKind::GlobalPointer => {
                writer.align_to(8);
                match &slot.value {
                    None => writer.put_u64(0),
                    Some(ArgValue::Mem(mem)) => {
                        let addr = mem.resident_addr(device.instance()).map_err(|e| {
                            crate::Error::InvalidKernelArgs {
                                reason: format!("argument {index}: {e}"),
                            }
                        })?;
                        writer.put_u64(addr);
                    }
                    Some(ArgValue::HostPtr(ptr)) => writer.put_u64(*ptr),
                    Some(ArgValue::Bytes(_)) => {
                        return InvalidKernelArgsSnafu {
                            reason: format!("argument {index} is a global pointer but holds plain bytes"),
                        }
                        .fail();
                    }
                }
            }
            ArgumentKind::Image => {
                writer.align_to(8);
                match &slot.value {
                    Some(ArgValue::Mem(mem)) => {
                        let handle = mem.image_handle(device.instance()).map_err(|e| {
                            crate::Error::InvalidKernelArgs {
                                reason: format!("argument {index}: {e}"),
                            }
                        })?;
                        writer.put_u64(handle);
                    }
                    _ => {
                        return InvalidKernelArgsSnafu {
                            reason: format!("argument {index} is an image but no image object is bound"),
                        }
                        .fail();
                    }
                }
            }
            ArgumentKind::Scalar | ArgumentKind::Sampler => match &slot.value {
                Some(ArgValue::Bytes(bytes)) => writer.put_bytes(bytes),
                _ => {
                    return InvalidKernelArgsSnafu {
                        reason: format!("argument {index} expects a by-value binding"),
                    }
                    .fail();
                }
            },
            ArgumentKind::Aggregate => {
                writer.align_to(8);
                match &slot.value {
                    Some(ArgValue::Bytes(bytes)) => writer.put_u64(bytes.as_ptr() as u64),
                    _ => {
                        return InvalidKernelArgsSnafu {
                            reason: format!("argument {index} expects an aggregate value"),
                        }
                        .fail();
                    }
                }
            }
        }
    }

    // Automatic locals keep their artifact-declared sizes; their store
    // slots stay value-less by construction.
    for index in 0..signature.automatic_local_count() {
        let size = store.slot(signature.argument_count() + index).size;
        writer.align_to(8);
        writer.put_u64(local_offset);
        local_offset += size as u64;
        group_segment_size += size;
    }

    Ok(MarshaledArgs { segment: writer.finish(), group_segment_size })
}

/// Marshal, submit, and await one launch.
pub(crate) fn dispatch_run(device: &Device, kernel: &Kernel, geometry: &LaunchGeometry) -> Result<()> {
    let instance = kernel
        .instance_for(device)
        .ok_or_else(|| crate::Error::InvalidCommandQueue {
            reason: format!("kernel '{}' does not target device {}", kernel.name(), device.spec()),
        })?;
    let signature = instance.signature();
    geometry.validate(signature)?;

    // The store stays locked across the whole dispatch: aggregate arguments
    // are passed by handle into the store's owned bytes, and a concurrent
    // rebind mid-flight would corrupt the launch.
    let store = instance.arguments.lock();
    let marshaled = marshal(signature, &store, device)?;
    let backend = device.backend();

    // Zero-argument kernels still need a (degenerate) kernarg region.
    let region_size = signature.kernarg_segment_size.max(1);
    let kernarg_address = backend
        .kernarg_allocator()
        .alloc(region_size)
        .map_err(|e| crate::Error::OutOfHostMemory { reason: e.to_string() })?;
    if !marshaled.segment.is_empty() {
        // SAFETY: the region was just allocated with at least segment-len
        // bytes (the writer is bounded by the same ABI size).
        unsafe { backend.write(marshaled.segment.as_ptr(), kernarg_address, marshaled.segment.len()) }
    }

    let completion = backend.create_signal(1);
    let packet = LaunchPacket {
        work_dim: geometry.work_dim as u16,
        workgroup_size: geometry.local_size.map(|s| s as u32),
        grid_size: geometry.global_size.map(|s| s as u32),
        group_segment_size: marshaled.group_segment_size as u32,
        private_segment_size: signature.private_segment_size as u32,
        entry_handle: signature.entry_handle,
        kernarg_address,
        completion: completion.clone(),
    };

    let ring = backend.ring();
    let index = match ring.reserve() {
        Ok(index) => index,
        // The device refused the submission; nothing was launched, but the
        // queue is wedged and cannot make progress.
        Err(e) => panic!("device rejected submission: {e}"),
    };
    ring.write(index, packet);
    ring.publish(index);

    tracing::debug!(
        kernel.name = %kernel.name(),
        device.instance = device.instance(),
        ring.index = index,
        kernarg.bytes = marshaled.segment.len(),
        local.bytes = marshaled.group_segment_size,
        "launch submitted"
    );
    backend.doorbell(index);

    let observed = match completion.wait_below(1, 0) {
        Ok(observed) => observed,
        Err(e) => panic!("completion wait failed: {e}"),
    };
    if observed != 0 {
        // Device-side effects may already be visible; this cannot be
        // unwound.
        panic!("kernel '{}' execution failed (signal value {observed})", kernel.name());
    }
    drop(store);

    backend.kernarg_allocator().free(kernarg_address);
    Ok(())
}
