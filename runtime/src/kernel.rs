//! Kernels and their bound-argument tables.
//!
//! A [`Kernel`] pairs a name with one [`KernelInstance`] per device its
//! program targets: argument binding is device-instance-specific because a
//! memory object resolves to a different resident address on each device.
//! The [`ArgumentStore`] is the mutable table behind
//! [`Kernel::set_argument`]; it performs no kind-compatibility checking —
//! incompatibilities surface at dispatch, not at bind time.

use std::sync::Arc;

use argos_device::{Device, MemObject};
use parking_lot::Mutex;
use snafu::ensure;

use crate::error::{InvalidArgValueSnafu, InvalidKernelArgIndexSnafu, Result};
use crate::program::Program;
use crate::signature::KernelSignature;

/// One argument value handed to [`Kernel::set_argument`].
#[derive(Debug)]
pub enum KernelArg<'a> {
    /// Raw bytes copied into the store (scalars, samplers, aggregates).
    Bytes(&'a [u8]),
    /// Memory object binding for pointer or image arguments.
    Mem(&'a Arc<MemObject>),
    /// Raw host pointer for a global-pointer argument.
    HostPtr(u64),
    /// Pointer argument with no buffer bound yet (marshals as null).
    NullPointer,
    /// Work-group local allocation of the given byte size.
    Local { size: usize },
}

/// Stored argument value.
#[derive(Debug, Clone)]
pub(crate) enum ArgValue {
    Bytes(Box<[u8]>),
    Mem(Arc<MemObject>),
    HostPtr(u64),
}

/// One slot of the argument table.
#[derive(Debug, Clone, Default)]
pub(crate) struct BoundArgument {
    /// `None` for unbound pointers and for local allocations (which are
    /// size-only).
    pub value: Option<ArgValue>,
    pub size: usize,
}

/// Mutable per-kernel, per-device table of bound arguments.
///
/// Slots `0..argument_count` hold the explicit arguments; the remaining
/// slots are automatic local allocations, pre-populated with their
/// artifact-declared sizes and never writable through `bind`.
#[derive(Debug)]
pub(crate) struct ArgumentStore {
    slots: Vec<BoundArgument>,
    explicit: usize,
}

impl ArgumentStore {
    pub fn new(signature: &KernelSignature) -> Self {
        let mut slots = vec![BoundArgument::default(); signature.argument_count()];
        slots.extend(
            signature.automatic_local_sizes.iter().map(|&size| BoundArgument { value: None, size }),
        );
        Self { slots, explicit: signature.argument_count() }
    }

    /// Overwrite the binding at `index`.
    pub fn bind(&mut self, index: usize, arg: &KernelArg<'_>) -> Result<()> {
        ensure!(index < self.explicit, InvalidKernelArgIndexSnafu { index, count: self.explicit });

        let slot = match arg {
            KernelArg::Bytes(bytes) => {
                ensure!(
                    !bytes.is_empty(),
                    InvalidArgValueSnafu { index, reason: "zero-size value".to_string() }
                );
                BoundArgument { value: Some(ArgValue::Bytes(Box::from(*bytes))), size: bytes.len() }
            }
            KernelArg::Mem(mem) => BoundArgument {
                value: Some(ArgValue::Mem(Arc::clone(mem))),
                size: std::mem::size_of::<u64>(),
            },
            KernelArg::HostPtr(ptr) => {
                BoundArgument { value: Some(ArgValue::HostPtr(*ptr)), size: std::mem::size_of::<u64>() }
            }
            KernelArg::NullPointer => BoundArgument { value: None, size: 0 },
            KernelArg::Local { size } => {
                ensure!(
                    *size > 0,
                    InvalidArgValueSnafu { index, reason: "local allocation of zero bytes".to_string() }
                );
                BoundArgument { value: None, size: *size }
            }
        };

        self.slots[index] = slot;
        Ok(())
    }

    pub fn slot(&self, index: usize) -> &BoundArgument {
        &self.slots[index]
    }
}

/// Per-device half of a kernel: the signature recovered from that device's
/// artifact and the argument table bound against it.
#[derive(Debug)]
pub struct KernelInstance {
    device: Arc<Device>,
    signature: Arc<KernelSignature>,
    pub(crate) arguments: Mutex<ArgumentStore>,
}

impl KernelInstance {
    pub(crate) fn new(device: Arc<Device>, signature: Arc<KernelSignature>) -> Self {
        let arguments = Mutex::new(ArgumentStore::new(&signature));
        Self { device, signature, arguments }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn signature(&self) -> &KernelSignature {
        &self.signature
    }
}

/// A named compute entry point with its bound arguments.
#[derive(Debug)]
pub struct Kernel {
    name: String,
    program: Arc<Program>,
    instances: Vec<KernelInstance>,
}

impl Kernel {
    pub(crate) fn new(name: String, program: Arc<Program>, instances: Vec<KernelInstance>) -> Arc<Self> {
        Arc::new(Self { name, program, instances })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// The per-device instance for a dispatching device, if this kernel
    /// targets it.
    pub fn instance_for(&self, device: &Device) -> Option<&KernelInstance> {
        self.instances.iter().find(|i| i.device.instance() == device.instance())
    }

    /// Bind an argument value at `index` on every device instance.
    ///
    /// Overwrites the prior binding. Kind compatibility against the
    /// signature is deliberately not validated here; a mismatch is
    /// detected when the kernel is dispatched.
    pub fn set_argument(&self, index: usize, arg: KernelArg<'_>) -> Result<()> {
        for instance in &self.instances {
            instance.arguments.lock().bind(index, &arg)?;
        }
        Ok(())
    }
}
