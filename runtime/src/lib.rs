//! Dispatch core of the argos heterogeneous compute runtime.
//!
//! Turns a compiled kernel plus dynamically-typed, user-bound arguments
//! into a device-native invocation, and sequences such invocations (and
//! data-movement commands) through ordered per-device command queues with
//! asynchronous completion tracking.
//!
//! The three pillars:
//!
//! - **Signature recovery** (`extract`): how many arguments a kernel takes
//!   and what kind each is, read from a native symbol table or scanned out
//!   of a packed binary and its kernel text.
//! - **Argument marshaling** (`dispatch` + `marshal`): packing
//!   heterogeneous, variably-aligned values into the artifact's argument
//!   segment, accumulating the local-memory footprint along the way.
//! - **Ordered dispatch** (`queue` + `event`): in-order command queues over
//!   a single-producer submission ring, with a monotonic event state
//!   machine per command.
//!
//! Device capabilities (memory, ring, signals) come from
//! [`argos_device`] and are consumed, never reimplemented, here.

pub mod dispatch;
pub mod error;
pub mod event;
pub mod extract;
pub mod kernel;
mod marshal;
pub mod program;
pub mod queue;
pub mod signature;
pub mod toolchain;

#[cfg(test)]
pub mod test;

pub use dispatch::LaunchGeometry;
pub use error::{Error, Result};
pub use event::{CommandKind, CommandStatus, Event, ProfilingTimes};
pub use extract::{
    ArtifactIntrospection, KernelEntry, NativeModuleIntrospection, PackedArtifactBuilder,
    PackedBinaryIntrospection, mangled_entry_name,
};
pub use kernel::{Kernel, KernelArg, KernelInstance};
pub use program::{DeviceArtifact, Program};
pub use queue::{CommandQueue, ExecutionOrder, QueueProperties};
pub use signature::{ArgumentKind, KernelSignature, SignatureFidelity};
pub use toolchain::{COMPILER_ENV, OfflineCompiler, build_program};
