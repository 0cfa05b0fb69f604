//! Accelerator capability surface for the argos dispatch core.
//!
//! This crate models what a device backend supplies and the dispatch layer
//! consumes: memory allocators and reference-counted memory objects with
//! per-device resident addresses, a single-producer submission ring with a
//! doorbell, completion signals, and a lifecycle-scoped device registry.
//!
//! The in-tree [`HostBackend`] is the reference implementation used by the
//! runtime's tests; real accelerators plug in behind [`DeviceBackend`] via
//! registry factories.

pub mod allocator;
pub mod device;
pub mod error;
pub mod memory;
pub mod registry;
pub mod ring;
pub mod signal;

#[cfg(test)]
pub mod test;

pub use allocator::{Allocator, HostAllocator};
pub use device::{Device, DeviceBackend, HostBackend, LaunchHook};
pub use error::{Error, Result};
pub use memory::{ImageLayout, MemObject};
pub use registry::{BackendFactory, DeviceRegistry, DeviceSpec};
pub use ring::{LaunchPacket, SubmissionRing};
pub use signal::CompletionSignal;
