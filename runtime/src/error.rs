//! Error types for the dispatch core.
//!
//! These cover the local/recoverable class and the build/toolchain class of
//! the error taxonomy. The fatal class (out-of-order enqueue, marshaling
//! ABI mismatch, post-submission device failure) intentionally does not
//! appear here: those conditions abort instead of returning, because
//! partial device-side effects cannot be safely unwound.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Program handle is unusable (no devices, inconsistent artifacts).
    #[snafu(display("invalid program: {reason}"))]
    InvalidProgram { reason: String },

    /// Program carries no executable artifact for a targeted device.
    #[snafu(display("program has no executable artifact for device {device}"))]
    InvalidProgramExecutable { device: String },

    /// No kernel with this name could be recovered from the artifact.
    #[snafu(display("invalid kernel name '{name}': {reason}"))]
    InvalidKernelName { name: String, reason: String },

    /// Artifact bytes do not parse as a packed binary.
    #[snafu(display("malformed artifact: {reason}"))]
    MalformedArtifact { reason: String },

    /// Argument index outside the kernel's declared argument range.
    #[snafu(display("kernel argument index {index} out of range (kernel has {count} arguments)"))]
    InvalidKernelArgIndex { index: usize, count: usize },

    /// Argument value violates the binding rules (zero-size scalar, ...).
    #[snafu(display("invalid value for kernel argument {index}: {reason}"))]
    InvalidArgValue { index: usize, reason: String },

    /// Bound arguments are incompatible with the kernel signature,
    /// discovered while marshaling.
    #[snafu(display("invalid kernel arguments: {reason}"))]
    InvalidKernelArgs { reason: String },

    /// Command queue cannot serve this request.
    #[snafu(display("invalid command queue: {reason}"))]
    InvalidCommandQueue { reason: String },

    /// Operand validation failure (bounds, pattern sizes, geometry).
    #[snafu(display("invalid value: {reason}"))]
    InvalidValue { reason: String },

    /// Operation applied to the wrong class of memory object.
    #[snafu(display("invalid memory object: {reason}"))]
    InvalidMemObject { reason: String },

    /// The offline compiler returned a non-zero status.
    #[snafu(display("build failed for device {device}:\n{log}"))]
    BuildFailure { device: String, log: String },

    /// Host-side allocation for the dispatch failed.
    #[snafu(display("out of host memory: {reason}"))]
    OutOfHostMemory { reason: String },

    /// Error reported by the device capability surface.
    #[snafu(display("device error: {source}"))]
    Device { source: argos_device::Error },
}
