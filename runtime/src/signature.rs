//! Recovered kernel metadata.
//!
//! A [`KernelSignature`] is derived once per kernel per device from the
//! compiled artifact and is immutable afterwards. It describes how many
//! arguments the kernel takes, what kind each is, the sizes of
//! compiler-introduced automatic local buffers, and the native entry point
//! plus argument-segment ABI size the artifact reports.

use smallvec::SmallVec;

/// Classification of one kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// Plain value copied into the argument segment verbatim.
    Scalar,
    /// Pointer into device-global memory (a memory object or raw host
    /// pointer).
    GlobalPointer,
    /// Work-group local allocation, sized per dispatch; the marshaled value
    /// is an offset into the local segment, not a data pointer.
    LocalPointer,
    /// Opaque 64-bit image handle.
    Image,
    /// Sampler state, copied by value like a scalar.
    Sampler,
    /// Struct argument passed indirectly (the device ABI takes a handle to
    /// the bound copy).
    Aggregate,
}

/// How trustworthy the recovered kind list is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFidelity {
    /// Kinds come from structured artifact metadata (native symbol tables).
    Exact,
    /// Kinds come from lexical heuristics over kernel text. Binary-only
    /// artifacts in particular cannot recover local/image/sampler/aggregate
    /// kinds and under-classify them as scalars.
    BestEffort,
}

/// Per-kernel, per-device argument and sizing metadata.
///
/// Immutable after extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSignature {
    /// Argument kinds in declaration order.
    pub kinds: SmallVec<[ArgumentKind; 8]>,
    /// Input-argument count the artifact itself declares. Re-checked at
    /// dispatch against `kinds`; disagreement is a fatal ABI inconsistency,
    /// never a silent truncation.
    pub declared_arg_count: usize,
    /// Sizes of automatic local buffers, appended after the explicit
    /// arguments at dispatch.
    pub automatic_local_sizes: SmallVec<[usize; 4]>,
    /// Required work-group size; all zeros means unconstrained.
    pub required_work_group_size: [usize; 3],
    /// Native entry point handle.
    pub entry_handle: u64,
    /// Byte size of one invocation's argument segment.
    pub kernarg_segment_size: usize,
    /// Fixed group-local memory usage already known to the artifact; seeds
    /// the per-dispatch local segment total.
    pub group_segment_size: usize,
    /// Per-work-item private memory usage.
    pub private_segment_size: usize,
    /// Provenance of the kind list.
    pub fidelity: SignatureFidelity,
}

impl KernelSignature {
    /// Number of explicit (user-bound) arguments.
    pub fn argument_count(&self) -> usize {
        self.kinds.len()
    }

    /// Number of automatic local allocations.
    pub fn automatic_local_count(&self) -> usize {
        self.automatic_local_sizes.len()
    }

    /// Total slot count of the argument store backing this signature.
    pub fn slot_count(&self) -> usize {
        self.argument_count() + self.automatic_local_count()
    }

    /// Kind of the explicit argument at `index`.
    pub fn kind(&self, index: usize) -> Option<ArgumentKind> {
        self.kinds.get(index).copied()
    }
}
