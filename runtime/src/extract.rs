//! Kernel signature recovery.
//!
//! A [`KernelSignature`] is produced for `(artifact, kernel name)` by one of
//! two strategies, selected by what kind of artifact backs the device:
//!
//! * **Native module** ([`native`]) — load the artifact as a shared module
//!   and read well-known descriptor symbols. Structured metadata, tagged
//!   [`SignatureFidelity::Exact`].
//! * **Packed binary** ([`packed`] + [`text`]) — locate the kernel entry
//!   directive by its mangled symbol, then recover argument kinds by
//!   lexical scanning of the kernel source (or, binary-only, of the
//!   lowered listing). Tagged [`SignatureFidelity::BestEffort`].
//!
//! Either strategy fails with an invalid-kernel-name condition rather than
//! ever producing a wrong signature; kernel creation for that device
//! aborts.

pub mod native;
pub mod packed;
pub mod text;

use smallvec::SmallVec;

use crate::error::Result;
use crate::signature::{KernelSignature, SignatureFidelity};

pub use native::NativeModuleIntrospection;
pub use packed::{KernelEntry, PackedArtifactBuilder};

/// Typed introspection over a compiled artifact.
///
/// Dynamic module loading is one pluggable implementation behind this
/// interface; the packed-binary scanner is the other.
pub trait ArtifactIntrospection {
    /// Derive the signature of the named kernel.
    fn extract(&self, kernel_name: &str) -> Result<KernelSignature>;
}

/// Mangled entry symbol derived from a kernel's declared name.
///
/// The offline toolchain emits kernel entry directives under this
/// deterministic scheme.
pub fn mangled_entry_name(kernel_name: &str) -> String {
    format!("&__kernel_{kernel_name}_entry")
}

/// Packed-binary strategy: directive scan plus heuristic kind recovery.
#[derive(Debug)]
pub struct PackedBinaryIntrospection<'a> {
    /// The packed artifact bytes.
    pub blob: &'a [u8],
    /// Kernel source, when the program still carries it.
    pub source: Option<&'a str>,
    /// Lowered listing for binary-only artifacts.
    pub lowered: Option<&'a str>,
}

impl ArtifactIntrospection for PackedBinaryIntrospection<'_> {
    fn extract(&self, kernel_name: &str) -> Result<KernelSignature> {
        let symbol = mangled_entry_name(kernel_name);
        let entry = packed::find_kernel_entry(self.blob, &symbol)?;

        let kinds: SmallVec<_> = match (self.source, self.lowered) {
            (Some(source), _) => text::scan_source(source, kernel_name)?.into_iter().collect(),
            (None, Some(lowered)) => {
                let kinds = text::scan_lowered(lowered, &symbol)?;
                tracing::warn!(
                    kernel.name = %kernel_name,
                    "binary-only kind recovery: local/image/sampler/aggregate arguments classify as scalars"
                );
                kinds.into_iter().collect()
            }
            (None, None) => {
                return crate::error::InvalidKernelNameSnafu {
                    name: kernel_name,
                    reason: "packed artifact has neither source nor lowered listing for kind recovery",
                }
                .fail();
            }
        };

        tracing::debug!(
            kernel.name = %kernel_name,
            kernel.num_args = kinds.len(),
            kernel.declared_args = entry.in_arg_count,
            "signature extracted from packed binary"
        );

        Ok(KernelSignature {
            kinds,
            declared_arg_count: entry.in_arg_count as usize,
            automatic_local_sizes: SmallVec::new(),
            required_work_group_size: [0; 3],
            entry_handle: entry.entry_handle,
            kernarg_segment_size: entry.kernarg_segment_size as usize,
            group_segment_size: entry.group_segment_size as usize,
            private_segment_size: entry.private_segment_size as usize,
            fidelity: SignatureFidelity::BestEffort,
        })
    }
}
