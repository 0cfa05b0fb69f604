//! Native-module introspection.
//!
//! Some devices receive their kernels as native shared modules. The offline
//! toolchain exports a descriptor alongside each kernel as a set of
//! well-known symbols:
//!
//! | symbol            | contents                                  |
//! |-------------------|-------------------------------------------|
//! | `_num_args`       | `u32` explicit argument count             |
//! | `_arg_is_pointer` | `i32` flag per argument                   |
//! | `_arg_is_local`   | `i32` flag per argument                   |
//! | `_arg_is_image`   | `i32` flag per argument                   |
//! | `_arg_is_sampler` | `i32` flag per argument                   |
//! | `_reqd_wg_size`   | `[i32; 3]` required work-group size       |
//! | `_num_locals`     | `u32` automatic local count               |
//! | `_local_sizes`    | `u32` size per automatic local            |
//! | `_kernarg_size`   | `u64` argument-segment byte size          |
//!
//! The entry handle is the address of the exported symbol named after the
//! kernel. The module stays loaded for as long as the introspection value
//! lives, keeping that address valid.

use std::path::{Path, PathBuf};

use libloading::Library;
use smallvec::SmallVec;

use crate::error::Result;
use crate::extract::ArtifactIntrospection;
use crate::signature::{ArgumentKind, KernelSignature, SignatureFidelity};

/// Introspection over a loaded native shared module.
pub struct NativeModuleIntrospection {
    /// Keeps the module mapped (entry handles point into it).
    lib: Library,
    path: PathBuf,
}

impl std::fmt::Debug for NativeModuleIntrospection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModuleIntrospection").field("path", &self.path).finish()
    }
}

impl NativeModuleIntrospection {
    /// Load the artifact as a native shared module.
    ///
    /// A module that cannot be loaded cannot name any kernel, so the
    /// failure surfaces as an invalid-kernel-name condition.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // SAFETY: the artifact is a descriptor module produced by the
        // offline toolchain; loading runs no untrusted initialization
        // beyond the platform loader.
        let lib = unsafe { Library::new(&path) }.map_err(|e| crate::Error::InvalidKernelName {
            name: path.display().to_string(),
            reason: format!("module load failed: {e}"),
        })?;
        Ok(Self { lib, path })
    }

    fn scalar<T: Copy>(&self, symbol: &[u8], kernel: &str) -> Result<T> {
        // SAFETY: the symbol is a data export of the descriptor module.
        unsafe {
            let sym = self.lib.get::<*const T>(symbol).map_err(|e| missing(kernel, symbol, e))?;
            Ok(**sym)
        }
    }

    fn array<T: Copy>(&self, symbol: &[u8], len: usize, kernel: &str) -> Result<Vec<T>> {
        // SAFETY: the descriptor module exports `len` elements under this
        // symbol; the slice is copied out before the lookup ends.
        unsafe {
            let sym = self.lib.get::<*const T>(symbol).map_err(|e| missing(kernel, symbol, e))?;
            Ok(std::slice::from_raw_parts(*sym, len).to_vec())
        }
    }
}

fn missing(kernel: &str, symbol: &[u8], e: libloading::Error) -> crate::Error {
    crate::Error::InvalidKernelName {
        name: kernel.to_string(),
        reason: format!("descriptor symbol {} missing: {e}", String::from_utf8_lossy(symbol)),
    }
}

impl ArtifactIntrospection for NativeModuleIntrospection {
    fn extract(&self, kernel_name: &str) -> Result<KernelSignature> {
        let num_args = self.scalar::<u32>(b"_num_args", kernel_name)? as usize;

        let is_pointer = self.array::<i32>(b"_arg_is_pointer", num_args, kernel_name)?;
        let is_local = self.array::<i32>(b"_arg_is_local", num_args, kernel_name)?;
        let is_image = self.array::<i32>(b"_arg_is_image", num_args, kernel_name)?;
        let is_sampler = self.array::<i32>(b"_arg_is_sampler", num_args, kernel_name)?;

        let kinds: SmallVec<[ArgumentKind; 8]> = (0..num_args)
            .map(|i| {
                if is_local[i] != 0 {
                    ArgumentKind::LocalPointer
                } else if is_image[i] != 0 {
                    ArgumentKind::Image
                } else if is_sampler[i] != 0 {
                    ArgumentKind::Sampler
                } else if is_pointer[i] != 0 {
                    ArgumentKind::GlobalPointer
                } else {
                    ArgumentKind::Scalar
                }
            })
            .collect();

        let reqd = self.array::<i32>(b"_reqd_wg_size", 3, kernel_name)?;
        let num_locals = self.scalar::<u32>(b"_num_locals", kernel_name)? as usize;
        let local_sizes = self.array::<u32>(b"_local_sizes", num_locals, kernel_name)?;
        let kernarg_size = self.scalar::<u64>(b"_kernarg_size", kernel_name)?;

        // SAFETY: resolving the kernel's own export; only the address is
        // taken.
        let entry_handle = unsafe {
            let sym = self
                .lib
                .get::<unsafe extern "C" fn()>(kernel_name.as_bytes())
                .map_err(|e| missing(kernel_name, kernel_name.as_bytes(), e))?;
            *sym as usize as u64
        };

        tracing::debug!(
            kernel.name = %kernel_name,
            kernel.num_args = num_args,
            kernel.num_locals = num_locals,
            module = %self.path.display(),
            "signature extracted from native module"
        );

        Ok(KernelSignature {
            declared_arg_count: kinds.len(),
            kinds,
            automatic_local_sizes: local_sizes.iter().map(|&s| s as usize).collect(),
            required_work_group_size: [reqd[0].max(0) as usize, reqd[1].max(0) as usize, reqd[2].max(0) as usize],
            entry_handle,
            kernarg_segment_size: kernarg_size as usize,
            group_segment_size: 0,
            private_segment_size: 0,
            fidelity: SignatureFidelity::Exact,
        })
    }
}
