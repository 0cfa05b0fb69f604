//! Programs: per-device compiled artifacts and kernel creation.
//!
//! A [`Program`] pairs the devices it targets with one compiled artifact
//! per device (plus the source it was built from, when still available).
//! [`Program::create_kernel`] runs signature extraction once per device;
//! recovered signatures are deduplicated in a lock-free cache keyed by
//! `(kernel name, device instance)`, so repeated kernel creation does not
//! re-scan artifacts.

use std::sync::Arc;

use argos_device::Device;
use papaya::{Compute, HashMap, Operation};
use snafu::ensure;

use crate::error::{InvalidProgramSnafu, Result};
use crate::extract::{ArtifactIntrospection, NativeModuleIntrospection, PackedBinaryIntrospection};
use crate::kernel::{Kernel, KernelInstance};
use crate::signature::KernelSignature;

/// Compiled, device-specific representation of a program.
#[derive(Debug)]
pub enum DeviceArtifact {
    /// Native shared module with exported descriptor symbols.
    NativeModule(NativeModuleIntrospection),
    /// Packed binary with kernel-entry directives, optionally accompanied
    /// by its lowered listing (the only kind-recovery input for
    /// binary-only programs).
    PackedBinary { blob: Vec<u8>, lowered_text: Option<String> },
}

/// Cache key: (kernel name, device instance).
type SignatureKey = (String, usize);

/// A program targeting one or more devices.
pub struct Program {
    devices: Vec<Arc<Device>>,
    source: Option<String>,
    /// One artifact per device, in device order. `None` until built.
    artifacts: Option<Vec<DeviceArtifact>>,
    /// Extracted-signature dedup cache.
    signatures: HashMap<SignatureKey, Arc<KernelSignature>>,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("devices", &self.devices.len())
            .field("built", &self.artifacts.is_some())
            .finish()
    }
}

impl Program {
    /// Create an unbuilt program from source.
    ///
    /// Kernels cannot be created until artifacts exist.
    pub fn from_source(devices: Vec<Arc<Device>>, source: String) -> Result<Arc<Self>> {
        ensure!(!devices.is_empty(), InvalidProgramSnafu { reason: "program targets no devices" });
        Ok(Arc::new(Self { devices, source: Some(source), artifacts: None, signatures: HashMap::new() }))
    }

    /// Create a built program from per-device artifacts.
    pub fn from_artifacts(
        devices: Vec<Arc<Device>>,
        source: Option<String>,
        artifacts: Vec<DeviceArtifact>,
    ) -> Result<Arc<Self>> {
        ensure!(!devices.is_empty(), InvalidProgramSnafu { reason: "program targets no devices" });
        ensure!(
            artifacts.len() == devices.len(),
            InvalidProgramSnafu {
                reason: format!("{} artifacts for {} devices", artifacts.len(), devices.len())
            }
        );
        Ok(Arc::new(Self { devices, source, artifacts: Some(artifacts), signatures: HashMap::new() }))
    }

    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Create a kernel, extracting its signature on every targeted device.
    ///
    /// Extraction failure on any device aborts creation: a kernel is never
    /// created with a wrong or partial signature set.
    pub fn create_kernel(self: &Arc<Self>, name: &str) -> Result<Arc<Kernel>> {
        ensure!(!self.devices.is_empty(), InvalidProgramSnafu { reason: "program targets no devices" });

        let mut instances = Vec::with_capacity(self.devices.len());
        for (position, device) in self.devices.iter().enumerate() {
            let signature = self.signature(name, position, device)?;
            instances.push(KernelInstance::new(Arc::clone(device), signature));
        }

        tracing::debug!(kernel.name = %name, devices = self.devices.len(), "kernel created");
        Ok(Kernel::new(name.to_string(), Arc::clone(self), instances))
    }

    /// Get or extract the signature of `name` on the device at `position`.
    fn signature(&self, name: &str, position: usize, device: &Arc<Device>) -> Result<Arc<KernelSignature>> {
        let key = (name.to_string(), device.instance());
        let guard = self.signatures.guard();

        // Fast path: signature already extracted.
        if let Some(cached) = self.signatures.get(&key, &guard) {
            return Ok(Arc::clone(cached));
        }

        // Slow path: run the artifact's extraction strategy.
        let artifacts = self.artifacts.as_ref().ok_or_else(|| crate::Error::InvalidProgramExecutable {
            device: device.spec().to_string(),
        })?;
        let extracted = Arc::new(match &artifacts[position] {
            DeviceArtifact::NativeModule(module) => module.extract(name)?,
            DeviceArtifact::PackedBinary { blob, lowered_text } => PackedBinaryIntrospection {
                blob,
                source: self.source.as_deref(),
                lowered: lowered_text.as_deref(),
            }
            .extract(name)?,
        });

        // Atomic insert - if another thread extracted first, use theirs.
        match self.signatures.compute(
            key,
            |entry| match entry {
                Some((_, existing)) => Operation::Abort(Arc::clone(existing)),
                None => Operation::Insert(Arc::clone(&extracted)),
            },
            &guard,
        ) {
            Compute::Inserted(_, signature) => Ok(Arc::clone(signature)),
            Compute::Aborted(signature) => Ok(signature),
            _ => Ok(extracted),
        }
    }
}
