//! Offline compiler integration.
//!
//! Source-to-artifact compilation is an external concern: an offline
//! toolchain command is invoked per device in a temporary directory, and
//! its output file becomes that device's packed artifact. A non-zero exit
//! is reported as a build failure carrying the captured stderr log, and
//! any artifacts already built for earlier devices are dropped.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use argos_device::Device;

use crate::error::Result;
use crate::program::{DeviceArtifact, Program};

/// Environment variable overriding the offline compiler command.
pub const COMPILER_ENV: &str = "ARGOS_OFFLINE_COMPILER";

/// External offline compiler invocation.
#[derive(Debug, Clone)]
pub struct OfflineCompiler {
    command: PathBuf,
    args: Vec<String>,
}

impl OfflineCompiler {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into(), args: Vec::new() }
    }

    /// Compiler configured from `ARGOS_OFFLINE_COMPILER`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var(COMPILER_ENV).ok().map(Self::new)
    }

    /// Append an extra command-line argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Compile `source` for one device, returning the artifact bytes.
    pub fn build(&self, source: &str, device: &Device) -> Result<Vec<u8>> {
        let fail = |log: String| crate::Error::BuildFailure { device: device.spec().to_string(), log };

        let tmp_dir = tempfile::tempdir().map_err(|e| fail(format!("failed to create temp directory: {e}")))?;
        let src_path = tmp_dir.path().join("program.src");
        let out_path = tmp_dir.path().join("program.bin");

        let mut src_file =
            std::fs::File::create(&src_path).map_err(|e| fail(format!("failed to create source file: {e}")))?;
        src_file.write_all(source.as_bytes()).map_err(|e| fail(format!("failed to write source file: {e}")))?;
        drop(src_file);

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg("-o")
            .arg(&out_path)
            .arg(&src_path)
            .output()
            .map_err(|e| fail(format!("failed to run {}: {e}", self.command.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(stderr.into_owned()));
        }

        let blob =
            std::fs::read(&out_path).map_err(|e| fail(format!("compiler produced no output file: {e}")))?;

        tracing::debug!(
            device.spec = %device.spec(),
            artifact.bytes = blob.len(),
            "offline compilation finished"
        );
        Ok(blob)
    }
}

/// Build a program for every device, rolling back on the first failure.
///
/// The `?` on a failed device build drops the artifacts gathered for the
/// devices before it; no partially built program escapes.
pub fn build_program(
    devices: Vec<Arc<Device>>,
    source: String,
    compiler: &OfflineCompiler,
) -> Result<Arc<Program>> {
    let mut artifacts = Vec::with_capacity(devices.len());
    for device in &devices {
        let blob = compiler.build(&source, device)?;
        artifacts.push(DeviceArtifact::PackedBinary { blob, lowered_text: None });
    }
    Program::from_artifacts(devices, Some(source), artifacts)
}
