#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::test::support::TestRig;
use crate::toolchain::{OfflineCompiler, build_program};

/// Write an executable shell script standing in for the offline compiler.
fn fake_compiler(dir: &tempfile::TempDir, script: &str) -> PathBuf {
    let path = dir.path().join("fakecc");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "{script}").unwrap();
    drop(file);

    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[test]
fn test_build_invokes_compiler_and_collects_output() {
    let rig = TestRig::with_hosts(1);
    let dir = tempfile::tempdir().unwrap();
    // Invoked as: fakecc -o <out> <src>; copies the source through.
    let compiler = OfflineCompiler::new(fake_compiler(&dir, r#"cp "$3" "$2""#));

    let blob = compiler.build("kernel void tick() {}", &rig.device(0)).unwrap();
    assert_eq!(blob, b"kernel void tick() {}");
}

#[test]
fn test_build_failure_carries_the_log() {
    let rig = TestRig::with_hosts(1);
    let dir = tempfile::tempdir().unwrap();
    let compiler = OfflineCompiler::new(fake_compiler(&dir, r#"echo "no such target" >&2; exit 1"#));

    let result = compiler.build("kernel void tick() {}", &rig.device(0));
    match result {
        Err(crate::Error::BuildFailure { device, log }) => {
            assert_eq!(device, "HOST:0");
            assert!(log.contains("no such target"));
        }
        other => panic!("expected BuildFailure, got {other:?}"),
    }
}

#[test]
fn test_build_failure_when_compiler_is_missing() {
    let rig = TestRig::with_hosts(1);
    let compiler = OfflineCompiler::new("/nonexistent/compiler");

    assert!(matches!(
        compiler.build("kernel void tick() {}", &rig.device(0)),
        Err(crate::Error::BuildFailure { .. })
    ));
}

#[test]
fn test_build_program_rolls_back_on_first_failing_device() {
    let rig = TestRig::with_hosts(2);
    let dir = tempfile::tempdir().unwrap();
    // Fails every invocation; no program (and no partial artifact set)
    // survives.
    let compiler = OfflineCompiler::new(fake_compiler(&dir, "exit 1"));

    let result = build_program(rig.registry.devices(), "kernel void tick() {}".to_string(), &compiler);
    assert!(matches!(result, Err(crate::Error::BuildFailure { .. })));
}

#[test]
fn test_extra_args_are_passed_through() {
    let rig = TestRig::with_hosts(1);
    let dir = tempfile::tempdir().unwrap();
    // Echoes its first argument into the output file.
    let compiler =
        OfflineCompiler::new(fake_compiler(&dir, r#"printf '%s' "$1" > "$3""#)).arg("--fast-math");

    let blob = compiler.build("kernel void tick() {}", &rig.device(0)).unwrap();
    assert_eq!(blob, b"--fast-math");
}
