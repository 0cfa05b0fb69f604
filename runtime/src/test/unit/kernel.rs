use argos_device::MemObject;

use crate::kernel::KernelArg;
use crate::test::support::{TestRig, entry, packed_program};

const SOURCE: &str = "kernel void scale(global int* data, int n, local int* tmp) {}";

#[test]
fn test_create_kernel_builds_per_device_instances() {
    let rig = TestRig::with_hosts(2);
    let program = packed_program(&rig, SOURCE, &[("scale", entry(3, 24))]);

    let kernel = program.create_kernel("scale").unwrap();
    assert_eq!(kernel.name(), "scale");
    for device in rig.registry.devices() {
        let instance = kernel.instance_for(&device).unwrap();
        assert_eq!(instance.signature().argument_count(), 3);
    }
}

#[test]
fn test_create_kernel_unknown_name() {
    let rig = TestRig::with_hosts(1);
    let program = packed_program(&rig, SOURCE, &[("scale", entry(3, 24))]);

    assert!(matches!(program.create_kernel("imagined"), Err(crate::Error::InvalidKernelName { .. })));
}

#[test]
fn test_create_kernel_on_unbuilt_program() {
    let rig = TestRig::with_hosts(1);
    let program =
        crate::Program::from_source(rig.registry.devices(), SOURCE.to_string()).unwrap();

    assert!(matches!(
        program.create_kernel("scale"),
        Err(crate::Error::InvalidProgramExecutable { .. })
    ));
}

#[test]
fn test_program_requires_devices() {
    assert!(matches!(
        crate::Program::from_source(Vec::new(), SOURCE.to_string()),
        Err(crate::Error::InvalidProgram { .. })
    ));
}

#[test]
fn test_set_argument_index_out_of_range() {
    let rig = TestRig::with_hosts(1);
    let program = packed_program(&rig, SOURCE, &[("scale", entry(3, 24))]);
    let kernel = program.create_kernel("scale").unwrap();

    assert!(matches!(
        kernel.set_argument(3, KernelArg::Bytes(&[0; 4])),
        Err(crate::Error::InvalidKernelArgIndex { index: 3, count: 3 })
    ));
}

#[test]
fn test_set_argument_rejects_empty_values() {
    let rig = TestRig::with_hosts(1);
    let program = packed_program(&rig, SOURCE, &[("scale", entry(3, 24))]);
    let kernel = program.create_kernel("scale").unwrap();

    assert!(matches!(
        kernel.set_argument(1, KernelArg::Bytes(&[])),
        Err(crate::Error::InvalidArgValue { index: 1, .. })
    ));
    assert!(matches!(
        kernel.set_argument(2, KernelArg::Local { size: 0 }),
        Err(crate::Error::InvalidArgValue { index: 2, .. })
    ));
}

#[test]
fn test_set_argument_accepts_null_pointer_and_overwrites() {
    let rig = TestRig::with_hosts(1);
    let program = packed_program(&rig, SOURCE, &[("scale", entry(3, 24))]);
    let kernel = program.create_kernel("scale").unwrap();
    let buffer = MemObject::buffer(&rig.registry, 64, None).unwrap();

    // No buffer bound yet: allowed for pointer arguments.
    kernel.set_argument(0, KernelArg::NullPointer).unwrap();
    // Rebinding overwrites the prior value.
    kernel.set_argument(0, KernelArg::Mem(&buffer)).unwrap();
    // Kind mismatches are not validated at bind time.
    kernel.set_argument(0, KernelArg::Bytes(&7i32.to_le_bytes())).unwrap();
}

#[test]
fn test_signature_cache_is_shared_across_kernels() {
    let rig = TestRig::with_hosts(1);
    let program = packed_program(&rig, SOURCE, &[("scale", entry(3, 24))]);

    let first = program.create_kernel("scale").unwrap();
    let second = program.create_kernel("scale").unwrap();

    let device = rig.device(0);
    let a = first.instance_for(&device).unwrap().signature() as *const _;
    let b = second.instance_for(&device).unwrap().signature() as *const _;
    assert_eq!(a, b);
}
