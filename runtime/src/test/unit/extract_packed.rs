use crate::extract::packed::{KernelEntry, PackedArtifactBuilder, find_kernel_entry};
use crate::extract::{ArtifactIntrospection, PackedBinaryIntrospection, mangled_entry_name};
use crate::signature::{ArgumentKind, SignatureFidelity};

fn sample_entry() -> KernelEntry {
    KernelEntry {
        in_arg_count: 3,
        out_arg_count: 0,
        entry_handle: 0xDEAD_BEEF,
        kernarg_segment_size: 24,
        group_segment_size: 128,
        private_segment_size: 64,
    }
}

#[test]
fn test_directive_roundtrip() {
    let symbol = mangled_entry_name("scale");
    let blob = PackedArtifactBuilder::new().kernel_entry(&symbol, sample_entry()).build();

    let entry = find_kernel_entry(&blob, &symbol).unwrap();
    assert_eq!(entry, sample_entry());
}

#[test]
fn test_walk_skips_other_records() {
    let symbol = mangled_entry_name("scale");
    let blob = PackedArtifactBuilder::new()
        .other_record(0x2001, &[0xAA; 12])
        .kernel_entry(&mangled_entry_name("other"), KernelEntry { in_arg_count: 1, ..sample_entry() })
        .other_record(0x2002, &[])
        .kernel_entry(&symbol, sample_entry())
        .build();

    let entry = find_kernel_entry(&blob, &symbol).unwrap();
    assert_eq!(entry.in_arg_count, 3);
}

#[test]
fn test_missing_directive_is_invalid_kernel_name() {
    let blob = PackedArtifactBuilder::new().kernel_entry(&mangled_entry_name("real"), sample_entry()).build();

    assert!(matches!(
        find_kernel_entry(&blob, &mangled_entry_name("imagined")),
        Err(crate::Error::InvalidKernelName { .. })
    ));
}

#[test]
fn test_malformed_artifacts_are_rejected() {
    assert!(matches!(find_kernel_entry(b"not an artifact", "&x"), Err(crate::Error::MalformedArtifact { .. })));

    let mut truncated = PackedArtifactBuilder::new().kernel_entry("&__kernel_a_entry", sample_entry()).build();
    truncated.truncate(truncated.len() - 8);
    assert!(matches!(
        find_kernel_entry(&truncated, "&__kernel_a_entry"),
        Err(crate::Error::MalformedArtifact { .. })
    ));
}

#[test]
fn test_extract_with_source_classifies_kinds() {
    let source = "kernel void scale(global int* data, int n, local int* tmp) {}";
    let blob = PackedArtifactBuilder::new().kernel_entry(&mangled_entry_name("scale"), sample_entry()).build();

    let introspection = PackedBinaryIntrospection { blob: &blob, source: Some(source), lowered: None };
    let signature = introspection.extract("scale").unwrap();

    assert_eq!(
        signature.kinds.as_slice(),
        &[ArgumentKind::GlobalPointer, ArgumentKind::Scalar, ArgumentKind::LocalPointer]
    );
    assert_eq!(signature.declared_arg_count, 3);
    assert_eq!(signature.entry_handle, 0xDEAD_BEEF);
    assert_eq!(signature.kernarg_segment_size, 24);
    assert_eq!(signature.group_segment_size, 128);
    assert_eq!(signature.fidelity, SignatureFidelity::BestEffort);
    assert_eq!(signature.automatic_local_count(), 0);
    assert_eq!(signature.required_work_group_size, [0; 3]);
}

#[test]
fn test_extract_binary_only_underclassifies() {
    // Without source, only the lowered listing is available: the local
    // argument degrades to a scalar. This is the documented limitation of
    // the binary-only path.
    let symbol = mangled_entry_name("scale");
    let lowered = format!("kernel {symbol}(kernarg_u64 %data, u32 %n, u32 %tmp) {{}}");
    let blob = PackedArtifactBuilder::new().kernel_entry(&symbol, sample_entry()).build();

    let introspection = PackedBinaryIntrospection { blob: &blob, source: None, lowered: Some(&lowered) };
    let signature = introspection.extract("scale").unwrap();

    assert_eq!(
        signature.kinds.as_slice(),
        &[ArgumentKind::GlobalPointer, ArgumentKind::Scalar, ArgumentKind::Scalar]
    );
    assert_eq!(signature.fidelity, SignatureFidelity::BestEffort);
}

#[test]
fn test_extract_without_any_kind_input_fails() {
    let blob = PackedArtifactBuilder::new().kernel_entry(&mangled_entry_name("scale"), sample_entry()).build();

    let introspection = PackedBinaryIntrospection { blob: &blob, source: None, lowered: None };
    assert!(matches!(introspection.extract("scale"), Err(crate::Error::InvalidKernelName { .. })));
}
