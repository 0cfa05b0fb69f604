use test_case::test_case;

use crate::extract::text::{classify_parameter, scan_lowered, scan_source};
use crate::signature::ArgumentKind;

#[test_case("global float* data", ArgumentKind::GlobalPointer; "pointer star")]
#[test_case("global float data[16]", ArgumentKind::GlobalPointer; "pointer brackets")]
#[test_case("local int* scratch", ArgumentKind::LocalPointer; "local pointer")]
#[test_case("read_only image2d_t src", ArgumentKind::Image; "image")]
#[test_case("sampler_t smp", ArgumentKind::Sampler; "sampler")]
#[test_case("struct params p", ArgumentKind::Aggregate; "aggregate")]
#[test_case("int n", ArgumentKind::Scalar; "scalar int")]
#[test_case("float alpha", ArgumentKind::Scalar; "scalar float")]
fn test_classify_parameter(param: &str, expected: ArgumentKind) {
    assert_eq!(classify_parameter(param), expected);
}

#[test]
fn test_scan_source_basic() {
    let source = r#"
kernel void scale(global int* data, int n, local int* tmp) {
    // body
}
"#;
    let kinds = scan_source(source, "scale").unwrap();
    assert_eq!(kinds, vec![ArgumentKind::GlobalPointer, ArgumentKind::Scalar, ArgumentKind::LocalPointer]);
}

#[test]
fn test_scan_source_no_arguments() {
    let source = "kernel void tick() {}";
    assert!(scan_source(source, "tick").unwrap().is_empty());

    let spaced = "kernel void tick( ) {}";
    assert!(scan_source(spaced, "tick").unwrap().is_empty());
}

#[test]
fn test_scan_source_skips_prefix_matches() {
    // `sum_rows` shares `sum` as a prefix; the scan must advance past it
    // and recover `sum`'s own parameter list.
    let source = r#"
kernel void sum_rows(global float* m, global float* out, local float* acc) {}
kernel void sum(global float* v, int n) {}
"#;
    let kinds = scan_source(source, "sum").unwrap();
    assert_eq!(kinds, vec![ArgumentKind::GlobalPointer, ArgumentKind::Scalar]);
}

#[test]
fn test_scan_source_whitespace_before_opener() {
    let source = "kernel void blur (global uchar* img, float sigma) {}";
    let kinds = scan_source(source, "blur").unwrap();
    assert_eq!(kinds, vec![ArgumentKind::GlobalPointer, ArgumentKind::Scalar]);
}

#[test]
fn test_scan_source_is_idempotent() {
    let source = r#"
kernel void mix(global float* a, global float* b, struct blend cfg, float t) {}
"#;
    let first = scan_source(source, "mix").unwrap();
    let second = scan_source(source, "mix").unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_scan_source_unknown_kernel() {
    let source = "kernel void real(global int* x) {}";
    assert!(matches!(
        scan_source(source, "imagined"),
        Err(crate::Error::InvalidKernelName { .. })
    ));
}

#[test]
fn test_scan_source_without_kernel_declaration() {
    assert!(matches!(
        scan_source("int main() { return 0; }", "main"),
        Err(crate::Error::InvalidKernelName { .. })
    ));
}

#[test]
fn test_scan_lowered_recovers_pointers_only() {
    // Binary-only recovery: the resident-address token maps to a global
    // pointer, everything else degrades to a scalar.
    let lowered = r#"
kernel &__kernel_add_entry(kernarg_u64 %a, kernarg_u64 %b, u32 %n) {
    ret;
}
"#;
    let kinds = scan_lowered(lowered, "&__kernel_add_entry").unwrap();
    assert_eq!(kinds, vec![ArgumentKind::GlobalPointer, ArgumentKind::GlobalPointer, ArgumentKind::Scalar]);
}

#[test]
fn test_scan_lowered_unknown_symbol() {
    let lowered = "kernel &__kernel_add_entry(kernarg_u64 %a) {}";
    assert!(matches!(
        scan_lowered(lowered, "&__kernel_sub_entry"),
        Err(crate::Error::InvalidKernelName { .. })
    ));
}
