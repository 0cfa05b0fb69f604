//! Lexical argument-kind recovery from kernel text.
//!
//! Two best-effort scanners live here:
//!
//! * [`scan_source`] reads the original kernel source, locating the
//!   parameter list between the kernel's declared name and the first `{`
//!   and classifying each parameter by lexical cues.
//! * [`scan_lowered`] reads the generated low-level listing of a
//!   binary-only artifact. The only recoverable cue there is the 64-bit
//!   kernel-resident address type, so everything else classifies as a
//!   scalar — local/image/sampler/aggregate kinds cannot be recovered on
//!   this path.
//!
//! Both scanners are deterministic over their inputs, so extracting twice
//! from the same text yields the same kind list.

use snafu::OptionExt;

use crate::error::{InvalidKernelNameSnafu, Result};
use crate::signature::ArgumentKind;

/// Type token the lowered listing uses for a 64-bit kernel-resident
/// address.
const LOWERED_ADDRESS_TOKEN: &str = "kernarg_u64";

/// Classify one source-level parameter declaration by lexical cues.
pub fn classify_parameter(param: &str) -> ArgumentKind {
    if param.contains("local") {
        ArgumentKind::LocalPointer
    } else if param.contains("image") {
        ArgumentKind::Image
    } else if param.contains("sampler_t") {
        ArgumentKind::Sampler
    } else if param.contains("struct") {
        ArgumentKind::Aggregate
    } else if param.contains('*') || param.contains('[') {
        ArgumentKind::GlobalPointer
    } else {
        ArgumentKind::Scalar
    }
}

/// Recover argument kinds from kernel source text.
///
/// Fails with an invalid-kernel-name condition when no parameter list can
/// be located for `kernel_name`.
pub fn scan_source(source: &str, kernel_name: &str) -> Result<Vec<ArgumentKind>> {
    let after_kernel = source
        .find("kernel")
        .map(|at| &source[at..])
        .context(InvalidKernelNameSnafu { name: kernel_name, reason: "no kernel declaration in source" })?;
    let after_void = after_kernel
        .find("void")
        .map(|at| &after_kernel[at..])
        .context(InvalidKernelNameSnafu { name: kernel_name, reason: "no kernel declaration in source" })?;

    let params = parameter_text(after_void, kernel_name)?;
    Ok(split_top_level(params).iter().map(|p| classify_parameter(p)).collect())
}

/// Recover argument kinds from a binary-only artifact's lowered listing.
///
/// Only the kernel-resident address token classifies as a global pointer;
/// every other parameter falls back to scalar.
pub fn scan_lowered(lowered: &str, mangled_symbol: &str) -> Result<Vec<ArgumentKind>> {
    let after_kernel = lowered
        .find("kernel")
        .map(|at| &lowered[at..])
        .context(InvalidKernelNameSnafu { name: mangled_symbol, reason: "no kernel entry in lowered listing" })?;

    let params = parameter_text(after_kernel, mangled_symbol)?;
    Ok(split_top_level(params)
        .iter()
        .map(|p| {
            if p.contains(LOWERED_ADDRESS_TOKEN) { ArgumentKind::GlobalPointer } else { ArgumentKind::Scalar }
        })
        .collect())
}

/// Find the text between the kernel name and the first `{`.
///
/// Another identifier may share the kernel name as a prefix
/// (`sum` vs `sum_rows`); such matches are skipped by re-searching until
/// the matched name is followed by the parameter-list opener (possibly
/// after whitespace), otherwise argument boundaries would be corrupted.
fn parameter_text<'a>(text: &'a str, name: &str) -> Result<&'a str> {
    let mut rest = text;
    loop {
        let at = rest
            .find(name)
            .context(InvalidKernelNameSnafu { name, reason: "kernel name not found before a parameter list" })?;
        let after = &rest[at + name.len()..];

        match after.chars().next() {
            Some(c) if c == '(' || c.is_whitespace() => {
                let body = after.split('{').next().unwrap_or(after);
                return Ok(body);
            }
            Some(_) => rest = after,
            None => {
                return InvalidKernelNameSnafu { name, reason: "kernel name not found before a parameter list" }
                    .fail();
            }
        }
    }
}

/// Split a parameter-list body on top-level commas.
///
/// The body still carries the surrounding parentheses; nested `(`/`[`
/// groups (function-pointer types, array extents) do not break parameters
/// apart. An empty list yields no parameters.
fn split_top_level(body: &str) -> Vec<&str> {
    let open = match body.find('(') {
        Some(at) => at + 1,
        None => return Vec::new(),
    };
    let close = body.rfind(')').unwrap_or(body.len());
    if close <= open {
        return Vec::new();
    }

    let inner = &body[open..close];
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (at, c) in inner.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                params.push(&inner[start..at]);
                start = at + 1;
            }
            _ => {}
        }
    }
    params.push(&inner[start..]);
    params
}
