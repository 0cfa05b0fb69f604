//! Packed binary artifact: kernel-entry directive records.
//!
//! A packed artifact carries a data section (length-prefixed names) and a
//! code section (byte-count-prefixed records). Kernel entry points appear
//! as directive records holding the declared input-argument count, the
//! native entry handle, and the segment sizes of one invocation. Records
//! are walked front to back; the directive whose name matches the mangled
//! kernel symbol wins.
//!
//! All fields are little-endian. Layout:
//!
//! ```text
//! header:     magic[4] data_off:u32 data_len:u32 code_off:u32 code_len:u32
//! data entry: len:u32 bytes[len]
//! record:     byte_count:u16 kind:u16 payload[byte_count - 4]
//! kernel dir: name_off:u32 in_args:u16 out_args:u16 entry:u64
//!             kernarg_size:u32 group_size:u32 private_size:u32
//! ```

use snafu::ensure;

use crate::error::{InvalidKernelNameSnafu, MalformedArtifactSnafu, Result};

const MAGIC: &[u8; 4] = b"APKB";

/// Record kind tag of a kernel entry directive.
pub const KERNEL_DIRECTIVE: u16 = 0x1008;

/// Encoded size of a kernel entry directive record.
const KERNEL_DIRECTIVE_SIZE: usize = 2 + 2 + 4 + 2 + 2 + 8 + 4 + 4 + 4;

/// Decoded kernel entry directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelEntry {
    /// Input-argument count the artifact declares.
    pub in_arg_count: u16,
    /// Output-argument count (unused by dispatch, kept for the walk).
    pub out_arg_count: u16,
    /// Native entry point handle.
    pub entry_handle: u64,
    /// Argument-segment byte size of one invocation.
    pub kernarg_segment_size: u32,
    /// Fixed group-local memory usage.
    pub group_segment_size: u32,
    /// Per-work-item private memory usage.
    pub private_segment_size: u32,
}

/// Byte cursor over a section slice.
struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        ensure!(
            self.at + len <= self.bytes.len(),
            MalformedArtifactSnafu { reason: format!("truncated at byte {}", self.at) }
        );
        let slice = &self.bytes[self.at..self.at + len];
        self.at += len;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

fn sections(blob: &[u8]) -> Result<(&[u8], &[u8])> {
    let mut header = Reader::new(blob);
    let magic = header.take(4)?;
    ensure!(magic == MAGIC, MalformedArtifactSnafu { reason: "bad magic".to_string() });

    let data_off = header.u32()? as usize;
    let data_len = header.u32()? as usize;
    let code_off = header.u32()? as usize;
    let code_len = header.u32()? as usize;

    ensure!(
        data_off + data_len <= blob.len() && code_off + code_len <= blob.len(),
        MalformedArtifactSnafu { reason: "section bounds exceed artifact".to_string() }
    );
    Ok((&blob[data_off..data_off + data_len], &blob[code_off..code_off + code_len]))
}

fn name_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    let mut reader = Reader { bytes: data, at: offset };
    let len = reader.u32()? as usize;
    reader.take(len)
}

/// Find the kernel entry directive whose name matches `mangled_symbol`.
///
/// The comparison is a prefix match over the stored name (stored names may
/// carry trailing decoration). No matching directive is an
/// invalid-kernel-name condition: kernel creation for this device must
/// abort rather than proceed with a wrong signature.
pub fn find_kernel_entry(blob: &[u8], mangled_symbol: &str) -> Result<KernelEntry> {
    let (data, code) = sections(blob)?;

    let mut reader = Reader::new(code);
    while reader.at < code.len() {
        let record_start = reader.at;
        let byte_count = reader.u16()? as usize;
        ensure!(
            byte_count >= 4 && record_start + byte_count <= code.len(),
            MalformedArtifactSnafu { reason: format!("bad record size {byte_count} at byte {record_start}") }
        );
        let kind = reader.u16()?;

        if kind == KERNEL_DIRECTIVE {
            ensure!(
                byte_count >= KERNEL_DIRECTIVE_SIZE,
                MalformedArtifactSnafu { reason: format!("short kernel directive at byte {record_start}") }
            );
            let name_off = reader.u32()? as usize;
            let entry = KernelEntry {
                in_arg_count: reader.u16()?,
                out_arg_count: reader.u16()?,
                entry_handle: reader.u64()?,
                kernarg_segment_size: reader.u32()?,
                group_segment_size: reader.u32()?,
                private_segment_size: reader.u32()?,
            };
            if name_at(data, name_off)?.starts_with(mangled_symbol.as_bytes()) {
                return Ok(entry);
            }
        }

        reader.at = record_start + byte_count;
    }

    InvalidKernelNameSnafu { name: mangled_symbol, reason: "no matching kernel entry directive" }.fail()
}

/// Builds packed artifacts the way the offline toolchain lays them out.
///
/// Primarily a test and tooling aid; the real blobs come from the external
/// finalizer.
#[derive(Debug, Default)]
pub struct PackedArtifactBuilder {
    data: Vec<u8>,
    code: Vec<u8>,
}

impl PackedArtifactBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a kernel entry directive named `mangled_symbol`.
    pub fn kernel_entry(mut self, mangled_symbol: &str, entry: KernelEntry) -> Self {
        let name_off = self.data.len() as u32;
        self.data.extend_from_slice(&(mangled_symbol.len() as u32).to_le_bytes());
        self.data.extend_from_slice(mangled_symbol.as_bytes());

        let byte_count = KERNEL_DIRECTIVE_SIZE as u16;
        self.code.extend_from_slice(&byte_count.to_le_bytes());
        self.code.extend_from_slice(&KERNEL_DIRECTIVE.to_le_bytes());
        self.code.extend_from_slice(&name_off.to_le_bytes());
        self.code.extend_from_slice(&entry.in_arg_count.to_le_bytes());
        self.code.extend_from_slice(&entry.out_arg_count.to_le_bytes());
        self.code.extend_from_slice(&entry.entry_handle.to_le_bytes());
        self.code.extend_from_slice(&entry.kernarg_segment_size.to_le_bytes());
        self.code.extend_from_slice(&entry.group_segment_size.to_le_bytes());
        self.code.extend_from_slice(&entry.private_segment_size.to_le_bytes());
        self
    }

    /// Append a non-kernel record (exercises the directive walk).
    pub fn other_record(mut self, kind: u16, payload: &[u8]) -> Self {
        let byte_count = (4 + payload.len()) as u16;
        self.code.extend_from_slice(&byte_count.to_le_bytes());
        self.code.extend_from_slice(&kind.to_le_bytes());
        self.code.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header_len = 4 + 4 * 4;
        let data_off = header_len as u32;
        let code_off = data_off + self.data.len() as u32;

        let mut blob = Vec::with_capacity(header_len + self.data.len() + self.code.len());
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&data_off.to_le_bytes());
        blob.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        blob.extend_from_slice(&code_off.to_le_bytes());
        blob.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        blob.extend_from_slice(&self.data);
        blob.extend_from_slice(&self.code);
        blob
    }
}
