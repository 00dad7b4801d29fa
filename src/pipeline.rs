//! Conversion in both directions.
//!
//! ```text
//! unwrap:  [CR LF] gzip( header(48) || tar.gz )  ->  HeaderRecord + files on disk
//! wrap:    directory  ->  gzip -9( header(48) || tar.gz )
//! ```
//!
//! Each step either completes or aborts the whole operation.  Header
//! findings (wrong magic, size or checksum disagreeing with the payload)
//! are reported as warnings and never abort.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{extract_archive, pack_directory, ExtractedEntry, DEFAULT_ROOT_NAME};
use crate::error::{ContainerError, Result};
use crate::gzip;
use crate::header::{decode_header, encode_header, HeaderRecord, HeaderWarning, HEADER_SIZE};
use crate::report::{error, info, warn, Reporter};

/// Bytes some firmware leaks from the HTTP response ahead of the gzip stream.
pub const LEADING_ARTIFACT: [u8; 2] = [0x0d, 0x0a];

/// Diagnostic file names, written only when a diagnostics directory is set.
pub const HEADER_DUMP_NAME:  &str = "a.header";
pub const PAYLOAD_DUMP_NAME: &str = "b.tar.gz";

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UnwrapOptions {
    /// Extraction root.  Entries land at `dest/<archive path>`.
    pub dest:               PathBuf,
    /// When set, the raw header and raw payload are written here.
    pub diagnostics_dir:    Option<PathBuf>,
    pub strip_leading_crlf: bool,
}

impl Default for UnwrapOptions {
    fn default() -> Self {
        Self {
            dest:               PathBuf::from("."),
            diagnostics_dir:    None,
            strip_leading_crlf: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WrapOptions {
    pub root_name:       String,
    pub inner_level:     u32,
    pub outer_level:     u32,
    /// When set, the generated payload is written here as `b.tar.gz`.
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            root_name:       DEFAULT_ROOT_NAME.to_string(),
            inner_level:     gzip::DEFAULT_LEVEL,
            outer_level:     gzip::BEST_LEVEL,
            diagnostics_dir: None,
        }
    }
}

// ── Results ──────────────────────────────────────────────────────────────────

/// Outer layer removed and header decoded; the payload is still packed.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub header:        HeaderRecord,
    pub warnings:      Vec<HeaderWarning>,
    pub payload:       Vec<u8>,
    pub stripped_crlf: bool,
}

#[derive(Debug, Clone)]
pub struct Unwrapped {
    pub header:   HeaderRecord,
    pub warnings: Vec<HeaderWarning>,
    pub entries:  Vec<ExtractedEntry>,
}

// ── Unwrap ───────────────────────────────────────────────────────────────────

/// Remove the leading CR LF artifact, if present.
pub fn strip_leading_artifact(input: &[u8]) -> (&[u8], bool) {
    match input.strip_prefix(&LEADING_ARTIFACT[..]) {
        Some(rest) => (rest, true),
        None       => (input, false),
    }
}

/// Outer-decompress `input` and decode its header without touching the payload.
pub fn inspect(input: &[u8], reporter: &dyn Reporter) -> Result<Inspection> {
    reported(inspect_with(input, true, reporter), reporter)
}

fn inspect_with(input: &[u8], strip_crlf: bool, reporter: &dyn Reporter) -> Result<Inspection> {
    let (input, stripped_crlf) = if strip_crlf {
        strip_leading_artifact(input)
    } else {
        (input, false)
    };
    if stripped_crlf {
        info(reporter, "Removing \\r\\n at the beginning of the container (firmware defect)");
    }

    info(reporter, "Extracting outer gzip");
    let data = gzip::decompress(input)
        .map_err(|source| ContainerError::OuterDecompression { source })?;
    if data.len() < HEADER_SIZE {
        return Err(ContainerError::TruncatedContainer {
            expected: HEADER_SIZE,
            actual:   data.len(),
        });
    }
    let (header_bytes, payload) = data.split_at(HEADER_SIZE);

    let decoded = decode_header(header_bytes)?;
    let mut warnings = decoded.warnings;
    warnings.extend(decoded.header.validate_payload(payload));

    dump_header(&decoded.header, reporter);
    for w in &warnings {
        warn(reporter, w.to_string());
    }

    Ok(Inspection {
        header: decoded.header,
        warnings,
        payload: payload.to_vec(),
        stripped_crlf,
    })
}

/// Decode a container and extract its inner archive under `opts.dest`.
pub fn unwrap(input: &[u8], opts: &UnwrapOptions, reporter: &dyn Reporter) -> Result<Unwrapped> {
    reported(unwrap_with(input, opts, reporter), reporter)
}

fn unwrap_with(input: &[u8], opts: &UnwrapOptions, reporter: &dyn Reporter) -> Result<Unwrapped> {
    let Inspection { header, warnings, payload, .. } =
        inspect_with(input, opts.strip_leading_crlf, reporter)?;

    if let Some(dir) = &opts.diagnostics_dir {
        write_diagnostic(dir, HEADER_DUMP_NAME, &header.to_bytes())?;
        write_diagnostic(dir, PAYLOAD_DUMP_NAME, &payload)?;
    }

    info(reporter, "Extracting inner tar.gz archive");
    let entries = extract_archive(&payload, &opts.dest)?;
    info(reporter, format!("Extracted {} entries into {}", entries.len(), opts.dest.display()));

    Ok(Unwrapped { header, warnings, entries })
}

// ── Wrap ─────────────────────────────────────────────────────────────────────

/// Build container bytes from the directory tree at `source`.
pub fn wrap(source: &Path, opts: &WrapOptions, reporter: &dyn Reporter) -> Result<Vec<u8>> {
    reported(wrap_with(source, opts, reporter), reporter)
}

fn wrap_with(source: &Path, opts: &WrapOptions, reporter: &dyn Reporter) -> Result<Vec<u8>> {
    info(reporter, format!("Creating tarball of {}", source.display()));
    let payload = pack_directory(source, &opts.root_name, opts.inner_level)?;

    if let Some(dir) = &opts.diagnostics_dir {
        write_diagnostic(dir, PAYLOAD_DUMP_NAME, &payload)?;
    }

    info(reporter, "Generating container header");
    let header = encode_header(&payload);
    dump_header(&header, reporter);

    info(reporter, "Creating outer gzip stream");
    let mut body = Vec::with_capacity(HEADER_SIZE + payload.len());
    body.extend_from_slice(&header.to_bytes());
    body.extend_from_slice(&payload);
    gzip::compress(&body, opts.outer_level)
        .map_err(|e| ContainerError::io("compressing the outer layer", e))
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Hand a failure to the reporter before it reaches the caller.
fn reported<T>(result: Result<T>, reporter: &dyn Reporter) -> Result<T> {
    if let Err(e) = &result {
        error(reporter, e.to_string());
    }
    result
}

fn dump_header(header: &HeaderRecord, reporter: &dyn Reporter) {
    info(reporter, format!("Magic: {}", String::from_utf8_lossy(header.magic_tag())));
    info(reporter, format!("Size of payload (compressed): {}", header.compressed_size));
    info(reporter, format!("Sum of payload bytes: 0x{:04X}", header.checksum));
    info(reporter, format!("Version: 0x{:04X}", header.version));
    info(reporter, format!("FS id: 0x{:04X}", header.fs_id));
}

fn write_diagnostic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let path = dir.join(name);
    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, bytes))
        .map_err(|e| ContainerError::io(format!("writing {}", path.display()), e))
}
