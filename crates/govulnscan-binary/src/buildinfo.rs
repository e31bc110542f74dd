//! Embedded Go build info
//!
//! Go binaries carry a `runtime/debug.BuildInfo` blob in a data section,
//! announced by the magic `\xff Go buildinf:`. Since go1.18 the toolchain
//! writes the version and module table inline as varint-length-prefixed
//! strings right after the 32-byte header; older pointer-based encodings
//! are not supported.

use tracing::debug;

use crate::error::{BinaryError, Result};
use govulnscan_graph::Module;

const BUILD_INFO_MAGIC: &[u8] = b"\xff Go buildinf:";
const HEADER_SIZE: usize = 32;

/// Flag bit: version and modinfo are inline strings (go1.18+).
const FLAG_INLINE_STRINGS: u8 = 0x2;

/// The module-table sentinel wrapping the modinfo string.
const MOD_SENTINEL_LEN: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    /// Toolchain version, e.g. `go1.21.3`.
    pub go_version: String,
    pub main_module: Option<Module>,
    /// Dependency modules, replacements applied to `replace`.
    pub modules: Vec<Module>,
    /// `GOOS`/`GOARCH` recovered from build settings, when recorded.
    pub goos: Option<String>,
    pub goarch: Option<String>,
}

/// Locate and decode the build info blob anywhere in the image bytes.
pub fn extract_build_info(data: &[u8]) -> Result<BuildInfo> {
    let offset = find_magic(data).ok_or(BinaryError::NoBuildInfo)?;
    let header = &data[offset..];
    if header.len() < HEADER_SIZE {
        return Err(BinaryError::Parse("truncated build info header".into()));
    }

    let flags = header[15];
    if flags & FLAG_INLINE_STRINGS == 0 {
        return Err(BinaryError::Parse(
            "pointer-encoded build info is not supported".into(),
        ));
    }

    let rest = &header[HEADER_SIZE..];
    let (go_version, rest) = read_string(rest)?;
    let (modinfo, _) = read_bytes(rest)?;
    debug!(%go_version, "found Go build info");

    // The sentinels framing the module table are not UTF-8; strip them
    // before text conversion.
    let modinfo = String::from_utf8_lossy(strip_sentinels(modinfo));
    let mut info = parse_mod_info(&modinfo)?;
    info.go_version = go_version;
    Ok(info)
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(BUILD_INFO_MAGIC.len())
        .position(|window| window == BUILD_INFO_MAGIC)
}

/// Read one varint-length-prefixed string.
fn read_string(data: &[u8]) -> Result<(String, &[u8])> {
    let (bytes, rest) = read_bytes(data)?;
    Ok((String::from_utf8_lossy(bytes).into_owned(), rest))
}

fn read_bytes(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, consumed) = read_uvarint(data)?;
    let start = consumed;
    let end = start + len as usize;
    if end > data.len() {
        return Err(BinaryError::Parse("string exceeds image".into()));
    }
    Ok((&data[start..end], &data[end..]))
}

fn read_uvarint(data: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            break;
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(BinaryError::Parse("invalid varint".into()))
}

/// Parse the `runtime/debug` module-info text: tab-separated `path`, `mod`,
/// `dep`, `=>`, and `build` lines.
fn parse_mod_info(raw: &str) -> Result<BuildInfo> {
    let mut info = BuildInfo::default();

    for line in raw.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        match fields.as_slice() {
            ["mod", path, version, ..] => {
                info.main_module = Some(Module::new(
                    *path,
                    non_empty(version).map(str::to_string),
                ));
            }
            ["dep", path, version, ..] => {
                info.modules
                    .push(Module::new(*path, non_empty(version).map(str::to_string)));
            }
            ["=>", path, version, ..] => {
                // Replacement for the most recent dep line.
                let Some(last) = info.modules.last_mut() else {
                    return Err(BinaryError::Parse(
                        "replacement line without module".into(),
                    ));
                };
                last.replace = Some(Box::new(Module::new(
                    *path,
                    non_empty(version).map(str::to_string),
                )));
            }
            ["build", setting] => {
                if let Some((key, value)) = setting.split_once('=') {
                    match key {
                        "GOOS" => info.goos = Some(value.to_string()),
                        "GOARCH" => info.goarch = Some(value.to_string()),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    if info.main_module.is_none() && info.modules.is_empty() {
        return Err(BinaryError::Parse("module table is empty".into()));
    }
    Ok(info)
}

/// The modinfo blob is framed by 16-byte hash sentinels on both ends.
fn strip_sentinels(raw: &[u8]) -> &[u8] {
    // Sentinel bytes are non-ASCII; a bare text table starts with a
    // keyword.
    if raw.len() >= 2 * MOD_SENTINEL_LEN && !raw[0].is_ascii_alphanumeric() {
        &raw[MOD_SENTINEL_LEN..raw.len() - MOD_SENTINEL_LEN]
    } else {
        raw
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() || s == "(devel)" {
        None
    } else {
        Some(s)
    }
}
