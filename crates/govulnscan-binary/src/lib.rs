//! Executable inspection for binary-mode scans
//!
//! Recovers two things from a compiled Go executable: the embedded build
//! info (module paths and versions, including replacements) and, when the
//! linker left one behind, the symbol table restricted to Go
//! `(package, symbol)` pairs. Build info is mandatory; the symbol table is
//! not, and a stripped image simply degrades the scan to package and module
//! granularity.

use std::path::Path;

use govulnscan_core::CancelToken;
use govulnscan_graph::Module;
use tracing::info;

mod buildinfo;
mod error;
mod symbols;

pub use buildinfo::{extract_build_info, BuildInfo};
pub use error::{BinaryError, Result};
pub use symbols::{extract_symbols, parse_symbol_name, BinSymbol};

/// Everything a binary-mode scan needs from the executable.
#[derive(Debug, Clone)]
pub struct BinaryInfo {
    /// Toolchain version the binary was built with, e.g. `go1.21.3`.
    pub go_version: String,
    pub main_module: Option<Module>,
    /// Dependency modules from the build info, replacements attached.
    pub modules: Vec<Module>,
    /// Go symbols surviving in the image; `None` when the table was
    /// stripped.
    pub symbols: Option<Vec<BinSymbol>>,
    pub goos: Option<String>,
    pub goarch: Option<String>,
}

impl BinaryInfo {
    /// Whether any symbol of the given package survived linking. Only
    /// meaningful when `symbols` is present.
    pub fn has_package(&self, pkg: &str) -> bool {
        self.symbols
            .as_ref()
            .is_some_and(|symbols| symbols.iter().any(|s| s.pkg == pkg))
    }

    /// Look up a symbol by OSV spelling (`Parse`, `Buffer.Write`,
    /// `(*Buffer).Write`).
    pub fn find_symbol(&self, pkg: &str, symbol: &str) -> Option<&BinSymbol> {
        let symbols = self.symbols.as_ref()?;
        let (receiver, name) = match symbol.rsplit_once('.') {
            Some((receiver, name)) => (
                Some(
                    receiver
                        .trim_start_matches('(')
                        .trim_end_matches(')')
                        .trim_start_matches('*'),
                ),
                name,
            ),
            None => (None, symbol),
        };
        symbols.iter().find(|s| {
            if s.pkg != pkg || s.name != name {
                return false;
            }
            match (receiver, &s.receiver) {
                (None, None) => true,
                (Some(want), Some(have)) => have.trim_start_matches('*') == want,
                _ => false,
            }
        })
    }
}

/// Inspect an executable on disk.
pub fn inspect(path: &Path, cancel: &CancelToken) -> Result<BinaryInfo> {
    if cancel.is_cancelled() {
        return Err(BinaryError::Cancelled);
    }
    let data = std::fs::read(path)?;
    inspect_bytes(&data)
}

/// Inspect an already-loaded image.
pub fn inspect_bytes(data: &[u8]) -> Result<BinaryInfo> {
    // Format check first: an unrecognized image is a hard error even if it
    // happens to contain the magic somewhere.
    let symbols = extract_symbols(data)?;
    let build = extract_build_info(data)?;

    info!(
        go_version = %build.go_version,
        modules = build.modules.len(),
        stripped = symbols.is_none(),
        "inspected binary"
    );

    Ok(BinaryInfo {
        go_version: build.go_version,
        main_module: build.main_module,
        modules: build.modules,
        symbols,
        goos: build.goos,
        goarch: build.goarch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal 64-bit little-endian ELF header with no sections: enough
    /// for format detection, with no symbol table.
    fn minimal_elf() -> Vec<u8> {
        let mut header = vec![0u8; 64];
        header[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        header[4] = 2; // ELFCLASS64
        header[5] = 1; // little endian
        header[6] = 1; // EV_CURRENT
        header[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        header[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        header[20..24].copy_from_slice(&1u32.to_le_bytes());
        header[52..54].copy_from_slice(&64u16.to_le_bytes()); // ehsize
        header[54..56].copy_from_slice(&56u16.to_le_bytes()); // phentsize
        header[58..60].copy_from_slice(&64u16.to_le_bytes()); // shentsize
        header
    }

    const MODINFO: &str = "path\texample.com/app\n\
        mod\texample.com/app\t(devel)\t\n\
        dep\tgolang.org/x/text\tv0.3.5\th1:abcd=\n";

    #[test]
    fn test_inspect_stripped_elf_with_build_info() {
        let mut image = minimal_elf();
        image.resize(256, 0);
        image.extend_from_slice(&buildinfo::testutil::build_info_blob(
            "go1.21.3", MODINFO,
        ));

        let info = inspect_bytes(&image).unwrap();
        assert_eq!(info.go_version, "go1.21.3");
        assert_eq!(info.main_module.as_ref().unwrap().path, "example.com/app");
        assert_eq!(info.modules[0].path, "golang.org/x/text");
        // Stripped: no symbol table, but not an error.
        assert!(info.symbols.is_none());
    }

    #[test]
    fn test_inspect_elf_without_build_info_fails() {
        let mut image = minimal_elf();
        image.resize(256, 0);
        assert!(matches!(
            inspect_bytes(&image),
            Err(BinaryError::NoBuildInfo)
        ));
    }

    #[test]
    fn test_inspect_garbage_is_unrecognized() {
        let image = vec![0xaau8; 512];
        assert!(matches!(
            inspect_bytes(&image),
            Err(BinaryError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn test_find_symbol_matching() {
        let info = BinaryInfo {
            go_version: "go1.21.3".to_string(),
            main_module: None,
            modules: vec![],
            symbols: Some(vec![
                BinSymbol {
                    pkg: "golang.org/x/text/language".to_string(),
                    receiver: None,
                    name: "Parse".to_string(),
                },
                BinSymbol {
                    pkg: "example.com/lib".to_string(),
                    receiver: Some("*Buffer".to_string()),
                    name: "Write".to_string(),
                },
            ]),
            goos: None,
            goarch: None,
        };

        assert!(info
            .find_symbol("golang.org/x/text/language", "Parse")
            .is_some());
        assert!(info.find_symbol("example.com/lib", "(*Buffer).Write").is_some());
        assert!(info.find_symbol("example.com/lib", "Buffer.Write").is_some());
        assert!(info.find_symbol("example.com/lib", "Read").is_none());
        assert!(info.has_package("example.com/lib"));
        assert!(!info.has_package("example.com/other"));
    }
}
