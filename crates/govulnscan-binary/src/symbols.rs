//! Symbol-table recovery
//!
//! Extracts the `(package, symbol)` pairs that survived linking. The symbol
//! table is optional: `strip` removes it from ELF and PE images, while
//! Mach-O keeps its `nlist` entries, so stripped Darwin binaries still
//! support symbol-level analysis. A missing table is represented as `None`,
//! never as an error.

use goblin::mach::Mach;
use goblin::Object;
use tracing::debug;

use crate::error::{BinaryError, Result};

/// One linked Go symbol, split into its owning package and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinSymbol {
    pub pkg: String,
    pub receiver: Option<String>,
    pub name: String,
}

/// Extract Go symbols from a parsed image. `Ok(None)` means the symbol
/// table is absent (stripped).
pub fn extract_symbols(data: &[u8]) -> Result<Option<Vec<BinSymbol>>> {
    let object = Object::parse(data).map_err(|_| BinaryError::UnrecognizedFormat)?;
    let names: Option<Vec<String>> = match object {
        Object::Elf(elf) => {
            if elf.syms.is_empty() {
                None
            } else {
                Some(
                    elf.syms
                        .iter()
                        .filter_map(|sym| elf.strtab.get_at(sym.st_name))
                        .map(str::to_string)
                        .collect(),
                )
            }
        }
        Object::Mach(mach) => {
            let collected: Vec<String> = match mach {
                Mach::Binary(macho) => macho
                    .symbols()
                    .filter_map(|sym| sym.ok())
                    .map(|(name, _)| name.to_string())
                    .collect(),
                Mach::Fat(multi) => match macho_from_fat(&multi) {
                    Some(macho) => macho
                        .symbols()
                        .filter_map(|sym| sym.ok())
                        .map(|(name, _)| name.to_string())
                        .collect(),
                    None => return Err(BinaryError::UnrecognizedFormat),
                },
            };
            if collected.is_empty() {
                None
            } else {
                Some(collected)
            }
        }
        Object::PE(pe) => pe_symbol_names(&pe, data),
        _ => return Err(BinaryError::UnrecognizedFormat),
    };

    let symbols = names.map(|names| {
        let mut symbols: Vec<BinSymbol> = names
            .iter()
            .filter_map(|name| parse_symbol_name(name))
            .collect();
        symbols.sort();
        symbols.dedup();
        debug!(count = symbols.len(), "extracted Go symbols");
        symbols
    });
    Ok(symbols)
}

fn macho_from_fat<'a>(
    multi: &'a goblin::mach::MultiArch<'a>,
) -> Option<goblin::mach::MachO<'a>> {
    for index in 0..multi.narches {
        if let Ok(goblin::mach::SingleArch::MachO(macho)) = multi.get(index) {
            return Some(macho);
        }
    }
    None
}

fn pe_symbol_names(pe: &goblin::pe::PE, data: &[u8]) -> Option<Vec<String>> {
    let coff = &pe.header.coff_header;
    let symbols = coff.symbols(data).ok()??;
    let strings = coff.strings(data).ok()??;
    let mut names = Vec::new();
    for (_, inline_name, symbol) in symbols.iter() {
        let name = match inline_name {
            Some(name) => Some(name.to_string()),
            None => symbol
                .name(&strings)
                .ok()
                .map(str::to_string),
        };
        if let Some(name) = name {
            names.push(name);
        }
    }
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

/// Split a linked Go symbol name into package path, optional receiver, and
/// symbol. Runtime-internal names (`go:buildid`, `type:.eq...`) and
/// packageless symbols are dropped.
pub fn parse_symbol_name(raw: &str) -> Option<BinSymbol> {
    if raw.is_empty() || raw.starts_with("go:") || raw.starts_with("type:") {
        return None;
    }
    // ABI wrappers carry a suffix: pkg.Func.abi0
    let raw = raw.strip_suffix(".abi0").unwrap_or(raw);

    // The package ends at the first dot after the last slash.
    let slash = raw.rfind('/').map_or(0, |i| i + 1);
    let dot = raw[slash..].find('.')? + slash;
    let pkg = &raw[..dot];
    let rest = &raw[dot + 1..];
    if pkg.is_empty() || rest.is_empty() {
        return None;
    }

    // Methods: pkg.(*Recv).Name or pkg.Recv.Name
    if let Some(inner) = rest.strip_prefix("(*") {
        let (receiver, name) = inner.split_once(").")?;
        return Some(BinSymbol {
            pkg: pkg.to_string(),
            receiver: Some(format!("*{receiver}")),
            name: name.to_string(),
        });
    }
    if let Some((receiver, name)) = rest.split_once('.') {
        // Anonymous helpers (Func.func1) are attributed to their creator.
        if name.starts_with("func") && name[4..].chars().all(|c| c.is_ascii_digit()) {
            return Some(BinSymbol {
                pkg: pkg.to_string(),
                receiver: None,
                name: receiver.to_string(),
            });
        }
        return Some(BinSymbol {
            pkg: pkg.to_string(),
            receiver: Some(receiver.to_string()),
            name: name.to_string(),
        });
    }

    Some(BinSymbol {
        pkg: pkg.to_string(),
        receiver: None,
        name: rest.to_string(),
    })
}
