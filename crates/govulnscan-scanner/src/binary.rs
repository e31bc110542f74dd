//! Binary-mode analysis
//!
//! The module set comes from the executable's build info; symbol evidence
//! comes from whatever survived linking. With a symbol table, vulnerable
//! symbols found in the image yield single-frame symbol findings (no
//! source positions exist). Without one, a vulnerable package of a present
//! module yields a package finding, and the module finding is the floor.

use std::collections::BTreeMap;
use std::sync::Arc;

use govulnscan_binary::BinaryInfo;
use govulnscan_core::{Finding, Frame, Platform, Progress, ScanLevel};
use govulnscan_db::Client;
use govulnscan_graph::{Module, STDLIB_MODULE_PATH};
use govulnscan_osv::Entry;
use tracing::info;

use crate::affecting::{affecting_vulns, applicable_packages};
use crate::emit::{Accumulator, Handler};
use crate::error::Result;
use crate::findings::{module_finding, package_finding};

/// Scan an inspected executable. Returns whether any finding was emitted.
pub fn scan_binary(
    binary: &BinaryInfo,
    client: &Client,
    platform: &Platform,
    level: ScanLevel,
    handler: &mut dyn Handler,
) -> Result<bool> {
    // The binary knows what it was built for; prefer that over the host.
    let platform = match (&binary.goos, &binary.goarch) {
        (Some(goos), Some(goarch)) => Platform::new(goos.clone(), goarch.clone()),
        _ => platform.clone(),
    };

    let mut modules: Vec<Arc<Module>> = Vec::new();
    if let Some(main) = &binary.main_module {
        modules.push(Arc::new(main.clone()));
    }
    modules.extend(binary.modules.iter().cloned().map(Arc::new));
    let stdlib_version = govulnscan_osv::canonical_version(&binary.go_version)
        .map(|v| format!("v{v}"))
        .unwrap_or_else(|| binary.go_version.clone());
    modules.push(Arc::new(Module::new(
        STDLIB_MODULE_PATH,
        Some(stdlib_version),
    )));

    handler.progress(&Progress::now(format!(
        "Scanning binary built with {} ({} modules) for known vulnerabilities...",
        binary.go_version,
        modules.len(),
    )))?;

    let affecting = affecting_vulns(&modules, &platform, client)?;
    info!(modules = affecting.len(), "modules with affecting vulnerabilities");

    let mut osvs: BTreeMap<String, Arc<Entry>> = BTreeMap::new();
    for mv in &affecting {
        for entry in &mv.vulns {
            osvs.insert(entry.id.clone(), Arc::clone(entry));
        }
    }

    let mut acc = Accumulator::new(level);
    for mv in &affecting {
        for entry in &mv.vulns {
            acc.add(module_finding(entry, &mv.module, &platform));
            if !level.wants_packages() {
                continue;
            }

            for pkg in applicable_packages(entry, &mv.module.path, &platform) {
                match &binary.symbols {
                    Some(_) => {
                        let mut symbol_hit = false;
                        if level.wants_symbols() && !pkg.symbols.is_empty() {
                            for symbol in &pkg.symbols {
                                if let Some(found) = binary.find_symbol(&pkg.path, symbol) {
                                    symbol_hit = true;
                                    acc.add(Finding {
                                        osv: entry.id.clone(),
                                        fixed_version: govulnscan_osv::latest_fixed(
                                            &entry.affected,
                                            &mv.module.path,
                                        ),
                                        // A single frame: binaries carry no
                                        // call sites.
                                        trace: vec![Frame {
                                            module: mv.module.path.clone(),
                                            version: mv.module.version.clone(),
                                            package: Some(pkg.path.clone()),
                                            function: Some(found.name.clone()),
                                            receiver: found.receiver.clone(),
                                            position: None,
                                        }],
                                    });
                                }
                            }
                        }
                        if !symbol_hit && binary.has_package(&pkg.path) {
                            acc.add(package_finding(entry, &mv.module, &pkg.path));
                        }
                    }
                    // Stripped: module presence is the only import signal.
                    None => acc.add(package_finding(entry, &mv.module, &pkg.path)),
                }
            }
        }
    }

    acc.emit(&osvs, handler)
}
