//! Source-mode analysis
//!
//! Runs the three precision passes over a loaded package graph: module
//! findings from the affecting index, package findings from the import
//! closure, and symbol findings from call-graph reachability, each pass
//! gated by the requested scan level. The accumulator keeps only the
//! highest precision achieved per OSV.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use govulnscan_core::{CancelToken, Finding, Frame, Platform, Position, Progress, ScanLevel};
use govulnscan_db::Client;
use govulnscan_graph::{Module, PackageGraph};
use govulnscan_osv::Entry;
use govulnscan_reachability::{CallGraph, FuncId};
use tracing::{debug, info};

use crate::affecting::{affecting_vulns, applicable_packages, ModuleVulns};
use crate::emit::{Accumulator, Handler};
use crate::error::Result;
use crate::findings::{module_finding, package_finding};

/// Scan a loaded package graph. Returns whether any finding was emitted.
pub fn scan_source(
    packages: &PackageGraph,
    client: &Client,
    platform: &Platform,
    level: ScanLevel,
    handler: &mut dyn Handler,
    cancel: &CancelToken,
) -> Result<bool> {
    handler.progress(&Progress::now(format!(
        "Scanning your code and {} packages across {} dependent modules for known vulnerabilities...",
        packages.packages().count(),
        packages.modules().len(),
    )))?;

    let affecting = affecting_vulns(packages.modules(), platform, client)?;
    info!(modules = affecting.len(), "modules with affecting vulnerabilities");

    let mut osvs: BTreeMap<String, Arc<Entry>> = BTreeMap::new();
    for mv in &affecting {
        for entry in &mv.vulns {
            osvs.insert(entry.id.clone(), Arc::clone(entry));
        }
    }

    let mut acc = Accumulator::new(level);

    // Module precision: every (OSV, module) pair in the index.
    for mv in &affecting {
        for entry in &mv.vulns {
            acc.add(module_finding(entry, &mv.module, platform));
        }
    }

    // Package precision: vulnerable packages some target package imports
    // (or that are scan roots themselves).
    if level.wants_packages() {
        for mv in &affecting {
            for entry in &mv.vulns {
                for pkg in applicable_packages(entry, &mv.module.path, platform) {
                    let imported = match packages.package(&pkg.path) {
                        Some(present) => {
                            present.is_root
                                || packages.importers_of(&pkg.path).next().is_some()
                        }
                        None => false,
                    };
                    if imported {
                        acc.add(package_finding(entry, &mv.module, &pkg.path));
                    }
                }
            }
        }
    }

    // Symbol precision: call stacks from an entry point to each vulnerable
    // symbol.
    if level.wants_symbols() {
        handler.progress(&Progress::now(
            "Building call graph and checking symbol reachability...",
        ))?;
        analyze_symbols(packages, platform, &affecting, &mut acc, cancel)?;
    }

    acc.emit(&osvs, handler)
}

fn analyze_symbols(
    packages: &PackageGraph,
    platform: &Platform,
    affecting: &[ModuleVulns],
    acc: &mut Accumulator,
    cancel: &CancelToken,
) -> Result<()> {
    // Only build the call graph when some vulnerable package is actually in
    // the import closure.
    let relevant = affecting.iter().any(|mv| {
        mv.vulns.iter().any(|entry| {
            applicable_packages(entry, &mv.module.path, platform)
                .iter()
                .any(|pkg| packages.package(&pkg.path).is_some())
        })
    });
    if !relevant {
        return Ok(());
    }

    let graph = CallGraph::build(packages, cancel)?;

    // Collect every sink up front: the avoid-other-vulnerable-symbols rule
    // needs the full set.
    let mut vulnerable: HashSet<FuncId> = HashSet::new();
    let mut sinks: Vec<(Arc<Entry>, Module, FuncId)> = Vec::new();
    for mv in affecting {
        for entry in &mv.vulns {
            for pkg in applicable_packages(entry, &mv.module.path, platform) {
                if packages.package(&pkg.path).is_none() {
                    continue;
                }
                let ids: Vec<FuncId> = if pkg.symbols.is_empty() {
                    graph.functions_in_package(&pkg.path).to_vec()
                } else {
                    pkg.symbols
                        .iter()
                        .flat_map(|symbol| graph.find_symbol(&pkg.path, symbol))
                        .collect()
                };
                for id in ids {
                    vulnerable.insert(id.clone());
                    sinks.push((Arc::clone(entry), mv.module.clone(), id));
                }
            }
        }
    }

    for (entry, module, sink) in sinks {
        let Some(stack) = graph.representative_stack(&sink, &vulnerable) else {
            continue;
        };
        debug!(osv = %entry.id, sink = %sink, frames = stack.len(), "vulnerable symbol reachable");

        // Frames are emitted sink first; the stack arrives entry first.
        let mut trace: Vec<Frame> = stack
            .iter()
            .map(|stack_entry| {
                let position = match &stack_entry.call_site {
                    Some(pos) => Some(pos.clone()),
                    // The sink has no outgoing call; use its declaration.
                    None => graph.position(&stack_entry.func).cloned(),
                };
                stack_frame(packages, &stack_entry.func, position)
            })
            .collect();
        trace.reverse();

        acc.add(Finding {
            osv: entry.id.clone(),
            fixed_version: govulnscan_osv::latest_fixed(&entry.affected, &module.path),
            trace,
        });
    }
    Ok(())
}

/// A call-stack frame for one function, with module attribution through the
/// package graph.
fn stack_frame(packages: &PackageGraph, func: &FuncId, position: Option<Position>) -> Frame {
    let (module, version) = match packages
        .package(&func.pkg)
        .map(|pkg| pkg.module.effective())
    {
        Some(Ok(module)) => (module.path.clone(), module.version.clone()),
        _ => (govulnscan_graph::UNKNOWN_MODULE_PATH.to_string(), None),
    };
    Frame {
        module,
        version,
        package: Some(func.pkg.clone()),
        function: Some(func.name.clone()),
        receiver: func.receiver.clone(),
        position,
    }
}
