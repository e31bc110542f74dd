//! Normalized module/package graph of a scan target
//!
//! Wraps the raw `go list` output into a graph with uniform module
//! ancestry: every package belongs to exactly one module, with standard
//! library packages assigned the synthetic `stdlib` module and otherwise
//! unattributable packages the synthetic `unknown` module. Module
//! replacements are resolved here so every downstream consumer reports the
//! replacement path and version.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

mod error;
mod loader;

pub use error::{LoadError, Result};
pub use loader::{
    load_packages, parse_go_list, toolchain_version, GoListModule, GoListPackage, LoadConfig,
};

/// Synthetic module owning all standard-library packages.
pub const STDLIB_MODULE_PATH: &str = "stdlib";

/// Synthetic module owning packages with no resolvable module.
pub const UNKNOWN_MODULE_PATH: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace: Option<Box<Module>>,
}

impl Module {
    pub fn new(path: impl Into<String>, version: Option<String>) -> Self {
        Module {
            path: path.into(),
            version,
            replace: None,
        }
    }

    /// The module to report: the end of the replacement chain. Chains are
    /// expected to be acyclic and short; a repeated path is an error.
    pub fn effective(&self) -> Result<&Module> {
        let mut seen = HashSet::new();
        let mut current = self;
        while let Some(replacement) = current.replace.as_deref() {
            if !seen.insert(current.path.as_str()) {
                return Err(LoadError::ReplaceCycle(current.path.clone()));
            }
            current = replacement;
        }
        Ok(current)
    }

    pub fn is_synthetic(&self) -> bool {
        self.path == STDLIB_MODULE_PATH || self.path == UNKNOWN_MODULE_PATH
    }
}

#[derive(Debug, Clone)]
pub struct Package {
    pub import_path: String,
    pub name: String,
    pub dir: PathBuf,
    pub go_files: Vec<PathBuf>,
    pub imports: Vec<String>,
    pub module: Arc<Module>,
    /// Whether the package matched a scan pattern (as opposed to being
    /// pulled in as a dependency).
    pub is_root: bool,
}

pub struct PackageGraph {
    packages: BTreeMap<String, Package>,
    modules: Vec<Arc<Module>>,
    go_version: String,
}

impl PackageGraph {
    /// Build the graph from loader output. `go_version` is the toolchain
    /// version string (`go1.21.3`), used for the synthetic stdlib module.
    pub fn from_list(list: Vec<GoListPackage>, go_version: &str) -> Result<Self> {
        let stdlib_version = govulnscan_osv::canonical_version(go_version)
            .map(|v| format!("v{v}"))
            .unwrap_or_else(|| go_version.to_string());

        let mut modules: HashMap<String, Arc<Module>> = HashMap::new();
        let stdlib = Arc::new(Module::new(STDLIB_MODULE_PATH, Some(stdlib_version)));
        let unknown = Arc::new(Module::new(UNKNOWN_MODULE_PATH, None));
        modules.insert(STDLIB_MODULE_PATH.to_string(), Arc::clone(&stdlib));

        // First pass: intern every explicitly-attributed module so that the
        // longest-prefix fallback has the full path set to match against.
        for pkg in &list {
            if let Some(module) = &pkg.module {
                modules
                    .entry(module.path.clone())
                    .or_insert_with(|| Arc::new(convert_module(module)));
            }
        }

        let mut packages = BTreeMap::new();
        for pkg in list {
            if pkg.import_path.is_empty() {
                continue;
            }
            let module = if pkg.standard || is_stdlib_path(&pkg.import_path) {
                Arc::clone(&stdlib)
            } else if let Some(module) = &pkg.module {
                Arc::clone(&modules[&module.path])
            } else if let Some(owner) = longest_prefix_module(&modules, &pkg.import_path) {
                owner
            } else {
                debug!(package = %pkg.import_path, "no module for package, using synthetic");
                modules
                    .entry(UNKNOWN_MODULE_PATH.to_string())
                    .or_insert_with(|| Arc::clone(&unknown));
                Arc::clone(&unknown)
            };

            // Chain validity is checked once at construction.
            module.effective()?;

            let go_files = pkg
                .go_files
                .iter()
                .map(|f| pkg.dir.join(f))
                .collect();
            packages.insert(
                pkg.import_path.clone(),
                Package {
                    import_path: pkg.import_path,
                    name: pkg.name,
                    dir: pkg.dir,
                    go_files,
                    imports: pkg.imports,
                    module,
                    is_root: !pkg.dep_only,
                },
            );
        }

        if packages.values().all(|p| !p.is_root) {
            warn!("no root packages among loaded packages");
        }

        let mut module_list: Vec<Arc<Module>> = modules.into_values().collect();
        module_list.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(PackageGraph {
            packages,
            modules: module_list,
            go_version: go_version.to_string(),
        })
    }

    /// All packages, ordered by import path.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn package(&self, import_path: &str) -> Option<&Package> {
        self.packages.get(import_path)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Package> {
        self.packages.values().filter(|p| p.is_root)
    }

    /// Every module with at least one package in the graph, stdlib
    /// included, ordered by path.
    pub fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    /// Packages that directly import `target`. A vulnerable package with no
    /// importer can only be a scan root itself.
    pub fn importers_of<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a Package> {
        self.packages
            .values()
            .filter(move |p| p.imports.iter().any(|i| i == target))
    }

    pub fn go_version(&self) -> &str {
        &self.go_version
    }
}

fn convert_module(module: &GoListModule) -> Module {
    Module {
        path: module.path.clone(),
        version: module.version.clone(),
        replace: module.replace.as_deref().map(|r| Box::new(convert_module(r))),
    }
}

/// Standard-library import paths have no dot in their first element
/// (`fmt`, `net/http`, `crypto/tls`).
fn is_stdlib_path(import_path: &str) -> bool {
    let first = import_path.split('/').next().unwrap_or(import_path);
    !first.contains('.') && first != "command-line-arguments"
}

fn longest_prefix_module(
    modules: &HashMap<String, Arc<Module>>,
    import_path: &str,
) -> Option<Arc<Module>> {
    let mut candidate = import_path;
    loop {
        if let Some(module) = modules.get(candidate) {
            return Some(Arc::clone(module));
        }
        match candidate.rfind('/') {
            Some(idx) => candidate = &candidate[..idx],
            None => return None,
        }
    }
}
