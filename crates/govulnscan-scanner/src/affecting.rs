//! Affecting-vulnerability index
//!
//! Pairs every module of the target with the database entries whose version
//! ranges cover the version actually present, after applying the entries'
//! GOOS/GOARCH filters against the scan platform. Modules are queried under
//! their effective (replacement) path, since that is the code that was
//! compiled.

use std::sync::Arc;

use govulnscan_core::Platform;
use govulnscan_db::Client;
use govulnscan_graph::{Module, UNKNOWN_MODULE_PATH};
use govulnscan_osv::{Entry, Package};
use tracing::debug;

use crate::error::Result;

/// One module of the target and the entries that affect it.
#[derive(Debug, Clone)]
pub struct ModuleVulns {
    /// The effective module (replacements already applied).
    pub module: Module,
    pub vulns: Vec<Arc<Entry>>,
}

/// Build the index for a module set. Modules without at least one
/// applicable entry are dropped; the result is ordered by module path.
pub fn affecting_vulns(
    modules: &[Arc<Module>],
    platform: &Platform,
    client: &Client,
) -> Result<Vec<ModuleVulns>> {
    let mut index = Vec::new();
    for module in modules {
        let effective = module.effective()?;
        if effective.path == UNKNOWN_MODULE_PATH {
            continue;
        }
        let entries =
            client.by_module_version(&effective.path, effective.version.as_deref())?;
        let entries: Vec<Arc<Entry>> = entries
            .into_iter()
            .filter(|entry| is_applicable(entry, &effective.path, platform))
            .collect();
        if entries.is_empty() {
            continue;
        }
        debug!(module = %effective.path, count = entries.len(), "affecting vulnerabilities");
        index.push(ModuleVulns {
            module: effective.clone(),
            vulns: entries,
        });
    }
    index.sort_by(|a, b| a.module.path.cmp(&b.module.path));
    Ok(index)
}

/// Whether any of the entry's affected blocks for this module survives the
/// platform filters.
fn is_applicable(entry: &Entry, module_path: &str, platform: &Platform) -> bool {
    entry.affected_for_module(module_path).any(|affected| {
        affected.ecosystem_specific.packages.is_empty()
            || affected
                .ecosystem_specific
                .packages
                .iter()
                .any(|pkg| pkg.matches_platform(&platform.goos, &platform.goarch))
    })
}

/// The packages of an entry that apply to this module on this platform.
pub fn applicable_packages<'a>(
    entry: &'a Entry,
    module_path: &'a str,
    platform: &Platform,
) -> Vec<&'a Package> {
    let mut packages: Vec<&Package> = entry
        .affected_for_module(module_path)
        .flat_map(|affected| affected.ecosystem_specific.packages.iter())
        .filter(|pkg| pkg.matches_platform(&platform.goos, &platform.goarch))
        .collect();
    packages.sort_by(|a, b| a.path.cmp(&b.path));
    packages.dedup_by(|a, b| a.path == b.path);
    packages
}

#[cfg(test)]
mod tests {
    use super::*;
    use govulnscan_core::CancelToken;
    use govulnscan_db::MemorySource;
    use govulnscan_osv::{
        Affected, EcosystemSpecific, ModuleRef, Range, RangeEvent, RangeKind,
    };

    fn entry_with_platform(id: &str, module: &str, goos: &[&str]) -> Entry {
        Entry {
            schema_version: None,
            id: id.to_string(),
            modified: "2023-01-01T00:00:00Z".parse().unwrap(),
            published: None,
            withdrawn: None,
            aliases: vec![],
            summary: None,
            details: None,
            affected: vec![Affected {
                module: ModuleRef {
                    path: module.to_string(),
                    ecosystem: "Go".to_string(),
                },
                ranges: vec![Range {
                    kind: RangeKind::Semver,
                    events: vec![RangeEvent::introduced("0"), RangeEvent::fixed("9.9.9")],
                }],
                ecosystem_specific: EcosystemSpecific {
                    packages: vec![Package {
                        path: format!("{module}/pkg"),
                        goos: goos.iter().map(|s| s.to_string()).collect(),
                        goarch: vec![],
                        symbols: vec!["Run".to_string()],
                    }],
                },
            }],
            references: vec![],
            database_specific: None,
        }
    }

    fn client(entries: &[Entry]) -> Client {
        Client::new(
            Box::new(MemorySource::from_entries(entries)),
            CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_platform_filter_drops_foreign_entries() {
        let db = client(&[
            entry_with_platform("GO-2023-0001", "example.com/m", &["windows"]),
            entry_with_platform("GO-2023-0002", "example.com/m", &["linux"]),
            entry_with_platform("GO-2023-0003", "example.com/m", &[]),
        ]);
        let modules = vec![Arc::new(Module::new(
            "example.com/m",
            Some("v1.0.0".to_string()),
        ))];
        let platform = Platform::new("linux", "amd64");

        let index = affecting_vulns(&modules, &platform, &db).unwrap();
        assert_eq!(index.len(), 1);
        let ids: Vec<&str> = index[0].vulns.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["GO-2023-0002", "GO-2023-0003"]);
    }

    #[test]
    fn test_replaced_module_queried_under_replacement() {
        let db = client(&[entry_with_platform("GO-2023-0009", "example.com/fork", &[])]);
        let mut module = Module::new("example.com/orig", Some("v1.0.0".to_string()));
        module.replace = Some(Box::new(Module::new(
            "example.com/fork",
            Some("v2.0.0".to_string()),
        )));

        let index =
            affecting_vulns(&[Arc::new(module)], &Platform::default(), &db).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].module.path, "example.com/fork");
        assert_eq!(index[0].module.version.as_deref(), Some("v2.0.0"));
    }

    #[test]
    fn test_unknown_module_skipped() {
        let db = client(&[]);
        let modules = vec![Arc::new(Module::new(UNKNOWN_MODULE_PATH, None))];
        let index = affecting_vulns(&modules, &Platform::default(), &db).unwrap();
        assert!(index.is_empty());
    }
}
