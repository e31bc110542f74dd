//! End-to-end scan scenarios over an in-memory database and fixture
//! packages on disk.

use std::path::Path;
use std::sync::Arc;

use govulnscan_binary::{BinSymbol, BinaryInfo};
use govulnscan_core::{CancelToken, Config, Finding, Platform, Progress, ScanLevel};
use govulnscan_db::{Client, MemorySource};
use govulnscan_graph::{GoListModule, GoListPackage, Module, PackageGraph};
use govulnscan_osv::{
    Affected, EcosystemSpecific, Entry, ModuleRef, Package, Range, RangeEvent, RangeKind,
};
use govulnscan_scanner::{scan_binary, scan_source, Handler};

#[derive(Default)]
struct Recorder {
    osvs: Vec<String>,
    findings: Vec<Finding>,
}

impl Handler for Recorder {
    fn config(&mut self, _: &Config) -> anyhow::Result<()> {
        Ok(())
    }
    fn progress(&mut self, _: &Progress) -> anyhow::Result<()> {
        Ok(())
    }
    fn osv(&mut self, entry: &Entry) -> anyhow::Result<()> {
        self.osvs.push(entry.id.clone());
        Ok(())
    }
    fn finding(&mut self, finding: &Finding) -> anyhow::Result<()> {
        self.findings.push(finding.clone());
        Ok(())
    }
}

fn text_entry() -> Entry {
    Entry {
        schema_version: None,
        id: "GO-2021-0113".to_string(),
        modified: "2021-10-06T17:51:21Z".parse().unwrap(),
        published: None,
        withdrawn: None,
        aliases: vec!["CVE-2021-38561".to_string()],
        summary: Some("Out-of-bounds read in golang.org/x/text/language".to_string()),
        details: None,
        affected: vec![Affected {
            module: ModuleRef {
                path: "golang.org/x/text".to_string(),
                ecosystem: "Go".to_string(),
            },
            ranges: vec![Range {
                kind: RangeKind::Semver,
                events: vec![RangeEvent::introduced("0"), RangeEvent::fixed("0.3.7")],
            }],
            ecosystem_specific: EcosystemSpecific {
                packages: vec![Package {
                    path: "golang.org/x/text/language".to_string(),
                    goos: vec![],
                    goarch: vec![],
                    symbols: vec![
                        "MatchStrings".to_string(),
                        "MustParse".to_string(),
                        "Parse".to_string(),
                        "ParseAcceptLanguage".to_string(),
                    ],
                }],
            },
        }],
        references: vec![],
        database_specific: None,
    }
}

fn simple_entry(id: &str, module: &str, fixed: &str) -> Entry {
    Entry {
        affected: vec![Affected {
            module: ModuleRef {
                path: module.to_string(),
                ecosystem: "Go".to_string(),
            },
            ranges: vec![Range {
                kind: RangeKind::Semver,
                events: vec![RangeEvent::introduced("0"), RangeEvent::fixed(fixed)],
            }],
            ecosystem_specific: EcosystemSpecific::default(),
        }],
        id: id.to_string(),
        ..text_entry()
    }
}

fn client(entries: &[Entry]) -> Client {
    Client::new(
        Box::new(MemorySource::from_entries(entries)),
        CancelToken::new(),
    )
    .unwrap()
}

const LANGUAGE_GO: &str = r#"
package language

func Parse(s string) (string, error) {
    return parse(s)
}

func MustParse(s string) string {
    tag, err := Parse(s)
    if err != nil {
        panic(err)
    }
    return tag
}

func parse(s string) (string, error) {
    return s, nil
}
"#;

/// Builds the fixture target: a main package in example.com/app plus the
/// vulnerable golang.org/x/text/language package at the given version.
fn target(root: &Path, main_src: &str, text_version: &str) -> PackageGraph {
    let app_dir = root.join("app");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(app_dir.join("main.go"), main_src).unwrap();

    let lang_dir = root.join("text/language");
    std::fs::create_dir_all(&lang_dir).unwrap();
    std::fs::write(lang_dir.join("language.go"), LANGUAGE_GO).unwrap();

    PackageGraph::from_list(
        vec![
            GoListPackage {
                import_path: "example.com/app".to_string(),
                name: "main".to_string(),
                dir: app_dir,
                go_files: vec!["main.go".to_string()],
                imports: vec!["golang.org/x/text/language".to_string()],
                module: Some(GoListModule {
                    path: "example.com/app".to_string(),
                    version: None,
                    replace: None,
                    main: true,
                }),
                standard: false,
                dep_only: false,
                for_test: None,
            },
            GoListPackage {
                import_path: "golang.org/x/text/language".to_string(),
                name: "language".to_string(),
                dir: lang_dir,
                go_files: vec!["language.go".to_string()],
                imports: vec![],
                module: Some(GoListModule {
                    path: "golang.org/x/text".to_string(),
                    version: Some(text_version.to_string()),
                    replace: None,
                    main: false,
                }),
                standard: false,
                dep_only: true,
                for_test: None,
            },
        ],
        "go1.21.3",
    )
    .unwrap()
}

const CALLING_MAIN: &str = r#"
package main

import "golang.org/x/text/language"

func main() {
    language.Parse("")
}
"#;

const IMPORT_ONLY_MAIN: &str = r#"
package main

import "golang.org/x/text/language"

func main() {
    _ = language.MustParse
}
"#;

#[test]
fn test_symbol_finding_for_called_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let packages = target(dir.path(), CALLING_MAIN, "v0.3.5");
    let db = client(&[text_entry()]);

    let mut rec = Recorder::default();
    let found = scan_source(
        &packages,
        &db,
        &Platform::default(),
        ScanLevel::Symbol,
        &mut rec,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(found);
    assert_eq!(rec.osvs, vec!["GO-2021-0113"]);
    assert_eq!(rec.findings.len(), 1);

    let finding = &rec.findings[0];
    assert_eq!(finding.fixed_version.as_deref(), Some("v0.3.7"));

    // Trace is sink first: Parse at the top, main at the bottom.
    let sink = &finding.trace[0];
    assert_eq!(sink.function.as_deref(), Some("Parse"));
    assert_eq!(sink.package.as_deref(), Some("golang.org/x/text/language"));
    assert_eq!(sink.module, "golang.org/x/text");
    assert_eq!(sink.version.as_deref(), Some("v0.3.5"));

    let entry = finding.trace.last().unwrap();
    assert_eq!(entry.function.as_deref(), Some("main"));
    assert_eq!(entry.package.as_deref(), Some("example.com/app"));
    assert!(entry.position.is_some());
}

#[test]
fn test_package_finding_for_import_without_call() {
    let dir = tempfile::tempdir().unwrap();
    let packages = target(dir.path(), IMPORT_ONLY_MAIN, "v0.3.5");
    let db = client(&[text_entry()]);

    let mut rec = Recorder::default();
    let found = scan_source(
        &packages,
        &db,
        &Platform::default(),
        ScanLevel::Symbol,
        &mut rec,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(found);
    assert_eq!(rec.findings.len(), 1);
    let finding = &rec.findings[0];
    assert_eq!(
        finding.trace[0].package.as_deref(),
        Some("golang.org/x/text/language")
    );
    assert_eq!(finding.trace[0].function, None);
    assert_eq!(finding.trace.len(), 1);
}

#[test]
fn test_fixed_version_produces_no_findings() {
    let dir = tempfile::tempdir().unwrap();
    let packages = target(dir.path(), CALLING_MAIN, "v0.3.7");
    let db = client(&[text_entry()]);

    let mut rec = Recorder::default();
    let found = scan_source(
        &packages,
        &db,
        &Platform::default(),
        ScanLevel::Symbol,
        &mut rec,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(!found);
    assert!(rec.osvs.is_empty());
    assert!(rec.findings.is_empty());
}

#[test]
fn test_scan_level_module_caps_findings() {
    let dir = tempfile::tempdir().unwrap();
    let packages = target(dir.path(), CALLING_MAIN, "v0.3.5");
    let db = client(&[text_entry()]);

    let mut rec = Recorder::default();
    scan_source(
        &packages,
        &db,
        &Platform::default(),
        ScanLevel::Module,
        &mut rec,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(rec.findings.len(), 1);
    assert_eq!(rec.findings[0].level(), ScanLevel::Module);
    assert_eq!(rec.findings[0].trace[0].package, None);
}

#[test]
fn test_multiple_modules_emit_in_ascending_osv_order() {
    let dir = tempfile::tempdir().unwrap();
    let app_dir = dir.path().join("app");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(app_dir.join("main.go"), "package main\n\nfunc main() {}\n").unwrap();

    let mut list = vec![GoListPackage {
        import_path: "example.com/app".to_string(),
        name: "main".to_string(),
        dir: app_dir,
        go_files: vec!["main.go".to_string()],
        imports: vec![],
        module: Some(GoListModule {
            path: "example.com/app".to_string(),
            version: None,
            replace: None,
            main: true,
        }),
        standard: false,
        dep_only: false,
        for_test: None,
    }];
    for (module, version) in [
        ("example.com/charlie", "v0.1.0"),
        ("example.com/alpha", "v0.1.0"),
        ("example.com/bravo", "v0.1.0"),
    ] {
        list.push(GoListPackage {
            import_path: format!("{module}/pkg"),
            name: "pkg".to_string(),
            dir: dir.path().join("none"),
            go_files: vec![],
            imports: vec![],
            module: Some(GoListModule {
                path: module.to_string(),
                version: Some(version.to_string()),
                replace: None,
                main: false,
            }),
            standard: false,
            dep_only: true,
            for_test: None,
        });
    }
    let packages = PackageGraph::from_list(list, "go1.21.3").unwrap();

    let db = client(&[
        simple_entry("GO-2023-0300", "example.com/charlie", "1.0.0"),
        simple_entry("GO-2021-0100", "example.com/alpha", "1.0.0"),
        simple_entry("GO-2022-0200", "example.com/bravo", "1.0.0"),
    ]);

    let mut rec = Recorder::default();
    let found = scan_source(
        &packages,
        &db,
        &Platform::default(),
        ScanLevel::Symbol,
        &mut rec,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(found);
    assert_eq!(
        rec.osvs,
        vec!["GO-2021-0100", "GO-2022-0200", "GO-2023-0300"]
    );
    assert_eq!(rec.findings.len(), 3);
}

#[test]
fn test_deterministic_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let packages = target(dir.path(), CALLING_MAIN, "v0.3.5");

    let mut runs = Vec::new();
    for _ in 0..2 {
        let db = client(&[text_entry()]);
        let mut rec = Recorder::default();
        scan_source(
            &packages,
            &db,
            &Platform::default(),
            ScanLevel::Symbol,
            &mut rec,
            &CancelToken::new(),
        )
        .unwrap();
        runs.push((rec.osvs, rec.findings));
    }
    assert_eq!(runs[0], runs[1]);
}

fn text_binary(symbols: Option<Vec<BinSymbol>>) -> BinaryInfo {
    BinaryInfo {
        go_version: "go1.21.3".to_string(),
        main_module: Some(Module::new("example.com/app", None)),
        modules: vec![Module::new(
            "golang.org/x/text",
            Some("v0.3.5".to_string()),
        )],
        symbols,
        goos: Some("linux".to_string()),
        goarch: Some("amd64".to_string()),
    }
}

#[test]
fn test_binary_with_symbols_yields_symbol_finding() {
    let binary = text_binary(Some(vec![
        BinSymbol {
            pkg: "golang.org/x/text/language".to_string(),
            receiver: None,
            name: "Parse".to_string(),
        },
        BinSymbol {
            pkg: "main".to_string(),
            receiver: None,
            name: "main".to_string(),
        },
    ]));
    let db = client(&[text_entry()]);

    let mut rec = Recorder::default();
    let found = scan_binary(
        &binary,
        &db,
        &Platform::default(),
        ScanLevel::Symbol,
        &mut rec,
    )
    .unwrap();

    assert!(found);
    assert_eq!(rec.findings.len(), 1);
    let finding = &rec.findings[0];
    // Single-frame trace: no call stacks, no positions in binaries.
    assert_eq!(finding.trace.len(), 1);
    assert_eq!(finding.trace[0].function.as_deref(), Some("Parse"));
    assert_eq!(finding.trace[0].position, None);
    assert_eq!(finding.fixed_version.as_deref(), Some("v0.3.7"));
}

#[test]
fn test_stripped_binary_yields_package_finding() {
    let binary = text_binary(None);
    let db = client(&[text_entry()]);

    let mut rec = Recorder::default();
    let found = scan_binary(
        &binary,
        &db,
        &Platform::default(),
        ScanLevel::Symbol,
        &mut rec,
    )
    .unwrap();

    assert!(found);
    assert_eq!(rec.findings.len(), 1);
    let finding = &rec.findings[0];
    assert_eq!(
        finding.trace[0].package.as_deref(),
        Some("golang.org/x/text/language")
    );
    assert_eq!(finding.trace[0].function, None);
}

#[test]
fn test_binary_symbols_present_but_vulnerable_symbol_absent() {
    // The package survived linking but none of the vulnerable symbols did:
    // the dead-code eliminated symbol is not in the image, so the finding
    // stays at package precision.
    let binary = text_binary(Some(vec![BinSymbol {
        pkg: "golang.org/x/text/language".to_string(),
        receiver: None,
        name: "Compose".to_string(),
    }]));
    let db = client(&[text_entry()]);

    let mut rec = Recorder::default();
    scan_binary(
        &binary,
        &db,
        &Platform::default(),
        ScanLevel::Symbol,
        &mut rec,
    )
    .unwrap();

    assert_eq!(rec.findings.len(), 1);
    assert_eq!(rec.findings[0].level(), ScanLevel::Package);
}

#[test]
fn test_stdlib_module_finding_names_package() {
    // A vulnerability in net/http affects the target through the synthetic
    // stdlib module; even the module-level frame names the package.
    let entry = Entry {
        id: "GO-2022-0969".to_string(),
        affected: vec![Affected {
            module: ModuleRef {
                path: "stdlib".to_string(),
                ecosystem: "Go".to_string(),
            },
            ranges: vec![Range {
                kind: RangeKind::Semver,
                events: vec![
                    RangeEvent::introduced("0"),
                    RangeEvent::fixed("1.18.6"),
                    RangeEvent::introduced("1.19.0"),
                    RangeEvent::fixed("1.19.1"),
                ],
            }],
            ecosystem_specific: EcosystemSpecific {
                packages: vec![Package {
                    path: "net/http".to_string(),
                    goos: vec![],
                    goarch: vec![],
                    symbols: vec!["ListenAndServe".to_string()],
                }],
            },
        }],
        ..text_entry()
    };

    let dir = tempfile::tempdir().unwrap();
    let app_dir = dir.path().join("app");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(app_dir.join("main.go"), "package main\n\nfunc main() {}\n").unwrap();
    let packages = PackageGraph::from_list(
        vec![GoListPackage {
            import_path: "example.com/app".to_string(),
            name: "main".to_string(),
            dir: app_dir,
            go_files: vec!["main.go".to_string()],
            imports: vec![],
            module: Some(GoListModule {
                path: "example.com/app".to_string(),
                version: None,
                replace: None,
                main: true,
            }),
            standard: false,
            dep_only: false,
            for_test: None,
        }],
        "go1.19.0",
    )
    .unwrap();
    let db = client(&[entry]);

    let mut rec = Recorder::default();
    scan_source(
        &packages,
        &db,
        &Platform::default(),
        ScanLevel::Module,
        &mut rec,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(rec.findings.len(), 1);
    let frame = &rec.findings[0].trace[0];
    assert_eq!(frame.module, "stdlib");
    assert_eq!(frame.version.as_deref(), Some("v1.19.0"));
    assert_eq!(frame.package.as_deref(), Some("net/http"));
    // Fixed twice, the later fix wins.
    assert_eq!(rec.findings[0].fixed_version.as_deref(), Some("v1.19.1"));
}

#[test]
fn test_osv_without_affected_emits_nothing() {
    let mut empty = text_entry();
    empty.affected.clear();

    let dir = tempfile::tempdir().unwrap();
    let packages = target(dir.path(), CALLING_MAIN, "v0.3.5");
    let db = client(&[empty]);

    let mut rec = Recorder::default();
    let found = scan_source(
        &packages,
        &db,
        &Platform::default(),
        ScanLevel::Symbol,
        &mut rec,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(!found);
    assert!(rec.findings.is_empty());
}
