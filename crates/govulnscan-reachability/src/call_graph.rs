//! Whole-program call graph
//!
//! Assembles per-file syntax into one directed graph over every function of
//! every package in the target. Resolution is a sound over-approximation:
//! qualified calls resolve through the file's imports, unqualified calls
//! stay in the package (plus dot imports), and method calls resolve by name
//! against every method in the program. Spurious edges inflate evidence;
//! missing edges would hide findings, so resolution always errs wide.

use std::collections::HashMap;
use std::fmt;

use govulnscan_core::{CancelToken, Position};
use govulnscan_graph::PackageGraph;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, warn};

use crate::ast::{self, CalleeRef, FileSyntax};
use crate::error::{ReachError, Result};

/// Identity of a function node: package, optional receiver type, name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId {
    pub pkg: String,
    pub receiver: Option<String>,
    pub name: String,
}

impl FuncId {
    pub fn func(pkg: impl Into<String>, name: impl Into<String>) -> Self {
        FuncId {
            pkg: pkg.into(),
            receiver: None,
            name: name.into(),
        }
    }

    pub fn method(
        pkg: impl Into<String>,
        receiver: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        FuncId {
            pkg: pkg.into(),
            receiver: Some(receiver.into()),
            name: name.into(),
        }
    }

    /// Label used for deterministic ordering and tie-breaks.
    pub fn label(&self) -> String {
        match &self.receiver {
            Some(receiver) => format!("{}.{}.{}", self.pkg, receiver, self.name),
            None => format!("{}.{}", self.pkg, self.name),
        }
    }

    /// Whether this is an anonymous (literal) function.
    pub fn is_anonymous(&self) -> bool {
        self.name.contains('$')
    }

    /// The declared function a literal was created in: `F$1$2` -> `F`.
    pub fn creator_name(&self) -> &str {
        self.name.split('$').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.pkg.rsplit('/').next().unwrap_or(&self.pkg);
        match &self.receiver {
            Some(receiver) => write!(f, "{base}.{receiver}.{}", self.name),
            None => write!(f, "{base}.{}", self.name),
        }
    }
}

pub struct CallGraph {
    pub(crate) graph: DiGraph<FuncId, Option<Position>>,
    pub(crate) nodes: HashMap<FuncId, NodeIndex>,
    positions: HashMap<FuncId, Position>,
    pub(crate) entry_points: Vec<NodeIndex>,
    methods_by_name: HashMap<String, Vec<FuncId>>,
    funcs_by_pkg: HashMap<String, Vec<FuncId>>,
}

impl CallGraph {
    /// Build the call graph for every package of the target with sources on
    /// disk. Packages whose files are unavailable (typically dependencies
    /// outside the module cache) simply contribute no nodes; their findings
    /// stay at lower precision.
    pub fn build(packages: &PackageGraph, cancel: &CancelToken) -> Result<Self> {
        let mut builder = Builder::default();

        for pkg in packages.packages() {
            if cancel.is_cancelled() {
                return Err(ReachError::Cancelled);
            }
            let mut init_counter = 0;
            let mut files = Vec::new();
            for file in &pkg.go_files {
                if !file.exists() {
                    debug!(file = %file.display(), "source file unavailable, skipping");
                    continue;
                }
                match ast::parse_file(file, &mut init_counter) {
                    Ok(syntax) => files.push(syntax),
                    Err(ReachError::Io(e)) => {
                        warn!(file = %file.display(), error = %e, "unreadable source file");
                    }
                    Err(e) => return Err(e),
                }
            }
            if !files.is_empty() {
                builder.add_package(&pkg.import_path, files);
            }
        }

        Ok(builder.finish(packages))
    }

    pub fn node(&self, id: &FuncId) -> Option<NodeIndex> {
        self.nodes.get(id).copied()
    }

    pub fn func(&self, index: NodeIndex) -> &FuncId {
        &self.graph[index]
    }

    /// Declaration position (for implicit init, the package clause).
    pub fn position(&self, id: &FuncId) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn entry_points(&self) -> &[NodeIndex] {
        &self.entry_points
    }

    /// Nodes matching an OSV symbol in a package. Symbols are either plain
    /// function names (`Parse`) or method references (`Buffer.Write`,
    /// `(*Buffer).Write`).
    pub fn find_symbol(&self, pkg: &str, symbol: &str) -> Vec<FuncId> {
        let Some(funcs) = self.funcs_by_pkg.get(pkg) else {
            return Vec::new();
        };
        let (receiver, name) = match symbol.rsplit_once('.') {
            Some((receiver, name)) => {
                let receiver = receiver
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .trim_start_matches('*');
                (Some(receiver), name)
            }
            None => (None, symbol),
        };
        funcs
            .iter()
            .filter(|id| {
                if id.name != name {
                    return false;
                }
                match (receiver, &id.receiver) {
                    (None, None) => true,
                    (Some(want), Some(have)) => have.trim_start_matches('*') == want,
                    _ => false,
                }
            })
            .cloned()
            .collect()
    }

    /// Every function of a package; used when an OSV declares a package
    /// vulnerable without naming symbols.
    pub fn functions_in_package(&self, pkg: &str) -> &[FuncId] {
        self.funcs_by_pkg
            .get(pkg)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Default)]
struct Builder {
    packages: Vec<(String, Vec<FileSyntax>)>,
}

impl Builder {
    fn add_package(&mut self, pkg_path: &str, files: Vec<FileSyntax>) {
        self.packages.push((pkg_path.to_string(), files));
    }

    fn finish(self, package_graph: &PackageGraph) -> CallGraph {
        let mut graph: DiGraph<FuncId, Option<Position>> = DiGraph::new();
        let mut nodes: HashMap<FuncId, NodeIndex> = HashMap::new();
        let mut positions: HashMap<FuncId, Position> = HashMap::new();
        let mut methods_by_name: HashMap<String, Vec<FuncId>> = HashMap::new();
        let mut funcs_by_pkg: HashMap<String, Vec<FuncId>> = HashMap::new();

        let mut add_node = |graph: &mut DiGraph<FuncId, Option<Position>>,
                            nodes: &mut HashMap<FuncId, NodeIndex>,
                            id: FuncId|
         -> NodeIndex {
            *nodes
                .entry(id.clone())
                .or_insert_with(|| graph.add_node(id))
        };

        // First pass: declare every function so cross-package edges can
        // resolve regardless of package order.
        for (pkg_path, files) in &self.packages {
            let implicit_init = FuncId::func(pkg_path.clone(), "init");
            add_node(&mut graph, &mut nodes, implicit_init.clone());
            if let Some(first) = files.first() {
                positions.insert(implicit_init.clone(), first.package_pos.clone());
            }
            funcs_by_pkg
                .entry(pkg_path.clone())
                .or_default()
                .push(implicit_init);

            for file in files {
                for func in &file.functions {
                    let id = FuncId {
                        pkg: pkg_path.clone(),
                        receiver: func.receiver.clone(),
                        name: func.name.clone(),
                    };
                    add_node(&mut graph, &mut nodes, id.clone());
                    positions.insert(id.clone(), func.pos.clone());
                    if id.receiver.is_some() && !id.is_anonymous() {
                        methods_by_name
                            .entry(id.name.clone())
                            .or_default()
                            .push(id.clone());
                    }
                    funcs_by_pkg
                        .entry(pkg_path.clone())
                        .or_default()
                        .push(id);
                }
            }
        }

        // Second pass: edges.
        let mut edges: Vec<(NodeIndex, NodeIndex, Option<Position>)> = Vec::new();
        for (pkg_path, files) in &self.packages {
            let implicit_init = nodes[&FuncId::func(pkg_path.clone(), "init")];

            for file in files {
                let dot_imports: Vec<&str> = file
                    .imports
                    .iter()
                    .filter(|i| i.alias.as_deref() == Some("."))
                    .map(|i| i.path.as_str())
                    .collect();

                // Importing a package runs its initializer.
                for import in &file.imports {
                    let target = FuncId::func(import.path.clone(), "init");
                    if let Some(&target_idx) = nodes.get(&target) {
                        edges.push((implicit_init, target_idx, Some(import.pos.clone())));
                    }
                }

                // Explicit inits run from the implicit one.
                for func in &file.functions {
                    if func.name.starts_with("init#") && !func.name.contains('$') {
                        let id = FuncId::func(pkg_path.clone(), func.name.clone());
                        if let Some(&target_idx) = nodes.get(&id) {
                            edges.push((implicit_init, target_idx, Some(file.package_pos.clone())));
                        }
                    }
                }

                for call in &file.calls {
                    let caller = FuncId {
                        pkg: pkg_path.clone(),
                        receiver: call.caller_receiver.clone(),
                        name: call.caller.clone(),
                    };
                    let Some(&caller_idx) = nodes.get(&caller) else {
                        continue;
                    };

                    match &call.callee {
                        CalleeRef::Bare(name) => {
                            let mut candidates =
                                vec![FuncId::func(pkg_path.clone(), name.clone())];
                            for dot in &dot_imports {
                                candidates.push(FuncId::func(dot.to_string(), name.clone()));
                            }
                            for candidate in candidates {
                                if let Some(&target_idx) = nodes.get(&candidate) {
                                    edges.push((caller_idx, target_idx, Some(call.pos.clone())));
                                }
                            }
                        }
                        CalleeRef::Selector { operand, field } => {
                            // An import is referred to by its alias, its
                            // declared package name, or its path's last
                            // element.
                            let import = file.imports.iter().find(|i| match &i.alias {
                                Some(alias) => alias == operand,
                                None => {
                                    i.effective_name() == operand
                                        || package_graph
                                            .package(&i.path)
                                            .is_some_and(|p| &p.name == operand)
                                }
                            });
                            if let Some(import) = import {
                                let target = FuncId::func(import.path.clone(), field.clone());
                                if let Some(&target_idx) = nodes.get(&target) {
                                    edges.push((caller_idx, target_idx, Some(call.pos.clone())));
                                    continue;
                                }
                            }
                            // Method call: class-hierarchy style, by name.
                            if let Some(methods) = methods_by_name.get(field) {
                                for method in methods {
                                    let target_idx = nodes[method];
                                    edges.push((caller_idx, target_idx, Some(call.pos.clone())));
                                }
                            }
                        }
                        CalleeRef::Literal(name) => {
                            let target = FuncId {
                                pkg: pkg_path.clone(),
                                receiver: call.caller_receiver.clone(),
                                name: name.clone(),
                            };
                            if let Some(&target_idx) = nodes.get(&target) {
                                edges.push((caller_idx, target_idx, Some(call.pos.clone())));
                            }
                        }
                    }
                }
            }
        }

        for (from, to, pos) in edges {
            graph.add_edge(from, to, pos);
        }

        // Entry points: main and initializers of root packages, plus their
        // exported functions and methods.
        let mut entry_points = Vec::new();
        for pkg in package_graph.roots() {
            let Some(funcs) = funcs_by_pkg.get(&pkg.import_path) else {
                continue;
            };
            for id in funcs {
                let is_main = pkg.name == "main" && id.receiver.is_none() && id.name == "main";
                let is_init = id.name == "init" || id.name.starts_with("init#");
                let exported = id
                    .name
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_uppercase());
                if (is_main || is_init || exported) && !id.is_anonymous() {
                    entry_points.push(nodes[id]);
                }
            }
        }
        entry_points.sort_by(|a, b| graph[*a].label().cmp(&graph[*b].label()));
        entry_points.dedup();

        for funcs in funcs_by_pkg.values_mut() {
            funcs.sort_by(|a, b| a.label().cmp(&b.label()));
        }

        debug!(
            functions = nodes.len(),
            edges = graph.edge_count(),
            entry_points = entry_points.len(),
            "call graph built"
        );

        CallGraph {
            graph,
            nodes,
            positions,
            entry_points,
            methods_by_name,
            funcs_by_pkg,
        }
    }
}

/// Incoming callers of a node, used by the stack search.
pub(crate) fn callers(
    graph: &DiGraph<FuncId, Option<Position>>,
    node: NodeIndex,
) -> impl Iterator<Item = NodeIndex> + '_ {
    graph.neighbors_directed(node, Direction::Incoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use govulnscan_graph::{GoListModule, GoListPackage, PackageGraph};
    use std::fs;
    use std::path::Path;

    fn write_package(root: &Path, rel: &str, files: &[(&str, &str)]) -> Vec<String> {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        files
            .iter()
            .map(|(name, content)| {
                fs::write(dir.join(name), content).unwrap();
                name.to_string()
            })
            .collect()
    }

    fn list_package(
        root: &Path,
        rel: &str,
        import_path: &str,
        name: &str,
        imports: &[&str],
        files: Vec<String>,
        dep_only: bool,
    ) -> GoListPackage {
        GoListPackage {
            import_path: import_path.to_string(),
            name: name.to_string(),
            dir: root.join(rel),
            go_files: files,
            imports: imports.iter().map(|s| s.to_string()).collect(),
            module: Some(GoListModule {
                path: import_path.split('/').take(3).collect::<Vec<_>>().join("/"),
                version: Some("v0.1.0".to_string()),
                replace: None,
                main: !dep_only,
            }),
            standard: false,
            dep_only,
            for_test: None,
        }
    }

    fn two_package_graph(root: &Path) -> PackageGraph {
        let app_files = write_package(
            root,
            "app",
            &[(
                "main.go",
                r#"
package main

import "example.com/lib/codec"

func main() {
    codec.Decode(nil)
}
"#,
            )],
        );
        let lib_files = write_package(
            root,
            "lib/codec",
            &[(
                "codec.go",
                r#"
package codec

func Decode(data []byte) error {
    return validate(data)
}

func validate(data []byte) error { return nil }

func Unused() {}
"#,
            )],
        );

        PackageGraph::from_list(
            vec![
                list_package(
                    root,
                    "app",
                    "example.com/app",
                    "main",
                    &["example.com/lib/codec"],
                    app_files,
                    false,
                ),
                list_package(
                    root,
                    "lib/codec",
                    "example.com/lib/codec",
                    "codec",
                    &[],
                    lib_files,
                    true,
                ),
            ],
            "go1.21.3",
        )
        .unwrap()
    }

    #[test]
    fn test_cross_package_edges() {
        let dir = tempfile::tempdir().unwrap();
        let packages = two_package_graph(dir.path());
        let cg = CallGraph::build(&packages, &CancelToken::new()).unwrap();

        let main = cg.node(&FuncId::func("example.com/app", "main")).unwrap();
        let decode = cg
            .node(&FuncId::func("example.com/lib/codec", "Decode"))
            .unwrap();
        assert!(cg.graph.find_edge(main, decode).is_some());

        // Importing codec wires app's init to codec's init.
        let app_init = cg.node(&FuncId::func("example.com/app", "init")).unwrap();
        let codec_init = cg
            .node(&FuncId::func("example.com/lib/codec", "init"))
            .unwrap();
        assert!(cg.graph.find_edge(app_init, codec_init).is_some());
    }

    #[test]
    fn test_entry_points_are_roots_only() {
        let dir = tempfile::tempdir().unwrap();
        let packages = two_package_graph(dir.path());
        let cg = CallGraph::build(&packages, &CancelToken::new()).unwrap();

        for &entry in cg.entry_points() {
            assert_eq!(cg.func(entry).pkg, "example.com/app");
        }
    }

    #[test]
    fn test_find_symbol_forms() {
        let dir = tempfile::tempdir().unwrap();
        write_package(
            dir.path(),
            "lib",
            &[(
                "lib.go",
                r#"
package lib

type Buffer struct{}

func (b *Buffer) Write(p []byte) {}

func Write() {}
"#,
            )],
        );
        let packages = PackageGraph::from_list(
            vec![list_package(
                dir.path(),
                "lib",
                "example.com/lib",
                "lib",
                &[],
                vec!["lib.go".to_string()],
                false,
            )],
            "go1.21.3",
        )
        .unwrap();
        let cg = CallGraph::build(&packages, &CancelToken::new()).unwrap();

        let plain = cg.find_symbol("example.com/lib", "Write");
        assert_eq!(plain.len(), 1);
        assert!(plain[0].receiver.is_none());

        let method = cg.find_symbol("example.com/lib", "Buffer.Write");
        assert_eq!(method.len(), 1);
        assert_eq!(method[0].receiver.as_deref(), Some("*Buffer"));

        let starred = cg.find_symbol("example.com/lib", "(*Buffer).Write");
        assert_eq!(starred, method);
    }
}
