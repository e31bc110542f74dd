//! Call-graph reachability analysis for Go targets
//!
//! Builds a whole-program call graph from the package graph's Go sources
//! and answers the question behind symbol-level findings: is there a path
//! from one of the target's entry points to a vulnerable symbol, and what
//! does a representative witness stack look like?
//!
//! ## Example
//!
//! ```no_run
//! use govulnscan_core::CancelToken;
//! use govulnscan_reachability::{CallGraph, FuncId};
//! use std::collections::HashSet;
//!
//! # fn demo(packages: &govulnscan_graph::PackageGraph) {
//! let graph = CallGraph::build(packages, &CancelToken::new()).unwrap();
//! let sink = FuncId::func("golang.org/x/text/language", "Parse");
//! if let Some(stack) = graph.representative_stack(&sink, &HashSet::new()) {
//!     println!("reachable through {} frames", stack.len());
//! }
//! # }
//! ```

pub mod ast;
pub mod call_graph;
mod error;
pub mod stacks;
pub mod summary;

pub use call_graph::{CallGraph, FuncId};
pub use error::{ReachError, Result};
pub use stacks::StackEntry;
pub use summary::summarize;
