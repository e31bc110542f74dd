//! Representative call-stack selection
//!
//! For a reachable vulnerable symbol there may be many witness stacks; one
//! is chosen to report. Stacks that route through another vulnerable symbol
//! are avoided so the reported entry point is a true one; among the rest the
//! shortest stack wins, with ties broken on function labels so identical
//! inputs always produce the identical stack. The search is over acyclic
//! paths: breadth-first distances never revisit a function.

use std::collections::{HashMap, HashSet, VecDeque};

use govulnscan_core::Position;
use petgraph::graph::NodeIndex;
use petgraph::Direction;

use crate::call_graph::{callers, CallGraph, FuncId};

/// One entry of a call stack, ordered entry -> sink. `call_site` is the
/// position where this function calls the next entry; the sink carries none.
#[derive(Debug, Clone, PartialEq)]
pub struct StackEntry {
    pub func: FuncId,
    pub call_site: Option<Position>,
}

impl CallGraph {
    /// The representative stack from an entry point to `sink`, or `None`
    /// when the sink is unreachable.
    ///
    /// `vulnerable` is the full set of known vulnerable functions; a stack
    /// passing through any of them other than the sink itself is only used
    /// as a last resort.
    pub fn representative_stack(
        &self,
        sink: &FuncId,
        vulnerable: &HashSet<FuncId>,
    ) -> Option<Vec<StackEntry>> {
        let sink_idx = self.node(sink)?;

        let forbidden: HashSet<NodeIndex> = vulnerable
            .iter()
            .filter(|id| *id != sink)
            .filter_map(|id| self.node(id))
            .collect();

        self.shortest_stack(sink_idx, &forbidden)
            .or_else(|| self.shortest_stack(sink_idx, &HashSet::new()))
    }

    /// Shortest entry-to-sink stack avoiding `forbidden` interior nodes,
    /// deterministic under label tie-breaks.
    fn shortest_stack(
        &self,
        sink: NodeIndex,
        forbidden: &HashSet<NodeIndex>,
    ) -> Option<Vec<StackEntry>> {
        // Breadth-first from the sink along reversed edges: dist[n] is the
        // number of calls from n down to the sink.
        let mut dist: HashMap<NodeIndex, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        dist.insert(sink, 0);
        queue.push_back(sink);
        while let Some(node) = queue.pop_front() {
            let next_dist = dist[&node] + 1;
            for caller in callers(&self.graph, node) {
                if forbidden.contains(&caller) || dist.contains_key(&caller) {
                    continue;
                }
                dist.insert(caller, next_dist);
                queue.push_back(caller);
            }
        }

        // Entry with the fewest edges to the sink; label breaks ties.
        let entry = self
            .entry_points
            .iter()
            .copied()
            .filter(|e| dist.contains_key(e))
            .min_by(|a, b| {
                dist[a]
                    .cmp(&dist[b])
                    .then_with(|| self.graph[*a].label().cmp(&self.graph[*b].label()))
            })?;

        // Walk forward, always stepping to a neighbor one closer to the
        // sink; among equals the smallest label wins.
        let mut stack = Vec::new();
        let mut current = entry;
        while current != sink {
            let want = dist[&current] - 1;
            let next = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .filter(|n| dist.get(n) == Some(&want))
                .min_by_key(|n| self.graph[*n].label())?;
            stack.push(StackEntry {
                func: self.graph[current].clone(),
                call_site: self.call_site(current, next),
            });
            current = next;
        }
        stack.push(StackEntry {
            func: self.graph[sink].clone(),
            call_site: None,
        });
        Some(stack)
    }

    /// The call-site position for an edge; parallel edges resolve to the
    /// earliest position.
    fn call_site(&self, from: NodeIndex, to: NodeIndex) -> Option<Position> {
        self.graph
            .edges_connecting(from, to)
            .filter_map(|e| e.weight().clone())
            .min()
    }
}
