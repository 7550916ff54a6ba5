//! Topological ordering of the resource dependency graph
//!
//! Kahn's algorithm over a petgraph `DiGraph`, with insertion order as the
//! tie-breaker so that siblings at the same dependency depth always come out
//! in input sequence. Deterministic output is what makes the creation order
//! (and its exact reverse, the teardown order) testable.

use crate::error::GraphError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};

/// Dependency relation over logical names. Edges point from a dependency to
/// the nodes that require it.
pub(crate) struct DependencyDag {
    graph: DiGraph<String, ()>,
    index_of: HashMap<String, NodeIndex>,
    insertion: Vec<NodeIndex>,
}

impl DependencyDag {
    pub(crate) fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index_of: HashMap::new(),
            insertion: Vec::new(),
        }
    }

    pub(crate) fn add_node(&mut self, name: &str) {
        if self.index_of.contains_key(name) {
            return;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index_of.insert(name.to_string(), idx);
        self.insertion.push(idx);
    }

    /// Add an edge `dependency -> dependent`. Both nodes must already exist;
    /// the graph builder resolves names before calling this.
    pub(crate) fn add_dependency(&mut self, dependency: &str, dependent: &str) {
        let from = self.index_of[dependency];
        let to = self.index_of[dependent];
        self.graph.add_edge(from, to, ());
    }

    /// Kahn's algorithm. Returns the creation order, or
    /// [`GraphError::CyclicDependency`] naming one node on a cycle when not
    /// every node can be consumed.
    pub(crate) fn creation_order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: HashMap<NodeIndex, usize> =
            self.graph.node_indices().map(|i| (i, 0)).collect();
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let position: HashMap<NodeIndex, usize> = self
            .insertion
            .iter()
            .enumerate()
            .map(|(pos, &idx)| (idx, pos))
            .collect();

        let mut ready: VecDeque<NodeIndex> = self
            .insertion
            .iter()
            .filter(|&idx| in_degree[idx] == 0)
            .copied()
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = ready.pop_front() {
            order.push(self.graph[idx].clone());

            let mut dependents: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect();
            dependents.sort_by_key(|n| position[n]);

            for dependent in dependents {
                let degree = in_degree.get_mut(&dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    // Keep the ready queue in input order among nodes that
                    // unblock at the same time.
                    let pos = position[&dependent];
                    let at = ready
                        .iter()
                        .position(|q| position[q] > pos)
                        .unwrap_or(ready.len());
                    ready.insert(at, dependent);
                }
            }
        }

        if order.len() != self.graph.node_count() {
            let stuck = self
                .insertion
                .iter()
                .find(|&idx| in_degree[idx] > 0)
                .map(|&idx| self.graph[idx].clone())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(GraphError::CyclicDependency(stuck));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyDag {
        let mut dag = DependencyDag::new();
        for n in nodes {
            dag.add_node(n);
        }
        for (dep, node) in edges {
            dag.add_dependency(dep, node);
        }
        dag
    }

    #[test]
    fn single_node() {
        let order = dag(&["vpc"], &[]).creation_order().unwrap();
        assert_eq!(order, vec!["vpc"]);
    }

    #[test]
    fn chain_respects_dependencies() {
        let order = dag(&["vpc", "igw", "rt"], &[("vpc", "igw"), ("igw", "rt")])
            .creation_order()
            .unwrap();
        assert_eq!(order, vec!["vpc", "igw", "rt"]);
    }

    #[test]
    fn siblings_keep_input_order() {
        let order = dag(
            &["vpc", "sub-b", "sub-a", "igw"],
            &[("vpc", "sub-b"), ("vpc", "sub-a"), ("vpc", "igw")],
        )
        .creation_order()
        .unwrap();
        assert_eq!(order, vec!["vpc", "sub-b", "sub-a", "igw"]);
    }

    #[test]
    fn diamond_is_deterministic() {
        let d = dag(
            &["vpc", "sub-1", "sub-2", "alb"],
            &[
                ("vpc", "sub-1"),
                ("vpc", "sub-2"),
                ("sub-1", "alb"),
                ("sub-2", "alb"),
            ],
        );
        let first = d.creation_order().unwrap();
        assert_eq!(first, vec!["vpc", "sub-1", "sub-2", "alb"]);
        assert_eq!(d.creation_order().unwrap(), first);
    }

    #[test]
    fn cycle_is_rejected() {
        let result = dag(&["a", "b"], &[("a", "b"), ("b", "a")]).creation_order();
        assert!(matches!(result, Err(GraphError::CyclicDependency(_))));
    }

    #[test]
    fn late_unblocked_node_sorts_by_input_position() {
        // "early" appears before "late" in the input even though both
        // unblock only after their dependencies complete.
        let order = dag(
            &["vpc", "early", "late", "base"],
            &[("vpc", "base"), ("base", "early"), ("base", "late")],
        )
        .creation_order()
        .unwrap();
        assert_eq!(order, vec!["vpc", "base", "early", "late"]);
    }
}
