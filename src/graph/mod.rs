//! Dependency graph over resource nodes.
//!
//! Edges point from a dependency to its dependent: `add_directed_edge(a, b, _)`
//! means `b` must not start before `a` has finished. Node insertion order is
//! preserved and drives every traversal, so scheduling is deterministic for a
//! given configuration.

mod cycle;
mod run;

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use crate::error::CycleError;

pub use run::RunOutcome;

/// A labelled outgoing edge.
#[derive(Debug, Clone)]
struct Edge {
    /// Index of the dependent node.
    to: usize,
    /// Human-readable description used in diagnostics.
    label: String,
}

/// Directed graph with labelled edges and stable node order.
#[derive(Debug, Clone)]
pub struct Graph<N> {
    /// Nodes in first-insertion order.
    nodes: Vec<N>,
    /// Node to position in `nodes`.
    index: HashMap<N, usize>,
    /// Outgoing edges per node.
    edges: Vec<Vec<Edge>>,
}

impl<N> Default for Graph<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        }
    }
}

impl<N> Graph<N>
where
    N: Clone + Eq + Hash + Display,
{
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node if not already present and returns its position.
    pub fn add_node(&mut self, node: N) -> usize {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.nodes.len();
        self.index.insert(node.clone(), idx);
        self.nodes.push(node);
        self.edges.push(Vec::new());
        idx
    }

    /// Adds an edge meaning `to` depends on `from`.
    ///
    /// Both endpoints are added if missing.
    ///
    /// # Errors
    ///
    /// Returns a single-node [`CycleError`] when `from == to`.
    pub fn add_directed_edge(
        &mut self,
        from: N,
        to: N,
        label: impl Into<String>,
    ) -> Result<(), CycleError> {
        let label = label.into();
        if from == to {
            return Err(CycleError {
                nodes: vec![from.to_string()],
                labels: vec![label],
            });
        }
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        self.edges[from_idx].push(Edge { to: to_idx, label });
        Ok(())
    }

    /// Returns the nodes in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if the node is part of the graph.
    #[must_use]
    pub fn contains(&self, node: &N) -> bool {
        self.index.contains_key(node)
    }

    /// Returns the direct dependents of a node.
    #[must_use]
    pub fn dependents(&self, node: &N) -> Vec<&N> {
        self.index.get(node).map_or_else(Vec::new, |&idx| {
            self.edges[idx].iter().map(|e| &self.nodes[e.to]).collect()
        })
    }

    /// Returns true if anything depends on the node.
    #[must_use]
    pub fn has_dependents(&self, node: &N) -> bool {
        self.index
            .get(node)
            .is_some_and(|&idx| !self.edges[idx].is_empty())
    }

    /// Returns the direct dependencies of a node.
    #[must_use]
    pub fn dependencies(&self, node: &N) -> Vec<&N> {
        let Some(&target) = self.index.get(node) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, out)| out.iter().any(|e| e.to == target))
            .map(|(idx, _)| &self.nodes[idx])
            .collect()
    }

    /// Iterates over all edges as `(from, to, label)`.
    pub fn edges(&self) -> impl Iterator<Item = (&N, &N, &str)> {
        self.edges.iter().enumerate().flat_map(move |(from, out)| {
            out.iter()
                .map(move |e| (&self.nodes[from], &self.nodes[e.to], e.label.as_str()))
        })
    }

    /// Returns a copy of the graph with every edge reversed.
    ///
    /// Node order is kept, so the reversed graph schedules dependents
    /// before the nodes they depend on.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut out = Self {
            nodes: self.nodes.clone(),
            index: self.index.clone(),
            edges: vec![Vec::new(); self.nodes.len()],
        };
        for (from, edges) in self.edges.iter().enumerate() {
            for edge in edges {
                out.edges[edge.to].push(Edge {
                    to: from,
                    label: edge.label.clone(),
                });
            }
        }
        out
    }

    /// Returns one valid execution order, or the first cycle found.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] if the graph is not acyclic.
    pub fn topological_order(&self) -> Result<Vec<&N>, CycleError> {
        self.detect_cycle()?;
        let mut in_degree = self.in_degrees();
        let mut ready: std::collections::VecDeque<usize> =
            (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(idx) = ready.pop_front() {
            order.push(&self.nodes[idx]);
            for edge in &self.edges[idx] {
                in_degree[edge.to] -= 1;
                if in_degree[edge.to] == 0 {
                    ready.push_back(edge.to);
                }
            }
        }
        Ok(order)
    }

    /// Counts incoming edges per node.
    fn in_degrees(&self) -> Vec<usize> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for edge in self.edges.iter().flatten() {
            in_degree[edge.to] += 1;
        }
        in_degree
    }
}
