//! Cycle detection.

use std::fmt::Display;
use std::hash::Hash;

use crate::error::CycleError;

use super::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

impl<N> Graph<N>
where
    N: Clone + Eq + Hash + Display,
{
    /// Checks the graph for cycles.
    ///
    /// Walks depth-first from every unvisited node in insertion order. The
    /// first edge found pointing into a node still on the walk stack closes a
    /// cycle, which is reported in reference order: each node depends on the
    /// next one via the paired label.
    ///
    /// # Errors
    ///
    /// Returns the first [`CycleError`] found.
    pub fn detect_cycle(&self) -> Result<(), CycleError> {
        let mut color = vec![Color::White; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if color[start] != Color::White {
                continue;
            }

            // (node, next outgoing edge to try)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            // labels[i] is the edge from stack[i] to stack[i + 1]
            let mut labels: Vec<&str> = Vec::new();
            color[start] = Color::Grey;

            while let Some(top) = stack.last_mut() {
                let (node, next) = *top;
                if let Some(edge) = self.edges[node].get(next) {
                    top.1 += 1;
                    match color[edge.to] {
                        Color::White => {
                            color[edge.to] = Color::Grey;
                            labels.push(edge.label.as_str());
                            stack.push((edge.to, 0));
                        }
                        Color::Grey => {
                            let pos = stack
                                .iter()
                                .position(|&(n, _)| n == edge.to)
                                .unwrap_or(0);
                            let nodes: Vec<usize> = stack[pos..].iter().map(|&(n, _)| n).collect();
                            let mut cycle_labels = labels[pos..].to_vec();
                            cycle_labels.push(edge.label.as_str());
                            return Err(self.cycle_error(&nodes, &cycle_labels));
                        }
                        Color::Black => {}
                    }
                } else {
                    color[node] = Color::Black;
                    stack.pop();
                    labels.pop();
                }
            }
        }

        Ok(())
    }

    /// Turns a walk `n0 -> n1 -> ... -> n0` into reference order.
    fn cycle_error(&self, walk: &[usize], walk_labels: &[&str]) -> CycleError {
        let nodes = walk
            .iter()
            .rev()
            .map(|&idx| self.nodes[idx].to_string())
            .collect();
        let mut labels: Vec<String> = walk_labels.iter().rev().map(|l| (*l).to_string()).collect();
        labels.rotate_left(1);
        CycleError { nodes, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acyclic() {
        let mut g = Graph::new();
        g.add_directed_edge("a", "b", "x").expect("edge");
        g.add_directed_edge("a", "c", "y").expect("edge");
        g.add_directed_edge("b", "c", "z").expect("edge");
        assert!(g.detect_cycle().is_ok());
    }

    #[test]
    fn test_three_node_cycle() {
        let mut g = Graph::new();
        g.add_directed_edge("a", "b", "b.ref_a").expect("edge");
        g.add_directed_edge("b", "c", "c.ref_b").expect("edge");
        g.add_directed_edge("c", "a", "a.ref_c").expect("edge");

        let err = g.detect_cycle().expect_err("cycle");
        assert_eq!(err.nodes, vec!["c", "b", "a"]);
        assert_eq!(err.labels, vec!["c.ref_b", "b.ref_a", "a.ref_c"]);
        assert_eq!(
            err.to_string(),
            "cycle detected: c refers to b via c.ref_b which refers to a via b.ref_a which refers to c via a.ref_c."
        );
    }

    #[test]
    fn test_cycle_excludes_tail() {
        let mut g = Graph::new();
        g.add_directed_edge("root", "a", "r").expect("edge");
        g.add_directed_edge("a", "b", "x").expect("edge");
        g.add_directed_edge("b", "a", "y").expect("edge");

        let err = g.detect_cycle().expect_err("cycle");
        assert_eq!(err.nodes.len(), 2);
        assert!(!err.nodes.contains(&"root".to_string()));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut g = Graph::new();
        g.add_directed_edge("a", "b", "1").expect("edge");
        g.add_directed_edge("a", "c", "2").expect("edge");
        g.add_directed_edge("b", "d", "3").expect("edge");
        g.add_directed_edge("c", "d", "4").expect("edge");
        assert!(g.detect_cycle().is_ok());
    }
}
