//! Dependency graph construction from reference expressions.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::{ConfigTree, ID_FIELD, ResourceNode, collect_references};
use crate::error::{ConfigError, Result};
use crate::graph::Graph;

/// Builds the graph of declared resources.
///
/// A resource whose configuration contains `${resources.g.k.id}` depends
/// on `g.k`; the edge is labelled with the expression.
///
/// # Errors
///
/// Returns a [`ConfigError`] for malformed references, references to
/// undeclared resources or to fields other than `id`, and a cycle error for
/// a resource referring to itself.
pub fn build_dependency_graph(tree: &ConfigTree) -> Result<Graph<ResourceNode>> {
    let mut graph = Graph::new();
    let nodes = tree.resource_nodes();
    for node in &nodes {
        graph.add_node(node.clone());
    }

    for node in &nodes {
        let config = tree.resource_config(node)?;
        for reference in collect_references(&config, node)? {
            if !tree.contains(&reference.target) {
                return Err(ConfigError::UndeclaredReference {
                    node: node.to_string(),
                    target: reference.target.to_string(),
                    expression: reference.expression,
                }
                .into());
            }
            if reference.field != ID_FIELD {
                return Err(ConfigError::UnsupportedReferenceField {
                    node: node.to_string(),
                    field: reference.field,
                    expression: reference.expression,
                }
                .into());
            }
            graph.add_directed_edge(reference.target, node.clone(), reference.expression)?;
        }
    }

    debug!("Built dependency graph with {} resources", graph.len());
    Ok(graph)
}

/// Builds the deletion order for recorded resources.
///
/// Dependents are deleted before what they reference. References are read
/// from the current configuration where the resource is still declared;
/// anything unreadable simply adds no edge.
#[must_use]
pub fn destroy_graph(tree: &ConfigTree, recorded: &[ResourceNode]) -> Graph<ResourceNode> {
    let mut graph = Graph::new();
    for node in recorded {
        graph.add_node(node.clone());
    }

    let known: BTreeSet<&ResourceNode> = recorded.iter().collect();
    for node in recorded {
        let Ok(config) = tree.resource_config(node) else {
            continue;
        };
        let Ok(references) = collect_references(&config, node) else {
            warn!("Ignoring malformed references of {node} when ordering deletes");
            continue;
        };
        for reference in references {
            if reference.target == *node || !known.contains(&reference.target) {
                continue;
            }
            if let Err(e) = graph.add_directed_edge(reference.target, node.clone(), reference.expression) {
                warn!("Ignoring delete ordering edge: {e}");
            }
        }
    }

    if let Err(e) = graph.detect_cycle() {
        warn!("Deleting without ordering: {e}");
        let mut flat = Graph::new();
        for node in recorded {
            flat.add_node(node.clone());
        }
        return flat;
    }
    graph.reversed()
}
