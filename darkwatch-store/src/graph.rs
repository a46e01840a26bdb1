//! Graph Builder
//!
//! Reads persisted snapshots and relationships and projects them into the
//! correlation graph. Runs on demand, independent of scanning.

use tracing::debug;

use darkwatch_core::{assemble, Graph};

use crate::store::{Store, StoreError};

/// Build the correlation graph from the current store contents
pub fn build_graph(store: &dyn Store) -> Result<Graph, StoreError> {
    let nodes = store.graph_nodes()?;
    let links = store.graph_links()?;
    let shared = store.shared_entity_links()?;

    let graph = assemble(nodes, links, shared);
    debug!(
        "Graph built: {} nodes, {} edges",
        graph.nodes.len(),
        graph.edges.len()
    );
    Ok(graph)
}
