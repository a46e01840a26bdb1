//! Correlation graph projection
//!
//! Nodes are the latest snapshot of each source URL. Edges are either
//! explicit (a recorded hyperlink) or inferred (two sources sharing an
//! identical entity).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{EntityType, LinkRelationship};

/// Maximum label length before truncation
pub const NODE_LABEL_MAX: usize = 20;

pub const EXPLICIT_EDGE_COLOR: &str = "#0f62fe";
pub const INFERRED_EDGE_COLOR: &str = "#da1e28";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub value: u8,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub color: String,
    pub dashes: bool,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Latest-snapshot summary for one source URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub source_url: String,
    pub title: String,
    pub score: u8,
    pub category: String,
}

/// Two sources whose latest snapshots share an entity of `entity_type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedEntityLink {
    pub source_a: String,
    pub source_b: String,
    pub entity_type: EntityType,
}

fn truncate_label(title: &str) -> String {
    if title.chars().count() > NODE_LABEL_MAX {
        let head: String = title.chars().take(NODE_LABEL_MAX).collect();
        format!("{}...", head)
    } else {
        title.to_string()
    }
}

/// Assemble the graph from persisted records.
///
/// Inferred edges are canonicalized so (A, B) and (B, A) collapse into one
/// edge per entity type.
pub fn assemble(
    nodes: Vec<NodeRecord>,
    links: Vec<LinkRelationship>,
    shared: Vec<SharedEntityLink>,
) -> Graph {
    let nodes = nodes
        .into_iter()
        .map(|n| GraphNode {
            label: truncate_label(&n.title),
            id: n.source_url,
            value: n.score,
            group: n.category,
        })
        .collect();

    let mut edges: Vec<GraphEdge> = links
        .into_iter()
        .map(|l| GraphEdge {
            from: l.source_url,
            to: l.target_url,
            color: EXPLICIT_EDGE_COLOR.to_string(),
            dashes: false,
            label: String::new(),
        })
        .collect();

    let mut seen: HashSet<(String, String, EntityType)> = HashSet::new();
    for link in shared {
        if link.source_a == link.source_b {
            continue;
        }
        let (from, to) = if link.source_a < link.source_b {
            (link.source_a, link.source_b)
        } else {
            (link.source_b, link.source_a)
        };
        if seen.insert((from.clone(), to.clone(), link.entity_type)) {
            edges.push(GraphEdge {
                from,
                to,
                color: INFERRED_EDGE_COLOR.to_string(),
                dashes: true,
                label: link.entity_type.as_str().to_string(),
            });
        }
    }

    Graph { nodes, edges }
}
