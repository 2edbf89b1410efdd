//! Identifier normalization.
//!
//! Client-created nodes and edges carry ids such as `task-1712345678` that
//! the store rejects. Before any write, every id that is not a store UUID is
//! replaced by a fresh v4 UUID and edge endpoints are rewritten to follow
//! their nodes. Normalizing an already normalized state is a no-op.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::model::CanvasState;

/// Result of [`normalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// State with store-compatible ids
    pub state: CanvasState,
    /// Whether any node id, edge id or endpoint was altered
    pub changed: bool,
    /// Old node id -> new node id
    pub rewrites: HashMap<String, String>,
    /// Old edge id -> new edge id
    pub edge_rewrites: HashMap<String, String>,
}

/// Whether `id` has the canonical hyphenated UUID form accepted by the store:
/// 8-4-4-4-12 hex digits, version 1-5, RFC 4122 variant. Case-insensitive.
pub fn is_store_uuid(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() != 36 {
        return false;
    }

    for (i, b) in bytes.iter().enumerate() {
        let ok = match i {
            8 | 13 | 18 | 23 => *b == b'-',
            14 => (b'1'..=b'5').contains(b),
            19 => matches!(b.to_ascii_lowercase(), b'8' | b'9' | b'a' | b'b'),
            _ => b.is_ascii_hexdigit(),
        };
        if !ok {
            return false;
        }
    }
    true
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// Replace every non-conforming or duplicate id in `state`.
///
/// The first occurrence of a valid id keeps it; later duplicates get fresh
/// ids. Edge endpoints are resolved through the node rewrite map, falling
/// back to the original value.
pub fn normalize(state: &CanvasState) -> Normalized {
    let mut out = state.clone();
    let mut rewrites: HashMap<String, String> = HashMap::new();
    let mut edge_rewrites: HashMap<String, String> = HashMap::new();
    let mut changed = false;

    let mut seen: HashSet<String> = HashSet::with_capacity(out.nodes.len());
    for node in &mut out.nodes {
        if is_store_uuid(&node.id) && !seen.contains(&node.id) {
            seen.insert(node.id.clone());
            continue;
        }

        let new_id = fresh_id();
        if !is_store_uuid(&node.id) {
            rewrites.entry(node.id.clone()).or_insert_with(|| new_id.clone());
        }
        tracing::debug!("Rewriting node id {} -> {}", node.id, new_id);
        node.id = new_id.clone();
        seen.insert(new_id);
        changed = true;
    }

    let mut seen_edges: HashSet<String> = HashSet::with_capacity(out.edges.len());
    for edge in &mut out.edges {
        if !is_store_uuid(&edge.id) || seen_edges.contains(&edge.id) {
            let new_id = fresh_id();
            if !is_store_uuid(&edge.id) {
                edge_rewrites.entry(edge.id.clone()).or_insert_with(|| new_id.clone());
            }
            edge.id = new_id;
            changed = true;
        }
        seen_edges.insert(edge.id.clone());

        if let Some(new_source) = rewrites.get(&edge.source) {
            edge.source = new_source.clone();
            changed = true;
        }
        if let Some(new_target) = rewrites.get(&edge.target) {
            edge.target = new_target.clone();
            changed = true;
        }
    }

    Normalized {
        state: out,
        changed,
        rewrites,
        edge_rewrites,
    }
}

/// Re-apply rewrite maps from an earlier [`normalize`] call to a newer state.
///
/// Used when the state moved on while a save was normalizing an older copy.
/// Returns whether anything was renamed.
pub fn apply_rewrites(
    state: &mut CanvasState,
    rewrites: &HashMap<String, String>,
    edge_rewrites: &HashMap<String, String>,
) -> bool {
    let mut changed = false;

    for node in &mut state.nodes {
        if let Some(new_id) = rewrites.get(&node.id) {
            node.id = new_id.clone();
            changed = true;
        }
    }

    for edge in &mut state.edges {
        if let Some(new_id) = edge_rewrites.get(&edge.id) {
            edge.id = new_id.clone();
            changed = true;
        }
        if let Some(new_source) = rewrites.get(&edge.source) {
            edge.source = new_source.clone();
            changed = true;
        }
        if let Some(new_target) = rewrites.get(&edge.target) {
            edge.target = new_target.clone();
            changed = true;
        }
    }

    changed
}
