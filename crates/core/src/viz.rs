//! Layout-safe tree building: the exclusive-self transform and the
//! partition (icicle) layout.
//!
//! Partition-style layouts derive a parent's displayed size from the sum
//! of its children, not from the parent's own stored value. A node with
//! both inclusive time and children would be misrepresented unless its own
//! exclusive share is exposed as a child, so the transform injects one
//! synthetic `$parent` leaf per interior node and zeroes the original.

use std::collections::{BTreeMap, HashMap};

use callprof_protocol::ProfNode;
use callprof_protocol::path::{self, PARENT};

/// Recompute `child_time` for every node: the sum of its *direct*
/// children's inclusive time. Direct children already include their own
/// descendants, so this is the node's total descendant time.
pub fn compute_child_times(nodes: &mut BTreeMap<String, ProfNode>) {
    for node in nodes.values_mut() {
        node.child_time = 0.0;
    }
    let contributions: Vec<(String, f64)> = nodes
        .iter()
        .filter_map(|(key, node)| {
            path::parent_of(key).map(|parent| (parent.to_string(), node.time))
        })
        .collect();
    for (parent, time) in contributions {
        if let Some(node) = nodes.get_mut(&parent) {
            node.child_time += time;
        }
    }
}

/// Inject an exclusive-self `$parent` leaf under every node with positive
/// child time and zero the node's own stored time, so summing a node's
/// children reproduces its original inclusive time exactly.
///
/// Nodes that already carry a `$parent` child (trees merged from
/// finalize-written raw files) are left alone, which makes the transform
/// idempotent. Leaves are untouched; their stored time is already correct.
pub fn inject_self_nodes(nodes: &mut BTreeMap<String, ProfNode>) {
    compute_child_times(nodes);

    let mut leaves: Vec<ProfNode> = Vec::new();
    let mut zeroed: Vec<String> = Vec::new();
    for (key, node) in nodes.iter() {
        if node.short_name == PARENT || node.child_time <= 0.0 {
            continue;
        }
        let self_key = path::child_of(key, PARENT);
        if nodes.contains_key(&self_key) {
            continue;
        }
        let mut leaf = ProfNode::new(self_key);
        leaf.time = node.self_time();
        leaf.count = 1;
        leaves.push(leaf);
        zeroed.push(key.clone());
    }

    for leaf in leaves {
        nodes.insert(leaf.name.clone(), leaf);
    }
    for key in zeroed {
        if let Some(node) = nodes.get_mut(&key) {
            node.time = 0.0;
        }
    }
}

/// One laid-out rectangle of the icicle view, in root-time units.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRect {
    /// Full call path.
    pub name: String,
    /// Trailing path segment, used as the display label.
    pub short_name: String,
    pub depth: u32,
    /// Horizontal offset in seconds from the left edge.
    pub x: f64,
    /// Width in seconds: this node's layout value.
    pub width: f64,
}

/// Partition layout over a transformed node set.
///
/// A node's layout value is the sum of its children's values; leaves
/// contribute their stored time. After [`inject_self_nodes`] the children
/// of an interior node sum to its original inclusive time, so widths are
/// proportional to real durations. Children are laid out heaviest-first.
pub fn layout_partition(nodes: &BTreeMap<String, ProfNode>) -> Vec<LayoutRect> {
    // Children index and root set. A node whose parent path is absent from
    // the map is treated as a root (top-level sibling of `$total`).
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut roots: Vec<&str> = Vec::new();
    for key in nodes.keys() {
        match path::parent_of(key) {
            Some(parent) if nodes.contains_key(parent) => {
                children.entry(parent).or_default().push(key);
            }
            _ => roots.push(key),
        }
    }

    // Bottom-up layout values: deepest paths first so every child's value
    // is ready when its parent sums them.
    let mut keys_by_depth: Vec<&str> = nodes.keys().map(String::as_str).collect();
    keys_by_depth.sort_by_key(|key| std::cmp::Reverse(path::split(key).count()));

    let mut values: HashMap<&str, f64> = HashMap::new();
    for key in keys_by_depth {
        let value = match children.get(key) {
            Some(kids) if !kids.is_empty() => kids
                .iter()
                .map(|kid| values.get(kid).copied().unwrap_or(0.0))
                .sum(),
            _ => nodes[key].time,
        };
        values.insert(key, value);
    }

    let mut rects = Vec::with_capacity(nodes.len());
    layout_level(&roots, 0, 0.0, &children, &values, &mut rects);
    rects
}

fn layout_level(
    keys: &[&str],
    depth: u32,
    mut x: f64,
    children: &HashMap<&str, Vec<&str>>,
    values: &HashMap<&str, f64>,
    rects: &mut Vec<LayoutRect>,
) {
    let mut ordered: Vec<&str> = keys.to_vec();
    ordered.sort_by(|a, b| {
        let (va, vb) = (values[a], values[b]);
        vb.total_cmp(&va).then_with(|| a.cmp(b))
    });

    for key in ordered {
        let width = values[key];
        rects.push(LayoutRect {
            name: key.to_string(),
            short_name: path::last_segment(key).to_string(),
            depth,
            x,
            width,
        });
        if let Some(kids) = children.get(key) {
            layout_level(kids, depth + 1, x, children, values, rects);
        }
        x += width;
    }
}
