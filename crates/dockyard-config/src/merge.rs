//! Document merging.
//!
//! Three strategies are supported:
//! - `replace`: top-level keys of the override replace the base subtree
//! - `merge`: recursive merge of mappings, the override wins everywhere else
//! - `strategicMerge`: like `merge`, but sequences of mappings at known
//!   locations are matched element-by-element on a merge key
//!
//! Merging never fails. Where the two sides disagree the override wins.

use dockyard_core::Node;
use std::collections::HashMap;

/// How two documents are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Replace,
    Merge,
    StrategicMerge,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::Replace => write!(f, "replace"),
            MergeStrategy::Merge => write!(f, "merge"),
            MergeStrategy::StrategicMerge => write!(f, "strategicMerge"),
        }
    }
}

/// Merge keys for sequences, by location.
///
/// A location is the chain of mapping keys leading to a sequence with
/// sequence indices left out, joined with `/` (e.g. `dev/sync`).
#[derive(Debug, Clone)]
pub struct MergeKeys {
    keys: HashMap<String, String>,
}

impl MergeKeys {
    /// No merge keys: strategic merge behaves exactly like `merge`.
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    pub fn with(mut self, location: impl Into<String>, key: impl Into<String>) -> Self {
        self.keys.insert(location.into(), key.into());
        self
    }

    pub fn get(&self, location: &str) -> Option<&str> {
        self.keys.get(location).map(|s| s.as_str())
    }
}

impl Default for MergeKeys {
    /// Merge keys of the project configuration schema.
    fn default() -> Self {
        Self::empty()
            .with("deployments", "name")
            .with("dependencies", "name")
            .with("commands", "name")
            .with("vars", "name")
            .with("dev/sync", "localSubPath")
    }
}

/// Merge `overlay` into a copy of `base` using the default merge keys.
pub fn merge(base: &Node, overlay: &Node, strategy: MergeStrategy) -> Node {
    merge_with_keys(base, overlay, strategy, &MergeKeys::default())
}

/// Merge `overlay` into a copy of `base`.
pub fn merge_with_keys(
    base: &Node,
    overlay: &Node,
    strategy: MergeStrategy,
    keys: &MergeKeys,
) -> Node {
    match strategy {
        MergeStrategy::Replace => replace_top_level(base.clone(), overlay.clone()),
        MergeStrategy::Merge => deep_merge(base.clone(), overlay.clone(), &mut Vec::new(), None),
        MergeStrategy::StrategicMerge => {
            deep_merge(base.clone(), overlay.clone(), &mut Vec::new(), Some(keys))
        }
    }
}

fn replace_top_level(base: Node, overlay: Node) -> Node {
    match (base, overlay) {
        (Node::Mapping(mut base_map), Node::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                base_map.insert(key, value);
            }
            Node::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn deep_merge(
    base: Node,
    overlay: Node,
    location: &mut Vec<String>,
    keys: Option<&MergeKeys>,
) -> Node {
    match (base, overlay) {
        (Node::Mapping(mut base_map), Node::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                location.push(key.clone());
                match base_map.get_mut(&key) {
                    Some(existing) => {
                        let current = std::mem::take(existing);
                        *existing = deep_merge(current, value, location, keys);
                    }
                    None => {
                        base_map.insert(key, value);
                    }
                }
                location.pop();
            }
            Node::Mapping(base_map)
        }

        (Node::Sequence(base_items), Node::Sequence(overlay_items)) => {
            let merge_key = keys.and_then(|k| k.get(&location.join("/")));
            match merge_key {
                Some(merge_key) => Node::Sequence(merge_keyed_sequence(
                    base_items,
                    overlay_items,
                    merge_key,
                    location,
                    keys,
                )),
                None => Node::Sequence(overlay_items),
            }
        }

        (_, overlay) => overlay,
    }
}

fn merge_keyed_sequence(
    base_items: Vec<Node>,
    overlay_items: Vec<Node>,
    merge_key: &str,
    location: &mut Vec<String>,
    keys: Option<&MergeKeys>,
) -> Vec<Node> {
    let mut result = base_items;

    for item in overlay_items {
        let position = item.field(merge_key).and_then(|wanted| {
            result
                .iter()
                .position(|candidate| candidate.field(merge_key) == Some(wanted))
        });

        match position {
            Some(index) => {
                let current = std::mem::take(&mut result[index]);
                result[index] = deep_merge(current, item, location, keys);
            }
            None => result.push(item),
        }
    }

    result
}
