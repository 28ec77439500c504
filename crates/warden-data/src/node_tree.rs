//! Hierarchical wildcard permission matching.
//!
//! Permission names are dot-delimited paths. A query is answered by the
//! value of the deepest node on its path that carries a non-zero value, so
//! an entry for `world.edit` covers `world.edit.blocks` unless a more
//! specific entry overrides it.
//!
//! ```text
//! entries                  query                  result
//! world = 1                world.edit.blocks       1
//! world.edit = -1          world.edit.blocks      -1
//! world.edit.blocks = 2    world.edit.blocks       2
//! *  = 1                   anything                1  (root)
//! ```
//!
//! Matching is case-insensitive and a trailing `.*` is equivalent to the
//! bare prefix (`world.*` == `world`).

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
struct Node {
    value: i32,
    children: HashMap<String, Node>,
}

/// Longest-prefix permission matcher built from a flat permission map.
///
/// # Example
///
/// ```
/// use warden_data::NodeTree;
///
/// let tree = NodeTree::from_entries([("world", 1), ("world.edit", -1)]);
/// assert_eq!(tree.get("world.view"), 1);
/// assert_eq!(tree.get("world.edit.blocks"), -1);
/// assert_eq!(tree.get("chat"), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    root: Node,
}

impl NodeTree {
    /// Builds a tree from a permission map.
    #[must_use]
    pub fn from_map(permissions: &BTreeMap<String, i32>) -> Self {
        Self::from_entries(permissions.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    /// Builds a tree from `(permission, value)` pairs; `0` values are ignored.
    #[must_use]
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, i32)>) -> Self {
        let mut tree = Self::default();
        for (name, value) in entries {
            tree.insert(name, value);
        }
        tree
    }

    fn insert(&mut self, name: &str, value: i32) {
        if value == 0 {
            return;
        }
        let mut node = &mut self.root;
        for part in path(name) {
            node = node.children.entry(part).or_default();
        }
        node.value = value;
    }

    /// Value of the deepest matching entry for `permission`, `0` if none.
    #[must_use]
    pub fn get(&self, permission: &str) -> i32 {
        let mut node = &self.root;
        let mut best = node.value;
        for part in path(permission) {
            match node.children.get(&part) {
                Some(child) => {
                    node = child;
                    if node.value != 0 {
                        best = node.value;
                    }
                }
                None => break,
            }
        }
        best
    }

    /// Value applying to every permission without a more specific entry.
    #[must_use]
    pub fn root_value(&self) -> i32 {
        self.root.value
    }

    /// `true` when the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.value == 0 && self.root.children.is_empty()
    }

    /// Flattens the tree back into normalized `(permission, value)` pairs.
    ///
    /// The root entry is reported as `*`.
    #[must_use]
    pub fn as_map(&self) -> BTreeMap<String, i32> {
        let mut out = BTreeMap::new();
        if self.root.value != 0 {
            out.insert("*".to_string(), self.root.value);
        }
        flatten(&self.root, &mut String::new(), &mut out);
        out
    }
}

fn flatten(node: &Node, prefix: &mut String, out: &mut BTreeMap<String, i32>) {
    for (name, child) in &node.children {
        let len = prefix.len();
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(name);
        if child.value != 0 {
            out.insert(prefix.clone(), child.value);
        }
        flatten(child, prefix, out);
        prefix.truncate(len);
    }
}

fn path(name: &str) -> impl Iterator<Item = String> + '_ {
    let name = name.trim();
    let name = if name == "*" {
        ""
    } else {
        name.strip_suffix(".*").unwrap_or(name)
    };
    name.split('.')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
}
