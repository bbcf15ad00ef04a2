//! Command tree built from operation paths.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Each distinct
//! path prefix owns exactly one node, so `services/list` and `services/add`
//! share the `services` container. A node may be both a leaf (it has an
//! operation) and a container (it has children) when the manifest declares
//! both `services` and `services/list`.

use indexmap::IndexMap;

use crate::manifest::{Manifest, Operation};

/// Index of a node in the arena.
pub type NodeId = usize;

/// One path segment of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    /// The segment itself, e.g. `add`.
    pub name: String,
    /// Full path up to and including this segment, e.g. `services/add`.
    pub path: String,
    /// Index into the manifest's operations when this node is a leaf.
    pub operation: Option<usize>,
    /// Child nodes in insertion order.
    pub children: Vec<NodeId>,
}

impl CommandNode {
    /// Whether invoking this node runs an operation.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.operation.is_some()
    }

    /// Whether this node has subcommands.
    #[must_use]
    pub fn is_container(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Arena of command nodes indexed by path.
#[derive(Debug, Clone, Default)]
pub struct CommandTree {
    nodes: Vec<CommandNode>,
    index: IndexMap<String, NodeId>,
    roots: Vec<NodeId>,
}

impl CommandTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the tree for every operation in `manifest`, in declaration order.
    #[must_use]
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut tree = Self::new();
        for (i, op) in manifest.operations.iter().enumerate() {
            tree.insert(&op.path, i);
        }
        tree
    }

    /// Inserts `path`, creating missing prefix nodes, and binds its last
    /// segment to `operation`. Returns the leaf node.
    pub fn insert(&mut self, path: &str, operation: usize) -> NodeId {
        let mut parent: Option<NodeId> = None;
        let mut prefix = String::new();

        for segment in path.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);

            let id = if let Some(&existing) = self.index.get(&prefix) {
                existing
            } else {
                let id = self.nodes.len();
                self.nodes.push(CommandNode {
                    name: segment.to_string(),
                    path: prefix.clone(),
                    operation: None,
                    children: Vec::new(),
                });
                self.index.insert(prefix.clone(), id);
                match parent {
                    Some(p) => self.nodes[p].children.push(id),
                    None => self.roots.push(id),
                }
                id
            };
            parent = Some(id);
        }

        // `split` yields at least one segment.
        let leaf = parent.unwrap_or_default();
        self.nodes[leaf].operation = Some(operation);
        leaf
    }

    /// Node by ID.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &CommandNode {
        &self.nodes[id]
    }

    /// Node at exactly `path`.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&CommandNode> {
        self.index.get(path).map(|&id| &self.nodes[id])
    }

    /// Top-level nodes in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = &CommandNode> {
        self.roots.iter().map(|&id| &self.nodes[id])
    }

    /// Children of `node` in insertion order.
    pub fn children<'a>(&'a self, node: &'a CommandNode) -> impl Iterator<Item = &'a CommandNode> {
        node.children.iter().map(|&id| &self.nodes[id])
    }

    /// Total number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Operation bound to `node`, looked up in `manifest`.
    #[must_use]
    pub fn operation<'m>(&self, node: &CommandNode, manifest: &'m Manifest) -> Option<&'m Operation> {
        node.operation.and_then(|i| manifest.operations.get(i))
    }
}
