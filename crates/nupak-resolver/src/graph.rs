//! Arena-backed restore graph: nodes, parent/child links, dispositions.

use std::fmt;

use serde::Serialize;

use nupak_core::library::{DependencyKey, LibraryIdentity};
use nupak_util::errors::{NupakError, NupakResult};

/// Index of a node in the graph arena. Ids stay valid for the arena's
/// lifetime; severed nodes are merely unlinked, never deallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resolution state of a node. Progresses monotonically from an undecided
/// state to a terminal one and never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Disposition {
    Acceptable,
    PotentiallyDowngraded,
    Cycle,
    Accepted,
    Rejected,
}

impl Disposition {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Cycle)
    }
}

/// A node in the restore graph.
///
/// A node can be reached through several parents; the graph is a DAG with
/// shared nodes, not a tree. `outer` and `inner` are kept mirror-consistent
/// by [`DependencyGraph::add_edge`].
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub key: DependencyKey,
    pub item: Option<LibraryIdentity>,
    /// Direct parents, in discovery order.
    pub outer: Vec<NodeId>,
    /// Direct children, in declaration order.
    pub inner: Vec<NodeId>,
    pub disposition: Disposition,
    /// Pinned at the root by central package management.
    pub central_transitive: bool,
}

/// The restore graph arena.
#[derive(Debug, Default, Serialize)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    pub root: Option<NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, key: DependencyKey, item: Option<LibraryIdentity>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(GraphNode {
            key,
            item,
            outer: Vec::new(),
            inner: Vec::new(),
            disposition: Disposition::Acceptable,
            central_transitive: false,
        });
        id
    }

    /// Set the root node of the graph (the project itself).
    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    /// Link `parent -> child`, maintaining both sides of the edge.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].inner.push(child);
        self.nodes[child.index()].outer.push(parent);
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id.index()]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove `id` from each parent's child list. The node keeps its own
    /// parent pointers so a diagnostic path can still be printed for it.
    pub fn sever_from_parents(&mut self, id: NodeId) {
        let parents = self.nodes[id.index()].outer.clone();
        for parent in parents {
            self.nodes[parent.index()].inner.retain(|&child| child != id);
        }
    }

    /// `name version` for resolved nodes, `name range` for unresolved ones;
    /// projects show only their name.
    pub fn label(&self, id: NodeId) -> String {
        let node = self.node(id);
        match node.item {
            Some(ref item) if item.kind.bypasses_ranges() => item.name.clone(),
            Some(ref item) => item.to_string(),
            None => node.key.to_string(),
        }
    }

    /// Check the structural invariants the resolver relies on: a root is
    /// set, and every edge is recorded consistently on both of its ends.
    pub fn validate(&self) -> NupakResult<()> {
        if self.root.is_none() {
            return Err(NupakError::InvalidGraph {
                message: "graph has no root".to_string(),
            }
            .into());
        }
        for id in self.node_ids() {
            let node = self.node(id);
            for &parent in &node.outer {
                let ours = node.outer.iter().filter(|&&p| p == parent).count();
                let theirs = self
                    .node(parent)
                    .inner
                    .iter()
                    .filter(|&&c| c == id)
                    .count();
                if ours != theirs {
                    return Err(NupakError::InvalidGraph {
                        message: format!(
                            "edge between {parent} and {id} is one-sided ({theirs} vs {ours})"
                        ),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Render the graph as a tree rooted at the graph root, for debugging
    /// and restore logs. Shared subtrees are printed once per path but only
    /// expanded the first time.
    pub fn print_tree(&self) -> String {
        let mut output = String::new();
        let root = match self.root {
            Some(r) => r,
            None => return output,
        };

        output.push_str(&format!("{}\n", self.label(root)));

        let mut visited = vec![false; self.nodes.len()];
        visited[root.index()] = true;

        let children = &self.node(root).inner;
        let count = children.len();
        for (i, &child) in children.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(&mut output, child, "", is_last, &mut visited);
        }

        output
    }

    fn print_subtree(
        &self,
        output: &mut String,
        id: NodeId,
        prefix: &str,
        is_last: bool,
        visited: &mut [bool],
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let marker = match self.node(id).disposition {
            Disposition::Rejected => " (rejected)",
            Disposition::Cycle => " (cycle)",
            _ => "",
        };
        output.push_str(&format!("{prefix}{connector}{}{marker}\n", self.label(id)));

        if visited[id.index()] {
            return;
        }
        visited[id.index()] = true;

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let children = &self.node(id).inner;
        let count = children.len();
        for (i, &child) in children.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(output, child, &child_prefix, is_last, visited);
        }

        visited[id.index()] = false;
    }
}
