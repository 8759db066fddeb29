//! Pane layout tree
//!
//! A resizable binary tree of panes. Leaves host terminal sessions, internal
//! nodes split space between exactly two children along one axis. Nodes live
//! in an id-indexed arena with parent/child links stored as ids, so ancestor
//! walks are O(1) lookups without ownership cycles.

use std::collections::HashMap;

use serde::Serialize;
use splitmux_protocol::SplitDirection;
use splitmux_utils::{Result, SplitmuxError};

use crate::registry::SessionId;

/// Opaque pane node identifier, allocated by the tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PaneId(u64);

impl std::fmt::Display for PaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pane-{}", self.0)
    }
}

/// Node payload: a leaf pane or a two-child split
#[derive(Debug, Clone)]
enum NodeKind {
    Pane {
        session: Option<SessionId>,
    },
    Split {
        direction: SplitDirection,
        /// Ordered children: [first/left/top, second/right/bottom]
        children: [PaneId; 2],
        /// Size percentages summing to 100, each in [10, 90] once resized
        sizes: [u8; 2],
    },
}

#[derive(Debug, Clone)]
struct PaneNode {
    parent: Option<PaneId>,
    kind: NodeKind,
}

/// Serializable snapshot of the tree for the renderer
#[derive(Debug, Clone, Serialize)]
pub struct LayoutSnapshot {
    pub root: LayoutNodeSnapshot,
    pub active_pane: PaneId,
}

/// One node of a [`LayoutSnapshot`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayoutNodeSnapshot {
    Pane {
        id: PaneId,
        session: Option<SessionId>,
    },
    Split {
        id: PaneId,
        direction: SplitDirection,
        sizes: [u8; 2],
        children: Vec<LayoutNodeSnapshot>,
    },
}

/// Binary tree of panes with an always-valid active leaf
#[derive(Debug)]
pub struct PaneLayoutTree {
    nodes: HashMap<PaneId, PaneNode>,
    root: PaneId,
    active: PaneId,
    next_id: u64,
}

impl PaneLayoutTree {
    /// Create a tree holding a single root pane
    pub fn new(session: Option<SessionId>) -> Self {
        let root = PaneId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            PaneNode {
                parent: None,
                kind: NodeKind::Pane { session },
            },
        );
        Self {
            nodes,
            root,
            active: root,
            next_id: 1,
        }
    }

    fn alloc(&mut self, node: PaneNode) -> PaneId {
        let id = PaneId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    /// Split a leaf pane, placing a fresh pane beside it
    ///
    /// The target leaf is replaced by a new split node whose children are
    /// (the original pane, a fresh pane holding `session`). The split
    /// inherits the target's slot in its former parent, or becomes the
    /// root. The fresh pane becomes active. Sizes default to 50/50.
    pub fn split(
        &mut self,
        pane_id: PaneId,
        direction: SplitDirection,
        session: Option<SessionId>,
    ) -> Result<PaneId> {
        if !self.is_pane(pane_id) {
            return Err(SplitmuxError::NotAPane(pane_id.to_string()));
        }

        let old_parent = self.nodes[&pane_id].parent;

        let new_pane = self.alloc(PaneNode {
            parent: None, // fixed up below
            kind: NodeKind::Pane { session },
        });
        let split = self.alloc(PaneNode {
            parent: old_parent,
            kind: NodeKind::Split {
                direction,
                children: [pane_id, new_pane],
                sizes: [50, 50],
            },
        });

        // The split takes the original pane's slot in its former parent
        match old_parent {
            Some(parent) => self.replace_child(parent, pane_id, split),
            None => self.root = split,
        }

        if let Some(node) = self.nodes.get_mut(&pane_id) {
            node.parent = Some(split);
        }
        if let Some(node) = self.nodes.get_mut(&new_pane) {
            node.parent = Some(split);
        }

        self.active = new_pane;
        Ok(new_pane)
    }

    /// Close a leaf pane, promoting its sibling into the parent's slot
    ///
    /// Fails on the root pane (a single-pane tree cannot be closed).
    /// Returns the session the closed pane held, if any.
    pub fn close(&mut self, pane_id: PaneId) -> Result<Option<SessionId>> {
        if !self.is_pane(pane_id) {
            return Err(SplitmuxError::NotAPane(pane_id.to_string()));
        }
        let Some(parent) = self.nodes[&pane_id].parent else {
            return Err(SplitmuxError::CannotClose);
        };

        let sibling = self
            .sibling_of(parent, pane_id)
            .ok_or_else(|| SplitmuxError::internal(format!("{} has no sibling", pane_id)))?;
        let grandparent = self.nodes[&parent].parent;

        // Rewire the grandparent's slot and the promoted node's parent
        // pointer together; a half-done splice corrupts later ancestor walks.
        match grandparent {
            Some(gp) => self.replace_child(gp, parent, sibling),
            None => self.root = sibling,
        }
        if let Some(node) = self.nodes.get_mut(&sibling) {
            node.parent = grandparent;
        }

        let removed = self.nodes.remove(&pane_id);
        self.nodes.remove(&parent);

        if self.active == pane_id {
            self.active = self.first_leaf(sibling);
        }

        match removed.map(|n| n.kind) {
            Some(NodeKind::Pane { session }) => Ok(session),
            _ => Ok(None),
        }
    }

    /// Update the active pane
    ///
    /// Returns whether observers should be re-notified: true only when the
    /// id named an existing pane and `notify` was requested. `notify=false`
    /// supports focus-only updates that must not trigger a full re-render.
    pub fn set_active(&mut self, pane_id: PaneId, notify: bool) -> bool {
        if self.is_pane(pane_id) {
            self.active = pane_id;
            notify
        } else {
            false
        }
    }

    /// Overwrite a split's size pair
    ///
    /// Sizes are clamped to [10, 90] and renormalized to sum 100 here, even
    /// though resize-drag callers already clamp, so the invariant holds no
    /// matter who calls.
    pub fn resize(&mut self, split_id: PaneId, sizes: [u8; 2]) -> Result<()> {
        let first = sizes[0].clamp(10, 90);
        match self.nodes.get_mut(&split_id) {
            Some(PaneNode {
                kind: NodeKind::Split { sizes: s, .. },
                ..
            }) => {
                *s = [first, 100 - first];
                Ok(())
            }
            _ => Err(SplitmuxError::PaneNotFound(split_id.to_string())),
        }
    }

    /// Advance the active pane to the next leaf in pre-order, wrapping
    pub fn focus_next(&mut self) -> PaneId {
        self.focus_offset(1)
    }

    /// Retreat the active pane to the previous leaf in pre-order, wrapping
    pub fn focus_previous(&mut self) -> PaneId {
        self.focus_offset(-1)
    }

    fn focus_offset(&mut self, offset: isize) -> PaneId {
        let leaves = self.all_pane_ids();
        let idx = leaves
            .iter()
            .position(|&id| id == self.active)
            .unwrap_or(0);
        let len = leaves.len() as isize;
        let next = (idx as isize + offset).rem_euclid(len) as usize;
        self.active = leaves[next];
        self.active
    }

    /// All leaf pane ids in pre-order (left-to-right spatial order)
    pub fn all_pane_ids(&self) -> Vec<PaneId> {
        let mut out = Vec::new();
        self.collect_leaves(self.root, &mut out);
        out
    }

    fn collect_leaves(&self, id: PaneId, out: &mut Vec<PaneId>) {
        match &self.nodes[&id].kind {
            NodeKind::Pane { .. } => out.push(id),
            NodeKind::Split { children, .. } => {
                for child in children {
                    self.collect_leaves(*child, out);
                }
            }
        }
    }

    /// First (leftmost/topmost) leaf under a subtree
    fn first_leaf(&self, mut id: PaneId) -> PaneId {
        loop {
            match &self.nodes[&id].kind {
                NodeKind::Pane { .. } => return id,
                NodeKind::Split { children, .. } => id = children[0],
            }
        }
    }

    /// Session hosted by a leaf pane
    pub fn pane_session(&self, pane_id: PaneId) -> Option<&SessionId> {
        match &self.nodes.get(&pane_id)?.kind {
            NodeKind::Pane { session } => session.as_ref(),
            NodeKind::Split { .. } => None,
        }
    }

    /// Attach (or detach) a session on a leaf pane
    pub fn set_pane_session(&mut self, pane_id: PaneId, session: Option<SessionId>) -> bool {
        match self.nodes.get_mut(&pane_id) {
            Some(PaneNode {
                kind: NodeKind::Pane { session: s },
                ..
            }) => {
                *s = session;
                true
            }
            _ => false,
        }
    }

    /// Whether the id names a leaf pane (splits cannot be split again directly)
    pub fn can_split(&self, pane_id: PaneId) -> bool {
        self.is_pane(pane_id)
    }

    /// Whether the pane can be closed (leaves only; never the sole root)
    pub fn can_close(&self, pane_id: PaneId) -> bool {
        self.is_pane(pane_id) && self.nodes[&pane_id].parent.is_some()
    }

    fn is_pane(&self, id: PaneId) -> bool {
        matches!(
            self.nodes.get(&id),
            Some(PaneNode {
                kind: NodeKind::Pane { .. },
                ..
            })
        )
    }

    /// Root node id
    pub fn root(&self) -> PaneId {
        self.root
    }

    /// Currently active leaf pane
    pub fn active_pane(&self) -> PaneId {
        self.active
    }

    /// Leaf count
    pub fn pane_count(&self) -> usize {
        self.all_pane_ids().len()
    }

    /// Serializable view of the whole tree for the renderer
    pub fn snapshot(&self) -> LayoutSnapshot {
        LayoutSnapshot {
            root: self.snapshot_node(self.root),
            active_pane: self.active,
        }
    }

    fn snapshot_node(&self, id: PaneId) -> LayoutNodeSnapshot {
        match &self.nodes[&id].kind {
            NodeKind::Pane { session } => LayoutNodeSnapshot::Pane {
                id,
                session: session.clone(),
            },
            NodeKind::Split {
                direction,
                children,
                sizes,
            } => LayoutNodeSnapshot::Split {
                id,
                direction: *direction,
                sizes: *sizes,
                children: children.iter().map(|c| self.snapshot_node(*c)).collect(),
            },
        }
    }

    /// Split sizes, if the id names a split
    pub fn split_sizes(&self, split_id: PaneId) -> Option<[u8; 2]> {
        match &self.nodes.get(&split_id)?.kind {
            NodeKind::Split { sizes, .. } => Some(*sizes),
            NodeKind::Pane { .. } => None,
        }
    }

    /// Parent split of a node, if it has one
    pub fn parent_of(&self, id: PaneId) -> Option<PaneId> {
        self.nodes.get(&id)?.parent
    }

    /// Replace `old` with `new` in a split's child slot, matching by id so
    /// both direction and ordering are preserved for rendering
    fn replace_child(&mut self, parent: PaneId, old: PaneId, new: PaneId) {
        if let Some(PaneNode {
            kind: NodeKind::Split { children, .. },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            for child in children.iter_mut() {
                if *child == old {
                    *child = new;
                    return;
                }
            }
        }
    }

    fn sibling_of(&self, parent: PaneId, child: PaneId) -> Option<PaneId> {
        match &self.nodes.get(&parent)?.kind {
            NodeKind::Split { children, .. } => {
                children.iter().copied().find(|&c| c != child)
            }
            NodeKind::Pane { .. } => None,
        }
    }
}

impl Default for PaneLayoutTree {
    fn default() -> Self {
        Self::new(None)
    }
}
