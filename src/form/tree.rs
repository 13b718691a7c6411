//! Navigation tree seam
//!
//! The sidebar tree is an external widget; the engine only talks to it
//! through [`TreeWidget`]. The trait surface is what the mirroring logic
//! needs: id-keyed lookup, subtree insertion and removal, per-node label and
//! class rewriting, selection and open state.
//!
//! [`SimpleTree`] is a plain in-memory implementation, enough to run the
//! engine headless and to assert tree/form consistency in tests.

use crate::form::error::{EditError, EditResult};

/// Where a new node goes relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreePosition {
    /// Anchor is the future parent, node becomes its first child.
    FirstChild,
    /// Anchor is the future parent, node becomes its last child.
    LastChild,
    /// Anchor is the future next sibling.
    Before,
    /// Anchor is the future previous sibling.
    After,
}

impl TreePosition {
    /// Wire spelling used by add/paste responses.
    pub fn from_wire(s: &str) -> Option<TreePosition> {
        match s {
            "first" | "inside" => Some(TreePosition::FirstChild),
            "last" => Some(TreePosition::LastChild),
            "before" => Some(TreePosition::Before),
            "after" => Some(TreePosition::After),
            _ => None,
        }
    }
}

/// A node (with its subtree) handed to the widget for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNodeInfo {
    pub id: String,
    /// Space-separated class tokens; the first one is the node's type tag.
    pub classes: String,
    /// Markup label shown next to the node.
    pub label: String,
    pub children: Vec<TreeNodeInfo>,
}

/// The widget contract the mirroring logic is written against.
pub trait TreeWidget {
    /// Number of attached nodes with this id. More than one means the widget
    /// holds inconsistent state, and locator resolution reports it.
    fn count(&self, id: &str) -> usize;
    fn contains(&self, id: &str) -> bool {
        self.count(id) > 0
    }
    fn parent_id(&self, id: &str) -> Option<String>;
    fn child_ids(&self, id: &str) -> Vec<String>;
    fn root_ids(&self) -> Vec<String>;

    fn label(&self, id: &str) -> Option<String>;
    fn set_label(&mut self, id: &str, label: &str);
    fn classes(&self, id: &str) -> Option<String>;
    fn set_classes(&mut self, id: &str, classes: &str);
    /// Change a node's id in place, keeping its position and subtree.
    fn change_id(&mut self, old: &str, new: &str);

    fn insert(&mut self, anchor: &str, position: TreePosition, node: TreeNodeInfo)
        -> EditResult<()>;
    /// Remove a node and its whole subtree. Unknown ids are a no-op.
    fn remove(&mut self, id: &str);
    /// Snapshot a node and its subtree, e.g. to re-insert it elsewhere.
    fn export(&self, id: &str) -> Option<TreeNodeInfo>;

    fn select(&mut self, id: &str);
    fn deselect_all(&mut self);
    fn selected(&self) -> Option<String>;

    fn open(&mut self, id: &str);
    fn close(&mut self, id: &str);
    fn is_open(&self, id: &str) -> bool;
}

#[derive(Debug, Clone)]
struct SimpleNode {
    id: String,
    classes: String,
    label: String,
    open: bool,
    alive: bool,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// In-memory [`TreeWidget`].
#[derive(Debug, Clone, Default)]
pub struct SimpleTree {
    nodes: Vec<SimpleNode>,
    roots: Vec<usize>,
    selected: Option<usize>,
}

impl SimpleTree {
    pub fn new() -> Self {
        SimpleTree::default()
    }

    /// Build a tree with a single root subtree.
    pub fn with_root(root: TreeNodeInfo) -> Self {
        let mut tree = SimpleTree::new();
        let index = tree.build(root, None);
        tree.roots.push(index);
        tree
    }

    fn build(&mut self, info: TreeNodeInfo, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(SimpleNode {
            id: info.id,
            classes: info.classes,
            label: info.label,
            open: false,
            alive: true,
            parent,
            children: Vec::new(),
        });
        for child in info.children {
            let child_index = self.build(child, Some(index));
            self.nodes[index].children.push(child_index);
        }
        index
    }

    fn lookup(&self, id: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.alive && n.id == id)
    }

    fn export_index(&self, index: usize) -> TreeNodeInfo {
        let node = &self.nodes[index];
        TreeNodeInfo {
            id: node.id.clone(),
            classes: node.classes.clone(),
            label: node.label.clone(),
            children: node
                .children
                .iter()
                .filter(|&&c| self.nodes[c].alive)
                .map(|&c| self.export_index(c))
                .collect(),
        }
    }

    fn kill(&mut self, index: usize) {
        self.nodes[index].alive = false;
        let children = self.nodes[index].children.clone();
        for child in children {
            self.kill(child);
        }
    }
}

impl TreeWidget for SimpleTree {
    fn count(&self, id: &str) -> usize {
        self.nodes.iter().filter(|n| n.alive && n.id == id).count()
    }

    fn parent_id(&self, id: &str) -> Option<String> {
        let index = self.lookup(id)?;
        self.nodes[index]
            .parent
            .map(|p| self.nodes[p].id.clone())
    }

    fn child_ids(&self, id: &str) -> Vec<String> {
        match self.lookup(id) {
            Some(index) => self.nodes[index]
                .children
                .iter()
                .filter(|&&c| self.nodes[c].alive)
                .map(|&c| self.nodes[c].id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    fn root_ids(&self) -> Vec<String> {
        self.roots
            .iter()
            .filter(|&&r| self.nodes[r].alive)
            .map(|&r| self.nodes[r].id.clone())
            .collect()
    }

    fn label(&self, id: &str) -> Option<String> {
        self.lookup(id).map(|i| self.nodes[i].label.clone())
    }

    fn set_label(&mut self, id: &str, label: &str) {
        if let Some(index) = self.lookup(id) {
            self.nodes[index].label = label.to_string();
        }
    }

    fn classes(&self, id: &str) -> Option<String> {
        self.lookup(id).map(|i| self.nodes[i].classes.clone())
    }

    fn set_classes(&mut self, id: &str, classes: &str) {
        if let Some(index) = self.lookup(id) {
            self.nodes[index].classes = classes.to_string();
        }
    }

    fn change_id(&mut self, old: &str, new: &str) {
        if let Some(index) = self.lookup(old) {
            self.nodes[index].id = new.to_string();
        }
    }

    fn insert(
        &mut self,
        anchor: &str,
        position: TreePosition,
        node: TreeNodeInfo,
    ) -> EditResult<()> {
        let anchor_index = self
            .lookup(anchor)
            .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", anchor)))?;
        match position {
            TreePosition::FirstChild | TreePosition::LastChild => {
                let new_index = self.build(node, Some(anchor_index));
                if position == TreePosition::FirstChild {
                    self.nodes[anchor_index].children.insert(0, new_index);
                } else {
                    self.nodes[anchor_index].children.push(new_index);
                }
            }
            TreePosition::Before | TreePosition::After => {
                let parent = self.nodes[anchor_index].parent;
                let new_index = self.build(node, parent);
                let slots = match parent {
                    Some(p) => &mut self.nodes[p].children,
                    None => &mut self.roots,
                };
                let at = slots
                    .iter()
                    .position(|&c| c == anchor_index)
                    .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", anchor)))?;
                let at = if position == TreePosition::Before {
                    at
                } else {
                    at + 1
                };
                slots.insert(at, new_index);
            }
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) {
        if let Some(index) = self.lookup(id) {
            if let Some(parent) = self.nodes[index].parent {
                self.nodes[parent].children.retain(|&c| c != index);
            } else {
                self.roots.retain(|&r| r != index);
            }
            if self.selected == Some(index) {
                self.selected = None;
            }
            self.kill(index);
        }
    }

    fn export(&self, id: &str) -> Option<TreeNodeInfo> {
        let index = self.lookup(id)?;
        Some(self.export_index(index))
    }

    fn select(&mut self, id: &str) {
        self.selected = self.lookup(id);
    }

    fn deselect_all(&mut self) {
        self.selected = None;
    }

    fn selected(&self) -> Option<String> {
        self.selected.map(|i| self.nodes[i].id.clone())
    }

    fn open(&mut self, id: &str) {
        if let Some(index) = self.lookup(id) {
            self.nodes[index].open = true;
        }
    }

    fn close(&mut self, id: &str) {
        if let Some(index) = self.lookup(id) {
            self.nodes[index].open = false;
        }
    }

    fn is_open(&self, id: &str) -> bool {
        self.lookup(id).map(|i| self.nodes[i].open).unwrap_or(false)
    }
}

/// Shorthand used by tests and local node rebuilding.
pub fn node(id: &str, classes: &str, label: &str) -> TreeNodeInfo {
    TreeNodeInfo {
        id: id.to_string(),
        classes: classes.to_string(),
        label: label.to_string(),
        children: Vec::new(),
    }
}
