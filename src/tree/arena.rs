//! The element tree: an arena of mounted elements plus a path index.

use std::collections::{HashMap, VecDeque};

use slotmap::{SecondaryMap, SlotMap};

use super::node::{join, ElementId, TreeNode};
use crate::error::ConfigurationError;

/// Empty slice constant for returning when an element has no children.
const EMPTY_CHILDREN: &[ElementId] = &[];

/// Mounted elements, backed by a slotmap arena.
///
/// Parent/child relationships live in secondary maps so removal is O(subtree size).
/// Paths are derived, not stored on the nodes: [`rebuild_index`](Self::rebuild_index)
/// recomputes them after every structural change, renumbering list items.
pub struct ElementTree<T> {
    nodes: SlotMap<ElementId, T>,
    children: SecondaryMap<ElementId, Vec<ElementId>>,
    parent: SecondaryMap<ElementId, ElementId>,
    root: ElementId,
    index: HashMap<String, ElementId>,
    paths: SecondaryMap<ElementId, String>,
}

impl<T: TreeNode> ElementTree<T> {
    /// A tree holding only `root`. The root's path is the empty string.
    pub fn new(root: T) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(root);
        let mut children = SecondaryMap::new();
        children.insert(root, Vec::new());
        let mut tree = Self {
            nodes,
            children,
            parent: SecondaryMap::new(),
            root,
            index: HashMap::new(),
            paths: SecondaryMap::new(),
        };
        tree.reindex();
        tree
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Attach `data` under `parent` without reindexing. Call
    /// [`rebuild_index`](Self::rebuild_index) once the batch is complete.
    pub fn insert_child(&mut self, parent: ElementId, data: T) -> ElementId {
        debug_assert!(self.nodes.contains_key(parent), "parent element does not exist");
        let id = self.nodes.insert(data);
        self.children.insert(id, Vec::new());
        self.parent.insert(id, parent);
        if let Some(siblings) = self.children.get_mut(parent) {
            siblings.push(id);
        }
        id
    }

    /// Attach `data` under `parent` and reindex. A path collision undoes the insert.
    pub fn register(&mut self, parent: ElementId, data: T) -> crate::Result<ElementId> {
        let id = self.insert_child(parent, data);
        if let Err(err) = self.rebuild_index() {
            self.detach(id);
            self.reindex();
            return Err(err);
        }
        Ok(id)
    }

    /// Remove `id` and its descendants, returning them in breadth-first order.
    pub fn unregister(&mut self, id: ElementId) -> Vec<(ElementId, T)> {
        if !self.nodes.contains_key(id) || id == self.root {
            return Vec::new();
        }
        let removed = self.detach(id);
        self.reindex();
        removed
    }

    /// Recompute every path. Fails on the first collision.
    pub fn rebuild_index(&mut self) -> crate::Result<()> {
        match self.reindex() {
            Some(path) => Err(ConfigurationError::DuplicatePath(path)),
            None => Ok(()),
        }
    }

    /// Rebuild the index, returning the first duplicated path if any.
    fn reindex(&mut self) -> Option<String> {
        self.index.clear();
        self.paths.clear();
        let mut duplicate = None;

        // (element, own path, prefix for its children)
        let mut stack = vec![(self.root, String::new(), String::new())];
        while let Some((id, path, prefix)) = stack.pop() {
            if self.index.insert(path.clone(), id).is_some() && duplicate.is_none() {
                duplicate = Some(path.clone());
            }
            self.paths.insert(id, path);

            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let positional = node.positional();
            for (position, &child) in self.children(id).iter().enumerate().rev() {
                let Some(data) = self.nodes.get(child) else {
                    continue;
                };
                let child_path = if positional {
                    join(&prefix, &position.to_string())
                } else {
                    join(&prefix, data.segment())
                };
                let child_prefix = if data.transparent() {
                    prefix.clone()
                } else {
                    child_path.clone()
                };
                stack.push((child, child_path, child_prefix));
            }
        }
        duplicate
    }

    fn detach(&mut self, id: ElementId) -> Vec<(ElementId, T)> {
        if let Some(parent_id) = self.parent.remove(id) {
            if let Some(siblings) = self.children.get_mut(parent_id) {
                siblings.retain(|&child| child != id);
            }
        }

        let mut removed = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if let Some(kids) = self.children.remove(current) {
                queue.extend(kids);
            }
            self.parent.remove(current);
            if let Some(data) = self.nodes.remove(current) {
                removed.push((current, data));
            }
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.parent.get(id).copied()
    }

    /// Children in insertion order. Empty if none or unknown.
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.children
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_CHILDREN)
    }

    /// Parent first, root last.
    pub fn ancestors(&self, id: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut current = id;
        while let Some(p) = self.parent.get(current).copied() {
            result.push(p);
            current = p;
        }
        result
    }

    /// Index among the parent's children.
    pub fn position(&self, id: ElementId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn get(&self, id: ElementId) -> Option<&T> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut T> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of elements, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order depth-first traversal starting from `start`.
    pub fn walk_depth_first(&self, start: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !self.nodes.contains_key(current) {
                continue;
            }
            result.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        result
    }

    /// Every element except the root, in tree order.
    pub fn elements(&self) -> Vec<ElementId> {
        let mut all = self.walk_depth_first(self.root);
        all.remove(0);
        all
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    /// Current dotted path of `id`.
    pub fn path(&self, id: ElementId) -> Option<&str> {
        self.paths.get(id).map(String::as_str)
    }

    /// Element at an absolute path.
    pub fn resolve(&self, path: &str) -> Option<ElementId> {
        self.index.get(path).copied()
    }
}

impl<T> std::fmt::Debug for ElementTree<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut paths: Vec<_> = self.index.keys().collect();
        paths.sort();
        f.debug_struct("ElementTree")
            .field("len", &self.nodes.len())
            .field("paths", &paths)
            .finish()
    }
}
