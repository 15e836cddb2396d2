//! Reference resolution: sibling-relative first, then absolute.

use super::arena::ElementTree;
use super::node::{join, parent_prefix, ElementId, TreeNode};

impl<T: TreeNode> ElementTree<T> {
    /// Resolve `reference` as seen from `from`.
    ///
    /// `"zip"` written on `address.city` finds `address.zip` before a top-level `zip`.
    /// A leading `@` is accepted and ignored.
    pub fn resolve_from(&self, from: ElementId, reference: &str) -> Option<ElementId> {
        let reference = reference.trim().trim_start_matches('@');
        if reference.is_empty() {
            return None;
        }
        let prefix = self.path(from).map(parent_prefix).unwrap_or_default();
        if !prefix.is_empty() {
            if let Some(id) = self.resolve(&join(prefix, reference)) {
                return Some(id);
            }
        }
        self.resolve(reference)
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::arena::tests::Node;
    use crate::tree::arena::ElementTree;

    #[test]
    fn sibling_before_absolute() {
        let mut tree = ElementTree::new(Node::Root);
        let root = tree.root();
        let zip = tree.insert_child(root, Node::Field("zip"));
        let address = tree.insert_child(root, Node::Field("address"));
        let inner_zip = tree.insert_child(address, Node::Field("zip"));
        let city = tree.insert_child(address, Node::Field("city"));
        let name = tree.insert_child(root, Node::Field("name"));
        tree.rebuild_index().unwrap();

        assert_eq!(tree.resolve_from(city, "zip"), Some(inner_zip));
        assert_eq!(tree.resolve_from(name, "zip"), Some(zip));
        assert_eq!(tree.resolve_from(city, "@address.zip"), Some(inner_zip));
        assert_eq!(tree.resolve_from(city, "name"), Some(name));
        assert_eq!(tree.resolve_from(city, "missing"), None);
        assert_eq!(tree.resolve_from(city, ""), None);
    }
}
