//! Element identity and what the tree needs to know about a node.

use slotmap::new_key_type;

new_key_type! {
    /// Stable identity of a mounted element. Copy, lightweight (u64).
    ///
    /// Paths change when list items are removed; ids never do.
    pub struct ElementId;
}

/// How a node contributes to the dotted paths of itself and its children.
pub trait TreeNode {
    /// Name segment as written in the schema.
    fn segment(&self) -> &str;

    /// Children share this node's parent prefix (groups, the form root).
    fn transparent(&self) -> bool {
        false
    }

    /// Children are addressed by position rather than by name (lists).
    fn positional(&self) -> bool {
        false
    }
}

/// Join a path prefix and a segment.
pub fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}.{segment}")
    }
}

/// Everything before the last segment; empty for top-level paths.
pub fn parent_prefix(path: &str) -> &str {
    path.rsplit_once('.').map_or("", |(prefix, _)| prefix)
}

/// The last segment of a path.
pub fn last_segment(path: &str) -> &str {
    path.rsplit_once('.').map_or(path, |(_, last)| last)
}
