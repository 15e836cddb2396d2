//! Element registry: the mounted tree, its path index and reference resolution.

pub mod arena;
pub mod node;
pub mod query;

pub use arena::ElementTree;
pub use node::{join, last_segment, parent_prefix, ElementId, TreeNode};
