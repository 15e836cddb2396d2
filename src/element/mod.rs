//! Elements: kinds, feature recipes and composition.

pub mod composed;
pub mod features;
pub mod kind;
pub mod recipe;

pub use composed::{compose, ComposeContext, ComposedElement, PostMount};
pub use features::{SelectOption, ValueState};
pub use kind::ElementKind;
pub use recipe::{recipe, Feature};
