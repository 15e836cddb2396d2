//! Schema input: element descriptors and their nesting.

pub mod descriptor;

pub use descriptor::{
    ConditionsSpec, ElementDescriptor, ElementOptions, Items, ItemsLoader, RuleSpecItem, RulesSpec,
    Schema,
};
