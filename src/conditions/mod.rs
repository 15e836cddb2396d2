//! Availability conditions.
//!
//! A conditions tree decides whether an element is *available*: unavailable elements
//! keep their value but drop out of form data and validation.

pub mod expr;

pub use expr::{Condition, Operator};
