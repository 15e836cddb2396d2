//! # formwork
//!
//! A schema-driven form state and validation engine.
//!
//! A schema describes elements (text fields, selects, lists, nested objects...). The
//! form mounts it into a tree of composed elements and keeps their state consistent:
//! value, dirtiness, availability under conditions, and validation with locale-aware
//! messages. Rendering is left to the host.
//!
//! ```
//! use formwork::{Form, FormConfig, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::from_json(json!({
//!     "age": {"type": "text", "rules": "numeric|max:2"},
//! }))?;
//! let mut form = Form::new(schema, FormConfig::default())?;
//! form.el_mut("age").unwrap().update("3");
//! # Ok::<(), formwork::ConfigurationError>(())
//! ```
//!
//! ## Core Systems
//!
//! - **[`schema`]**: element descriptors, from JSON or builders
//! - **[`element`]**: element kinds, per-kind feature recipes, composition
//! - **[`tree`]**: slotmap-backed element arena, paths and reference resolution
//! - **[`conditions`]**: availability expressions
//! - **[`validation`]**: rule parsing, built-in rules, messages, per-element state
//! - **[`reactive`]**: dependency graph and the flush scheduler
//! - **[`form`]**: the orchestrator, configuration, change events, element handles
//! - **[`value`]**: the engine's value type

// Foundation
pub mod error;
pub mod value;

// Input
pub mod schema;

// Core systems
pub mod conditions;
pub mod element;
pub mod tree;
pub mod validation;

// Reactivity
pub mod reactive;

// Orchestration
pub mod form;

pub use error::{AsyncSourceError, ConfigurationError, ResolutionError, Result};
pub use form::{
    ChangeEvent, ElementMut, ElementRef, Form, FormBuilder, FormConfig, MultilingualValidation,
    SubmitOutcome, ValidateOn,
};
pub use schema::{ElementDescriptor, ElementOptions, RuleSpecItem, Schema};
pub use validation::{AsyncRule, FnRule, Locale, Locales, Rule, RuleRegistry};
pub use value::{FileValue, Value};
