//! Validation: the rule mini-language, built-in rules, locale messages and the
//! per-element validation state.

pub mod engine;
pub mod messages;
pub mod parser;
pub mod registry;
pub mod rule;
pub mod rules;
pub mod tokenizer;

pub use engine::{SlotKey, SlotState, ValidationContext, ValidationResult, ValidationState, ValidationTicket};
pub use messages::{interpolate, Locale, Locales, MessageEntry};
pub use parser::{parse_rules, ParsedRule};
pub use registry::{RuleInstance, RuleRegistry};
pub use rule::{AsyncRule, Check, FnRule, Lookup, NoLookup, Rule, RuleInput, Subject};
pub use rules::Builtin;
