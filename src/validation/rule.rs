//! The [`Rule`] trait and what a rule sees when it runs.

use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::value::Value;

/// How size-based rules (`min`, `max`, `between`, `gt`...) measure a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// The value as a number.
    Numeric,
    /// Character count.
    String,
    /// Item count.
    Array,
    /// Kilobytes.
    File,
}

impl Subject {
    /// Key used to pick the matching locale message variant.
    pub fn key(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Array => "array",
            Self::File => "file",
        }
    }

    /// Mode for a value when no shape rule is declared: files measure as files,
    /// lists as arrays, everything else by character count.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::File(_) => Self::File,
            Value::List(_) => Self::Array,
            _ => Self::String,
        }
    }

    /// Measure `value` in this mode. `None` when the value has no size in this mode
    /// (a non-numeric string in numeric mode).
    pub fn measure(self, value: &Value) -> Option<f64> {
        match self {
            Self::Numeric => value.to_number(),
            Self::String => Some(match value {
                Value::Null => 0.0,
                Value::String(s) => s.chars().count() as f64,
                other => other.to_string().chars().count() as f64,
            }),
            Self::Array => match value {
                Value::Null => Some(0.0),
                Value::List(items) => Some(items.len() as f64),
                Value::Object(map) => Some(map.len() as f64),
                _ => None,
            },
            Self::File => match value {
                Value::Null => Some(0.0),
                Value::File(file) => Some(file.kilobytes()),
                _ => None,
            },
        }
    }
}

/// Outcome of a single rule check.
pub enum Check {
    Pass,
    Fail,
    /// Needs external resolution; resolves to `true` when valid.
    Deferred(LocalBoxFuture<'static, bool>),
}

impl Check {
    pub fn from_bool(valid: bool) -> Self {
        if valid {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("Pass"),
            Self::Fail => f.write_str("Fail"),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Read access to the rest of the form, resolved relative to the element being
/// validated. Used by cross-field rules at check time.
pub trait Lookup {
    /// Live value of the referenced element, `None` when no element has that path.
    fn value(&self, reference: &str) -> Option<Value>;

    /// Display name of the referenced element.
    fn generic_name(&self, reference: &str) -> Option<String>;
}

/// A lookup with no other elements, for checking rules in isolation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLookup;

impl Lookup for NoLookup {
    fn value(&self, _reference: &str) -> Option<Value> {
        None
    }

    fn generic_name(&self, _reference: &str) -> Option<String> {
        None
    }
}

/// Everything a rule sees.
pub struct RuleInput<'a> {
    pub value: &'a Value,
    pub params: &'a [String],
    pub subject: Subject,
    /// Name segment of the element being validated.
    pub name: &'a str,
    pub lookup: &'a dyn Lookup,
}

impl RuleInput<'_> {
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Parameter parsed as a number. An `@path` parameter reads the referenced value.
    pub fn number(&self, index: usize) -> Option<f64> {
        let param = self.param(index)?.trim();
        match param.strip_prefix('@') {
            Some(path) => self.other(path).to_number(),
            None => param.parse().ok(),
        }
    }

    /// Parameter as a value, `@path` parameters replaced by the referenced value.
    pub fn resolved(&self, index: usize) -> Option<Value> {
        let param = self.param(index)?.trim();
        Some(match param.strip_prefix('@') {
            Some(path) => self.other(path),
            None => Value::from(param),
        })
    }

    /// Parameters from `from` on, resolved. A reference to a list contributes its items.
    pub fn resolved_params(&self, from: usize) -> Vec<Value> {
        (from..self.params.len())
            .filter_map(|index| self.resolved(index))
            .flat_map(|value| match value {
                Value::List(items) => items,
                single => vec![single],
            })
            .collect()
    }

    /// Measure the rule's own value.
    pub fn size(&self) -> Option<f64> {
        self.subject.measure(self.value)
    }

    /// Value of another element. Missing references read as null.
    pub fn other(&self, reference: &str) -> Value {
        self.lookup.value(reference).unwrap_or_default()
    }

    /// Display name of another element, falling back to the reference itself.
    pub fn other_name(&self, reference: &str) -> String {
        self.lookup
            .generic_name(reference)
            .unwrap_or_else(|| reference.trim_start_matches('@').to_owned())
    }
}

/// A named validation check.
///
/// Implementations must be pure with respect to their inputs: the engine may call
/// `check` again whenever the value or a referenced element changes.
pub trait Rule {
    /// Run the check.
    fn check(&self, input: &RuleInput<'_>) -> Check;

    /// Implicit rules also run on empty values (`required`, `accepted`...). All others
    /// pass on an empty value.
    fn implicit(&self) -> bool {
        false
    }

    /// Size-based rules pick their message by [`Subject`].
    fn sized(&self) -> bool {
        false
    }

    /// Shape rules (`numeric`, `array`...) set the measuring mode for the whole chain.
    fn subject(&self) -> Option<Subject> {
        None
    }

    /// Validate parameters at parse time.
    fn check_params(&self, _params: &[String]) -> Result<(), String> {
        Ok(())
    }

    /// Paths of other elements this rule reads, given its parameters and the owning
    /// element's name. The engine re-runs the rule when any of them changes.
    fn references(&self, _params: &[String], _name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Placeholder values for the message template, besides `:attribute`.
    fn placeholders(&self, _input: &RuleInput<'_>) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// A host-provided synchronous rule built from a closure.
pub struct FnRule {
    check: Box<dyn Fn(&Value, &[String]) -> bool>,
    implicit: bool,
}

impl FnRule {
    pub fn new(check: impl Fn(&Value, &[String]) -> bool + 'static) -> Self {
        Self {
            check: Box::new(check),
            implicit: false,
        }
    }

    /// Also run on empty values (builder).
    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }
}

impl Rule for FnRule {
    fn check(&self, input: &RuleInput<'_>) -> Check {
        Check::from_bool((self.check)(input.value, input.params))
    }

    fn implicit(&self) -> bool {
        self.implicit
    }
}

/// A host-provided rule needing external resolution (uniqueness checks, remote
/// endpoints). The closure receives owned copies so the future can outlive the check.
pub struct AsyncRule {
    check: Rc<dyn Fn(Value, Vec<String>) -> LocalBoxFuture<'static, bool>>,
}

impl AsyncRule {
    pub fn new<F, Fut>(check: F) -> Self
    where
        F: Fn(Value, Vec<String>) -> Fut + 'static,
        Fut: std::future::Future<Output = bool> + 'static,
    {
        Self {
            check: Rc::new(move |value, params| Box::pin(check(value, params))),
        }
    }
}

impl Rule for AsyncRule {
    fn check(&self, input: &RuleInput<'_>) -> Check {
        Check::Deferred((self.check)(input.value.clone(), input.params.to_vec()))
    }
}
