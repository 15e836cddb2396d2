//! Feature states and the value rules each kind follows.

use std::time::Duration;

use crate::conditions::Condition;
use crate::error::AsyncSourceError;
use crate::form::events::ChangeHandler;
use crate::schema::{ElementDescriptor, Items, Schema};
use crate::validation::ValidationState;
use crate::value::{parse_date, ObjectMap, Value};

use super::kind::ElementKind;

// ---------------------------------------------------------------------------
// Plain feature states
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BaseState {
    pub kind: ElementKind,
    pub name: String,
    pub disabled: bool,
    pub readonly: bool,
    /// Part of submitted data.
    pub submit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LabelState {
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub description: Option<String>,
    pub info: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutState {
    /// Width on a 12-column grid.
    pub columns: u8,
}

impl Default for LayoutState {
    fn default() -> Self {
        Self { columns: 12 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConditionsState {
    pub condition: Option<Condition>,
    /// Result of the element's own conditions.
    pub own: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EventsState {
    pub handlers: Vec<ChangeHandler>,
}

#[derive(Debug, Clone)]
pub struct ValidationFeature {
    pub state: ValidationState,
    pub debounce: Option<Duration>,
}

/// Children of containers: a nested schema, or a list item template.
#[derive(Debug, Clone, Default)]
pub struct ChildrenState {
    pub schema: Option<Schema>,
    pub template: Option<ElementDescriptor>,
    /// Items a list starts with when it has no default.
    pub initial: usize,
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// The value container of a leaf element.
#[derive(Debug, Clone, Default)]
pub struct ValueState {
    pub value: Value,
    pub default: Value,
    pub null: Value,
    /// Compared against to compute `dirty`.
    pub baseline: Value,
    pub previous: Value,
    pub true_value: Value,
    pub false_value: Value,
}

impl ValueState {
    pub fn dirty(&self) -> bool {
        self.value != self.baseline
    }
}

/// Languages of a multilingual element.
#[derive(Debug, Clone, Default)]
pub struct LanguagesState {
    pub languages: Vec<String>,
}

/// The empty value of a kind.
pub fn null_value(kind: ElementKind, languages: &[String], false_value: &Value) -> Value {
    match kind {
        ElementKind::Checkbox | ElementKind::Toggle => false_value.clone(),
        ElementKind::TText | ElementKind::TTextarea => Value::Object(
            languages
                .iter()
                .map(|lang| (lang.clone(), Value::Null))
                .collect(),
        ),
        ElementKind::Object | ElementKind::Group => Value::object(),
        ElementKind::List | ElementKind::Dates => Value::List(Vec::new()),
        _ => Value::Null,
    }
}

/// Bring `value` into the shape `kind` stores.
///
/// Dates parse from strings (unparsable strings are kept so the `date` rule can reject
/// them), toggles map onto their true/false values, files accept file values, names or
/// null, containers fall back to their null value for anything but their own shape.
pub fn coerce(kind: ElementKind, value: Value, state: &ValueState) -> Value {
    match kind {
        ElementKind::Date => coerce_date(value),
        ElementKind::Dates => match value {
            Value::List(items) => Value::List(items.into_iter().map(coerce_date).collect()),
            Value::Null => Value::List(Vec::new()),
            single => Value::List(vec![coerce_date(single)]),
        },
        ElementKind::Checkbox | ElementKind::Toggle => {
            if value == state.true_value {
                state.true_value.clone()
            } else if value == state.false_value {
                state.false_value.clone()
            } else {
                let on = match &value {
                    Value::Bool(b) => *b,
                    Value::Number(n) => *n != 0.0,
                    Value::String(s) => matches!(s.as_str(), "1" | "true" | "on" | "yes"),
                    _ => false,
                };
                if on {
                    state.true_value.clone()
                } else {
                    state.false_value.clone()
                }
            }
        }
        ElementKind::File => match value {
            Value::File(_) | Value::String(_) => value,
            _ => Value::Null,
        },
        ElementKind::Object | ElementKind::Group => match value {
            Value::Object(_) => value,
            _ => state.null.clone(),
        },
        ElementKind::List => match value {
            Value::List(_) => value,
            _ => state.null.clone(),
        },
        ElementKind::TText | ElementKind::TTextarea => match value {
            Value::Object(map) => {
                let mut merged = state.null.as_object().cloned().unwrap_or_default();
                merged.extend(map);
                Value::Object(merged)
            }
            _ => state.null.clone(),
        },
        _ => value,
    }
}

fn coerce_date(value: Value) -> Value {
    match &value {
        Value::String(s) => parse_date(s).map(Value::Date).unwrap_or(value),
        _ => value,
    }
}

/// Default of a child named `name` carried by its parent's default.
pub fn child_default(parent_default: Option<&Value>, name: &str) -> Option<Value> {
    match parent_default? {
        Value::Object(map) => map.get(name).cloned(),
        Value::List(items) => name.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A normalised select option.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub value: Value,
    pub label: Value,
}

impl SelectOption {
    pub fn to_value(&self) -> Value {
        let mut map = ObjectMap::new();
        map.insert("value".to_owned(), self.value.clone());
        map.insert("label".to_owned(), self.label.clone());
        Value::Object(map)
    }
}

/// Option list of a select-like element.
#[derive(Debug, Clone, Default)]
pub struct ItemsState {
    pub source: Option<Items>,
    pub options: Vec<SelectOption>,
    pub error: Option<AsyncSourceError>,
    /// Store the whole option instead of its value.
    pub object: bool,
    pub value_prop: String,
    pub label_prop: String,
}

impl ItemsState {
    /// Replace the options from a raw list or mapping.
    pub fn set_options(&mut self, raw: &Value) {
        self.options = normalize_options(raw, &self.value_prop, &self.label_prop);
    }

    /// The option `value` selects, matched loosely (`1` finds `"1"`).
    pub fn find(&self, value: &Value) -> Option<&SelectOption> {
        let key = match value {
            Value::Object(map) if self.object => map.get(&self.value_prop)?,
            other => other,
        };
        self.options
            .iter()
            .find(|o| crate::conditions::expr::loose_eq(&o.value, key))
    }
}

/// Normalise options.
///
/// - a list of scalars: the position is the value, the item the label
/// - a list of objects: `value_prop` and `label_prop` are read from each
/// - a mapping: the key is the value, the entry the label
pub fn normalize_options(raw: &Value, value_prop: &str, label_prop: &str) -> Vec<SelectOption> {
    match raw {
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(map) => SelectOption {
                    value: map.get(value_prop).cloned().unwrap_or_default(),
                    label: map.get(label_prop).cloned().unwrap_or_default(),
                },
                scalar => SelectOption {
                    value: Value::from(index as u64),
                    label: scalar.clone(),
                },
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(key, label)| SelectOption {
                value: Value::from(key.as_str()),
                label: label.clone(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Generic name
// ---------------------------------------------------------------------------

/// Display name substituted for `:attribute`.
///
/// Label, then placeholder, then the capitalised name. File elements without a label
/// whose name is a list position use `file_word` instead.
pub fn generic_name(kind: ElementKind, labels: &LabelState, segment: &str, file_word: &str) -> String {
    if let Some(label) = labels.label.as_deref().filter(|l| !l.is_empty()) {
        return label.to_owned();
    }
    if kind == ElementKind::File {
        if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
            return file_word.to_owned();
        }
    } else if let Some(placeholder) = labels.placeholder.as_deref().filter(|p| !p.is_empty()) {
        return placeholder.to_owned();
    }
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
