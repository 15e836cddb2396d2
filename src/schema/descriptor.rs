//! Element descriptors: the schema author's input.
//!
//! Descriptors deserialize from JSON (`{"type": "text", "rules": "required"}`) or are
//! assembled with the builder methods. They are read-only once handed to a form.

use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::conditions::Condition;
use crate::form::events::{ChangeEvent, ChangeHandler};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Async option loader. Resolves to a list or mapping of options.
pub type ItemsLoader = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<Value, String>>>;

/// Where a select-like element gets its options from.
#[derive(Clone)]
pub enum Items {
    /// A list (`[1, 2, 3]` or `[{value, label}]`) or a mapping (`{"0": 1}`).
    Static(Value),
    /// Loaded once after mount.
    Loader(ItemsLoader),
}

impl fmt::Debug for Items {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Self::Loader(_) => f.write_str("Loader(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Items {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(de).map(|json| Self::Static(Value::from(json)))
    }
}

// ---------------------------------------------------------------------------
// Rules and conditions as written
// ---------------------------------------------------------------------------

/// Rules as the schema author wrote them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RulesSpec {
    /// `"required|min:3"`
    Pipe(String),
    /// `["required", "min:3", {"name": "regex", "parameters": ["^a|b$"]}]`
    List(Vec<RuleSpecItem>),
}

/// One entry of a rule list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RuleSpecItem {
    /// `"min:3"`. A single rule; pipes are not split here.
    Text(String),
    /// Explicit form, needed when parameters contain `|`, `:` or `,`.
    Object {
        name: String,
        #[serde(default)]
        parameters: Vec<serde_json::Value>,
        #[serde(default)]
        conditions: Option<serde_json::Value>,
    },
}

/// Conditions as written: raw JSON from a schema, or a tree built in code.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionsSpec {
    Raw(serde_json::Value),
    Tree(Condition),
}

impl<'de> Deserialize<'de> for ConditionsSpec {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(de).map(Self::Raw)
    }
}

/// `options` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementOptions {
    /// Store the whole `{value, label}` option as the value instead of its `value`.
    #[serde(default)]
    pub object: bool,
    /// Option key holding the value. Defaults to `"value"`.
    #[serde(default)]
    pub value_prop: Option<String>,
    /// Option key holding the label. Defaults to `"label"`.
    #[serde(default)]
    pub label_prop: Option<String>,
}

// ---------------------------------------------------------------------------
// ElementDescriptor
// ---------------------------------------------------------------------------

/// One schema element.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    /// Element kind (`"text"`, `"select"`, `"list"`...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Name segment. Filled from the schema key when omitted.
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "de_opt_value")]
    pub default: Option<Value>,
    #[serde(default)]
    pub rules: Option<RulesSpec>,
    #[serde(default)]
    pub conditions: Option<ConditionsSpec>,
    #[serde(default)]
    pub items: Option<Items>,
    #[serde(default)]
    pub options: ElementOptions,
    /// Children of object and group elements.
    #[serde(default)]
    pub schema: Option<Schema>,
    /// Item template of list elements.
    #[serde(default)]
    pub element: Option<Box<ElementDescriptor>>,
    /// Number of list items created on mount.
    #[serde(default)]
    pub initial: Option<usize>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    /// Layout width on a 12-column grid.
    #[serde(default)]
    pub columns: Option<u8>,
    /// Debounce window for change-triggered validation, in milliseconds.
    #[serde(default)]
    pub debounce: Option<u64>,
    /// Per-rule message overrides.
    #[serde(default)]
    pub messages: IndexMap<String, String>,
    /// Whether the value is part of submitted data. Defaults to true.
    #[serde(default)]
    pub submit: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_value")]
    pub true_value: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_value")]
    pub false_value: Option<Value>,
    #[serde(default)]
    pub native: Option<bool>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub readonly: bool,
    /// Change listeners attached in code.
    #[serde(skip)]
    pub on_change: Vec<ChangeHandler>,
}

impl fmt::Debug for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("default", &self.default)
            .field("rules", &self.rules)
            .field("conditions", &self.conditions)
            .field("items", &self.items)
            .field("schema", &self.schema)
            .field("element", &self.element)
            .field("on_change", &self.on_change.len())
            .finish_non_exhaustive()
    }
}

impl ElementDescriptor {
    /// Start a descriptor of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Set the name segment (builder).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the default value (builder).
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set pipe-delimited rules (builder).
    pub fn rules(mut self, rules: impl Into<String>) -> Self {
        self.rules = Some(RulesSpec::Pipe(rules.into()));
        self
    }

    /// Set rules as a list (builder).
    pub fn rule_list(mut self, rules: Vec<RuleSpecItem>) -> Self {
        self.rules = Some(RulesSpec::List(rules));
        self
    }

    /// Set a conditions tree (builder).
    pub fn conditions(mut self, condition: Condition) -> Self {
        self.conditions = Some(ConditionsSpec::Tree(condition));
        self
    }

    /// Set static items (builder).
    pub fn items(mut self, items: impl Into<Value>) -> Self {
        self.items = Some(Items::Static(items.into()));
        self
    }

    /// Set an async items loader (builder).
    pub fn items_loader<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: std::future::Future<Output = Result<Value, String>> + 'static,
    {
        self.items = Some(Items::Loader(Rc::new(move || Box::pin(loader()))));
        self
    }

    /// Set select options (builder).
    pub fn options(mut self, options: ElementOptions) -> Self {
        self.options = options;
        self
    }

    /// Set nested children for object/group elements (builder).
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the item template of a list (builder).
    pub fn element(mut self, element: ElementDescriptor) -> Self {
        self.element = Some(Box::new(element));
        self
    }

    /// Set the initial item count of a list (builder).
    pub fn initial(mut self, count: usize) -> Self {
        self.initial = Some(count);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Debounce change-triggered validation (builder).
    pub fn debounce(mut self, millis: u64) -> Self {
        self.debounce = Some(millis);
        self
    }

    /// Override the message of one rule (builder).
    pub fn message(mut self, rule: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(rule.into(), message.into());
        self
    }

    /// Exclude from submitted data (builder).
    pub fn no_submit(mut self) -> Self {
        self.submit = Some(false);
        self
    }

    /// Attach a change listener (builder).
    pub fn on_change(mut self, handler: impl FnMut(&ChangeEvent) + 'static) -> Self {
        self.on_change.push(ChangeHandler::new(handler));
        self
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// An ordered mapping of element name → descriptor.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    elements: IndexMap<String, ElementDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element under `name` (builder).
    pub fn with(mut self, name: impl Into<String>, descriptor: ElementDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    /// Add or replace an element. The descriptor's name is set to `name`.
    pub fn insert(&mut self, name: impl Into<String>, mut descriptor: ElementDescriptor) {
        let name = name.into();
        descriptor.name = name.clone();
        self.elements.insert(name, descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ElementDescriptor> {
        self.elements.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ElementDescriptor)> {
        self.elements.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Parse a schema from JSON text.
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a schema from a JSON value.
    pub fn from_json(json: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(json)?)
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, ElementDescriptor>::deserialize(de)?;
        let mut schema = Schema::new();
        for (name, descriptor) in raw {
            schema.insert(name, descriptor);
        }
        Ok(schema)
    }
}

fn de_opt_value<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Value>, D::Error> {
    Option::<serde_json::Value>::deserialize(de).map(|json| json.map(Value::from))
}
