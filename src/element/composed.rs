//! Composition: descriptor + recipe → [`ComposedElement`].

use std::time::Duration;

use indexmap::IndexMap;

use crate::conditions::Condition;
use crate::error::ConfigurationError;
use crate::schema::{ConditionsSpec, ElementDescriptor, Items};
use crate::tree::TreeNode;
use crate::validation::{RuleRegistry, SlotKey, ValidationState};
use crate::value::{ObjectMap, Value};

use super::features::{
    child_default, coerce, generic_name, null_value, BaseState, ChildrenState, ConditionsState,
    EventsState, ItemsState, LabelState, LanguagesState, LayoutState, ValidationFeature,
    ValueState,
};
use super::kind::ElementKind;
use super::recipe::{recipe, Feature};

/// Work that runs once the element is registered, before the mounting call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostMount {
    /// Put validation into its untouched state.
    InitValidation,
    /// First evaluation of the element's conditions.
    EvaluateConditions,
    /// Start the async items loader.
    LoadItems,
}

/// What composition needs from the surrounding form.
pub struct ComposeContext<'a> {
    /// Path the element will be registered under, for error messages.
    pub path: &'a str,
    /// Default value of the parent container.
    pub parent_default: Option<&'a Value>,
    pub registry: &'a RuleRegistry,
    /// Form languages, for multilingual kinds.
    pub languages: &'a [String],
    pub default_debounce: Option<Duration>,
}

/// A mounted element: one state per feature of its recipe.
#[derive(Debug, Clone)]
pub struct ComposedElement {
    pub features: &'static [Feature],
    pub base: BaseState,
    pub languages: Option<LanguagesState>,
    pub value: Option<ValueState>,
    pub conditions: ConditionsState,
    pub validation: Option<ValidationFeature>,
    pub events: EventsState,
    pub labels: LabelState,
    pub layout: LayoutState,
    pub items: Option<ItemsState>,
    pub children: Option<ChildrenState>,
    /// Per-rule message overrides.
    pub messages: IndexMap<String, String>,
    pub hooks: Vec<PostMount>,
}

impl ComposedElement {
    /// The implicit container at the top of every form.
    pub fn root() -> Self {
        let null = Value::object();
        Self {
            features: recipe(ElementKind::Group),
            base: BaseState {
                kind: ElementKind::Group,
                name: String::new(),
                disabled: false,
                readonly: false,
                submit: true,
            },
            languages: None,
            value: Some(ValueState {
                value: null.clone(),
                default: null.clone(),
                baseline: null.clone(),
                previous: null.clone(),
                null,
                true_value: Value::Bool(true),
                false_value: Value::Bool(false),
            }),
            conditions: ConditionsState {
                condition: None,
                own: true,
            },
            validation: Some(ValidationFeature {
                state: ValidationState::new(Vec::new(), [None]),
                debounce: None,
            }),
            events: EventsState::default(),
            labels: LabelState::default(),
            layout: LayoutState::default(),
            items: None,
            children: Some(ChildrenState::default()),
            messages: IndexMap::new(),
            hooks: Vec::new(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.base.kind
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn is_container(&self) -> bool {
        self.base.kind.is_container()
    }

    /// Stored value of a leaf; containers derive theirs from their children.
    pub fn own_value(&self) -> Value {
        self.value.as_ref().map(|v| v.value.clone()).unwrap_or_default()
    }

    pub fn default_value(&self) -> Value {
        self.value.as_ref().map(|v| v.default.clone()).unwrap_or_default()
    }

    pub fn null_value(&self) -> Value {
        self.value.as_ref().map(|v| v.null.clone()).unwrap_or_default()
    }

    /// Language codes of a multilingual element.
    pub fn language_list(&self) -> &[String] {
        self.languages
            .as_ref()
            .map(|l| l.languages.as_slice())
            .unwrap_or_default()
    }

    /// The value a widget binds to.
    ///
    /// Multilingual kinds expose the active language slot. Selects expose the matched
    /// `{value, label}` option, or null while nothing matches.
    pub fn model(&self, language: &str) -> Value {
        let value = self.own_value();
        if self.kind().is_multilingual() {
            return value.get(language).cloned().unwrap_or_default();
        }
        if let Some(items) = &self.items {
            return match items.find(&value) {
                Some(option) => option.to_value(),
                None if items.object && matches!(value, Value::Object(_)) => value,
                None => Value::Null,
            };
        }
        value
    }

    /// What storing `model` through the widget puts into the value.
    pub fn value_from_model(&self, model: Value, language: &str) -> Value {
        if self.kind().is_multilingual() {
            let mut value = self.own_value();
            if let Some(map) = value.as_object_mut() {
                map.insert(language.to_owned(), model);
            }
            return value;
        }
        match &self.items {
            Some(items) if !items.object => match &model {
                Value::Object(map) => map.get(&items.value_prop).cloned().unwrap_or_default(),
                _ => model,
            },
            _ => model,
        }
    }

    /// Coerce `value` into this element's shape.
    pub fn coerce(&self, value: Value) -> Value {
        match &self.value {
            Some(state) => coerce(self.kind(), value, state),
            None => value,
        }
    }

    /// Display name used in messages.
    pub fn generic_name(&self, segment: &str, file_word: &str) -> String {
        generic_name(self.kind(), &self.labels, segment, file_word)
    }

    pub fn validation_state(&self) -> Option<&ValidationState> {
        self.validation.as_ref().map(|v| &v.state)
    }

    pub fn validation_state_mut(&mut self) -> Option<&mut ValidationState> {
        self.validation.as_mut().map(|v| &mut v.state)
    }

    pub fn has_rules(&self) -> bool {
        self.validation_state().is_some_and(ValidationState::has_rules)
    }

    pub fn debounce(&self) -> Option<Duration> {
        self.validation.as_ref().and_then(|v| v.debounce)
    }

    /// Validation slots of this element.
    pub fn slots(&self) -> Vec<SlotKey> {
        if self.kind().is_multilingual() {
            self.language_list().iter().cloned().map(Some).collect()
        } else {
            vec![None]
        }
    }
}

impl TreeNode for ComposedElement {
    fn segment(&self) -> &str {
        &self.base.name
    }

    fn transparent(&self) -> bool {
        self.base.kind == ElementKind::Group
    }

    fn positional(&self) -> bool {
        self.base.kind == ElementKind::List
    }
}

/// Compose `descriptor` by applying its kind's recipe feature by feature.
pub fn compose(descriptor: &ElementDescriptor, ctx: &ComposeContext<'_>) -> crate::Result<ComposedElement> {
    let kind = ElementKind::parse(&descriptor.kind, ctx.path)?;
    let features = recipe(kind);
    let invalid = |reason: &str| ConfigurationError::InvalidDescriptor {
        path: ctx.path.to_owned(),
        reason: reason.to_owned(),
    };

    let mut element = ComposedElement {
        features,
        base: BaseState {
            kind,
            name: descriptor.name.clone(),
            disabled: descriptor.disabled,
            readonly: descriptor.readonly,
            submit: descriptor.submit.unwrap_or(true),
        },
        languages: None,
        value: None,
        conditions: ConditionsState {
            condition: None,
            own: true,
        },
        validation: None,
        events: EventsState::default(),
        labels: LabelState::default(),
        layout: LayoutState::default(),
        items: None,
        children: None,
        messages: descriptor.messages.clone(),
        hooks: Vec::new(),
    };

    for feature in features {
        match feature {
            Feature::Base => {}
            Feature::Path => {
                if descriptor.name.is_empty() {
                    return Err(invalid("element has no name"));
                }
                if descriptor.name.contains('.') {
                    return Err(invalid("names may not contain `.`"));
                }
            }
            Feature::Languages => {
                if ctx.languages.is_empty() {
                    return Err(invalid("multilingual element in a form without languages"));
                }
                element.languages = Some(LanguagesState {
                    languages: ctx.languages.to_vec(),
                });
            }
            Feature::NullValue => {
                let true_value = descriptor.true_value.clone().unwrap_or(Value::Bool(true));
                let false_value = descriptor.false_value.clone().unwrap_or(Value::Bool(false));
                let null = null_value(kind, element.language_list(), &false_value);
                element.value = Some(ValueState {
                    null,
                    true_value,
                    false_value,
                    ..ValueState::default()
                });
            }
            Feature::Default => {
                let inherited = if kind == ElementKind::Group {
                    ctx.parent_default.cloned()
                } else {
                    child_default(ctx.parent_default, &descriptor.name)
                };
                let raw = descriptor.default.clone().or(inherited);
                if let Some(state) = element.value.as_mut() {
                    state.default = match raw {
                        Some(value) if kind.is_multilingual() && !matches!(value, Value::Object(_)) => {
                            let filled: ObjectMap = state
                                .null
                                .as_object()
                                .map(|langs| {
                                    langs
                                        .keys()
                                        .map(|lang| (lang.clone(), value.clone()))
                                        .collect()
                                })
                                .unwrap_or_default();
                            Value::Object(filled)
                        }
                        Some(value) => coerce(kind, value, state),
                        None => state.null.clone(),
                    };
                }
            }
            Feature::Value => {
                if let Some(state) = element.value.as_mut() {
                    state.value = state.default.clone();
                    state.baseline = state.default.clone();
                    state.previous = state.null.clone();
                }
            }
            Feature::Conditions => {
                element.conditions.condition = match &descriptor.conditions {
                    None => None,
                    Some(ConditionsSpec::Tree(tree)) => Some(tree.clone()),
                    Some(ConditionsSpec::Raw(json)) => Some(Condition::from_json(json).map_err(
                        |reason| ConfigurationError::InvalidConditions {
                            path: ctx.path.to_owned(),
                            reason,
                        },
                    )?),
                };
                if element.conditions.condition.is_some() {
                    element.hooks.push(PostMount::EvaluateConditions);
                }
            }
            Feature::Label => {
                element.labels = LabelState {
                    label: descriptor.label.clone(),
                    placeholder: descriptor.placeholder.clone(),
                    description: descriptor.description.clone(),
                    info: descriptor.info.clone(),
                };
            }
            Feature::GenericName => {}
            Feature::Validation => {
                let rules = match &descriptor.rules {
                    Some(spec) => ctx.registry.compile(spec, ctx.path)?,
                    None => Vec::new(),
                };
                element.validation = Some(ValidationFeature {
                    state: ValidationState::new(rules, element.slots()),
                    debounce: None,
                });
                element.hooks.push(PostMount::InitValidation);
            }
            Feature::Events => {
                element.events.handlers = descriptor.on_change.clone();
            }
            Feature::Layout => {
                if let Some(columns) = descriptor.columns {
                    element.layout.columns = columns.clamp(1, 12);
                }
            }
            Feature::Debounce => {
                let debounce = descriptor
                    .debounce
                    .map(Duration::from_millis)
                    .or(ctx.default_debounce)
                    .filter(|d| !d.is_zero());
                if let Some(validation) = element.validation.as_mut() {
                    validation.debounce = debounce;
                }
            }
            Feature::Items => {
                let mut items = ItemsState {
                    source: descriptor.items.clone(),
                    object: descriptor.options.object,
                    value_prop: descriptor
                        .options
                        .value_prop
                        .clone()
                        .unwrap_or_else(|| "value".to_owned()),
                    label_prop: descriptor
                        .options
                        .label_prop
                        .clone()
                        .unwrap_or_else(|| "label".to_owned()),
                    ..ItemsState::default()
                };
                match &descriptor.items {
                    Some(Items::Static(raw)) => items.set_options(raw),
                    Some(Items::Loader(_)) => element.hooks.push(PostMount::LoadItems),
                    None => {}
                }
                element.items = Some(items);
            }
            Feature::Children => {
                let children = match kind {
                    ElementKind::List => ChildrenState {
                        template: Some(
                            descriptor
                                .element
                                .as_deref()
                                .cloned()
                                .ok_or_else(|| invalid("list without an item `element`"))?,
                        ),
                        initial: descriptor.initial.unwrap_or(0),
                        schema: None,
                    },
                    _ => ChildrenState {
                        schema: Some(
                            descriptor
                                .schema
                                .clone()
                                .ok_or_else(|| invalid("container without a nested `schema`"))?,
                        ),
                        template: None,
                        initial: 0,
                    },
                };
                element.children = Some(children);
            }
        }
    }

    tracing::debug!(path = ctx.path, kind = %kind, "composed element");
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    fn ctx<'a>(registry: &'a RuleRegistry, languages: &'a [String]) -> ComposeContext<'a> {
        ComposeContext {
            path: "el",
            parent_default: None,
            registry,
            languages,
            default_debounce: None,
        }
    }

    fn compose_json(json: serde_json::Value) -> crate::Result<ComposedElement> {
        let mut descriptor: ElementDescriptor = serde_json::from_value(json).unwrap();
        descriptor.name = "el".into();
        let registry = RuleRegistry::with_builtins();
        let languages = vec!["en".to_owned(), "de".to_owned()];
        compose(&descriptor, &ctx(&registry, &languages))
    }

    #[test]
    fn features_follow_recipe() {
        let el = compose_json(json!({"type": "text", "rules": "required"})).unwrap();
        assert!(el.has(Feature::Validation));
        assert!(el.has_rules());
        assert_eq!(el.hooks, vec![PostMount::InitValidation]);
    }

    #[test]
    fn unknown_kind_fails() {
        let err = compose_json(json!({"type": "slider"})).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownKind { .. }));
    }

    #[test]
    fn bad_rules_fail() {
        let err = compose_json(json!({"type": "text", "rules": "required|nope"})).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownRule { .. }));
    }

    #[test]
    fn bad_conditions_fail() {
        let err = compose_json(json!({"type": "text", "conditions": 5})).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidConditions { .. }));
    }

    #[test]
    fn containers_need_children() {
        let err = compose_json(json!({"type": "object"})).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidDescriptor { .. }));
        let err = compose_json(json!({"type": "list"})).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidDescriptor { .. }));
    }

    #[test]
    fn default_resolution() {
        let registry = RuleRegistry::with_builtins();
        let parent = Value::from(json!({"el": "from parent"}));
        let mut context = ctx(&registry, &[]);
        context.parent_default = Some(&parent);

        let descriptor = ElementDescriptor::new("text").with_name("el");
        let el = compose(&descriptor, &context).unwrap();
        assert_eq!(el.own_value(), Value::from("from parent"));

        let descriptor = ElementDescriptor::new("text").with_name("el").default_value("own");
        let el = compose(&descriptor, &context).unwrap();
        assert_eq!(el.own_value(), Value::from("own"));

        let descriptor = ElementDescriptor::new("checkbox").with_name("other");
        let el = compose(&descriptor, &context).unwrap();
        assert_eq!(el.own_value(), Value::Bool(false));
    }

    #[test]
    fn multilingual_defaults() {
        let el = compose_json(json!({"type": "ttext", "default": "hi"})).unwrap();
        assert_eq!(el.own_value(), Value::from(json!({"en": "hi", "de": "hi"})));
        assert_eq!(el.model("de"), Value::from("hi"));
        assert_eq!(el.slots(), vec![Some("en".to_owned()), Some("de".to_owned())]);

        let el = compose_json(json!({"type": "ttext", "default": {"en": "hi"}})).unwrap();
        assert_eq!(el.own_value(), Value::from(json!({"en": "hi", "de": null})));
    }

    #[test]
    fn select_model() {
        let el = compose_json(json!({"type": "select", "items": [1, 2, 3], "default": 0})).unwrap();
        assert_eq!(el.model("en"), Value::from(json!({"value": 0, "label": 1})));
        assert_eq!(
            el.value_from_model(Value::from(json!({"value": 2, "label": 3})), "en"),
            Value::from(2)
        );

        let el = compose_json(json!({
            "type": "select",
            "items": [1, 2, 3],
            "default": {"value": 0, "label": 1},
            "options": {"object": true}
        }))
        .unwrap();
        let option = Value::from(json!({"value": 2, "label": 3}));
        assert_eq!(el.value_from_model(option.clone(), "en"), option);
        assert_eq!(el.model("en"), Value::from(json!({"value": 0, "label": 1})));
    }

    #[test]
    fn async_items_register_a_hook() {
        let descriptor = ElementDescriptor::new("select")
            .with_name("el")
            .items_loader(|| async { Ok(Value::from(vec![1, 2])) });
        let registry = RuleRegistry::with_builtins();
        let el = compose(&descriptor, &ctx(&registry, &[])).unwrap();
        assert!(el.hooks.contains(&PostMount::LoadItems));
        assert!(el.items.as_ref().is_some_and(|i| i.options.is_empty()));
    }

    #[test]
    fn debounce_and_layout() {
        let el = compose_json(json!({"type": "text", "debounce": 300, "columns": 40})).unwrap();
        assert_eq!(el.debounce(), Some(Duration::from_millis(300)));
        assert_eq!(el.layout.columns, 12);
    }

    #[test]
    fn group_inherits_whole_parent_default() {
        let registry = RuleRegistry::with_builtins();
        let parent = Value::from(json!({"a": 1}));
        let mut context = ctx(&registry, &[]);
        context.parent_default = Some(&parent);
        let descriptor = ElementDescriptor::new("group")
            .with_name("g")
            .schema(Schema::new().with("a", ElementDescriptor::new("text")));
        let el = compose(&descriptor, &context).unwrap();
        assert_eq!(el.default_value(), parent);
    }
}
