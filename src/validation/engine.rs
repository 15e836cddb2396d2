//! Per-element validation state.
//!
//! A validation pass has three steps so that the element's state is never borrowed
//! across an await:
//!
//! 1. [`ValidationState::begin`] runs the synchronous rules, collects the async ones
//!    and hands out a [`ValidationTicket`] stamped with a fresh generation.
//! 2. [`ValidationTicket::run`] awaits the deferred checks.
//! 3. [`ValidationState::complete`] applies the result, unless a newer pass for the same
//!    slot has been issued since.

use futures::future::{join_all, LocalBoxFuture};
use indexmap::IndexMap;

use crate::validation::messages::{interpolate, Locales};
use crate::validation::registry::RuleInstance;
use crate::validation::rule::{Check, Lookup, RuleInput, Subject};
use crate::value::Value;

/// Slot key: `None` for plain elements, the language code for multilingual ones.
pub type SlotKey = Option<String>;

/// Validation outcome of one slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotState {
    pub validated: bool,
    pub invalid: bool,
    pub errors: Vec<String>,
    pub pending: bool,
    generation: u64,
    /// What the latest pass was issued over: value, locale, display name and
    /// referenced values.
    inputs: Option<Value>,
}

/// What a pass needs to know about the element and the form around it.
pub struct ValidationContext<'a> {
    pub value: &'a Value,
    /// Name segment of the element.
    pub name: &'a str,
    /// Substituted for `:attribute`.
    pub generic_name: &'a str,
    pub lookup: &'a dyn Lookup,
    /// Per-element message overrides (`"max"` or `"max.string"`).
    pub overrides: &'a IndexMap<String, String>,
    pub locales: &'a Locales,
    pub locale: &'a str,
    pub fallback_locale: &'a str,
}

enum Entry {
    Failed(String),
    Deferred {
        message: String,
        check: LocalBoxFuture<'static, bool>,
    },
}

/// An issued validation pass.
pub struct ValidationTicket {
    slot: SlotKey,
    generation: u64,
    entries: Vec<Entry>,
}

impl ValidationTicket {
    pub fn slot(&self) -> &SlotKey {
        &self.slot
    }

    /// Whether awaiting is needed at all.
    pub fn is_ready(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| matches!(entry, Entry::Failed(_)))
    }

    /// Await every deferred check. Messages keep declaration order.
    pub async fn run(self) -> ValidationResult {
        let mut messages: Vec<Option<String>> = Vec::with_capacity(self.entries.len());
        let mut pending = Vec::new();
        for entry in self.entries {
            match entry {
                Entry::Failed(message) => messages.push(Some(message)),
                Entry::Deferred { message, check } => {
                    pending.push((messages.len(), message, check));
                    messages.push(None);
                }
            }
        }

        let (slots, rest): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|(index, message, check)| ((index, message), check))
            .unzip();
        let outcomes = join_all(rest).await;
        for ((index, message), valid) in slots.into_iter().zip(outcomes) {
            if !valid {
                messages[index] = Some(message);
            }
        }

        ValidationResult {
            slot: self.slot,
            generation: self.generation,
            errors: messages.into_iter().flatten().collect(),
        }
    }
}

/// A finished pass, ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub slot: SlotKey,
    pub generation: u64,
    pub errors: Vec<String>,
}

/// Rules plus per-slot outcomes of one element.
#[derive(Debug, Clone, Default)]
pub struct ValidationState {
    rules: Vec<RuleInstance>,
    slots: IndexMap<SlotKey, SlotState>,
}

impl ValidationState {
    /// State for an element validated once per entry of `slots`.
    pub fn new(rules: Vec<RuleInstance>, slots: impl IntoIterator<Item = SlotKey>) -> Self {
        let mut slots: IndexMap<_, _> = slots
            .into_iter()
            .map(|key| (key, SlotState::default()))
            .collect();
        if slots.is_empty() {
            slots.insert(None, SlotState::default());
        }
        Self { rules, slots }
    }

    pub fn rules(&self) -> &[RuleInstance] {
        &self.rules
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Paths of other elements the rules read.
    pub fn references(&self, own_name: &str) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        for rule in &self.rules {
            for path in rule.references(own_name) {
                if !refs.contains(&path) {
                    refs.push(path);
                }
            }
        }
        refs
    }

    pub fn slot(&self, key: &SlotKey) -> Option<&SlotState> {
        self.slots.get(key)
    }

    pub fn slot_keys(&self) -> impl Iterator<Item = &SlotKey> {
        self.slots.keys()
    }

    fn considered<'a>(&'a self, only: Option<&'a SlotKey>) -> impl Iterator<Item = &'a SlotState> {
        self.slots
            .iter()
            .filter(move |(key, _)| only.is_none_or(|only| *key == only))
            .map(|(_, slot)| slot)
    }

    /// Invalid when any considered slot was validated and failed.
    pub fn invalid(&self, only: Option<&SlotKey>) -> bool {
        self.considered(only).any(|s| s.validated && s.invalid)
    }

    /// Every considered slot has completed a pass.
    pub fn validated(&self, only: Option<&SlotKey>) -> bool {
        let mut slots = self.considered(only).peekable();
        slots.peek().is_some() && slots.all(|s| s.validated)
    }

    pub fn pending(&self) -> bool {
        self.slots.values().any(|s| s.pending)
    }

    /// Messages of every considered slot, in slot order.
    pub fn errors(&self, only: Option<&SlotKey>) -> Vec<String> {
        self.considered(only)
            .flat_map(|s| s.errors.iter().cloned())
            .collect()
    }

    /// Start a pass for `slot`. Synchronous rules are evaluated now.
    ///
    /// Returns `None` when the slot's last completed pass saw the same inputs; its
    /// outcome still holds and no rule runs.
    pub fn begin(&mut self, slot: SlotKey, ctx: &ValidationContext<'_>) -> Option<ValidationTicket> {
        let inputs = self.inputs(ctx);
        let current = self.slots.get(&slot).is_some_and(|state| {
            state.validated && !state.pending && state.inputs.as_ref() == Some(&inputs)
        });
        if current {
            tracing::trace!(slot = ?slot, "validation outcome still current");
            return None;
        }
        let entries = self.evaluate(ctx);
        let state = self.slots.entry(slot.clone()).or_default();
        state.generation += 1;
        state.pending = true;
        state.inputs = Some(inputs);
        Some(ValidationTicket {
            slot,
            generation: state.generation,
            entries,
        })
    }

    fn inputs(&self, ctx: &ValidationContext<'_>) -> Value {
        let mut inputs = vec![
            ctx.value.clone(),
            Value::from(ctx.locale),
            Value::from(ctx.generic_name),
        ];
        inputs.extend(
            self.references(ctx.name)
                .iter()
                .map(|path| ctx.lookup.value(path).unwrap_or_default()),
        );
        Value::List(inputs)
    }

    /// Apply a finished pass. Returns `false` when it was superseded.
    pub fn complete(&mut self, result: ValidationResult) -> bool {
        let Some(state) = self.slots.get_mut(&result.slot) else {
            return false;
        };
        if state.generation != result.generation {
            tracing::debug!(
                generation = result.generation,
                current = state.generation,
                "discarding superseded validation"
            );
            return false;
        }
        state.pending = false;
        state.validated = true;
        state.invalid = !result.errors.is_empty();
        state.errors = result.errors;
        true
    }

    /// Clear outcomes and drop any in-flight pass.
    pub fn reset(&mut self) {
        for state in self.slots.values_mut() {
            let generation = state.generation + 1;
            *state = SlotState {
                generation,
                ..SlotState::default()
            };
        }
    }

    fn evaluate(&self, ctx: &ValidationContext<'_>) -> Vec<Entry> {
        let subject = self
            .rules
            .iter()
            .find_map(|r| r.rule.subject())
            .unwrap_or_else(|| Subject::infer(ctx.value));
        let empty = ctx.value.is_empty();

        let mut entries = Vec::new();
        for instance in &self.rules {
            if empty && !instance.rule.implicit() {
                continue;
            }
            if let Some(conditions) = &instance.conditions {
                let mut lookup = |path: &str| ctx.lookup.value(path);
                if !conditions.evaluate(&mut lookup) {
                    continue;
                }
            }

            let input = RuleInput {
                value: ctx.value,
                params: &instance.params,
                subject,
                name: ctx.name,
                lookup: ctx.lookup,
            };
            match instance.rule.check(&input) {
                Check::Pass => {}
                Check::Fail => {
                    entries.push(Entry::Failed(message(instance, &input, ctx)));
                    if instance.name == "required" {
                        break;
                    }
                }
                Check::Deferred(check) => entries.push(Entry::Deferred {
                    message: message(instance, &input, ctx),
                    check,
                }),
            }
        }
        entries
    }
}

fn message(instance: &RuleInstance, input: &RuleInput<'_>, ctx: &ValidationContext<'_>) -> String {
    let sized = instance.rule.sized();
    let keyed = format!("{}.{}", instance.name, input.subject.key());
    let template = ctx
        .overrides
        .get(&keyed)
        .filter(|_| sized)
        .or_else(|| ctx.overrides.get(&instance.name))
        .cloned()
        .unwrap_or_else(|| {
            ctx.locales.template(
                &instance.name,
                sized.then_some(input.subject),
                ctx.locale,
                ctx.fallback_locale,
            )
        });

    let mut values = vec![("attribute", ctx.generic_name.to_owned())];
    values.extend(instance.rule.placeholders(input));
    interpolate(&template, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RulesSpec;
    use crate::validation::registry::RuleRegistry;
    use crate::validation::rule::{AsyncRule, NoLookup};

    fn state(spec: &str) -> ValidationState {
        let rules = RuleRegistry::with_builtins()
            .compile(&RulesSpec::Pipe(spec.into()), "a")
            .unwrap();
        ValidationState::new(rules, [None])
    }

    fn validate(state: &mut ValidationState, value: impl Into<Value>) -> bool {
        let value = value.into();
        let overrides = IndexMap::new();
        let locales = Locales::new();
        let ctx = ValidationContext {
            value: &value,
            name: "a",
            generic_name: "A",
            lookup: &NoLookup,
            overrides: &overrides,
            locales: &locales,
            locale: "en",
            fallback_locale: "en",
        };
        if let Some(ticket) = state.begin(None, &ctx) {
            let result = futures::executor::block_on(ticket.run());
            assert!(state.complete(result));
        }
        state.invalid(None)
    }

    #[test]
    fn unchanged_inputs_keep_the_outcome() {
        let mut s = state("numeric|max:2");
        let value = Value::from("3");
        let overrides = IndexMap::new();
        let locales = Locales::new();
        let mut ctx = ValidationContext {
            value: &value,
            name: "a",
            generic_name: "A",
            lookup: &NoLookup,
            overrides: &overrides,
            locales: &locales,
            locale: "en",
            fallback_locale: "en",
        };
        let first = s.begin(None, &ctx).unwrap();
        let second = s.begin(None, &ctx).expect("pending passes are not reused");
        assert!(!s.complete(futures::executor::block_on(first.run())));
        assert!(s.complete(futures::executor::block_on(second.run())));
        assert!(s.begin(None, &ctx).is_none());

        ctx.locale = "fr";
        assert!(s.begin(None, &ctx).is_some());

        s.reset();
        ctx.locale = "en";
        assert!(s.begin(None, &ctx).is_some());
    }

    #[test]
    fn numeric_max() {
        let mut s = state("numeric|max:2");
        assert!(validate(&mut s, "3"));
        assert!(!validate(&mut s, "2"));
        assert!(s.validated(None));
        assert!(s.errors(None).is_empty());
    }

    #[test]
    fn messages_follow_subject() {
        let mut s = state("numeric|max:2");
        validate(&mut s, "3");
        insta::assert_debug_snapshot!(s.errors(None), @r#"
        [
            "The A may not be greater than 2.",
        ]
        "#);

        let mut s = state("max:2");
        validate(&mut s, "abc");
        insta::assert_debug_snapshot!(s.errors(None), @r#"
        [
            "The A may not be greater than 2 characters.",
        ]
        "#);
    }

    #[test]
    fn empty_values_skip_non_implicit_rules() {
        let mut s = state("email|min:3");
        assert!(!validate(&mut s, ""));
        assert!(!validate(&mut s, Value::Null));
    }

    #[test]
    fn required_stops_the_chain() {
        let mut s = state("required|filled|min:3");
        assert!(validate(&mut s, "  "));
        assert_eq!(s.errors(None), vec!["The A field is required."]);
    }

    #[test]
    fn other_failures_accumulate() {
        let mut s = state("alpha|min:5|email");
        assert!(validate(&mut s, "ab1"));
        assert_eq!(s.errors(None).len(), 3);
    }

    #[test]
    fn overrides_win() {
        let rules = RuleRegistry::with_builtins()
            .compile(&RulesSpec::Pipe("required".into()), "a")
            .unwrap();
        let mut s = ValidationState::new(rules, [None]);
        let value = Value::Null;
        let overrides = IndexMap::from([("required".to_owned(), "Fill :attribute in".to_owned())]);
        let locales = Locales::new();
        let ctx = ValidationContext {
            value: &value,
            name: "a",
            generic_name: "Name",
            lookup: &NoLookup,
            overrides: &overrides,
            locales: &locales,
            locale: "en",
            fallback_locale: "en",
        };
        let ticket = s.begin(None, &ctx).unwrap();
        assert!(ticket.is_ready());
        s.complete(futures::executor::block_on(ticket.run()));
        assert_eq!(s.errors(None), vec!["Fill Name in"]);
    }

    #[test]
    fn superseded_results_are_discarded() {
        let mut s = state("required");
        let value = Value::Null;
        let overrides = IndexMap::new();
        let locales = Locales::new();
        let ctx = ValidationContext {
            value: &value,
            name: "a",
            generic_name: "A",
            lookup: &NoLookup,
            overrides: &overrides,
            locales: &locales,
            locale: "en",
            fallback_locale: "en",
        };
        let first = s.begin(None, &ctx).unwrap();
        let second = s.begin(None, &ctx).unwrap();
        assert!(s.pending());
        let stale = futures::executor::block_on(first.run());
        assert!(!s.complete(stale));
        assert!(s.pending());
        assert!(s.complete(futures::executor::block_on(second.run())));
        assert!(!s.pending());
        assert!(s.invalid(None));
    }

    #[test]
    fn async_rules_resolve_in_order() {
        let registry = RuleRegistry::with_builtins()
            .with("taken", AsyncRule::new(|v, _| async move { v != Value::from("bob") }));
        let rules = registry
            .compile(&RulesSpec::Pipe("taken|min:5".into()), "a")
            .unwrap();
        let mut s = ValidationState::new(rules, [None]);
        let value = Value::from("bob");
        let overrides = IndexMap::new();
        let locales = Locales::new();
        let ctx = ValidationContext {
            value: &value,
            name: "a",
            generic_name: "A",
            lookup: &NoLookup,
            overrides: &overrides,
            locales: &locales,
            locale: "en",
            fallback_locale: "en",
        };
        let ticket = s.begin(None, &ctx).unwrap();
        assert!(!ticket.is_ready());
        s.complete(futures::executor::block_on(ticket.run()));
        // `taken` has no locale template of its own.
        assert_eq!(
            s.errors(None),
            vec!["Invalid field", "The A must be at least 5 characters."]
        );
    }

    #[test]
    fn reset_clears_outcomes() {
        let mut s = state("required");
        validate(&mut s, "");
        s.reset();
        assert!(!s.validated(None));
        assert!(!s.invalid(None));
        assert!(s.errors(None).is_empty());
    }

    #[test]
    fn multilingual_slots() {
        let rules = RuleRegistry::with_builtins()
            .compile(&RulesSpec::Pipe("required".into()), "a")
            .unwrap();
        let en = Some("en".to_owned());
        let de = Some("de".to_owned());
        let mut s = ValidationState::new(rules, [en.clone(), de.clone()]);
        let overrides = IndexMap::new();
        let locales = Locales::new();
        for (slot, value) in [(en.clone(), Value::from("x")), (de.clone(), Value::Null)] {
            let ctx = ValidationContext {
                value: &value,
                name: "a",
                generic_name: "A",
                lookup: &NoLookup,
                overrides: &overrides,
                locales: &locales,
                locale: "en",
                fallback_locale: "en",
            };
            let ticket = s.begin(slot, &ctx).unwrap();
            s.complete(futures::executor::block_on(ticket.run()));
        }
        assert!(s.invalid(None));
        assert!(!s.invalid(Some(&en)));
        assert!(s.invalid(Some(&de)));
        assert!(s.validated(None));
    }
}
