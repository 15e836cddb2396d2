//! The form: mounting, the update protocol, flushing and form-wide operations.
//!
//! All derived state is either computed on read (container values, availability
//! inheritance, aggregated validity) or recomputed by jobs the [`Scheduler`] runs
//! during [`Form::flush`]. Writes only touch the element they target and queue work.

use std::fmt;

use futures::future::{join_all, LocalBoxFuture};
use tokio::time::Instant;

use crate::element::{compose, ComposeContext, ComposedElement, ElementKind, PostMount};
use crate::error::{AsyncSourceError, ConfigurationError, ResolutionError};
use crate::reactive::{
    DependencyGraph, Drained, LanguageScope, PendingChange, Reaction, Scheduler, ValidationRequest,
};
use crate::schema::{ElementDescriptor, Items, Schema};
use crate::tree::{join, last_segment, ElementId, ElementTree};
use crate::validation::{
    Locale, Locales, Lookup, Rule, RuleRegistry, SlotKey, ValidationContext, ValidationResult,
    ValidationState, ValidationTicket,
};
use crate::value::{ObjectMap, Value};

use super::config::{FormConfig, MultilingualValidation};
use super::events::{ChangeEvent, ChangeHandler, EventBus};
use super::handle::{ElementMut, ElementRef};

/// Upper bound on scheduler passes per flush. Reaching it means jobs keep
/// re-queueing each other.
const MAX_FLUSH_PASSES: usize = 64;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects what a form is mounted with.
pub struct FormBuilder {
    schema: Schema,
    config: FormConfig,
    registry: RuleRegistry,
    locales: Locales,
}

impl FormBuilder {
    /// Set the configuration (builder).
    pub fn config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the rule registry (builder).
    pub fn registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register one more rule (builder).
    pub fn rule(mut self, name: impl Into<String>, rule: impl Rule + 'static) -> Self {
        self.registry.register(name, rule);
        self
    }

    /// Replace the message tables (builder).
    pub fn locales(mut self, locales: Locales) -> Self {
        self.locales = locales;
        self
    }

    /// Add or replace one locale (builder).
    pub fn locale(mut self, code: impl Into<String>, locale: Locale) -> Self {
        self.locales.insert(code, locale);
        self
    }

    /// Compose and register every element, then run post-mount hooks.
    pub fn mount(self) -> crate::Result<Form> {
        Form::mount(self)
    }
}

// ---------------------------------------------------------------------------
// Validation batches
// ---------------------------------------------------------------------------

/// Validation passes that have been started but not awaited.
///
/// Produced by [`Form::start_validation`]; the affected elements report `pending`
/// until the matching [`Form::finish_validation`].
pub struct ValidationBatch {
    tickets: Vec<(ElementId, ValidationTicket)>,
}

impl ValidationBatch {
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Await every pass concurrently.
    pub async fn run(self) -> ValidationOutcome {
        let (ids, tickets): (Vec<_>, Vec<_>) = self.tickets.into_iter().unzip();
        let results = join_all(tickets.into_iter().map(ValidationTicket::run)).await;
        ValidationOutcome {
            results: ids.into_iter().zip(results).collect(),
        }
    }
}

impl fmt::Debug for ValidationBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationBatch")
            .field("tickets", &self.tickets.len())
            .finish()
    }
}

/// Finished passes, ready to be applied with [`Form::finish_validation`].
#[derive(Debug)]
pub struct ValidationOutcome {
    results: Vec<(ElementId, ValidationResult)>,
}

/// Result of [`Form::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Everything validated; the submitted data.
    Valid(serde_json::Value),
    /// Messages of every invalid element, in tree order.
    Invalid(Vec<String>),
}

impl SubmitOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Write {
    /// User input: change events, validation, dirty.
    Update,
    /// Programmatic: new baseline, validators reset, no event.
    Load,
}

// ---------------------------------------------------------------------------
// Form
// ---------------------------------------------------------------------------

/// A mounted form.
pub struct Form {
    tree: ElementTree<ComposedElement>,
    graph: DependencyGraph,
    scheduler: Scheduler,
    registry: RuleRegistry,
    locales: Locales,
    config: FormConfig,
    language: String,
    locale: String,
    bus: EventBus,
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("elements", &self.tree.elements().len())
            .field("language", &self.language)
            .field("locale", &self.locale)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Form {
    /// Mount `schema` with built-in rules and the English messages.
    pub fn new(schema: Schema, config: FormConfig) -> crate::Result<Self> {
        Self::builder(schema).config(config).mount()
    }

    /// Start configuring a form for `schema`.
    pub fn builder(schema: Schema) -> FormBuilder {
        FormBuilder {
            schema,
            config: FormConfig::default(),
            registry: RuleRegistry::with_builtins(),
            locales: Locales::default(),
        }
    }

    fn mount(builder: FormBuilder) -> crate::Result<Self> {
        let FormBuilder {
            schema,
            config,
            registry,
            locales,
        } = builder;
        let mut form = Self {
            tree: ElementTree::new(ComposedElement::root()),
            graph: DependencyGraph::new(),
            scheduler: Scheduler::new(),
            registry,
            locales,
            language: config.initial_language(),
            locale: config.locale.clone(),
            config,
            bus: EventBus::new(),
        };

        let root = form.tree.root();
        let mut created = Vec::new();
        for (_, descriptor) in schema.iter() {
            form.build(root, descriptor, "", None, &mut created)?;
        }
        form.tree.rebuild_index()?;
        form.finish_mount(&created);
        tracing::debug!(elements = created.len(), "form mounted");
        Ok(form)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Read view of the element at `path`.
    pub fn el(&self, path: &str) -> Option<ElementRef<'_>> {
        let id = self.tree.resolve(path).filter(|&id| id != self.tree.root())?;
        self.view(id)
    }

    /// Mutation handle of the element at `path`.
    pub fn el_mut(&mut self, path: &str) -> Option<ElementMut<'_>> {
        let id = self.tree.resolve(path).filter(|&id| id != self.tree.root())?;
        Some(ElementMut::new(self, id))
    }

    pub(crate) fn view(&self, id: ElementId) -> Option<ElementRef<'_>> {
        let element = self.tree.get(id)?;
        Some(ElementRef::new(self, id, element))
    }

    /// Every element path, in tree order.
    pub fn paths(&self) -> Vec<String> {
        self.tree
            .elements()
            .into_iter()
            .map(|id| self.path_of(id))
            .collect()
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// No queued work.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    // -----------------------------------------------------------------------
    // Form-wide state
    // -----------------------------------------------------------------------

    /// Value of every element, groups flattened.
    pub fn value(&self) -> Value {
        self.value_of(self.tree.root())
    }

    /// Submittable data: available elements with `submit != false`.
    pub fn data(&self) -> serde_json::Value {
        self.data_of(self.tree.root()).to_json()
    }

    pub fn invalid(&self) -> bool {
        self.top_level().any(|id| self.is_invalid(id))
    }

    pub fn dirty(&self) -> bool {
        self.top_level().any(|id| self.is_dirty(id))
    }

    pub fn validated(&self) -> bool {
        self.top_level()
            .filter(|&id| self.is_available(id))
            .all(|id| self.is_validated(id))
    }

    pub fn pending(&self) -> bool {
        self.top_level().any(|id| self.is_pending(id))
    }

    /// Messages of every invalid element, in tree order.
    pub fn errors(&self) -> Vec<String> {
        self.top_level().flat_map(|id| self.errors_of(id)).collect()
    }

    fn top_level(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.tree.children(self.tree.root()).iter().copied()
    }

    // -----------------------------------------------------------------------
    // Form-wide operations
    // -----------------------------------------------------------------------

    /// Switch the active language of multilingual elements.
    ///
    /// Returns `false` (and changes nothing) for a language the form does not have.
    pub fn set_language(&mut self, code: &str) -> bool {
        if !self.config.languages.iter().any(|l| l == code) {
            tracing::warn!(language = code, "ignoring unknown language");
            return false;
        }
        self.language = code.to_owned();
        true
    }

    /// Switch the message locale. Elements validated before re-run on the next flush
    /// so their messages follow.
    pub fn set_locale(&mut self, code: &str) {
        if self.locales.get(code).is_none() {
            tracing::warn!(locale = code, "no messages for locale, falling back");
        }
        self.locale = code.to_owned();
        for id in self.tree.elements() {
            if self.touched(id) {
                self.scheduler.schedule_validation(id, LanguageScope::All, None);
            }
        }
    }

    /// Listen to changes of the element at `path`.
    pub fn on_change(&mut self, path: &str, handler: impl FnMut(&ChangeEvent) + 'static) {
        self.bus
            .subscribe(Some(path.to_owned()), ChangeHandler::new(handler));
    }

    /// Listen to changes of every element.
    pub fn on_any_change(&mut self, handler: impl FnMut(&ChangeEvent) + 'static) {
        self.bus.subscribe(None, ChangeHandler::new(handler));
    }

    /// Run queued work until nothing is left: conditions, change events, item
    /// loaders, then validations whose debounce window has passed.
    pub async fn flush(&mut self) {
        for _ in 0..MAX_FLUSH_PASSES {
            if self.scheduler.is_idle() {
                return;
            }
            let drained = self.scheduler.drain();
            tracing::trace!(
                conditions = drained.conditions.len(),
                changes = drained.changes.len(),
                loaders = drained.loaders.len(),
                validations = drained.validations.len(),
                "flush pass"
            );
            let busy = !(drained.conditions.is_empty()
                && drained.changes.is_empty()
                && drained.loaders.is_empty());
            let validations = self.run_jobs(drained).await;

            let now = Instant::now();
            let (ready, waiting): (Vec<_>, Vec<_>) = validations
                .into_iter()
                .partition(|(_, request)| request.due.is_none_or(|due| due <= now));
            for (id, request) in waiting {
                self.scheduler.requeue(id, request);
            }

            if !ready.is_empty() {
                let batch =
                    self.begin_validation(ready.into_iter().map(|(id, request)| (id, request.scope)));
                let outcome = batch.run().await;
                self.finish_validation(outcome);
            } else if !busy {
                if let Some(due) = self.scheduler.next_due() {
                    tokio::time::sleep_until(due).await;
                }
            }
        }
        tracing::warn!(passes = MAX_FLUSH_PASSES, "flush stopped with work still queued");
    }

    /// Validate every available element concurrently.
    ///
    /// Queued conditions, change events and loaders run first; queued validations are
    /// superseded. Returns `true` when everything is valid.
    pub async fn validate(&mut self) -> bool {
        self.settle().await;
        self.scheduler.clear_validations();
        let requests: Vec<_> = self
            .tree
            .elements()
            .into_iter()
            .map(|id| (id, LanguageScope::All))
            .collect();
        let batch = self.begin_validation(requests);
        let outcome = batch.run().await;
        self.finish_validation(outcome);
        let valid = !self.invalid();
        tracing::debug!(valid, "form validated");
        valid
    }

    /// Validate (when `validate_on` includes submit) and collect the data.
    pub async fn submit(&mut self) -> SubmitOutcome {
        let valid = if self.config.validate_on.submit {
            self.validate().await
        } else {
            self.flush().await;
            !self.invalid()
        };
        if valid {
            SubmitOutcome::Valid(self.data())
        } else {
            SubmitOutcome::Invalid(self.errors())
        }
    }

    /// Return every element to its default and untouched validation state.
    pub fn reset(&mut self) {
        for id in self.top_level().collect::<Vec<_>>() {
            self.reset_element(id);
        }
        self.schedule_all_conditions();
        tracing::debug!("form reset");
    }

    /// Append an item to the list at `path`. Returns the new item's path.
    pub fn add_item(&mut self, path: &str, value: Option<Value>) -> crate::Result<String> {
        let list = self.list_at(path)?;
        let previous = self.value_of(list);
        let item = self.push_item(list, value)?;
        self.structure_changed(list, previous);
        Ok(self.path_of(item))
    }

    /// Remove the item at `index` of the list at `path`. Later items move up.
    pub fn remove_item(&mut self, path: &str, index: usize) -> bool {
        let Ok(list) = self.list_at(path) else {
            return false;
        };
        let Some(&item) = self.tree.children(list).get(index) else {
            return false;
        };
        let previous = self.value_of(list);
        self.remove_subtree(item);
        self.structure_changed(list, previous);
        true
    }

    fn list_at(&self, path: &str) -> crate::Result<ElementId> {
        self.tree
            .resolve(path)
            .filter(|&id| self.tree.get(id).is_some_and(|el| el.kind() == ElementKind::List))
            .ok_or_else(|| ConfigurationError::InvalidDescriptor {
                path: path.to_owned(),
                reason: "no list element at this path".to_owned(),
            })
    }

    // -----------------------------------------------------------------------
    // Validation passes
    // -----------------------------------------------------------------------

    /// Start validating the element at `path` and everything below it.
    pub fn start_validation(&mut self, path: &str) -> Option<ValidationBatch> {
        let id = self.tree.resolve(path)?;
        Some(self.start_subtree_validation(id))
    }

    pub(crate) fn start_subtree_validation(&mut self, id: ElementId) -> ValidationBatch {
        let requests: Vec<_> = self
            .tree
            .walk_depth_first(id)
            .into_iter()
            .map(|id| (id, LanguageScope::All))
            .collect();
        self.begin_validation(requests)
    }

    /// Apply finished passes. Passes superseded by a later start are dropped.
    pub fn finish_validation(&mut self, outcome: ValidationOutcome) {
        for (id, result) in outcome.results {
            let applied = self
                .tree
                .get_mut(id)
                .and_then(ComposedElement::validation_state_mut)
                .is_some_and(|state| state.complete(result));
            if applied {
                tracing::debug!(path = %self.path_of(id), invalid = self.is_invalid(id), "validated");
            }
        }
    }

    fn begin_validation(
        &mut self,
        requests: impl IntoIterator<Item = (ElementId, LanguageScope)>,
    ) -> ValidationBatch {
        let mut tickets = Vec::new();
        for (id, scope) in requests {
            tickets.extend(self.begin_element(id, &scope).into_iter().map(|t| (id, t)));
        }
        ValidationBatch { tickets }
    }

    fn begin_element(&mut self, id: ElementId, scope: &LanguageScope) -> Vec<ValidationTicket> {
        if !self.is_available(id) {
            return Vec::new();
        }
        let only = self.only_slot(id);
        let Some(el) = self.tree.get(id) else {
            return Vec::new();
        };
        let Some(state) = el.validation_state() else {
            return Vec::new();
        };
        let slots: Vec<SlotKey> = match (only, scope) {
            (Some(active), _) => vec![active],
            _ if !el.kind().is_multilingual() => vec![None],
            (None, LanguageScope::All) => state.slot_keys().cloned().collect(),
            (None, LanguageScope::Only(languages)) => languages
                .iter()
                .map(|l| Some(l.clone()))
                .filter(|key| state.slot(key).is_some())
                .collect(),
        };

        let value = self.value_of(id);
        let generic_name = self.generic_name_of(id);
        let Some(state) = self
            .tree
            .get_mut(id)
            .and_then(ComposedElement::validation_state_mut)
        else {
            return Vec::new();
        };
        let mut state = std::mem::take(state);

        let tickets: Vec<ValidationTicket> = match self.tree.get(id) {
            Some(el) => {
                let lookup = FormLookup { form: self, from: id };
                slots
                    .into_iter()
                    .filter_map(|slot| {
                        let slot_value = match &slot {
                            Some(language) => value.get(language).cloned().unwrap_or_default(),
                            None => value.clone(),
                        };
                        let ctx = ValidationContext {
                            value: &slot_value,
                            name: el.name(),
                            generic_name: &generic_name,
                            lookup: &lookup,
                            overrides: &el.messages,
                            locales: &self.locales,
                            locale: &self.locale,
                            fallback_locale: &self.config.fallback_locale,
                        };
                        state.begin(slot, &ctx)
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        if let Some(slot) = self
            .tree
            .get_mut(id)
            .and_then(ComposedElement::validation_state_mut)
        {
            *slot = state;
        }
        tickets
    }

    /// The single slot an element is judged by, when it is judged by one.
    fn only_slot(&self, id: ElementId) -> Option<SlotKey> {
        let el = self.tree.get(id)?;
        (el.kind().is_multilingual()
            && self.config.multilingual_validation == MultilingualValidation::ActiveLanguage)
            .then(|| Some(self.language.clone()))
    }

    /// Any slot has completed a pass.
    fn touched(&self, id: ElementId) -> bool {
        self.tree
            .get(id)
            .and_then(ComposedElement::validation_state)
            .is_some_and(|state| {
                state
                    .slot_keys()
                    .any(|key| state.slot(key).is_some_and(|s| s.validated))
            })
    }

    // -----------------------------------------------------------------------
    // Mounting
    // -----------------------------------------------------------------------

    /// Compose `descriptor` and its children under `parent` without reindexing.
    fn build(
        &mut self,
        parent: ElementId,
        descriptor: &ElementDescriptor,
        prefix: &str,
        parent_default: Option<&Value>,
        created: &mut Vec<ElementId>,
    ) -> crate::Result<ElementId> {
        let path = join(prefix, &descriptor.name);
        let element = compose(
            descriptor,
            &ComposeContext {
                path: &path,
                parent_default,
                registry: &self.registry,
                languages: &self.config.languages,
                default_debounce: self.config.default_debounce,
            },
        )?;
        let kind = element.kind();
        let default = element.default_value();
        let children = element.children.clone();
        let id = self.tree.insert_child(parent, element);
        created.push(id);

        let Some(children) = children else {
            return Ok(id);
        };
        if let Some(template) = children.template {
            let count = default
                .as_list()
                .map(<[Value]>::len)
                .filter(|&n| n > 0)
                .unwrap_or(children.initial);
            for index in 0..count {
                let item = template.clone().with_name(index.to_string());
                self.build(id, &item, &path, Some(&default), created)?;
            }
        } else if let Some(schema) = children.schema {
            let child_prefix = if kind == ElementKind::Group { prefix } else { &path };
            for (_, child) in schema.iter() {
                self.build(id, child, child_prefix, Some(&default), created)?;
            }
        }
        Ok(id)
    }

    /// Wire new elements, run their post-mount hooks and set container baselines.
    fn finish_mount(&mut self, created: &[ElementId]) {
        self.rewire();
        for &id in created {
            let hooks = self.tree.get(id).map(|el| el.hooks.clone()).unwrap_or_default();
            for hook in hooks {
                match hook {
                    PostMount::InitValidation => {
                        if let Some(state) = self
                            .tree
                            .get_mut(id)
                            .and_then(ComposedElement::validation_state_mut)
                        {
                            state.reset();
                        }
                    }
                    PostMount::EvaluateConditions => {
                        let available = self.evaluate_conditions(id);
                        if let Some(el) = self.tree.get_mut(id) {
                            el.conditions.own = available;
                        }
                    }
                    PostMount::LoadItems => self.scheduler.schedule_loader(id),
                }
            }
        }
        for &id in created.iter().rev() {
            self.refresh_baseline(id);
        }
    }

    /// Append an item built from the list's template.
    fn push_item(&mut self, list: ElementId, value: Option<Value>) -> crate::Result<ElementId> {
        let template = self
            .tree
            .get(list)
            .and_then(|el| el.children.as_ref())
            .and_then(|children| children.template.clone())
            .ok_or_else(|| ConfigurationError::InvalidDescriptor {
                path: self.path_of(list),
                reason: "list without an item template".to_owned(),
            })?;
        let index = self.tree.children(list).len();
        let mut descriptor = template.with_name(index.to_string());
        if let Some(value) = value {
            descriptor.default = Some(value);
        }

        let prefix = self.path_of(list);
        let mut created = Vec::new();
        let built = self
            .build(list, &descriptor, &prefix, None, &mut created)
            .and_then(|id| self.tree.rebuild_index().map(|()| id));
        match built {
            Ok(id) => {
                self.finish_mount(&created);
                Ok(id)
            }
            Err(err) => {
                if let Some(&first) = created.first() {
                    self.remove_subtree(first);
                }
                Err(err)
            }
        }
    }

    /// Re-declare every reaction's subjects and renumber list items.
    fn rewire(&mut self) {
        for id in self.tree.elements() {
            let Some(el) = self.tree.get(id) else {
                continue;
            };
            let condition_subjects: Vec<ElementId> = el
                .conditions
                .condition
                .iter()
                .flat_map(|c| c.paths())
                .filter_map(|path| self.tree.resolve_from(id, path))
                .collect();
            let rule_subjects: Vec<ElementId> = el
                .validation_state()
                .map(|state| state.references(el.name()))
                .unwrap_or_default()
                .iter()
                .filter_map(|path| self.tree.resolve_from(id, path))
                .collect();
            self.graph.track(Reaction::Conditions(id), condition_subjects);
            self.graph.track(Reaction::Revalidate(id), rule_subjects);

            if self.tree.get(id).is_some_and(|el| el.kind() == ElementKind::List) {
                for (index, item) in self.tree.children(id).to_vec().into_iter().enumerate() {
                    if let Some(el) = self.tree.get_mut(item) {
                        el.base.name = index.to_string();
                    }
                }
            }
        }
    }

    fn schedule_all_conditions(&mut self) {
        for id in self.tree.elements() {
            if self.tree.get(id).is_some_and(|el| el.conditions.condition.is_some()) {
                self.scheduler.schedule_conditions(id);
            }
        }
    }

    fn remove_subtree(&mut self, id: ElementId) {
        let removed = self.tree.unregister(id);
        self.forget(removed);
    }

    fn forget(&mut self, removed: Vec<(ElementId, ComposedElement)>) {
        for (id, _) in removed {
            self.graph.forget(id);
            self.scheduler.cancel(id);
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// User-driven write.
    pub(crate) fn update(&mut self, id: ElementId, value: Value) {
        let Some(el) = self.tree.get(id) else {
            return;
        };
        let kind = el.kind();
        if kind.is_container() {
            self.write_container(id, value, Write::Update);
            return;
        }
        if !kind.has_value() {
            tracing::debug!(path = %self.path_of(id), "ignoring write to element without a value");
            return;
        }
        let (value, scope) = if kind.is_multilingual() && !matches!(value, Value::Object(_)) {
            (
                el.value_from_model(value, &self.language),
                LanguageScope::Only(vec![self.language.clone()]),
            )
        } else {
            (value, LanguageScope::All)
        };
        let value = el.coerce(value);
        if value == el.own_value() {
            return;
        }

        let Some(previous) = self.store(id, value.clone(), Write::Update) else {
            return;
        };
        tracing::debug!(path = %self.path_of(id), "updated");
        self.scheduler.schedule_change(id, value, previous);
        if self.config.validate_on.change {
            self.schedule_own_validation(id, scope);
        }
        self.changed(id);
    }

    /// Programmatic write: becomes the new baseline, no change event.
    pub(crate) fn load(&mut self, id: ElementId, value: Value) {
        let Some(el) = self.tree.get(id) else {
            return;
        };
        let kind = el.kind();
        if kind.is_container() {
            self.write_container(id, value, Write::Load);
            self.reset_validators(id);
            self.refresh_baseline(id);
            return;
        }
        if !kind.has_value() {
            return;
        }
        let value = if kind.is_multilingual() && !matches!(value, Value::Object(_)) {
            el.value_from_model(value, &self.language)
        } else {
            value
        };
        let value = el.coerce(value);
        let changed = value != el.own_value();
        self.store(id, value, Write::Load);
        self.reset_validators(id);
        tracing::debug!(path = %self.path_of(id), "loaded");
        if changed {
            self.changed(id);
        }
    }

    /// Value becomes the null value, validators reset.
    pub(crate) fn clear(&mut self, id: ElementId) {
        let Some(el) = self.tree.get(id) else {
            return;
        };
        match el.kind() {
            ElementKind::Object | ElementKind::Group => {
                for child in self.tree.children(id).to_vec() {
                    self.clear(child);
                }
            }
            ElementKind::List => {
                let previous = self.value_of(id);
                for item in self.tree.children(id).to_vec() {
                    self.remove_subtree(item);
                }
                self.structure_changed(id, previous);
            }
            ElementKind::Static => return,
            _ => {
                let null = el.null_value();
                if null != el.own_value() {
                    if let Some(previous) = self.store(id, null.clone(), Write::Update) {
                        self.scheduler.schedule_change(id, null, previous);
                        self.changed(id);
                    }
                }
            }
        }
        self.reset_validators(id);
    }

    /// Value and baseline return to the default, validators reset.
    pub(crate) fn reset_element(&mut self, id: ElementId) {
        let Some(el) = self.tree.get(id) else {
            return;
        };
        match el.kind() {
            ElementKind::Object | ElementKind::Group => {
                for child in self.tree.children(id).to_vec() {
                    self.reset_element(child);
                }
            }
            ElementKind::List => {
                let previous = self.value_of(id);
                let default = el.default_value();
                let initial = el.children.as_ref().map_or(0, |c| c.initial);
                let items: Vec<Option<Value>> = match default.as_list() {
                    Some(items) if !items.is_empty() => items.iter().cloned().map(Some).collect(),
                    _ => vec![None; initial],
                };
                for item in self.tree.children(id).to_vec() {
                    self.remove_subtree(item);
                }
                for item in items {
                    if let Err(err) = self.push_item(id, item) {
                        tracing::warn!(error = %err, "could not recreate list item");
                        break;
                    }
                }
                let value = self.value_of(id);
                if value != previous {
                    self.scheduler.schedule_change(id, value, previous);
                    self.changed(id);
                }
            }
            ElementKind::Static => return,
            _ => {
                let default = el.default_value();
                let changed = default != el.own_value();
                if let Some(previous) = self.store(id, default.clone(), Write::Load) {
                    if changed {
                        self.scheduler.schedule_change(id, default, previous);
                        self.changed(id);
                    }
                }
            }
        }
        self.reset_validators(id);
        self.refresh_baseline(id);
    }

    /// Set the model: select options map to their value, multilingual models fill
    /// the active language.
    pub(crate) fn set_model(&mut self, id: ElementId, model: Value) {
        let Some(el) = self.tree.get(id) else {
            return;
        };
        let value = el.value_from_model(model, &self.language);
        self.update(id, value);
    }

    fn write_container(&mut self, id: ElementId, value: Value, write: Write) {
        let Some(el) = self.tree.get(id) else {
            return;
        };
        if el.kind() != ElementKind::List {
            for child in self.tree.children(id).to_vec() {
                let Some(child_el) = self.tree.get(child) else {
                    continue;
                };
                let part = if child_el.kind() == ElementKind::Group {
                    Some(value.clone())
                } else {
                    value.get(child_el.name()).cloned()
                };
                match (write, part) {
                    (Write::Update, Some(part)) => self.update(child, part),
                    (Write::Update, None) => {}
                    (Write::Load, part) => {
                        let part = part.unwrap_or_else(|| child_el.null_value());
                        self.load(child, part);
                    }
                }
            }
            return;
        }

        let items = match value {
            Value::List(items) => items,
            _ => Vec::new(),
        };
        let previous = self.value_of(id);
        let existing = self.tree.children(id).to_vec();
        let mut structural = false;
        match write {
            Write::Load => {
                for item in existing {
                    self.remove_subtree(item);
                }
                for item in items {
                    if let Err(err) = self.push_item(id, Some(item)) {
                        tracing::warn!(error = %err, "could not load list item");
                        break;
                    }
                }
                if previous != self.value_of(id) {
                    self.changed(id);
                }
                return;
            }
            Write::Update => {
                let count = items.len();
                for (index, item) in items.into_iter().enumerate() {
                    match existing.get(index) {
                        Some(&child) => self.update(child, item),
                        None => match self.push_item(id, None) {
                            Ok(child) => {
                                structural = true;
                                self.update(child, item);
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "could not add list item");
                                break;
                            }
                        },
                    }
                }
                for &extra in existing.iter().skip(count) {
                    structural = true;
                    self.remove_subtree(extra);
                }
            }
        }
        if structural {
            self.structure_changed(id, previous);
        }
    }

    /// Store a leaf value. `Load` also moves the baseline.
    fn store(&mut self, id: ElementId, value: Value, write: Write) -> Option<Value> {
        let state = self.tree.get_mut(id)?.value.as_mut()?;
        let previous = std::mem::replace(&mut state.value, value);
        state.previous = previous.clone();
        if write == Write::Load {
            state.baseline = state.value.clone();
        }
        Some(previous)
    }

    /// Containers remember their aggregated value to tell structural edits apart.
    fn refresh_baseline(&mut self, id: ElementId) {
        let is_container = self.tree.get(id).is_some_and(ComposedElement::is_container);
        if !is_container {
            return;
        }
        let value = self.value_of(id);
        if let Some(state) = self.tree.get_mut(id).and_then(|el| el.value.as_mut()) {
            state.baseline = value.clone();
            state.value = value;
        }
    }

    fn reset_validators(&mut self, id: ElementId) {
        if let Some(state) = self
            .tree
            .get_mut(id)
            .and_then(ComposedElement::validation_state_mut)
        {
            state.reset();
        }
        self.scheduler.cancel_validation(id);
    }

    fn schedule_own_validation(&mut self, id: ElementId, scope: LanguageScope) {
        let Some(el) = self.tree.get(id) else {
            return;
        };
        if el.has_rules() {
            let debounce = el.debounce();
            self.scheduler.schedule_validation(id, scope, debounce);
        }
    }

    /// A list gained or lost items.
    fn structure_changed(&mut self, list: ElementId, previous: Value) {
        self.rewire();
        self.schedule_all_conditions();
        let value = self.value_of(list);
        if value != previous {
            self.scheduler.schedule_change(list, value, previous);
        }
        if self.config.validate_on.change {
            self.schedule_own_validation(list, LanguageScope::All);
        }
        self.changed(list);
    }

    /// Propagate a value change of `id` to whatever depends on it or its ancestors.
    fn changed(&mut self, id: ElementId) {
        let mut subjects = vec![id];
        subjects.extend(self.tree.ancestors(id));
        for &ancestor in &subjects[1..] {
            let revalidate = self.tree.get(ancestor).is_some_and(ComposedElement::has_rules)
                && self.touched(ancestor);
            if revalidate {
                self.scheduler
                    .schedule_validation(ancestor, LanguageScope::All, None);
            }
        }
        let reactions = self.graph.notify(&subjects);
        for reaction in reactions {
            match reaction {
                Reaction::Conditions(owner) => self.scheduler.schedule_conditions(owner),
                Reaction::Revalidate(owner) => {
                    if self.touched(owner) {
                        self.scheduler
                            .schedule_validation(owner, LanguageScope::All, None);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Run everything but validations; hand those back.
    async fn run_jobs(&mut self, drained: Drained) -> Vec<(ElementId, ValidationRequest)> {
        let Drained {
            conditions,
            changes,
            loaders,
            validations,
        } = drained;
        self.run_conditions(&conditions);
        self.emit_changes(changes);
        self.run_loaders(loaders).await;
        validations
    }

    /// Run queued work except validations until none is left.
    async fn settle(&mut self) {
        for _ in 0..MAX_FLUSH_PASSES {
            let drained = self.scheduler.drain();
            if drained.conditions.is_empty() && drained.changes.is_empty() && drained.loaders.is_empty() {
                return;
            }
            self.run_jobs(drained).await;
        }
        tracing::warn!(passes = MAX_FLUSH_PASSES, "settling stopped with work still queued");
    }

    fn run_conditions(&mut self, ids: &[ElementId]) {
        for &id in ids {
            if !self.tree.contains(id) {
                continue;
            }
            let available = self.evaluate_conditions(id);
            let Some(el) = self.tree.get_mut(id) else {
                continue;
            };
            let was = std::mem::replace(&mut el.conditions.own, available);
            if was == available {
                continue;
            }
            tracing::debug!(path = %self.path_of(id), available, "availability changed");
            if available {
                self.reset_element(id);
            }
        }
    }

    fn evaluate_conditions(&self, id: ElementId) -> bool {
        let Some(condition) = self
            .tree
            .get(id)
            .and_then(|el| el.conditions.condition.as_ref())
        else {
            return true;
        };
        let mut lookup = |path: &str| self.lookup_value(id, path);
        condition.evaluate(&mut lookup)
    }

    fn emit_changes(&self, changes: Vec<PendingChange>) {
        for change in changes {
            let Some(el) = self.tree.get(change.id) else {
                continue;
            };
            let event = ChangeEvent {
                path: self.path_of(change.id),
                value: change.value,
                previous: change.previous,
            };
            for handler in el.events.handlers.clone() {
                handler.call(&event);
            }
            self.bus.emit(&event);
        }
    }

    async fn run_loaders(&mut self, ids: Vec<ElementId>) {
        let mut jobs: Vec<(ElementId, LocalBoxFuture<'static, Result<Value, String>>)> = Vec::new();
        for id in ids {
            let loader = self
                .tree
                .get(id)
                .and_then(|el| el.items.as_ref())
                .and_then(|items| match &items.source {
                    Some(Items::Loader(loader)) => Some(loader.clone()),
                    _ => None,
                });
            if let Some(loader) = loader {
                jobs.push((id, loader()));
            }
        }
        if jobs.is_empty() {
            return;
        }

        let (ids, futures): (Vec<_>, Vec<_>) = jobs.into_iter().unzip();
        let results = join_all(futures).await;
        for (id, result) in ids.into_iter().zip(results) {
            let path = self.path_of(id);
            let Some(items) = self.tree.get_mut(id).and_then(|el| el.items.as_mut()) else {
                continue;
            };
            match result {
                Ok(raw) => {
                    items.set_options(&raw);
                    items.error = None;
                    tracing::debug!(path = %path, options = items.options.len(), "items loaded");
                }
                Err(reason) => {
                    let err = AsyncSourceError { path, reason };
                    tracing::warn!(error = %err, "items loader failed");
                    items.options.clear();
                    items.error = Some(err);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    pub(crate) fn path_of(&self, id: ElementId) -> String {
        self.tree.path(id).unwrap_or_default().to_owned()
    }

    /// Own conditions hold for the element and every ancestor.
    pub(crate) fn is_available(&self, id: ElementId) -> bool {
        let own = |id| self.tree.get(id).is_some_and(|el| el.conditions.own);
        own(id) && self.tree.ancestors(id).into_iter().all(own)
    }

    /// Live value. Containers aggregate their children, groups flattened.
    pub(crate) fn value_of(&self, id: ElementId) -> Value {
        self.aggregate(id, false)
    }

    /// Submittable value: unavailable and `submit: false` children left out.
    pub(crate) fn data_of(&self, id: ElementId) -> Value {
        self.aggregate(id, true)
    }

    fn aggregate(&self, id: ElementId, data: bool) -> Value {
        let Some(el) = self.tree.get(id) else {
            return Value::Null;
        };
        match el.kind() {
            ElementKind::Object | ElementKind::Group => {
                let mut map = ObjectMap::new();
                self.collect_into(id, &mut map, data);
                Value::Object(map)
            }
            ElementKind::List => Value::List(
                self.tree
                    .children(id)
                    .iter()
                    .filter(|&&child| !data || self.included(child))
                    .map(|&child| self.aggregate(child, data))
                    .collect(),
            ),
            _ => el.own_value(),
        }
    }

    fn collect_into(&self, id: ElementId, map: &mut ObjectMap, data: bool) {
        for &child in self.tree.children(id) {
            let Some(el) = self.tree.get(child) else {
                continue;
            };
            if !el.kind().has_value() || (data && !self.included(child)) {
                continue;
            }
            if el.kind() == ElementKind::Group {
                self.collect_into(child, map, data);
            } else {
                map.insert(el.name().to_owned(), self.aggregate(child, data));
            }
        }
    }

    fn included(&self, id: ElementId) -> bool {
        self.tree
            .get(id)
            .is_some_and(|el| el.conditions.own && el.base.submit)
    }

    pub(crate) fn is_dirty(&self, id: ElementId) -> bool {
        let Some(el) = self.tree.get(id) else {
            return false;
        };
        let children_dirty = || self.tree.children(id).iter().any(|&c| self.is_dirty(c));
        match el.kind() {
            ElementKind::Object | ElementKind::Group => children_dirty(),
            ElementKind::List => match &el.value {
                Some(state) => self.value_of(id) != state.baseline,
                None => children_dirty(),
            },
            _ => el.value.as_ref().is_some_and(|v| v.dirty()),
        }
    }

    pub(crate) fn is_invalid(&self, id: ElementId) -> bool {
        if !self.is_available(id) {
            return false;
        }
        let only = self.only_slot(id);
        let own = self
            .tree
            .get(id)
            .and_then(ComposedElement::validation_state)
            .is_some_and(|s| s.invalid(only.as_ref()));
        own || self.tree.children(id).iter().any(|&c| self.is_invalid(c))
    }

    pub(crate) fn errors_of(&self, id: ElementId) -> Vec<String> {
        if !self.is_available(id) {
            return Vec::new();
        }
        let only = self.only_slot(id);
        let mut errors = self
            .tree
            .get(id)
            .and_then(ComposedElement::validation_state)
            .map(|s| s.errors(only.as_ref()))
            .unwrap_or_default();
        for &child in self.tree.children(id) {
            errors.extend(self.errors_of(child));
        }
        errors
    }

    pub(crate) fn is_validated(&self, id: ElementId) -> bool {
        let only = self.only_slot(id);
        let own = self
            .tree
            .get(id)
            .and_then(ComposedElement::validation_state)
            .is_none_or(|s| s.validated(only.as_ref()));
        own && self
            .tree
            .children(id)
            .iter()
            .filter(|&&c| self.is_available(c))
            .all(|&c| self.is_validated(c))
    }

    pub(crate) fn is_pending(&self, id: ElementId) -> bool {
        let own = self
            .tree
            .get(id)
            .and_then(ComposedElement::validation_state)
            .is_some_and(ValidationState::pending);
        own || self.tree.children(id).iter().any(|&c| self.is_pending(c))
    }

    pub(crate) fn model_of(&self, id: ElementId) -> Value {
        match self.tree.get(id) {
            Some(el) if el.is_container() => self.value_of(id),
            Some(el) => el.model(&self.language),
            None => Value::Null,
        }
    }

    pub(crate) fn generic_name_of(&self, id: ElementId) -> String {
        let Some(el) = self.tree.get(id) else {
            return String::new();
        };
        let path = self.path_of(id);
        let file_word = self
            .locales
            .string("file", &self.locale, &self.config.fallback_locale)
            .unwrap_or_else(|| "File".to_owned());
        el.generic_name(last_segment(&path), &file_word)
    }

    /// Value of `reference` as seen from `from`. Missing references are logged.
    fn lookup_value(&self, from: ElementId, reference: &str) -> Option<Value> {
        match self.tree.resolve_from(from, reference) {
            Some(id) => Some(self.value_of(id)),
            None => {
                let err = ResolutionError {
                    from: self.path_of(from),
                    path: reference.trim_start_matches('@').to_owned(),
                };
                tracing::warn!(error = %err, "unresolved reference");
                None
            }
        }
    }
}

/// Cross-field access for rules, resolved relative to the validated element.
struct FormLookup<'a> {
    form: &'a Form,
    from: ElementId,
}

impl Lookup for FormLookup<'_> {
    fn value(&self, reference: &str) -> Option<Value> {
        self.form.lookup_value(self.from, reference)
    }

    fn generic_name(&self, reference: &str) -> Option<String> {
        self.form
            .tree
            .resolve_from(self.from, reference)
            .map(|id| self.form.generic_name_of(id))
    }
}
