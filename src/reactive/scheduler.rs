//! Deferred work queue, drained by [`Form::flush`](crate::form::Form::flush).
//!
//! Writes never recompute dependent state inline. They enqueue jobs here, and the
//! next flush runs them in a fixed order: conditions, change events, item loaders,
//! validations. Validation requests are keyed by element so any number of updates
//! before a flush collapse into a single pass that sees the final value.

use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use tokio::time::Instant;

use crate::tree::ElementId;
use crate::value::Value;

/// Which language slots a validation pass should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageScope {
    /// Every language (and plain single-value elements).
    All,
    /// Only the listed language slots.
    Only(Vec<String>),
}

impl LanguageScope {
    fn merge(&mut self, other: LanguageScope) {
        match (&mut *self, other) {
            (Self::All, _) => {}
            (_, Self::All) => *self = Self::All,
            (Self::Only(mine), Self::Only(theirs)) => {
                for lang in theirs {
                    if !mine.contains(&lang) {
                        mine.push(lang);
                    }
                }
            }
        }
    }
}

/// A coalesced request to validate one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    /// Not before this instant (debounce). `None` runs on the next flush.
    pub due: Option<Instant>,
    pub scope: LanguageScope,
}

/// A value change waiting to be announced to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub id: ElementId,
    pub value: Value,
    pub previous: Value,
}

/// Everything that was queued when a flush started.
#[derive(Debug, Default)]
pub struct Drained {
    pub conditions: Vec<ElementId>,
    pub changes: Vec<PendingChange>,
    pub loaders: Vec<ElementId>,
    pub validations: Vec<(ElementId, ValidationRequest)>,
}

impl Drained {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.changes.is_empty()
            && self.loaders.is_empty()
            && self.validations.is_empty()
    }
}

/// The queue itself.
#[derive(Debug, Default)]
pub struct Scheduler {
    conditions: IndexSet<ElementId>,
    changes: Vec<PendingChange>,
    loaders: IndexSet<ElementId>,
    validations: IndexMap<ElementId, ValidationRequest>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_conditions(&mut self, id: ElementId) {
        self.conditions.insert(id);
    }

    pub fn schedule_loader(&mut self, id: ElementId) {
        self.loaders.insert(id);
    }

    /// Queue a change event. Consecutive changes to the same element are announced
    /// separately, in order.
    pub fn schedule_change(&mut self, id: ElementId, value: Value, previous: Value) {
        self.changes.push(PendingChange { id, value, previous });
    }

    /// Queue (or refresh) a validation request.
    ///
    /// A debounced request restarts its window on every call, so only a pause in
    /// input lets it run.
    pub fn schedule_validation(
        &mut self,
        id: ElementId,
        scope: LanguageScope,
        debounce: Option<Duration>,
    ) {
        let due = debounce.map(|d| Instant::now() + d);
        match self.validations.get_mut(&id) {
            Some(existing) => {
                existing.scope.merge(scope);
                existing.due = due;
            }
            None => {
                self.validations.insert(id, ValidationRequest { due, scope });
            }
        }
    }

    /// Put back a drained request whose debounce window is still open. A request
    /// queued since the drain wins on timing; scopes merge.
    pub fn requeue(&mut self, id: ElementId, request: ValidationRequest) {
        match self.validations.get_mut(&id) {
            Some(newer) => newer.scope.merge(request.scope),
            None => {
                self.validations.insert(id, request);
            }
        }
    }

    /// Earliest instant a queued debounced validation becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.validations.values().filter_map(|r| r.due).min()
    }

    /// Drop every queued validation.
    pub fn clear_validations(&mut self) {
        self.validations.clear();
    }

    /// Drop all queued work for a removed element.
    pub fn cancel(&mut self, id: ElementId) {
        self.conditions.shift_remove(&id);
        self.loaders.shift_remove(&id);
        self.validations.shift_remove(&id);
        self.changes.retain(|c| c.id != id);
    }

    /// Drop a queued validation (the element was reset or loaded).
    pub fn cancel_validation(&mut self, id: ElementId) {
        self.validations.shift_remove(&id);
    }

    pub fn is_idle(&self) -> bool {
        self.conditions.is_empty()
            && self.changes.is_empty()
            && self.loaders.is_empty()
            && self.validations.is_empty()
    }

    /// Take everything queued so far.
    pub fn drain(&mut self) -> Drained {
        Drained {
            conditions: self.conditions.drain(..).collect(),
            changes: std::mem::take(&mut self.changes),
            loaders: self.loaders.drain(..).collect(),
            validations: self.validations.drain(..).collect(),
        }
    }
}
