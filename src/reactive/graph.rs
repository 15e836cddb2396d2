//! Explicit dependency graph between elements and the reactions they drive.
//!
//! A *subject* is an element whose value other state depends on; a *reaction* is the
//! derived state that must be recomputed when a subject changes (an element's
//! availability, or its validity under a cross-field rule). Edges are declared, not
//! auto-tracked: whenever the tree's structure changes, every reaction re-declares
//! its subjects with [`DependencyGraph::track`], which first drops its old edges.

use std::collections::{HashMap, HashSet};

use crate::tree::ElementId;

/// Derived state that depends on other elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reaction {
    /// Re-evaluate the element's conditions expression.
    Conditions(ElementId),
    /// Re-run the element's validators (only if it has been validated before).
    Revalidate(ElementId),
}

impl Reaction {
    /// The element that owns this reaction.
    pub fn owner(&self) -> ElementId {
        match *self {
            Self::Conditions(id) | Self::Revalidate(id) => id,
        }
    }
}

/// Subject → reaction edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    subscribers: HashMap<ElementId, HashSet<Reaction>>,
    dependencies: HashMap<Reaction, HashSet<ElementId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the subjects `reaction` depends on.
    pub fn track(&mut self, reaction: Reaction, subjects: impl IntoIterator<Item = ElementId>) {
        self.untrack(reaction);
        let subjects: HashSet<ElementId> = subjects
            .into_iter()
            .filter(|&subject| subject != reaction.owner())
            .collect();
        if subjects.is_empty() {
            return;
        }
        for &subject in &subjects {
            self.subscribers.entry(subject).or_default().insert(reaction);
        }
        self.dependencies.insert(reaction, subjects);
    }

    /// Remove every edge into `reaction`.
    pub fn untrack(&mut self, reaction: Reaction) {
        let Some(old) = self.dependencies.remove(&reaction) else {
            return;
        };
        for subject in old {
            if let Some(subs) = self.subscribers.get_mut(&subject) {
                subs.remove(&reaction);
                if subs.is_empty() {
                    self.subscribers.remove(&subject);
                }
            }
        }
    }

    /// Drop an element from the graph entirely, both as subject and as owner.
    pub fn forget(&mut self, id: ElementId) {
        self.untrack(Reaction::Conditions(id));
        self.untrack(Reaction::Revalidate(id));
        if let Some(subs) = self.subscribers.remove(&id) {
            for reaction in subs {
                if let Some(deps) = self.dependencies.get_mut(&reaction) {
                    deps.remove(&id);
                }
            }
        }
    }

    /// Notify that the given subjects changed. Returns the deduplicated reactions to run.
    pub fn notify(&mut self, subjects: &[ElementId]) -> Vec<Reaction> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for subject in subjects {
            if let Some(subs) = self.subscribers.get(subject) {
                let mut subs: Vec<Reaction> = subs.iter().copied().collect();
                // HashSet order is arbitrary; keep runs deterministic.
                subs.sort_by_key(|r| (matches!(r, Reaction::Revalidate(_)), r.owner()));
                out.extend(subs.into_iter().filter(|r| seen.insert(*r)));
            }
        }
        out
    }
}
