//! Path-addressed views into a form.

use crate::element::{ComposedElement, ElementKind, SelectOption};
use crate::error::AsyncSourceError;
use crate::tree::ElementId;
use crate::value::Value;

use super::form::Form;

/// Read view of one element.
#[derive(Clone, Copy)]
pub struct ElementRef<'a> {
    form: &'a Form,
    id: ElementId,
    element: &'a ComposedElement,
}

impl<'a> ElementRef<'a> {
    pub(crate) fn new(form: &'a Form, id: ElementId, element: &'a ComposedElement) -> Self {
        Self { form, id, element }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    /// The composed element behind this view.
    pub fn element(&self) -> &'a ComposedElement {
        self.element
    }

    pub fn kind(&self) -> ElementKind {
        self.element().kind()
    }

    pub fn path(&self) -> String {
        self.form.path_of(self.id)
    }

    /// Current value. Containers aggregate their children.
    pub fn value(&self) -> Value {
        self.form.value_of(self.id)
    }

    /// Widget-bound value: `{value, label}` for selects, the active language for
    /// multilingual kinds.
    pub fn model(&self) -> Value {
        self.form.model_of(self.id)
    }

    pub fn previous(&self) -> Value {
        self.element()
            .value
            .as_ref()
            .map(|v| v.previous.clone())
            .unwrap_or_default()
    }

    pub fn default_value(&self) -> Value {
        self.element().default_value()
    }

    pub fn null_value(&self) -> Value {
        self.element().null_value()
    }

    pub fn dirty(&self) -> bool {
        self.form.is_dirty(self.id)
    }

    /// Validated and failing. Unavailable elements are never invalid.
    pub fn invalid(&self) -> bool {
        self.form.is_invalid(self.id)
    }

    /// Messages in rule order, then those of children.
    pub fn errors(&self) -> Vec<String> {
        self.form.errors_of(self.id)
    }

    /// The first message, if any.
    pub fn error(&self) -> Option<String> {
        self.errors().into_iter().next()
    }

    pub fn available(&self) -> bool {
        self.form.is_available(self.id)
    }

    pub fn validated(&self) -> bool {
        self.form.is_validated(self.id)
    }

    pub fn pending(&self) -> bool {
        self.form.is_pending(self.id)
    }

    /// Normalised options of a select-like element.
    pub fn options(&self) -> &'a [SelectOption] {
        self.element()
            .items
            .as_ref()
            .map(|items| items.options.as_slice())
            .unwrap_or_default()
    }

    /// Why the async items loader failed, if it did.
    pub fn items_error(&self) -> Option<&'a AsyncSourceError> {
        self.element().items.as_ref().and_then(|items| items.error.as_ref())
    }

    /// Name shown in messages.
    pub fn generic_name(&self) -> String {
        self.form.generic_name_of(self.id)
    }
}

impl std::fmt::Debug for ElementRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRef")
            .field("path", &self.path())
            .field("kind", &self.kind())
            .field("value", &self.value())
            .finish()
    }
}

/// Mutation handle of one element.
pub struct ElementMut<'a> {
    form: &'a mut Form,
    id: ElementId,
}

impl<'a> ElementMut<'a> {
    pub(crate) fn new(form: &'a mut Form, id: ElementId) -> Self {
        Self { form, id }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Read view of the same element, `None` once a write removed it.
    pub fn get(&self) -> Option<ElementRef<'_>> {
        self.form.view(self.id)
    }

    /// User-driven write: marks dirty, queues a change event and, with
    /// `validate_on` change, a validation pass.
    pub fn update(&mut self, value: impl Into<Value>) -> &mut Self {
        self.form.update(self.id, value.into());
        self
    }

    /// Programmatic write: the value becomes the new baseline and validation starts
    /// over. No change event.
    pub fn load(&mut self, value: impl Into<Value>) -> &mut Self {
        self.form.load(self.id, value.into());
        self
    }

    /// Write through the widget-bound shape.
    pub fn set_model(&mut self, model: impl Into<Value>) -> &mut Self {
        self.form.set_model(self.id, model.into());
        self
    }

    /// Back to the default, validation back to its untouched state.
    pub fn reset(&mut self) -> &mut Self {
        self.form.reset_element(self.id);
        self
    }

    /// Back to the null value, validation back to its untouched state.
    pub fn clear(&mut self) -> &mut Self {
        self.form.clear(self.id);
        self
    }

    /// Validate the element and its children now. Resolves to `invalid`.
    pub async fn validate(&mut self) -> bool {
        let batch = self.form.start_subtree_validation(self.id);
        let outcome = batch.run().await;
        self.form.finish_validation(outcome);
        self.form.is_invalid(self.id)
    }
}
