//! Change events and their listeners.
//!
//! Events are queued by `update` and dispatched during a flush, element listeners
//! first, then form-level ones in registration order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// A value change of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Path of the element at dispatch time.
    pub path: String,
    pub value: Value,
    pub previous: Value,
}

/// A shareable change listener.
#[derive(Clone)]
pub struct ChangeHandler(Rc<RefCell<dyn FnMut(&ChangeEvent)>>);

impl ChangeHandler {
    pub fn new(handler: impl FnMut(&ChangeEvent) + 'static) -> Self {
        Self(Rc::new(RefCell::new(handler)))
    }

    /// Invoke the listener. A listener already running further up the stack is skipped.
    pub fn call(&self, event: &ChangeEvent) {
        match self.0.try_borrow_mut() {
            Ok(mut handler) => handler(event),
            Err(_) => tracing::warn!(path = %event.path, "skipping re-entrant change listener"),
        }
    }
}

impl fmt::Debug for ChangeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangeHandler(..)")
    }
}

/// Form-level listeners, optionally filtered by element path.
#[derive(Debug, Default)]
pub struct EventBus {
    listeners: Vec<(Option<String>, ChangeHandler)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to changes of the element at `path`, or of every element with `None`.
    pub fn subscribe(&mut self, path: Option<String>, handler: ChangeHandler) {
        self.listeners.push((path, handler));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every matching listener.
    pub fn emit(&self, event: &ChangeEvent) {
        for (filter, handler) in &self.listeners {
            if filter.as_deref().is_none_or(|path| path == event.path) {
                handler.call(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str, value: i32) -> ChangeEvent {
        ChangeEvent {
            path: path.into(),
            value: Value::from(value),
            previous: Value::Null,
        }
    }

    #[test]
    fn handler_clones_share_state() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let handler = ChangeHandler::new(move |e| sink.borrow_mut().push(e.value.clone()));
        let copy = handler.clone();
        handler.call(&event("a", 1));
        copy.call(&event("a", 2));
        assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn bus_filters_by_path() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = seen.clone();
        bus.subscribe(
            Some("a".into()),
            ChangeHandler::new(move |e| sink.borrow_mut().push(format!("a:{}", e.path))),
        );
        let sink = seen.clone();
        bus.subscribe(
            None,
            ChangeHandler::new(move |e| sink.borrow_mut().push(format!("*:{}", e.path))),
        );
        assert_eq!(bus.len(), 2);

        bus.emit(&event("a", 1));
        bus.emit(&event("b", 1));
        assert_eq!(*seen.borrow(), vec!["a:a", "*:a", "*:b"]);
    }
}
