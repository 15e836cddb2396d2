//! Integration tests for formwork.
//!
//! These tests drive forms through the public API only: mount a schema, write through
//! element handles, flush, and read the derived state back.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use formwork::{
    AsyncRule, ElementDescriptor, FileValue, FnRule, Form, FormConfig, MultilingualValidation,
    Schema, SubmitOutcome, ValidateOn, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;
use tokio_test::{assert_pending, assert_ready};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn form(schema: serde_json::Value) -> Form {
    init_tracing();
    Form::new(Schema::from_json(schema).unwrap(), FormConfig::default()).unwrap()
}

fn kilobytes(name: &str, kb: u64) -> Value {
    Value::from(FileValue::new(name, kb * 1024))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn numeric_max_rejects_three_and_accepts_two() {
    let mut form = form(json!({"a": {"type": "text", "rules": "numeric|max:2"}}));

    form.el_mut("a").unwrap().update("3");
    form.flush().await;
    let a = form.el("a").unwrap();
    assert!(a.invalid());
    insta::assert_debug_snapshot!(a.errors(), @r#"
    [
        "The A may not be greater than 2.",
    ]
    "#);

    form.el_mut("a").unwrap().update("2");
    form.flush().await;
    let a = form.el("a").unwrap();
    assert!(!a.invalid());
    assert!(a.validated());
    assert!(a.errors().is_empty());
}

#[tokio::test]
async fn list_max_items_follows_removal() {
    let mut form = form(json!({
        "tags": {"type": "list", "initial": 3, "rules": "array|max:2", "element": {"type": "text"}},
    }));
    assert!(!form.validate().await);
    assert!(form.el("tags").unwrap().invalid());
    insta::assert_debug_snapshot!(form.errors(), @r#"
    [
        "The Tags may not have more than 2 items.",
    ]
    "#);

    assert!(form.remove_item("tags", 0));
    form.flush().await;
    assert!(!form.el("tags").unwrap().invalid());
    assert!(form.validate().await);
}

#[tokio::test]
async fn select_load_sets_value_and_model() {
    let mut form = form(json!({
        "pick": {"type": "select", "items": [1, 2, 3], "default": 0},
    }));
    assert_eq!(
        form.el("pick").unwrap().model(),
        Value::from(json!({"value": 0, "label": 1}))
    );

    form.el_mut("pick").unwrap().load(1);
    assert_eq!(form.el("pick").unwrap().value(), Value::from(1));
    form.flush().await;
    let pick = form.el("pick").unwrap();
    assert_eq!(pick.model(), Value::from(json!({"value": 1, "label": 2})));
    assert!(!pick.dirty());
}

#[tokio::test]
async fn conditions_hide_and_restore() {
    let mut form = form(json!({
        "b": {"type": "text", "default": 1},
        "a": {"type": "text", "default": "start", "conditions": [["b", "==", 1]]},
    }));
    assert!(form.el("a").unwrap().available());

    form.el_mut("a").unwrap().update("typed");
    form.el_mut("b").unwrap().update(2);
    form.flush().await;
    let a = form.el("a").unwrap();
    assert!(!a.available());
    assert_eq!(a.value(), Value::from("typed"));
    assert_eq!(form.data(), json!({"b": 2}));

    form.el_mut("b").unwrap().update(1);
    form.flush().await;
    let a = form.el("a").unwrap();
    assert!(a.available());
    assert_eq!(a.value(), Value::from("start"));
    assert_eq!(form.data(), json!({"b": 1, "a": "start"}));
}

#[tokio::test]
async fn file_gte_compares_kilobytes_across_elements() {
    let mut form = form(json!({
        "el1": {"type": "file", "rules": "gte:el2"},
        "el2": {"type": "file"},
    }));

    form.el_mut("el2").unwrap().update(kilobytes("b.pdf", 1000));
    form.el_mut("el1").unwrap().update(kilobytes("a.pdf", 500));
    form.flush().await;
    assert!(form.el("el1").unwrap().invalid());

    form.el_mut("el1").unwrap().update(kilobytes("a.pdf", 1000));
    form.flush().await;
    assert!(!form.el("el1").unwrap().invalid());
}

// ---------------------------------------------------------------------------
// Reactivity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cross_field_rules_rerun_when_target_changes() {
    let mut form = form(json!({
        "el1": {"type": "file", "rules": "gte:el2"},
        "el2": {"type": "file"},
    }));
    form.el_mut("el2").unwrap().update(kilobytes("b.pdf", 1000));
    form.el_mut("el1").unwrap().update(kilobytes("a.pdf", 500));
    form.flush().await;
    assert!(form.el("el1").unwrap().invalid());

    form.el_mut("el2").unwrap().update(kilobytes("b.pdf", 400));
    form.flush().await;
    assert!(!form.el("el1").unwrap().invalid());
}

#[tokio::test]
async fn untouched_elements_do_not_revalidate() {
    let mut form = form(json!({
        "password": {"type": "text", "rules": "confirmed"},
        "password_confirmation": {"type": "text"},
    }));
    form.el_mut("password_confirmation").unwrap().update("x");
    form.flush().await;
    assert!(!form.el("password").unwrap().validated());

    form.el_mut("password").unwrap().update("y");
    form.flush().await;
    assert!(form.el("password").unwrap().invalid());

    form.el_mut("password_confirmation").unwrap().update("y");
    form.flush().await;
    assert!(!form.el("password").unwrap().invalid());
}

#[tokio::test]
async fn required_if_follows_the_other_field() {
    let mut form = form(json!({
        "type": {"type": "select", "items": {"personal": "Personal", "business": "Business"}, "default": "personal"},
        "company": {"type": "text", "rules": "required_if:type,business"},
    }));
    assert!(form.validate().await);

    form.el_mut("type").unwrap().update("business");
    form.flush().await;
    let company = form.el("company").unwrap();
    assert!(company.invalid());
    assert_eq!(
        company.errors(),
        vec!["The Company field is required when Type is business."]
    );
}

#[tokio::test]
async fn missing_reference_reads_as_null() {
    let mut form = form(json!({"a": {"type": "text", "rules": "same:nowhere"}}));
    form.el_mut("a").unwrap().update("x");
    form.flush().await;
    assert!(form.el("a").unwrap().invalid());
}

#[tokio::test]
async fn nested_references_resolve_siblings_first() {
    let mut form = form(json!({
        "min": {"type": "text", "default": 100},
        "range": {"type": "object", "schema": {
            "min": {"type": "text", "default": 1},
            "max": {"type": "text", "rules": "numeric|gt:min"},
        }},
    }));
    form.el_mut("range.max").unwrap().update(5);
    form.flush().await;
    assert!(!form.el("range.max").unwrap().invalid());

    form.el_mut("range.min").unwrap().update(10);
    form.flush().await;
    assert!(form.el("range.max").unwrap().invalid());
    assert!(form.el("range").unwrap().invalid());
    assert!(form.invalid());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_and_reset_are_idempotent() {
    let mut form = form(json!({
        "a": {"type": "text", "rules": "required|min:3"},
        "b": {"type": "text", "default": "ok", "rules": "required"},
    }));
    form.el_mut("a").unwrap().update("xy");

    let first = form.validate().await;
    let errors = form.errors();
    let second = form.validate().await;
    assert_eq!(first, second);
    assert_eq!(errors, form.errors());
    assert!(!first);

    form.reset();
    let value = form.value();
    form.reset();
    assert_eq!(form.value(), value);
    assert!(!form.dirty());
    assert!(!form.validated());
    assert!(form.errors().is_empty());
}

#[tokio::test]
async fn dirty_tracks_the_baseline() {
    let mut form = form(json!({"a": {"type": "text", "default": "x"}}));
    assert!(!form.el("a").unwrap().dirty());

    form.el_mut("a").unwrap().update("y");
    assert!(form.el("a").unwrap().dirty());
    form.el_mut("a").unwrap().update("x");
    assert!(!form.el("a").unwrap().dirty());

    form.el_mut("a").unwrap().load("z");
    assert!(!form.el("a").unwrap().dirty());
    form.el_mut("a").unwrap().update("x");
    assert!(form.el("a").unwrap().dirty());
    assert!(form.dirty());

    form.el_mut("a").unwrap().reset();
    assert!(!form.el("a").unwrap().dirty());
    assert_eq!(form.el("a").unwrap().value(), Value::from("x"));
}

#[tokio::test]
async fn updates_before_a_flush_coalesce() {
    init_tracing();
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (counter, sink) = (calls.clone(), seen.clone());
    let schema = Schema::new().with("a", ElementDescriptor::new("text").rules("counted"));
    let mut form = Form::builder(schema)
        .rule(
            "counted",
            FnRule::new(move |value, _| {
                counter.set(counter.get() + 1);
                sink.borrow_mut().push(value.clone());
                true
            }),
        )
        .mount()
        .unwrap();

    for text in ["a", "ab", "abc"] {
        form.el_mut("a").unwrap().update(text);
    }
    form.flush().await;
    assert_eq!(calls.get(), 1);
    assert_eq!(*seen.borrow(), vec![Value::from("abc")]);
}

#[tokio::test]
async fn equal_date_is_not_a_change() {
    let mut form = form(json!({"when": {"type": "date", "default": "2020-12-25"}}));
    let events = Rc::new(Cell::new(0));
    let counter = events.clone();
    form.on_change("when", move |_| counter.set(counter.get() + 1));

    form.el_mut("when").unwrap().update("2020-12-25");
    form.el_mut("when").unwrap().update("2020-12-25T00:00:00+00:00");
    form.flush().await;
    assert!(!form.el("when").unwrap().dirty());
    assert_eq!(events.get(), 0);

    form.el_mut("when").unwrap().update("2020-12-26");
    form.flush().await;
    assert_eq!(events.get(), 1);
    assert_eq!(form.data(), json!({"when": "2020-12-26T00:00:00+00:00"}));
}

// ---------------------------------------------------------------------------
// Async and timing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn debounced_validation_waits_for_a_pause() {
    init_tracing();
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let schema = Schema::new().with(
        "search",
        ElementDescriptor::new("text").rules("required|counted").debounce(300),
    );
    let mut form = Form::builder(schema)
        .rule(
            "counted",
            FnRule::new(move |_, _| {
                counter.set(counter.get() + 1);
                true
            }),
        )
        .mount()
        .unwrap();

    let start = Instant::now();
    form.el_mut("search").unwrap().update("r");
    tokio::time::advance(Duration::from_millis(200)).await;
    form.el_mut("search").unwrap().update("ru");
    form.flush().await;

    assert!(Instant::now() >= start + Duration::from_millis(500));
    assert_eq!(calls.get(), 1);
    assert!(form.el("search").unwrap().validated());
    assert!(form.is_idle());
}

#[tokio::test(start_paused = true)]
async fn async_rules_report_pending_and_latest_wins() {
    init_tracing();
    let schema = Schema::new().with(
        "username",
        ElementDescriptor::new("text").default_value("free").rules("unique"),
    );
    let mut form = Form::builder(schema)
        .rule(
            "unique",
            AsyncRule::new(|value, _| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                value != Value::from("taken")
            }),
        )
        .mount()
        .unwrap();

    let first = form.start_validation("username").unwrap();
    assert!(form.el("username").unwrap().pending());
    let mut running = tokio_test::task::spawn(first.run());
    assert_pending!(running.poll());

    form.el_mut("username").unwrap().load("taken");
    let second = form.start_validation("username").unwrap();
    tokio::time::advance(Duration::from_millis(50)).await;
    let stale = assert_ready!(running.poll());
    let fresh = second.run().await;

    form.finish_validation(fresh);
    form.finish_validation(stale);
    let username = form.el("username").unwrap();
    assert!(!username.pending());
    assert!(username.invalid());
    assert_eq!(username.errors(), vec!["The Username has already been taken."]);
}

#[tokio::test]
async fn validating_twice_reuses_async_results() {
    init_tracing();
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let schema = Schema::new().with(
        "username",
        ElementDescriptor::new("text").default_value("free").rules("unique"),
    );
    let mut form = Form::builder(schema)
        .rule(
            "unique",
            AsyncRule::new(move |value, _| {
                counter.set(counter.get() + 1);
                async move { value != Value::from("taken") }
            }),
        )
        .mount()
        .unwrap();

    assert!(form.validate().await);
    assert!(form.validate().await);
    assert!(!form.el_mut("username").unwrap().validate().await);
    assert_eq!(calls.get(), 1);

    form.el_mut("username").unwrap().update("taken");
    assert!(!form.validate().await);
    assert!(!form.validate().await);
    assert_eq!(calls.get(), 2);

    form.reset();
    assert!(form.validate().await);
    assert_eq!(calls.get(), 3);
}

#[tokio::test]
async fn reference_parameters_follow_the_referenced_element() {
    let mut form = form(json!({
        "choice": {"type": "text", "default": "x", "rules": "in:@allowed"},
        "allowed": {"type": "text", "default": "x"},
        "qty": {"type": "text", "default": "4", "rules": "numeric|max:@limit"},
        "limit": {"type": "text", "default": "5"},
    }));
    assert!(form.validate().await);

    form.el_mut("allowed").unwrap().update("y");
    form.el_mut("limit").unwrap().update("3");
    assert!(!form.validate().await);
    assert_eq!(
        form.errors(),
        vec!["The selected Choice is invalid.", "The Qty may not be greater than 3."]
    );
}

#[tokio::test]
async fn element_validate_resolves_to_invalid() {
    let mut form = form(json!({
        "address": {"type": "object", "schema": {
            "city": {"type": "text", "rules": "required"},
            "zip": {"type": "text", "rules": "digits:5", "default": "123"},
        }},
    }));
    let invalid = form.el_mut("address").unwrap().validate().await;
    assert!(invalid);
    assert_eq!(
        form.el("address").unwrap().errors(),
        vec!["The City field is required.", "The Zip must be 5 digits."]
    );
    assert!(form.el("address").unwrap().validated());
}

#[tokio::test]
async fn items_loader_fills_options_or_records_the_failure() {
    init_tracing();
    let schema = Schema::new()
        .with(
            "good",
            ElementDescriptor::new("select")
                .default_value(1)
                .items_loader(|| async { Ok(Value::from(json!(["a", "b"]))) }),
        )
        .with(
            "bad",
            ElementDescriptor::new("select")
                .items_loader(|| async { Err("backend unavailable".to_owned()) }),
        );
    let mut form = Form::new(schema, FormConfig::default()).unwrap();
    assert!(form.el("good").unwrap().options().is_empty());
    assert_eq!(form.el("good").unwrap().model(), Value::Null);

    form.flush().await;
    let good = form.el("good").unwrap();
    assert_eq!(good.options().len(), 2);
    assert_eq!(good.model(), Value::from(json!({"value": 1, "label": "b"})));
    assert!(good.items_error().is_none());

    let bad = form.el("bad").unwrap();
    assert!(bad.options().is_empty());
    let err = bad.items_error().unwrap();
    assert_eq!(err.path, "bad");
    assert_eq!(err.reason, "backend unavailable");
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_on_submit_skips_change_validation() {
    let schema = Schema::from_json(json!({"name": {"type": "text", "rules": "required"}})).unwrap();
    let config = FormConfig::new().with_validate_on(ValidateOn::SUBMIT);
    let mut form = Form::new(schema, config).unwrap();

    form.el_mut("name").unwrap().update("x");
    form.el_mut("name").unwrap().update("");
    form.flush().await;
    assert!(!form.el("name").unwrap().validated());

    let outcome = form.submit().await;
    assert_eq!(
        outcome,
        SubmitOutcome::Invalid(vec!["The Name field is required.".to_owned()])
    );
}

#[tokio::test]
async fn multilingual_validates_per_language() {
    let schema = Schema::from_json(json!({"title": {"type": "ttext", "rules": "required"}})).unwrap();
    let config = FormConfig::new().with_languages(["en", "de"]);
    let mut form = Form::new(schema.clone(), config.clone()).unwrap();

    form.el_mut("title").unwrap().update("Hello");
    form.flush().await;
    let title = form.el("title").unwrap();
    assert_eq!(title.value(), Value::from(json!({"en": "Hello", "de": null})));
    assert!(!title.invalid());
    assert!(!title.validated());

    assert!(!form.validate().await);
    assert_eq!(form.errors(), vec!["The Title field is required."]);

    assert!(form.set_language("de"));
    assert_eq!(form.el("title").unwrap().model(), Value::Null);
    form.el_mut("title").unwrap().update("Hallo");
    form.flush().await;
    assert!(!form.el("title").unwrap().invalid());

    let active_only = config.with_multilingual_validation(MultilingualValidation::ActiveLanguage);
    let mut form = Form::new(schema, active_only).unwrap();
    form.el_mut("title").unwrap().update("Hello");
    assert!(form.validate().await);
}

#[tokio::test]
async fn submit_collects_available_submittable_data() {
    let mut form = form(json!({
        "name": {"type": "text", "default": "n"},
        "g": {"type": "group", "schema": {"x": {"type": "text", "default": 1}}},
        "secret": {"type": "text", "default": "s", "submit": false},
        "extra": {"type": "text", "default": "e", "conditions": [["name", "empty"]]},
        "address": {"type": "object", "schema": {
            "city": {"type": "text", "default": "Paris"},
        }},
        "note": {"type": "static", "label": "Read me"},
    }));
    assert_eq!(
        form.submit().await,
        SubmitOutcome::Valid(json!({"name": "n", "x": 1, "address": {"city": "Paris"}}))
    );
    assert_eq!(
        form.value(),
        Value::from(json!({
            "name": "n", "x": 1, "secret": "s", "extra": "e", "address": {"city": "Paris"}
        }))
    );
}

#[tokio::test]
async fn message_overrides_win() {
    let schema = Schema::new().with(
        "age",
        ElementDescriptor::new("text")
            .rules("numeric|min:18")
            .label("Your age")
            .message("min.numeric", ":attribute: at least :min")
            .message("numeric", "Numbers only"),
    );
    let mut form = Form::new(schema, FormConfig::default()).unwrap();
    form.el_mut("age").unwrap().update("x");
    form.flush().await;
    assert_eq!(form.el("age").unwrap().errors(), vec!["Numbers only"]);

    form.el_mut("age").unwrap().update("12");
    form.flush().await;
    assert_eq!(form.el("age").unwrap().errors(), vec!["Your age: at least 18"]);
}

// ---------------------------------------------------------------------------
// Events and structure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn change_events_reach_element_and_form_listeners() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let element_log = log.clone();
    let schema = Schema::new().with(
        "a",
        ElementDescriptor::new("text").on_change(move |event| {
            element_log
                .borrow_mut()
                .push(format!("element [{}] -> {}", event.previous, event.value));
        }),
    );
    let mut form = Form::new(schema, FormConfig::default()).unwrap();
    let form_log = log.clone();
    form.on_any_change(move |event| form_log.borrow_mut().push(format!("form {}", event.path)));

    form.el_mut("a").unwrap().update("x");
    form.el_mut("a").unwrap().update("y");
    form.el_mut("a").unwrap().load("z");
    form.flush().await;
    assert_eq!(
        *log.borrow(),
        vec!["element [] -> x", "form a", "element [x] -> y", "form a"]
    );
}

#[tokio::test]
async fn list_items_keep_state_when_renumbered() {
    let mut form = form(json!({
        "emails": {"type": "list", "element": {"type": "text", "rules": "email"}},
    }));
    form.add_item("emails", Some(Value::from("ok@example.com"))).unwrap();
    form.add_item("emails", None).unwrap();
    form.el_mut("emails.1").unwrap().update("broken");
    form.flush().await;
    assert!(form.el("emails.1").unwrap().invalid());

    assert!(form.remove_item("emails", 0));
    let moved = form.el("emails.0").unwrap();
    assert_eq!(moved.value(), Value::from("broken"));
    assert!(moved.invalid());
    assert_eq!(moved.errors().len(), 1);
    assert!(form.el("emails").unwrap().dirty());
}

#[tokio::test]
async fn clearing_empties_values_and_validation() {
    let mut form = form(json!({
        "a": {"type": "text", "default": "x", "rules": "required"},
        "tags": {"type": "list", "default": ["t"], "element": {"type": "text"}},
        "ok": {"type": "checkbox", "default": true},
    }));
    assert!(form.validate().await);

    form.el_mut("a").unwrap().clear();
    form.el_mut("tags").unwrap().clear();
    form.el_mut("ok").unwrap().clear();
    let a = form.el("a").unwrap();
    assert_eq!(a.value(), Value::Null);
    assert!(!a.validated());
    assert_eq!(form.el("tags").unwrap().value(), Value::List(vec![]));
    assert_eq!(form.el("ok").unwrap().value(), Value::Bool(false));
}
