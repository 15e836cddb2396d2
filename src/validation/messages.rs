//! Locale message tables and `:placeholder` interpolation.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::validation::rule::Subject;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(":([a-z_]+)").expect("valid placeholder pattern"));

/// Message template for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MessageEntry {
    Plain(String),
    /// Size-based rules: one template per [`Subject`] key.
    BySubject(IndexMap<String, String>),
}

impl MessageEntry {
    fn template(&self, subject: Option<Subject>) -> Option<&str> {
        match self {
            Self::Plain(text) => Some(text),
            Self::BySubject(variants) => {
                let key = subject.unwrap_or(Subject::String).key();
                variants.get(key).map(String::as_str)
            }
        }
    }
}

/// One language's messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locale {
    /// Rule name → template.
    #[serde(default)]
    pub validation: IndexMap<String, MessageEntry>,
    /// Used when no template exists for a failing rule.
    #[serde(default)]
    pub default_message: Option<String>,
    /// Other strings (`"file"` is the generic name of unnamed file elements).
    #[serde(default)]
    pub strings: IndexMap<String, String>,
}

impl Locale {
    /// Parse a locale from JSON text.
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Built-in English table.
    pub fn english() -> Self {
        let by_subject = |numeric: &str, file: &str, string: &str, array: &str| {
            MessageEntry::BySubject(IndexMap::from([
                ("numeric".to_owned(), numeric.to_owned()),
                ("file".to_owned(), file.to_owned()),
                ("string".to_owned(), string.to_owned()),
                ("array".to_owned(), array.to_owned()),
            ]))
        };
        let plain = |text: &str| MessageEntry::Plain(text.to_owned());

        let validation = IndexMap::from([
            ("accepted".to_owned(), plain("The :attribute must be accepted.")),
            ("after".to_owned(), plain("The :attribute must be a date after :date.")),
            (
                "after_or_equal".to_owned(),
                plain("The :attribute must be a date after or equal to :date."),
            ),
            ("alpha".to_owned(), plain("The :attribute may only contain letters.")),
            (
                "alpha_dash".to_owned(),
                plain("The :attribute may only contain letters, numbers, dashes and underscores."),
            ),
            (
                "alpha_num".to_owned(),
                plain("The :attribute may only contain letters and numbers."),
            ),
            ("array".to_owned(), plain("The :attribute must be an array.")),
            ("before".to_owned(), plain("The :attribute must be a date before :date.")),
            (
                "before_or_equal".to_owned(),
                plain("The :attribute must be a date before or equal to :date."),
            ),
            (
                "between".to_owned(),
                by_subject(
                    "The :attribute must be between :min and :max.",
                    "The :attribute must be between :min and :max kilobytes.",
                    "The :attribute must be between :min and :max characters.",
                    "The :attribute must have between :min and :max items.",
                ),
            ),
            ("boolean".to_owned(), plain("The :attribute field must be true or false.")),
            ("confirmed".to_owned(), plain("The :attribute confirmation does not match.")),
            ("date".to_owned(), plain("The :attribute is not a valid date.")),
            ("date_equals".to_owned(), plain("The :attribute must be equal to :date.")),
            ("different".to_owned(), plain("The :attribute and :other must be different.")),
            ("digits".to_owned(), plain("The :attribute must be :digits digits.")),
            (
                "digits_between".to_owned(),
                plain("The :attribute must be between :min and :max digits."),
            ),
            ("distinct".to_owned(), plain("The :attribute field has a duplicate value.")),
            ("email".to_owned(), plain("The :attribute must be a valid email address.")),
            ("file".to_owned(), plain("The :attribute must be a file.")),
            ("filled".to_owned(), plain("The :attribute field must have a value.")),
            (
                "gt".to_owned(),
                by_subject(
                    "The :attribute must be greater than :value.",
                    "The :attribute must be greater than :value kilobytes.",
                    "The :attribute must be greater than :value characters.",
                    "The :attribute must have more than :value items.",
                ),
            ),
            (
                "gte".to_owned(),
                by_subject(
                    "The :attribute must be greater than or equal :value.",
                    "The :attribute must be greater than or equal :value kilobytes.",
                    "The :attribute must be greater than or equal :value characters.",
                    "The :attribute must have :value items or more.",
                ),
            ),
            ("in".to_owned(), plain("The selected :attribute is invalid.")),
            ("integer".to_owned(), plain("The :attribute must be an integer.")),
            ("ip".to_owned(), plain("The :attribute must be a valid IP address.")),
            ("ipv4".to_owned(), plain("The :attribute must be a valid IPv4 address.")),
            ("ipv6".to_owned(), plain("The :attribute must be a valid IPv6 address.")),
            ("json".to_owned(), plain("The :attribute must be a valid JSON string.")),
            (
                "lt".to_owned(),
                by_subject(
                    "The :attribute must be less than :value.",
                    "The :attribute must be less than :value kilobytes.",
                    "The :attribute must be less than :value characters.",
                    "The :attribute must have less than :value items.",
                ),
            ),
            (
                "lte".to_owned(),
                by_subject(
                    "The :attribute must be less than or equal :value.",
                    "The :attribute must be less than or equal :value kilobytes.",
                    "The :attribute must be less than or equal :value characters.",
                    "The :attribute must not have more than :value items.",
                ),
            ),
            (
                "max".to_owned(),
                by_subject(
                    "The :attribute may not be greater than :max.",
                    "The :attribute may not be greater than :max kilobytes.",
                    "The :attribute may not be greater than :max characters.",
                    "The :attribute may not have more than :max items.",
                ),
            ),
            ("mimes".to_owned(), plain("The :attribute must be a file of type: :values.")),
            ("mimetypes".to_owned(), plain("The :attribute must be a file of type: :values.")),
            (
                "min".to_owned(),
                by_subject(
                    "The :attribute must be at least :min.",
                    "The :attribute must be at least :min kilobytes.",
                    "The :attribute must be at least :min characters.",
                    "The :attribute must have at least :min items.",
                ),
            ),
            ("not_in".to_owned(), plain("The selected :attribute is invalid.")),
            ("not_regex".to_owned(), plain("The :attribute format is invalid.")),
            ("numeric".to_owned(), plain("The :attribute must be a number.")),
            ("regex".to_owned(), plain("The :attribute format is invalid.")),
            ("required".to_owned(), plain("The :attribute field is required.")),
            (
                "required_if".to_owned(),
                plain("The :attribute field is required when :other is :value."),
            ),
            (
                "required_unless".to_owned(),
                plain("The :attribute field is required unless :other is in :values."),
            ),
            ("same".to_owned(), plain("The :attribute and :other must match.")),
            (
                "size".to_owned(),
                by_subject(
                    "The :attribute must be :size.",
                    "The :attribute must be :size kilobytes.",
                    "The :attribute must be :size characters.",
                    "The :attribute must contain :size items.",
                ),
            ),
            ("string".to_owned(), plain("The :attribute must be a string.")),
            ("url".to_owned(), plain("The :attribute format is invalid.")),
            ("uuid".to_owned(), plain("The :attribute must be a valid UUID.")),
            ("unique".to_owned(), plain("The :attribute has already been taken.")),
            ("remote".to_owned(), plain("The :attribute field is invalid.")),
        ]);

        Self {
            validation,
            default_message: Some("Invalid field".to_owned()),
            strings: IndexMap::from([("file".to_owned(), "File".to_owned())]),
        }
    }
}

/// Every known locale, keyed by code.
#[derive(Debug, Clone)]
pub struct Locales {
    locales: HashMap<String, Locale>,
}

impl Default for Locales {
    fn default() -> Self {
        Self {
            locales: HashMap::from([("en".to_owned(), Locale::english())]),
        }
    }
}

impl Locales {
    /// The built-in set (`en`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a locale.
    pub fn insert(&mut self, code: impl Into<String>, locale: Locale) -> &mut Self {
        self.locales.insert(code.into(), locale);
        self
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, code: impl Into<String>, locale: Locale) -> Self {
        self.insert(code, locale);
        self
    }

    pub fn get(&self, code: &str) -> Option<&Locale> {
        self.locales.get(code)
    }

    /// Template for `rule`: active locale, then fallback, then the default message.
    pub fn template(
        &self,
        rule: &str,
        subject: Option<Subject>,
        locale: &str,
        fallback: &str,
    ) -> String {
        let chain = [locale, fallback];
        chain
            .iter()
            .filter_map(|code| self.get(code))
            .find_map(|l| l.validation.get(rule).and_then(|entry| entry.template(subject)))
            .or_else(|| {
                chain
                    .iter()
                    .filter_map(|code| self.get(code))
                    .find_map(|l| l.default_message.as_deref())
            })
            .unwrap_or("Invalid field")
            .to_owned()
    }

    /// Non-validation string, with the same fallback chain.
    pub fn string(&self, key: &str, locale: &str, fallback: &str) -> Option<String> {
        [locale, fallback]
            .iter()
            .filter_map(|code| self.get(code))
            .find_map(|l| l.strings.get(key).cloned())
    }
}

/// Replace `:name` placeholders. Unknown placeholders are left as written.
pub fn interpolate(template: &str, values: &[(&str, String)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_sized_templates() {
        let locales = Locales::new();
        insta::assert_snapshot!(
            locales.template("required", None, "en", "en"),
            @"The :attribute field is required."
        );
        insta::assert_snapshot!(
            locales.template("max", Some(Subject::File), "en", "en"),
            @"The :attribute may not be greater than :max kilobytes."
        );
        insta::assert_snapshot!(
            locales.template("max", Some(Subject::Array), "en", "en"),
            @"The :attribute may not have more than :max items."
        );
    }

    #[test]
    fn fallback_chain() {
        let german = Locale::from_json_str(
            r#"{"validation": {"required": "Das Feld :attribute ist erforderlich."}}"#,
        )
        .unwrap();
        let locales = Locales::new().with("de", german);
        assert_eq!(
            locales.template("required", None, "de", "en"),
            "Das Feld :attribute ist erforderlich."
        );
        assert_eq!(
            locales.template("email", None, "de", "en"),
            "The :attribute must be a valid email address."
        );
        assert_eq!(locales.template("no_such_rule", None, "de", "en"), "Invalid field");
        assert_eq!(locales.template("required", None, "xx", "yy"), "Invalid field");
    }

    #[test]
    fn sized_json_locale() {
        let locale = Locale::from_json_str(
            r#"{"validation": {"min": {"string": "short", "numeric": "small"}}, "defaultMessage": "Nope"}"#,
        )
        .unwrap();
        let locales = Locales::new().with("xx", locale);
        assert_eq!(locales.template("min", Some(Subject::Numeric), "xx", "en"), "small");
        assert_eq!(locales.template("nothing", None, "xx", "en"), "Nope");
    }

    #[test]
    fn strings() {
        let locales = Locales::new();
        assert_eq!(locales.string("file", "de", "en").as_deref(), Some("File"));
        assert_eq!(locales.string("missing", "en", "en"), None);
    }

    #[test]
    fn interpolation() {
        let text = interpolate(
            "The :attribute must be between :min and :max.",
            &[
                ("attribute", "Age".to_owned()),
                ("min", "1".to_owned()),
                ("max", "3".to_owned()),
            ],
        );
        insta::assert_snapshot!(text, @"The Age must be between 1 and 3.");
        assert_eq!(interpolate("Keep :unknown", &[]), "Keep :unknown");
    }
}
