//! Form configuration.
//!
//! [`FormConfig`] is built in code with the `with_*` builder methods or deserialized
//! from JSON (camelCase keys, `"validateOn": "change|submit"`).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

// ---------------------------------------------------------------------------
// ValidateOn
// ---------------------------------------------------------------------------

/// When elements validate on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOn {
    /// After every user-driven `update`.
    pub change: bool,
    /// As part of `submit`.
    pub submit: bool,
}

impl ValidateOn {
    pub const CHANGE_AND_SUBMIT: Self = Self {
        change: true,
        submit: true,
    };

    pub const SUBMIT: Self = Self {
        change: false,
        submit: true,
    };

    /// Parse `"change|submit"`. Unknown triggers are ignored with a warning.
    pub fn parse(spec: &str) -> Self {
        let mut on = Self {
            change: false,
            submit: false,
        };
        for trigger in spec.split('|').map(str::trim).filter(|t| !t.is_empty()) {
            match trigger {
                "change" => on.change = true,
                "submit" => on.submit = true,
                other => tracing::warn!(trigger = other, "ignoring unknown validateOn trigger"),
            }
        }
        on
    }
}

impl Default for ValidateOn {
    fn default() -> Self {
        Self::CHANGE_AND_SUBMIT
    }
}

impl fmt::Display for ValidateOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [(self.change, "change"), (self.submit, "submit")]
            .into_iter()
            .filter_map(|(on, name)| on.then_some(name))
            .collect();
        f.write_str(&parts.join("|"))
    }
}

impl<'de> Deserialize<'de> for ValidateOn {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        String::deserialize(de).map(|s| Self::parse(&s))
    }
}

// ---------------------------------------------------------------------------
// MultilingualValidation
// ---------------------------------------------------------------------------

/// Which language slots decide whether a multilingual element is invalid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultilingualValidation {
    /// Any validated language failing makes the element invalid.
    #[default]
    AllLanguages,
    /// Only the active language is validated and considered.
    ActiveLanguage,
}

// ---------------------------------------------------------------------------
// FormConfig
// ---------------------------------------------------------------------------

/// Configuration for a form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormConfig {
    pub validate_on: ValidateOn,
    /// Active message locale.
    pub locale: String,
    /// Locale consulted when the active one has no template.
    pub fallback_locale: String,
    /// Languages of multilingual elements.
    pub languages: Vec<String>,
    /// Active language. Defaults to the first of `languages`.
    pub language: Option<String>,
    pub multilingual_validation: MultilingualValidation,
    /// Debounce for elements that do not set their own, in milliseconds.
    #[serde(deserialize_with = "de_millis")]
    pub default_debounce: Option<Duration>,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            validate_on: ValidateOn::default(),
            locale: "en".to_owned(),
            fallback_locale: "en".to_owned(),
            languages: vec!["en".to_owned()],
            language: None,
            multilingual_validation: MultilingualValidation::default(),
            default_debounce: None,
        }
    }
}

impl FormConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON text.
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set when elements validate (builder).
    pub fn with_validate_on(mut self, validate_on: ValidateOn) -> Self {
        self.validate_on = validate_on;
        self
    }

    /// Set the message locale (builder).
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Set the fallback locale (builder).
    pub fn with_fallback_locale(mut self, locale: impl Into<String>) -> Self {
        self.fallback_locale = locale.into();
        self
    }

    /// Set the languages of multilingual elements (builder).
    pub fn with_languages(mut self, languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Set the active language (builder).
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set how multilingual elements validate (builder).
    pub fn with_multilingual_validation(mut self, mode: MultilingualValidation) -> Self {
        self.multilingual_validation = mode;
        self
    }

    /// Set the default debounce (builder).
    pub fn with_default_debounce(mut self, debounce: Duration) -> Self {
        self.default_debounce = Some(debounce);
        self
    }

    /// The language active at mount.
    pub fn initial_language(&self) -> String {
        self.language
            .clone()
            .or_else(|| self.languages.first().cloned())
            .unwrap_or_else(|| self.locale.clone())
    }
}

fn de_millis<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
    Option::<u64>::deserialize(de).map(|ms| ms.map(Duration::from_millis))
}
