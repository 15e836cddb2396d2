//! Built-in rules.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::{Regex, RegexBuilder};

use crate::conditions::expr::loose_eq;
use crate::validation::rule::{Check, Rule, RuleInput, Subject};
use crate::value::{parse_date, Value};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern")
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^(https?|ftp)://[^\s/$.?#][^\s]*$")
        .case_insensitive(true)
        .build()
        .expect("valid url pattern")
});

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid uuid pattern")
});

/// Every rule shipped with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Accepted,
    After,
    AfterOrEqual,
    Alpha,
    AlphaDash,
    AlphaNum,
    Array,
    Before,
    BeforeOrEqual,
    Between,
    Boolean,
    Confirmed,
    Date,
    DateEquals,
    Different,
    Digits,
    DigitsBetween,
    Distinct,
    Email,
    File,
    Filled,
    Gt,
    Gte,
    In,
    Integer,
    Ip,
    Ipv4,
    Ipv6,
    Json,
    Lt,
    Lte,
    Max,
    Mimes,
    Mimetypes,
    Min,
    NotIn,
    NotRegex,
    Nullable,
    Numeric,
    Regex,
    Required,
    RequiredIf,
    RequiredUnless,
    Same,
    Size,
    String,
    Url,
    Uuid,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Self::Accepted,
        Self::After,
        Self::AfterOrEqual,
        Self::Alpha,
        Self::AlphaDash,
        Self::AlphaNum,
        Self::Array,
        Self::Before,
        Self::BeforeOrEqual,
        Self::Between,
        Self::Boolean,
        Self::Confirmed,
        Self::Date,
        Self::DateEquals,
        Self::Different,
        Self::Digits,
        Self::DigitsBetween,
        Self::Distinct,
        Self::Email,
        Self::File,
        Self::Filled,
        Self::Gt,
        Self::Gte,
        Self::In,
        Self::Integer,
        Self::Ip,
        Self::Ipv4,
        Self::Ipv6,
        Self::Json,
        Self::Lt,
        Self::Lte,
        Self::Max,
        Self::Mimes,
        Self::Mimetypes,
        Self::Min,
        Self::NotIn,
        Self::NotRegex,
        Self::Nullable,
        Self::Numeric,
        Self::Regex,
        Self::Required,
        Self::RequiredIf,
        Self::RequiredUnless,
        Self::Same,
        Self::Size,
        Self::String,
        Self::Url,
        Self::Uuid,
    ];

    /// Registry name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::After => "after",
            Self::AfterOrEqual => "after_or_equal",
            Self::Alpha => "alpha",
            Self::AlphaDash => "alpha_dash",
            Self::AlphaNum => "alpha_num",
            Self::Array => "array",
            Self::Before => "before",
            Self::BeforeOrEqual => "before_or_equal",
            Self::Between => "between",
            Self::Boolean => "boolean",
            Self::Confirmed => "confirmed",
            Self::Date => "date",
            Self::DateEquals => "date_equals",
            Self::Different => "different",
            Self::Digits => "digits",
            Self::DigitsBetween => "digits_between",
            Self::Distinct => "distinct",
            Self::Email => "email",
            Self::File => "file",
            Self::Filled => "filled",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
            Self::Integer => "integer",
            Self::Ip => "ip",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::Json => "json",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Max => "max",
            Self::Mimes => "mimes",
            Self::Mimetypes => "mimetypes",
            Self::Min => "min",
            Self::NotIn => "not_in",
            Self::NotRegex => "not_regex",
            Self::Nullable => "nullable",
            Self::Numeric => "numeric",
            Self::Regex => "regex",
            Self::Required => "required",
            Self::RequiredIf => "required_if",
            Self::RequiredUnless => "required_unless",
            Self::Same => "same",
            Self::Size => "size",
            Self::String => "string",
            Self::Url => "url",
            Self::Uuid => "uuid",
        }
    }

    /// Minimum number of parameters.
    fn arity(self) -> usize {
        match self {
            Self::Between | Self::DigitsBetween | Self::RequiredIf | Self::RequiredUnless => 2,
            Self::After
            | Self::AfterOrEqual
            | Self::Before
            | Self::BeforeOrEqual
            | Self::DateEquals
            | Self::Different
            | Self::Digits
            | Self::Gt
            | Self::Gte
            | Self::In
            | Self::Lt
            | Self::Lte
            | Self::Max
            | Self::Mimes
            | Self::Mimetypes
            | Self::Min
            | Self::NotIn
            | Self::NotRegex
            | Self::Regex
            | Self::Same
            | Self::Size => 1,
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `@path` marks a reference in any parameter position.
fn reference(param: &str) -> Option<&str> {
    param.strip_prefix('@')
}

/// Size parameter of `gt`/`gte`/`lt`/`lte`: a number, or the path of another element.
fn comparison_target(param: &str) -> Option<&str> {
    let param = param.trim();
    match reference(param) {
        Some(path) => Some(path),
        None if param.parse::<f64>().is_ok() => None,
        None => Some(param),
    }
}

/// Date parameter: a literal date, or the path of another element.
fn date_target(param: &str) -> Option<&str> {
    let param = param.trim();
    match reference(param) {
        Some(path) => Some(path),
        None if parse_date(param).is_some() => None,
        None => Some(param),
    }
}

/// Scalar text the way string-shaped rules see it.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) => Some(value.to_string()),
        _ => None,
    }
}

fn present(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        other => !other.is_empty(),
    }
}

fn matches_any(value: &Value, options: &[Value]) -> bool {
    let hit = |item: &Value| options.iter().any(|option| loose_eq(item, option));
    match value {
        Value::List(items) => items.iter().all(hit),
        other => hit(other),
    }
}

/// Compile a `regex` parameter. `/pattern/flags` literals are unwrapped; `i`, `m`, `s`
/// and `x` flags are honored.
pub(crate) fn compile_pattern(param: &str) -> Result<Regex, regex::Error> {
    let (pattern, flags) = match param.strip_prefix('/').and_then(|rest| rest.rsplit_once('/')) {
        Some((pattern, flags)) if flags.chars().all(|c| c.is_ascii_alphabetic()) => {
            (pattern, flags)
        }
        _ => (param, ""),
    };
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
}

fn pattern_matches(input: &RuleInput<'_>) -> bool {
    let Some(text) = text(input.value) else {
        return false;
    };
    compile_pattern(input.param(0).unwrap_or_default())
        .map(|re| re.is_match(&text))
        .unwrap_or(false)
}

/// Compare the measured value against a number or another element measured the same way.
fn compare_size(input: &RuleInput<'_>, cmp: fn(f64, f64) -> bool) -> bool {
    let Some(own) = input.size() else {
        return false;
    };
    let param = input.param(0).unwrap_or_default();
    let other = match comparison_target(param) {
        Some(path) => input.subject.measure(&input.other(path)),
        None => param.trim().parse().ok(),
    };
    other.is_some_and(|other| cmp(own, other))
}

fn target_date(input: &RuleInput<'_>) -> Option<DateTime<FixedOffset>> {
    let param = input.param(0).unwrap_or_default();
    match date_target(param) {
        Some(path) => input.other(path).to_date(),
        None => parse_date(param),
    }
}

/// Missing or unparsable targets pass; a value that is not a date fails.
fn compare_dates(
    input: &RuleInput<'_>,
    cmp: fn(&DateTime<FixedOffset>, &DateTime<FixedOffset>) -> bool,
) -> bool {
    let Some(target) = target_date(input) else {
        return true;
    };
    input.value.to_date().is_some_and(|own| cmp(&own, &target))
}

fn digits_len(value: &Value) -> Option<usize> {
    let text = text(value)?;
    (!text.is_empty() && text.chars().all(|c| c.is_ascii_digit())).then_some(text.len())
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.fract() == 0.0,
        Value::String(s) => {
            let digits = s.strip_prefix('-').unwrap_or(s);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(family) => mime.split('/').next() == Some(family),
        None => pattern.eq_ignore_ascii_case(mime),
    }
}

// ---------------------------------------------------------------------------
// Rule implementation
// ---------------------------------------------------------------------------

impl Rule for Builtin {
    fn check(&self, input: &RuleInput<'_>) -> Check {
        let value = input.value;
        let valid = match self {
            Self::Accepted => match value {
                Value::Bool(flag) => *flag,
                Value::Number(n) => *n == 1.0,
                Value::String(s) => matches!(s.as_str(), "yes" | "on" | "1" | "true"),
                _ => false,
            },
            Self::After => compare_dates(input, |a, b| a > b),
            Self::AfterOrEqual => compare_dates(input, |a, b| a >= b),
            Self::Alpha => value
                .as_str()
                .is_some_and(|s| s.chars().all(char::is_alphabetic)),
            Self::AlphaDash => text(value).is_some_and(|s| {
                s.chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
            }),
            Self::AlphaNum => text(value).is_some_and(|s| s.chars().all(char::is_alphanumeric)),
            Self::Array => matches!(value, Value::List(_)),
            Self::Before => compare_dates(input, |a, b| a < b),
            Self::BeforeOrEqual => compare_dates(input, |a, b| a <= b),
            Self::Between => match (input.size(), input.number(0), input.number(1)) {
                (Some(size), Some(min), Some(max)) => size >= min && size <= max,
                _ => false,
            },
            Self::Boolean => match value {
                Value::Bool(_) => true,
                Value::Number(n) => *n == 0.0 || *n == 1.0,
                Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
                _ => false,
            },
            Self::Confirmed => {
                let confirmation = format!("{}_confirmation", input.name);
                loose_eq(value, &input.other(&confirmation))
            }
            Self::Date => value.to_date().is_some(),
            Self::DateEquals => compare_dates(input, |a, b| a == b),
            Self::Different => !loose_eq(value, &input.other(other_path(input))),
            Self::Digits => digits_len(value)
                .zip(input.number(0))
                .is_some_and(|(len, n)| len as f64 == n),
            Self::DigitsBetween => match (digits_len(value), input.number(0), input.number(1)) {
                (Some(len), Some(min), Some(max)) => len as f64 >= min && len as f64 <= max,
                _ => false,
            },
            Self::Distinct => match value {
                Value::List(items) => items
                    .iter()
                    .enumerate()
                    .all(|(i, a)| items[i + 1..].iter().all(|b| !loose_eq(a, b))),
                _ => true,
            },
            Self::Email => value.as_str().is_some_and(|s| EMAIL.is_match(s)),
            Self::File => matches!(value, Value::File(_)),
            Self::Filled | Self::Required => present(value),
            Self::Gt => compare_size(input, |a, b| a > b),
            Self::Gte => compare_size(input, |a, b| a >= b),
            Self::In => matches_any(value, &input.resolved_params(0)),
            Self::Integer => is_integer(value),
            Self::Ip => value
                .as_str()
                .is_some_and(|s| s.parse::<Ipv4Addr>().is_ok() || s.parse::<Ipv6Addr>().is_ok()),
            Self::Ipv4 => value.as_str().is_some_and(|s| s.parse::<Ipv4Addr>().is_ok()),
            Self::Ipv6 => value.as_str().is_some_and(|s| s.parse::<Ipv6Addr>().is_ok()),
            Self::Json => value
                .as_str()
                .is_some_and(|s| serde_json::from_str::<serde_json::Value>(s).is_ok()),
            Self::Lt => compare_size(input, |a, b| a < b),
            Self::Lte => compare_size(input, |a, b| a <= b),
            Self::Max => input
                .size()
                .zip(input.number(0))
                .is_some_and(|(size, max)| size <= max),
            Self::Mimes => value.as_file().and_then(|f| f.extension()).is_some_and(|ext| {
                input
                    .params
                    .iter()
                    .any(|p| p.trim().eq_ignore_ascii_case(&ext))
            }),
            Self::Mimetypes => value.as_file().and_then(|f| f.mime.as_deref()).is_some_and(|mime| {
                input.params.iter().any(|p| mime_matches(p.trim(), mime))
            }),
            Self::Min => input
                .size()
                .zip(input.number(0))
                .is_some_and(|(size, min)| size >= min),
            Self::NotIn => !matches_any(value, &input.resolved_params(0)),
            Self::NotRegex => !pattern_matches(input),
            Self::Nullable => true,
            Self::Numeric => value.to_number().is_some(),
            Self::Regex => pattern_matches(input),
            Self::RequiredIf => {
                let other = input.other(other_path(input));
                !matches_any(&other, &input.resolved_params(1)) || present(value)
            }
            Self::RequiredUnless => {
                let other = input.other(other_path(input));
                matches_any(&other, &input.resolved_params(1)) || present(value)
            }
            Self::Same => loose_eq(value, &input.other(other_path(input))),
            Self::Size => input
                .size()
                .zip(input.number(0))
                .is_some_and(|(size, n)| size == n),
            Self::String => matches!(value, Value::String(_)),
            Self::Url => value.as_str().is_some_and(|s| URL.is_match(s)),
            Self::Uuid => value.as_str().is_some_and(|s| UUID.is_match(s)),
        };
        Check::from_bool(valid)
    }

    fn implicit(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Filled | Self::Required | Self::RequiredIf | Self::RequiredUnless
        )
    }

    fn sized(&self) -> bool {
        matches!(
            self,
            Self::Between | Self::Gt | Self::Gte | Self::Lt | Self::Lte | Self::Max | Self::Min | Self::Size
        )
    }

    fn subject(&self) -> Option<Subject> {
        match self {
            Self::Numeric | Self::Integer => Some(Subject::Numeric),
            Self::Array => Some(Subject::Array),
            Self::File => Some(Subject::File),
            Self::String => Some(Subject::String),
            _ => None,
        }
    }

    fn check_params(&self, params: &[String]) -> Result<(), String> {
        let arity = self.arity();
        if params.len() < arity {
            return Err(format!(
                "`{}` expects at least {arity} parameter(s), got {}",
                self.name(),
                params.len()
            ));
        }
        let numeric = |index: usize| -> Result<(), String> {
            let param = params[index].trim();
            if reference(param).is_some() {
                return Ok(());
            }
            param
                .parse::<f64>()
                .map(|_| ())
                .map_err(|_| format!("`{}` expects a number, got `{}`", self.name(), params[index]))
        };
        match self {
            Self::Max | Self::Min | Self::Size | Self::Digits => numeric(0),
            Self::Between | Self::DigitsBetween => numeric(0).and_then(|_| numeric(1)),
            Self::Regex | Self::NotRegex => compile_pattern(&params[0])
                .map(|_| ())
                .map_err(|err| err.to_string()),
            _ => Ok(()),
        }
    }

    fn references(&self, params: &[String], name: &str) -> Vec<String> {
        let mut refs: Vec<String> = match self {
            Self::Gt | Self::Gte | Self::Lt | Self::Lte => {
                params.first().and_then(|p| comparison_target(p)).map(str::to_owned).into_iter().collect()
            }
            Self::After | Self::AfterOrEqual | Self::Before | Self::BeforeOrEqual | Self::DateEquals => {
                params.first().and_then(|p| date_target(p)).map(str::to_owned).into_iter().collect()
            }
            Self::Same | Self::Different | Self::RequiredIf | Self::RequiredUnless => params
                .first()
                .map(|p| p.trim().trim_start_matches('@').to_owned())
                .into_iter()
                .collect(),
            Self::Confirmed => vec![format!("{name}_confirmation")],
            _ => Vec::new(),
        };
        for param in params {
            if let Some(path) = reference(param.trim()) {
                if !refs.iter().any(|r| r == path) {
                    refs.push(path.to_owned());
                }
            }
        }
        refs
    }

    fn placeholders(&self, input: &RuleInput<'_>) -> Vec<(&'static str, String)> {
        let param = |i: usize| input.param(i).unwrap_or_default().trim().to_owned();
        let shown = |i: usize| input.resolved(i).map(|v| v.to_string()).unwrap_or_default();
        let list = |from: usize| {
            input
                .resolved_params(from)
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Self::Between | Self::DigitsBetween => vec![("min", shown(0)), ("max", shown(1))],
            Self::Max => vec![("max", shown(0))],
            Self::Min => vec![("min", shown(0))],
            Self::Size => vec![("size", shown(0))],
            Self::Digits => vec![("digits", shown(0))],
            Self::Gt | Self::Gte | Self::Lt | Self::Lte => {
                let shown = match comparison_target(&param(0)) {
                    Some(path) => input
                        .subject
                        .measure(&input.other(path))
                        .map(|n| Value::from(n).to_string())
                        .unwrap_or_default(),
                    None => param(0),
                };
                vec![("value", shown)]
            }
            Self::After | Self::AfterOrEqual | Self::Before | Self::BeforeOrEqual | Self::DateEquals => {
                let shown = match date_target(&param(0)) {
                    Some(path) => input.other_name(path),
                    None => param(0),
                };
                vec![("date", shown)]
            }
            Self::Same | Self::Different => vec![("other", input.other_name(other_path(input)))],
            Self::RequiredIf => vec![
                ("other", input.other_name(other_path(input))),
                ("value", list(1)),
            ],
            Self::RequiredUnless => vec![
                ("other", input.other_name(other_path(input))),
                ("values", list(1)),
            ],
            Self::Mimes | Self::Mimetypes => vec![("values", list(0))],
            _ => Vec::new(),
        }
    }
}

fn other_path<'a>(input: &'a RuleInput<'_>) -> &'a str {
    let param = input.param(0).unwrap_or_default().trim();
    param.strip_prefix('@').unwrap_or(param)
}
