//! Element values.
//!
//! [`Value`] is JSON-shaped with two extra leaves the engine needs to reason about:
//! uploaded files (measured by byte size) and dates (compared chronologically).
//! Equality is structural ("deep"): lists compare element-wise, objects compare
//! key-by-key regardless of insertion order, and dates compare as absolute instants
//! so `2020-12-25T10:00:00+02:00 == 2020-12-25T08:00:00Z`.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;

/// Ordered string-keyed map used for object values.
pub type ObjectMap = IndexMap<String, Value>;

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileValue {
    /// Original file name, including extension.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type, when the host knows it.
    pub mime: Option<String>,
}

impl FileValue {
    /// Create a file value without a MIME type.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mime: None,
        }
    }

    /// Set the MIME type (builder).
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// Size in kilobytes, the unit size-based file rules measure in.
    pub fn kilobytes(&self) -> f64 {
        self.size as f64 / 1024.0
    }
}

/// A form value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Object(ObjectMap),
    File(FileValue),
    Date(DateTime<FixedOffset>),
}

impl Value {
    /// An empty object value.
    pub fn object() -> Self {
        Self::Object(ObjectMap::new())
    }

    /// Whether the value counts as "not filled in": null, `""`, `[]` or `{}`.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileValue> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Date(date) => Some(date),
            _ => None,
        }
    }

    /// Look up a key on an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Interpret the value as a number the way a text input would: numbers as-is,
    /// strings when they are a plain decimal literal.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) if is_decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a date: date values as-is, strings when they parse.
    pub fn to_date(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Date(date) => Some(*date),
            Self::String(s) => parse_date(s),
            _ => None,
        }
    }

    /// Convert from a JSON value. Strings stay strings; kinds that expect dates coerce later.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Files become `{name, size, mime}` objects, dates RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::File(file) => serde_json::json!({
                "name": file.name,
                "size": file.size,
                "mime": file.mime,
            }),
            Self::Date(date) => serde_json::Value::String(date.to_rfc3339()),
        }
    }
}

impl fmt::Display for Value {
    /// Human-readable rendering used in messages and option labels.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Object(_) => write!(f, "{}", self.to_json()),
            Self::File(file) => f.write_str(&file.name),
            Self::Date(date) => f.write_str(&date.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<FileValue> for Value {
    fn from(file: FileValue) -> Self {
        Self::File(file)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(date: DateTime<FixedOffset>) -> Self {
        Self::Date(date)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(&json)
    }
}

/// Whether `s` is a plain decimal literal: optional minus, digits, optional fraction.
pub(crate) fn is_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    let int_ok = int.chars().all(|c| c.is_ascii_digit());
    match frac {
        Some(frac) => int_ok && !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit()),
        None => int_ok && !int.is_empty(),
    }
}

/// Parse the date notations the engine accepts.
///
/// RFC 3339 keeps its offset. Date-only and offset-less date-times are taken as UTC.
pub fn parse_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date);
    }
    let utc = FixedOffset::east_opt(0)?;
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return utc.from_local_datetime(&naive).single();
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive).fixed_offset())
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emptiness() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("").is_empty());
        assert!(Value::List(vec![]).is_empty());
        assert!(Value::object().is_empty());
        assert!(!Value::from(" ").is_empty());
        assert!(!Value::from(0).is_empty());
        assert!(!Value::from(false).is_empty());
    }

    #[test]
    fn decimal_literals() {
        for ok in ["1", "-3", "1.2", "0.50"] {
            assert!(is_decimal(ok), "{ok}");
        }
        for bad in ["", "-", "1,2", "3 ", " 3", "1.", ".5", "asdf", "1e3"] {
            assert!(!is_decimal(bad), "{bad}");
        }
    }

    #[test]
    fn to_number_only_accepts_literals() {
        assert_eq!(Value::from("2.5").to_number(), Some(2.5));
        assert_eq!(Value::from(7).to_number(), Some(7.0));
        assert_eq!(Value::from("2,5").to_number(), None);
        assert_eq!(Value::Bool(true).to_number(), None);
    }

    #[test]
    fn deep_equality_ignores_object_order() {
        let a = Value::from(json!({"x": 1, "y": [1, 2]}));
        let b = Value::from(json!({"y": [1, 2], "x": 1}));
        assert_eq!(a, b);
        assert_ne!(a, Value::from(json!({"x": 1, "y": [2, 1]})));
    }

    #[test]
    fn dates_compare_as_instants() {
        let a = parse_date("2020-12-25T10:00:00+02:00").unwrap();
        let b = parse_date("2020-12-25T08:00:00Z").unwrap();
        assert_eq!(Value::Date(a), Value::Date(b));
    }

    #[test]
    fn date_only_is_midnight_utc() {
        let d = parse_date("2020-12-25").unwrap();
        assert_eq!(d.to_rfc3339(), "2020-12-25T00:00:00+00:00");
        assert!(parse_date("25/12/2020").is_none());
    }

    #[test]
    fn json_round_trip_keeps_integers() {
        let json = json!({"a": 1, "b": 1.5, "c": [true, null, "x"]});
        assert_eq!(Value::from(json.clone()).to_json(), json);
    }

    #[test]
    fn file_to_json() {
        let file = FileValue::new("photo.JPG", 2048).with_mime("image/jpeg");
        assert_eq!(file.extension().as_deref(), Some("jpg"));
        assert_eq!(file.kilobytes(), 2.0);
        assert_eq!(
            Value::from(file).to_json(),
            json!({"name": "photo.JPG", "size": 2048, "mime": "image/jpeg"})
        );
    }

    #[test]
    fn display() {
        assert_eq!(Value::from(2).to_string(), "2");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(vec![1, 2, 3]).to_string(), "1, 2, 3");
        assert_eq!(Value::Null.to_string(), "");
    }
}
