//! Conditions expression trees: parsing and evaluation.
//!
//! Two notations are accepted from schemas:
//!
//! ```text
//! {"op": "and", "children": [{"path": "b", "operator": "==", "value": 1}, ...]}
//! [["b", 1], ["c", "!=", 2], [["d", 1], ["e", 1]]]
//! ```
//!
//! In the compact list notation the outer list is an AND, a leaf is `[path, value]` or
//! `[path, operator, value]`, and an entry whose first item is itself a list is an OR of
//! its entries.

use std::fmt;
use std::str::FromStr;

use serde_json::Value as Json;

use crate::value::Value;

/// Comparison performed by a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    /// The referenced element exists in the tree.
    Exists,
    Empty,
    NotEmpty,
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" | "=" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            "exists" => Self::Exists,
            "empty" => Self::Empty,
            "not_empty" => Self::NotEmpty,
            other => return Err(format!("unknown operator `{other}`")),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Exists => "exists",
            Self::Empty => "empty",
            Self::NotEmpty => "not_empty",
        })
    }
}

/// A conditions expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Leaf {
        path: String,
        operator: Operator,
        value: Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    /// `path <operator> value`.
    pub fn compare(path: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Leaf {
            path: path.into(),
            operator,
            value: value.into(),
        }
    }

    /// `path == value`.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, Operator::Eq, value)
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Self::And(children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Self::Or(children)
    }

    /// Every path referenced by a leaf, in order of appearance.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Leaf { path, .. } => {
                if !out.contains(&path.as_str()) {
                    out.push(path);
                }
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
        }
    }

    /// Evaluate against live values. `lookup` returns `None` for paths with no element.
    ///
    /// `and` stops at the first false child, `or` at the first true one. Empty
    /// combinators follow the usual identities (`and` true, `or` false).
    pub fn evaluate(&self, lookup: &mut dyn FnMut(&str) -> Option<Value>) -> bool {
        match self {
            Self::Leaf {
                path,
                operator,
                value,
            } => {
                let actual = lookup(path);
                compare(actual.as_ref(), *operator, value)
            }
            Self::And(children) => children.iter().all(|c| c.evaluate(lookup)),
            Self::Or(children) => children.iter().any(|c| c.evaluate(lookup)),
        }
    }

    /// Parse either notation from JSON.
    pub fn from_json(json: &Json) -> Result<Self, String> {
        match json {
            Json::Object(_) => parse_object(json),
            Json::Array(items) => {
                if is_leaf_array(items) {
                    parse_leaf_array(items)
                } else {
                    items
                        .iter()
                        .map(parse_entry)
                        .collect::<Result<Vec<_>, _>>()
                        .map(Self::And)
                }
            }
            other => Err(format!("expected object or list, found {other}")),
        }
    }
}

fn parse_object(json: &Json) -> Result<Condition, String> {
    if let Some(op) = json.get("op") {
        let children = json
            .get("children")
            .and_then(Json::as_array)
            .ok_or("combinator without `children` list")?
            .iter()
            .map(Condition::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        return match op.as_str() {
            Some("and") => Ok(Condition::And(children)),
            Some("or") => Ok(Condition::Or(children)),
            _ => Err(format!("unknown combinator {op}")),
        };
    }
    let path = json
        .get("path")
        .and_then(Json::as_str)
        .ok_or("leaf without `path`")?;
    let operator = match json.get("operator") {
        Some(op) => op.as_str().ok_or("operator must be a string")?.parse()?,
        None => Operator::Eq,
    };
    let value = json.get("value").map(Value::from_json).unwrap_or_default();
    Ok(Condition::compare(path, operator, value))
}

/// An entry of a compact AND list: a leaf, an object, or an OR group.
fn parse_entry(json: &Json) -> Result<Condition, String> {
    match json {
        Json::Array(items) if is_leaf_array(items) => parse_leaf_array(items),
        Json::Array(items) => items
            .iter()
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()
            .map(Condition::Or),
        Json::Object(_) => parse_object(json),
        other => Err(format!("unexpected condition entry {other}")),
    }
}

fn is_leaf_array(items: &[Json]) -> bool {
    matches!(items.first(), Some(Json::String(_)))
}

fn parse_leaf_array(items: &[Json]) -> Result<Condition, String> {
    let path = items[0].as_str().unwrap_or_default();
    match items.len() {
        1 => Ok(Condition::compare(path, Operator::NotEmpty, Value::Null)),
        2 => {
            // `["b", "empty"]` reads as an operator, `["b", "x"]` as equality.
            if let Some(op) = items[1]
                .as_str()
                .and_then(|s| s.parse::<Operator>().ok())
                .filter(|op| matches!(op, Operator::Empty | Operator::NotEmpty | Operator::Exists))
            {
                return Ok(Condition::compare(path, op, Value::Null));
            }
            Ok(Condition::eq(path, Value::from_json(&items[1])))
        }
        3 => {
            let op = items[1]
                .as_str()
                .ok_or("operator must be a string")?
                .parse()?;
            Ok(Condition::compare(path, op, Value::from_json(&items[2])))
        }
        n => Err(format!("condition leaf has {n} entries")),
    }
}

/// Equality the way a form author means it: numeric strings equal their numbers,
/// everything else compares deeply.
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.to_number(), b.to_number()) {
        return x == y;
    }
    a == b
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.to_number(), b.to_number()) {
        return x.partial_cmp(&y);
    }
    if let (Value::Date(_), _) | (_, Value::Date(_)) = (a, b) {
        return a.to_date()?.partial_cmp(&b.to_date()?);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::List(items) => items.iter().any(|item| loose_eq(item, needle)),
        other => loose_eq(other, needle),
    }
}

fn compare(actual: Option<&Value>, operator: Operator, expected: &Value) -> bool {
    use std::cmp::Ordering::*;

    let null = Value::Null;
    let present = actual.is_some();
    let actual = actual.unwrap_or(&null);
    match operator {
        Operator::Exists => present,
        Operator::Empty => actual.is_empty(),
        Operator::NotEmpty => !actual.is_empty(),
        // A list value "equals" a scalar it contains (checkbox groups, multiselects).
        Operator::Eq => match (actual, expected) {
            (Value::List(_), Value::List(_)) => actual == expected,
            (Value::List(_), _) => contains(actual, expected),
            _ => loose_eq(actual, expected),
        },
        Operator::Ne => !compare(Some(actual), Operator::Eq, expected),
        Operator::Gt => ordering(actual, expected) == Some(Greater),
        Operator::Gte => matches!(ordering(actual, expected), Some(Greater | Equal)),
        Operator::Lt => ordering(actual, expected) == Some(Less),
        Operator::Lte => matches!(ordering(actual, expected), Some(Less | Equal)),
        Operator::In => match actual {
            Value::List(items) => items.iter().any(|item| contains(expected, item)),
            _ => contains(expected, actual),
        },
        Operator::NotIn => !compare(Some(actual), Operator::In, expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup_from(values: &[(&str, Value)]) -> impl FnMut(&str) -> Option<Value> {
        let map: HashMap<String, Value> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |path| map.get(path).cloned()
    }

    #[test]
    fn operators_parse() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("not_in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert!("~=".parse::<Operator>().is_err());
    }

    #[test]
    fn equality_is_loose_for_numbers() {
        let cond = Condition::eq("b", 1);
        assert!(cond.evaluate(&mut lookup_from(&[("b", Value::from(1))])));
        assert!(cond.evaluate(&mut lookup_from(&[("b", Value::from("1"))])));
        assert!(!cond.evaluate(&mut lookup_from(&[("b", Value::from(2))])));
    }

    #[test]
    fn ordering_operators() {
        let mut lookup = lookup_from(&[("n", Value::from(5)), ("s", Value::from("b"))]);
        assert!(Condition::compare("n", Operator::Gt, 4).evaluate(&mut lookup));
        assert!(Condition::compare("n", Operator::Gte, 5).evaluate(&mut lookup));
        assert!(!Condition::compare("n", Operator::Lt, 5).evaluate(&mut lookup));
        assert!(Condition::compare("n", Operator::Lte, 5).evaluate(&mut lookup));
        assert!(Condition::compare("s", Operator::Gt, "a").evaluate(&mut lookup));
        // Incomparable shapes never satisfy an ordering.
        assert!(!Condition::compare("s", Operator::Gt, 1).evaluate(&mut lookup));
    }

    #[test]
    fn membership() {
        let mut lookup = lookup_from(&[("x", Value::from(2)), ("tags", Value::from(vec!["a", "b"]))]);
        assert!(Condition::compare("x", Operator::In, vec![1, 2]).evaluate(&mut lookup));
        assert!(Condition::compare("x", Operator::NotIn, vec![3]).evaluate(&mut lookup));
        assert!(Condition::compare("tags", Operator::In, vec!["b", "z"]).evaluate(&mut lookup));
        assert!(Condition::eq("tags", "a").evaluate(&mut lookup));
    }

    #[test]
    fn missing_paths_are_absent() {
        let mut lookup = lookup_from(&[]);
        assert!(!Condition::compare("nope", Operator::Exists, Value::Null).evaluate(&mut lookup));
        assert!(Condition::compare("nope", Operator::Empty, Value::Null).evaluate(&mut lookup));
        assert!(!Condition::eq("nope", 1).evaluate(&mut lookup));
        assert!(Condition::compare("nope", Operator::Ne, 1).evaluate(&mut lookup));
    }

    #[test]
    fn combinators_short_circuit() {
        let mut seen = Vec::new();
        let mut lookup = |path: &str| {
            seen.push(path.to_string());
            Some(Value::from(1))
        };
        let cond = Condition::or(vec![Condition::eq("a", 1), Condition::eq("b", 1)]);
        assert!(cond.evaluate(&mut lookup));
        let cond = Condition::and(vec![Condition::eq("c", 2), Condition::eq("d", 1)]);
        assert!(!cond.evaluate(&mut lookup));
        assert_eq!(seen, vec!["a", "c"]);
    }

    #[test]
    fn parse_object_notation() {
        let cond = Condition::from_json(&json!({
            "op": "or",
            "children": [
                {"path": "a", "operator": ">=", "value": 3},
                {"op": "and", "children": [{"path": "b", "value": "x"}]}
            ]
        }))
        .unwrap();
        assert_eq!(
            cond,
            Condition::or(vec![
                Condition::compare("a", Operator::Gte, 3),
                Condition::and(vec![Condition::eq("b", "x")]),
            ])
        );
        assert_eq!(cond.paths(), vec!["a", "b"]);
    }

    #[test]
    fn parse_compact_notation() {
        let cond = Condition::from_json(&json!([
            ["a", 1],
            ["b", "!=", 2],
            [["c", 1], ["d", "empty"]]
        ]))
        .unwrap();
        assert_eq!(
            cond,
            Condition::and(vec![
                Condition::eq("a", 1),
                Condition::compare("b", Operator::Ne, 2),
                Condition::or(vec![
                    Condition::eq("c", 1),
                    Condition::compare("d", Operator::Empty, Value::Null),
                ]),
            ])
        );
    }

    #[test]
    fn single_leaf_array() {
        assert_eq!(
            Condition::from_json(&json!(["b", "==", 1])).unwrap(),
            Condition::eq("b", 1)
        );
    }

    #[test]
    fn parse_errors() {
        assert!(Condition::from_json(&json!("b")).is_err());
        assert!(Condition::from_json(&json!({"op": "xor", "children": []})).is_err());
        assert!(Condition::from_json(&json!(["b", "~", 1])).is_err());
        assert!(Condition::from_json(&json!({"operator": "=="})).is_err());
    }
}
