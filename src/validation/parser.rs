//! Rule specification parser.
//!
//! Turns [`RulesSpec`] into [`ParsedRule`]s: a rule name plus raw parameters. Whether
//! the name exists and the parameters make sense is decided later by the
//! [`RuleRegistry`](super::RuleRegistry).

use crate::conditions::Condition;
use crate::error::ConfigurationError;
use crate::schema::{RuleSpecItem, RulesSpec};
use crate::validation::tokenizer::{tokenize, Token};

/// A syntactically valid rule reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRule {
    pub name: String,
    pub params: Vec<String>,
    /// The rule only applies while this holds.
    pub conditions: Option<Condition>,
}

impl ParsedRule {
    fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
            conditions: None,
        }
    }
}

/// Rules whose single parameter is taken verbatim, commas included.
fn takes_raw_parameter(name: &str) -> bool {
    matches!(name, "regex" | "not_regex")
}

/// Parse a whole rules specification, in declaration order.
pub fn parse_rules(spec: &RulesSpec) -> Result<Vec<ParsedRule>, ConfigurationError> {
    match spec {
        RulesSpec::Pipe(text) => parse_pipe(text),
        RulesSpec::List(items) => items.iter().map(parse_item).collect(),
    }
}

/// Parse `"required|min:3|in:a,b"`.
pub fn parse_pipe(text: &str) -> Result<Vec<ParsedRule>, ConfigurationError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    tokenize(text)
        .split(|(token, _)| *token == Token::Pipe)
        .map(|segment| parse_segment(segment, text))
        .collect()
}

fn parse_item(item: &RuleSpecItem) -> Result<ParsedRule, ConfigurationError> {
    match item {
        RuleSpecItem::Text(text) => {
            // Pipes are plain text inside a single list entry.
            let tokens: Vec<_> = tokenize(text)
                .into_iter()
                .map(|(token, s)| match token {
                    Token::Pipe => (Token::Text, s),
                    other => (other, s),
                })
                .collect();
            parse_segment(&merge_text(tokens), text)
        }
        RuleSpecItem::Object {
            name,
            parameters,
            conditions,
        } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(malformed(&format!("{item:?}"), "empty rule name"));
            }
            let params = parameters
                .iter()
                .map(|p| match p {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            let conditions = conditions
                .as_ref()
                .map(Condition::from_json)
                .transpose()
                .map_err(|reason| malformed(name, &reason))?;
            Ok(ParsedRule {
                conditions,
                ..ParsedRule::new(name, params)
            })
        }
    }
}

/// Join consecutive text tokens so a re-labelled pipe does not split a parameter.
fn merge_text(tokens: Vec<(Token, &str)>) -> Vec<(Token, String)> {
    let mut merged: Vec<(Token, String)> = Vec::with_capacity(tokens.len());
    for (token, text) in tokens {
        match (merged.last_mut(), token) {
            (Some((Token::Text, prev)), Token::Text) => prev.push_str(text),
            _ => merged.push((token, text.to_owned())),
        }
    }
    merged
}

/// Parse the tokens of one rule: `name[:param[,param...]]`.
fn parse_segment<S: AsRef<str>>(
    tokens: &[(Token, S)],
    spec: &str,
) -> Result<ParsedRule, ConfigurationError> {
    let mut iter = tokens.iter();

    let name = match iter.next() {
        Some((Token::Text, text)) => text.as_ref().trim(),
        Some((token, _)) => {
            return Err(malformed(spec, &format!("expected a rule name, found {token:?}")))
        }
        None => return Err(malformed(spec, "empty rule")),
    };
    if name.is_empty() {
        return Err(malformed(spec, "empty rule name"));
    }

    match iter.next() {
        None => return Ok(ParsedRule::new(name, Vec::new())),
        Some((Token::Colon, _)) => {}
        Some((token, _)) => {
            return Err(malformed(
                spec,
                &format!("expected `:` after `{name}`, found {token:?}"),
            ))
        }
    }

    // After the first colon, further colons are parameter text.
    let raw = takes_raw_parameter(name);
    let mut params = Vec::new();
    let mut current = String::new();
    for (token, text) in iter {
        match token {
            Token::Comma if !raw => params.push(std::mem::take(&mut current)),
            _ => current.push_str(text.as_ref()),
        }
    }
    params.push(current);

    if raw {
        if params[0].is_empty() {
            return Err(malformed(spec, &format!("`{name}` expects a pattern")));
        }
        return Ok(ParsedRule::new(name, params));
    }

    let params: Vec<String> = params.into_iter().map(|p| p.trim().to_owned()).collect();
    if params.iter().all(String::is_empty) {
        return Err(malformed(spec, &format!("expected parameters after `{name}:`")));
    }
    Ok(ParsedRule::new(name, params))
}

fn malformed(spec: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::MalformedRule {
        spec: spec.to_owned(),
        reason: reason.to_owned(),
    }
}
