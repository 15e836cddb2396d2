//! Rule registry.
//!
//! Maps rule names to implementations. A registry is handed to the form at
//! construction; hosts add their own (possibly async) rules next to the built-ins.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::conditions::Condition;
use crate::error::ConfigurationError;
use crate::schema::RulesSpec;
use crate::validation::parser::parse_rules;
use crate::validation::rule::Rule;
use crate::validation::rules::Builtin;

/// A parsed rule bound to its implementation.
#[derive(Clone)]
pub struct RuleInstance {
    pub name: String,
    pub params: Vec<String>,
    /// The rule only applies while this holds.
    pub conditions: Option<Condition>,
    pub rule: Rc<dyn Rule>,
}

impl RuleInstance {
    /// Paths of other elements this instance reads, including those of its conditions.
    pub fn references(&self, own_name: &str) -> Vec<String> {
        let mut refs = self.rule.references(&self.params, own_name);
        if let Some(conditions) = &self.conditions {
            for path in conditions.paths() {
                if !refs.iter().any(|r| r == path) {
                    refs.push(path.to_owned());
                }
            }
        }
        refs
    }
}

impl fmt::Debug for RuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleInstance")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("conditions", &self.conditions)
            .finish_non_exhaustive()
    }
}

/// Name → rule table.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Rc<dyn Rule>>,
}

impl RuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every [`Builtin`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in Builtin::ALL {
            registry.register(builtin.name(), *builtin);
        }
        registry
    }

    /// Add or replace a rule.
    pub fn register(&mut self, name: impl Into<String>, rule: impl Rule + 'static) -> &mut Self {
        self.rules.insert(name.into(), Rc::new(rule));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, rule: impl Rule + 'static) -> Self {
        self.register(name, rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Rule>> {
        self.rules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse `spec` and bind every rule, checking names and parameters.
    pub fn compile(&self, spec: &RulesSpec, path: &str) -> crate::Result<Vec<RuleInstance>> {
        parse_rules(spec)?
            .into_iter()
            .map(|parsed| {
                let rule = self
                    .get(&parsed.name)
                    .ok_or_else(|| ConfigurationError::UnknownRule {
                        name: parsed.name.clone(),
                        path: path.to_owned(),
                    })?;
                rule.check_params(&parsed.params)
                    .map_err(|reason| ConfigurationError::MalformedRule {
                        spec: describe(spec),
                        reason,
                    })?;
                Ok(RuleInstance {
                    name: parsed.name,
                    params: parsed.params,
                    conditions: parsed.conditions,
                    rule,
                })
            })
            .collect()
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.rules.keys().collect();
        names.sort();
        f.debug_struct("RuleRegistry").field("rules", &names).finish()
    }
}

fn describe(spec: &RulesSpec) -> String {
    match spec {
        RulesSpec::Pipe(text) => text.clone(),
        RulesSpec::List(items) => format!("{items:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::rule::FnRule;

    #[test]
    fn builtins_registered() {
        let registry = RuleRegistry::with_builtins();
        assert_eq!(registry.len(), Builtin::ALL.len());
        assert!(registry.contains("required"));
        assert!(registry.contains("digits_between"));
        assert!(!registry.contains("unique"));
    }

    #[test]
    fn compile_binds_rules() {
        let registry = RuleRegistry::with_builtins();
        let rules = registry
            .compile(&RulesSpec::Pipe("required|between:1,3".into()), "a")
            .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].params, vec!["1", "3"]);
        assert!(rules[0].rule.implicit());
        assert!(rules[1].rule.sized());
    }

    #[test]
    fn unknown_rule() {
        let err = RuleRegistry::with_builtins()
            .compile(&RulesSpec::Pipe("required|unique".into()), "user.email")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownRule { ref name, ref path } if name == "unique" && path == "user.email"
        ));
    }

    #[test]
    fn bad_parameters() {
        let err = RuleRegistry::with_builtins()
            .compile(&RulesSpec::Pipe("max:lots".into()), "a")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedRule { .. }));
    }

    #[test]
    fn custom_rules() {
        let registry = RuleRegistry::with_builtins()
            .with("even", FnRule::new(|v, _| v.to_number().is_some_and(|n| n % 2.0 == 0.0)));
        let rules = registry
            .compile(&RulesSpec::Pipe("even".into()), "n")
            .unwrap();
        assert_eq!(rules[0].name, "even");
    }

    #[test]
    fn references_include_conditions() {
        let spec: RulesSpec = serde_json::from_value(serde_json::json!([
            {"name": "same", "parameters": ["b"], "conditions": [["c", 1]]}
        ]))
        .unwrap();
        let rules = RuleRegistry::with_builtins().compile(&spec, "a").unwrap();
        assert_eq!(rules[0].references("a"), vec!["b", "c"]);
    }
}
