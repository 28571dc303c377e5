//! `requires` clauses
//!
//! A choice's `requires` JSON is parsed once, at load time, into a [`Condition`] tree.
//! Evaluation goes through a [`Resolver`], which lets the expander resolve a referenced
//! wildcard on demand and report cycles.
//!
//! Accepted shapes:
//!
//! ```text
//! {"animal": "dog"}                     value equals
//! {"animal": ["dog", "wolf"]}           value in set
//! {"animal": {"any": [...], "not": ...}} membership and/or negated membership
//! {"tags": "furry"} | {"tags": [...]}   all tags present
//! {"tags": {"any": [...]}}              at least one tag present
//! {"and": [...]} {"or": [...]} {"not": {...}}
//! ```
//!
//! An object with several keys is the conjunction of its clauses.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConditionError, ExpandError};

/// How a tag clause compares against the accumulated tag set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    Any,
    All,
}

/// Parsed boolean expression gating a choice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// True if `wildcard` resolved to one of `values`
    ValueEquals { wildcard: String, values: BTreeSet<String> },
    /// Compared against the union of tags of every resolved wildcard
    TagMatch { mode: TagMode, tags: BTreeSet<String> },
}

/// Source of resolved values during evaluation
pub trait Resolver {
    /// Value of `wildcard`, resolving it first if it has not been resolved yet.
    ///
    /// Returns `Ok(None)` when the wildcard does not exist or has nothing to select.
    fn resolve_value(&mut self, wildcard: &str) -> Result<Option<String>, ExpandError>;

    /// Union of the tags of every resolved wildcard
    fn accumulated_tags(&self) -> BTreeSet<String>;
}

impl Condition {
    /// A condition that is never satisfied: `Not(And[])`
    pub fn never() -> Self {
        Condition::Not(Box::new(Condition::And(Vec::new())))
    }

    /// Parse a raw `requires` value for a choice of wildcard `owner`
    pub fn parse(raw: &Value, owner: &str) -> Result<Self, ConditionError> {
        match raw {
            Value::Object(map) => Self::parse_object(map, owner),
            other => Err(ConditionError::NotAnObject {
                found: json_kind(other).to_string(),
            }),
        }
    }

    fn parse_object(map: &Map<String, Value>, owner: &str) -> Result<Self, ConditionError> {
        let mut clauses = map
            .iter()
            .map(|(key, value)| Self::parse_clause(key, value, owner))
            .collect::<Result<Vec<_>, _>>()?;

        if clauses.len() == 1 {
            return Ok(clauses.remove(0));
        }
        Ok(Condition::And(clauses))
    }

    fn parse_clause(key: &str, value: &Value, owner: &str) -> Result<Self, ConditionError> {
        match key {
            "and" => Ok(Condition::And(Self::parse_operands(key, value, owner)?)),
            "or" => Ok(Condition::Or(Self::parse_operands(key, value, owner)?)),
            "not" => {
                let mut operands = Self::parse_operands(key, value, owner)?;
                let inner = if operands.len() == 1 {
                    operands.remove(0)
                } else {
                    // {"not": [a, b]} means none of them hold
                    Condition::Or(operands)
                };
                Ok(Condition::Not(Box::new(inner)))
            }
            "tags" => Self::parse_tags(value),
            wildcard => {
                if wildcard == owner {
                    return Err(ConditionError::SelfReference {
                        wildcard: wildcard.to_string(),
                    });
                }
                Self::parse_values(wildcard, value)
            }
        }
    }

    fn parse_operands(op: &str, value: &Value, owner: &str) -> Result<Vec<Self>, ConditionError> {
        let bad_operand = || ConditionError::BadOperand {
            op: op.to_string(),
            expected: "an object or a list of objects".to_string(),
        };
        match value {
            Value::Object(map) => Ok(vec![Self::parse_object(map, owner)?]),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Self::parse_object(map, owner),
                    _ => Err(bad_operand()),
                })
                .collect(),
            _ => Err(bad_operand()),
        }
    }

    fn parse_values(wildcard: &str, value: &Value) -> Result<Self, ConditionError> {
        let bad = || ConditionError::BadValueClause {
            wildcard: wildcard.to_string(),
        };
        let equals = |values: BTreeSet<String>| Condition::ValueEquals {
            wildcard: wildcard.to_string(),
            values,
        };

        match value {
            Value::Object(map) => {
                let mut parts = Vec::new();
                for (op, operand) in map {
                    let values = string_set(operand).ok_or_else(bad)?;
                    match op.as_str() {
                        "any" => parts.push(equals(values)),
                        "not" => parts.push(Condition::Not(Box::new(equals(values)))),
                        _ => return Err(bad()),
                    }
                }
                match parts.len() {
                    0 => Err(bad()),
                    1 => Ok(parts.remove(0)),
                    _ => Ok(Condition::And(parts)),
                }
            }
            other => string_set(other).map(equals).ok_or_else(bad),
        }
    }

    fn parse_tags(value: &Value) -> Result<Self, ConditionError> {
        match value {
            Value::Object(map) => {
                let mut parts = Vec::new();
                for (op, operand) in map {
                    let tags = string_set(operand).ok_or(ConditionError::BadTagClause)?;
                    let mode = match op.as_str() {
                        "any" => TagMode::Any,
                        "all" => TagMode::All,
                        _ => return Err(ConditionError::BadTagClause),
                    };
                    parts.push(Condition::TagMatch { mode, tags });
                }
                match parts.len() {
                    0 => Err(ConditionError::BadTagClause),
                    1 => Ok(parts.remove(0)),
                    _ => Ok(Condition::And(parts)),
                }
            }
            other => string_set(other)
                .map(|tags| Condition::TagMatch {
                    mode: TagMode::All,
                    tags,
                })
                .ok_or(ConditionError::BadTagClause),
        }
    }

    /// Wildcard names this condition reads
    pub fn referenced_wildcards(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references(&self, names: &mut BTreeSet<String>) {
        match self {
            Condition::And(items) | Condition::Or(items) => {
                for item in items {
                    item.collect_references(names);
                }
            }
            Condition::Not(inner) => inner.collect_references(names),
            Condition::ValueEquals { wildcard, .. } => {
                names.insert(wildcard.clone());
            }
            Condition::TagMatch { .. } => {}
        }
    }

    /// Every `(wildcard, value)` pair this condition compares against
    pub fn referenced_values(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        self.collect_values(&mut pairs);
        pairs
    }

    fn collect_values<'a>(&'a self, pairs: &mut Vec<(&'a str, &'a str)>) {
        match self {
            Condition::And(items) | Condition::Or(items) => {
                for item in items {
                    item.collect_values(pairs);
                }
            }
            Condition::Not(inner) => inner.collect_values(pairs),
            Condition::ValueEquals { wildcard, values } => {
                pairs.extend(values.iter().map(|v| (wildcard.as_str(), v.as_str())));
            }
            Condition::TagMatch { .. } => {}
        }
    }

    /// Evaluate against a resolver, short-circuiting `And`/`Or`
    pub fn evaluate<R: Resolver + ?Sized>(&self, resolver: &mut R) -> Result<bool, ExpandError> {
        match self {
            Condition::And(items) => {
                for item in items {
                    if !item.evaluate(resolver)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(items) => {
                for item in items {
                    if item.evaluate(resolver)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!inner.evaluate(resolver)?),
            Condition::ValueEquals { wildcard, values } => {
                let resolved = resolver.resolve_value(wildcard)?;
                debug!(%wildcard, ?resolved, "Condition::evaluate: value check");
                Ok(resolved.is_some_and(|v| values.contains(&v)))
            }
            Condition::TagMatch { mode, tags } => {
                let accumulated = resolver.accumulated_tags();
                Ok(match mode {
                    TagMode::Any => tags.iter().any(|t| accumulated.contains(t)),
                    TagMode::All => tags.iter().all(|t| accumulated.contains(t)),
                })
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Condition], sep: &str, empty: &str) -> fmt::Result {
            if items.is_empty() {
                return write!(f, "{}", empty);
            }
            write!(f, "(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, ")")
        }
        fn set(values: &BTreeSet<String>) -> String {
            values.iter().cloned().collect::<Vec<_>>().join(", ")
        }

        match self {
            Condition::And(items) => join(f, items, "and", "true"),
            Condition::Or(items) => join(f, items, "or", "false"),
            Condition::Not(inner) => write!(f, "not {}", inner),
            Condition::ValueEquals { wildcard, values } => write!(f, "{} in {{{}}}", wildcard, set(values)),
            Condition::TagMatch { mode, tags } => match mode {
                TagMode::Any => write!(f, "tags any {{{}}}", set(tags)),
                TagMode::All => write!(f, "tags all {{{}}}", set(tags)),
            },
        }
    }
}

fn string_set(value: &Value) -> Option<BTreeSet<String>> {
    match value {
        Value::Array(items) => items.iter().map(scalar_string).collect(),
        other => scalar_string(other).map(|s| BTreeSet::from([s])),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    /// Resolver over fixed values that records lookups
    struct Fixed {
        values: HashMap<String, String>,
        tags: BTreeSet<String>,
        lookups: Vec<String>,
    }

    impl Fixed {
        fn new(values: &[(&str, &str)], tags: &[&str]) -> Self {
            Self {
                values: values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                lookups: Vec::new(),
            }
        }
    }

    impl Resolver for Fixed {
        fn resolve_value(&mut self, wildcard: &str) -> Result<Option<String>, ExpandError> {
            self.lookups.push(wildcard.to_string());
            Ok(self.values.get(wildcard).cloned())
        }

        fn accumulated_tags(&self) -> BTreeSet<String> {
            self.tags.clone()
        }
    }

    fn parse(raw: Value) -> Condition {
        Condition::parse(&raw, "hat").unwrap()
    }

    #[test]
    fn test_parse_simple_value() {
        let cond = parse(json!({"animal": "dog"}));
        assert_eq!(
            cond,
            Condition::ValueEquals {
                wildcard: "animal".to_string(),
                values: BTreeSet::from(["dog".to_string()]),
            }
        );
    }

    #[test]
    fn test_multiple_keys_are_conjunction() {
        let cond = parse(json!({"animal": "dog", "weather": ["rain", "snow"]}));
        let Condition::And(items) = cond else {
            panic!("expected And");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_evaluate_value_membership() {
        let cond = parse(json!({"weather": ["rain", "snow"]}));
        assert!(cond.evaluate(&mut Fixed::new(&[("weather", "snow")], &[])).unwrap());
        assert!(!cond.evaluate(&mut Fixed::new(&[("weather", "sun")], &[])).unwrap());
    }

    #[test]
    fn test_evaluate_unresolved_is_false() {
        let cond = parse(json!({"animal": "dog"}));
        assert!(!cond.evaluate(&mut Fixed::new(&[], &[])).unwrap());
    }

    #[test]
    fn test_negated_value() {
        let cond = parse(json!({"animal": {"not": ["cat"]}}));
        assert!(cond.evaluate(&mut Fixed::new(&[("animal", "dog")], &[])).unwrap());
        assert!(!cond.evaluate(&mut Fixed::new(&[("animal", "cat")], &[])).unwrap());
    }

    #[test]
    fn test_any_and_not_combined() {
        let cond = parse(json!({"animal": {"any": ["cat", "dog"], "not": "dog"}}));
        assert!(cond.evaluate(&mut Fixed::new(&[("animal", "cat")], &[])).unwrap());
        assert!(!cond.evaluate(&mut Fixed::new(&[("animal", "dog")], &[])).unwrap());
    }

    #[test]
    fn test_tags_any_and_all() {
        let any = parse(json!({"tags": {"any": ["winter", "night"]}}));
        let all = parse(json!({"tags": ["winter", "night"]}));
        let mut resolver = Fixed::new(&[], &["winter"]);
        assert!(any.evaluate(&mut resolver).unwrap());
        assert!(!all.evaluate(&mut resolver).unwrap());

        let mut resolver = Fixed::new(&[], &["winter", "night", "urban"]);
        assert!(all.evaluate(&mut resolver).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let cond = parse(json!({
            "or": [
                {"animal": "dog"},
                {"and": [{"weather": "rain"}, {"not": {"tags": "indoor"}}]}
            ]
        }));
        assert!(cond.evaluate(&mut Fixed::new(&[("animal", "dog")], &[])).unwrap());
        assert!(cond.evaluate(&mut Fixed::new(&[("weather", "rain")], &[])).unwrap());
        assert!(!cond.evaluate(&mut Fixed::new(&[("weather", "rain")], &["indoor"])).unwrap());
    }

    #[test]
    fn test_short_circuit_skips_lookups() {
        let cond = parse(json!({"or": [{"animal": "dog"}, {"weather": "rain"}]}));
        let mut resolver = Fixed::new(&[("animal", "dog")], &[]);
        assert!(cond.evaluate(&mut resolver).unwrap());
        assert_eq!(resolver.lookups, vec!["animal".to_string()]);
    }

    #[test]
    fn test_never_is_false() {
        assert!(!Condition::never().evaluate(&mut Fixed::new(&[], &[])).unwrap());
    }

    #[test]
    fn test_empty_object_is_true() {
        let cond = parse(json!({}));
        assert!(cond.evaluate(&mut Fixed::new(&[], &[])).unwrap());
    }

    #[test]
    fn test_self_reference_rejected() {
        let err = Condition::parse(&json!({"hat": "beanie"}), "hat").unwrap_err();
        assert_eq!(
            err,
            ConditionError::SelfReference {
                wildcard: "hat".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_shapes() {
        assert!(matches!(
            Condition::parse(&json!("dog"), "hat"),
            Err(ConditionError::NotAnObject { .. })
        ));
        assert!(matches!(
            Condition::parse(&json!({"and": "dog"}), "hat"),
            Err(ConditionError::BadOperand { .. })
        ));
        assert!(matches!(
            Condition::parse(&json!({"animal": {"maybe": "dog"}}), "hat"),
            Err(ConditionError::BadValueClause { .. })
        ));
        assert!(matches!(
            Condition::parse(&json!({"tags": {"some": ["x"]}}), "hat"),
            Err(ConditionError::BadTagClause)
        ));
    }

    #[test]
    fn test_referenced_wildcards() {
        let cond = parse(json!({"and": [{"animal": "dog"}, {"not": {"weather": "rain"}}, {"tags": "x"}]}));
        let names: Vec<String> = cond.referenced_wildcards().into_iter().collect();
        assert_eq!(names, vec!["animal".to_string(), "weather".to_string()]);
        assert_eq!(cond.referenced_values(), vec![("animal", "dog"), ("weather", "rain")]);
    }

    #[test]
    fn test_display() {
        let cond = parse(json!({"animal": ["cat", "dog"]}));
        assert_eq!(cond.to_string(), "animal in {cat, dog}");
        assert_eq!(Condition::never().to_string(), "not true");
    }
}
