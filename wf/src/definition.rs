//! Wildcard definitions
//!
//! A definition is loaded from `NAME.json`:
//!
//! ```json
//! {
//!   "description": "Headwear",
//!   "choices": [
//!     "beanie",
//!     {"value": "straw hat", "weight": 2, "tags": ["summer"],
//!      "requires": {"animal": "dog"}, "includes": ["ribbon"]}
//!   ],
//!   "includes": "__accessory__"
//! }
//! ```
//!
//! or from a legacy `NAME.txt` with one plain choice per line.
//!
//! Clauses that cannot be parsed do not fail the load. The affected choice gets a
//! condition that is never satisfied and the problem is kept in [`WildcardDefinition::issues`].

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::condition::{Condition, json_kind};
use crate::error::ConditionError;
use crate::tokenizer::{TokenSyntax, referenced_names};

static NO_TAGS: BTreeSet<String> = BTreeSet::new();

/// File format a definition was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Text,
}

/// Wildcards pulled in after a choice (or after any choice of a wildcard)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeSpec {
    /// Explicit list of wildcard names
    Names(Vec<String>),
    /// Template string with `__name__` / `[name]` tokens
    Template(String),
}

impl IncludeSpec {
    pub fn parse(raw: &Value) -> Result<Self, ConditionError> {
        match raw {
            Value::String(s) => Ok(IncludeSpec::Template(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or(ConditionError::BadIncludes))
                .collect::<Result<Vec<_>, _>>()
                .map(IncludeSpec::Names),
            _ => Err(ConditionError::BadIncludes),
        }
    }

    /// Distinct wildcard names referenced, in order of first appearance
    pub fn referenced_names(&self) -> Vec<String> {
        match self {
            IncludeSpec::Names(names) => {
                let mut seen: Vec<String> = Vec::new();
                for name in names {
                    if !seen.contains(name) {
                        seen.push(name.clone());
                    }
                }
                seen
            }
            IncludeSpec::Template(template) => referenced_names(template, TokenSyntax::Include),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            IncludeSpec::Names(names) => names.is_empty(),
            IncludeSpec::Template(template) => template.trim().is_empty(),
        }
    }
}

impl fmt::Display for IncludeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncludeSpec::Names(names) => write!(f, "[{}]", names.join(", ")),
            IncludeSpec::Template(template) => write!(f, "\"{}\"", template),
        }
    }
}

/// A choice with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct RichChoice {
    pub value: String,
    pub weight: f64,
    pub tags: BTreeSet<String>,
    pub requires: Option<Condition>,
    pub includes: Option<IncludeSpec>,
}

/// One entry of a wildcard's choice list
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    /// Plain string, weight 1, no constraints
    Simple(String),
    Rich(RichChoice),
}

impl Choice {
    pub fn value(&self) -> &str {
        match self {
            Choice::Simple(value) => value,
            Choice::Rich(rich) => &rich.value,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Choice::Simple(_) => 1.0,
            Choice::Rich(rich) => rich.weight,
        }
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        match self {
            Choice::Simple(_) => &NO_TAGS,
            Choice::Rich(rich) => &rich.tags,
        }
    }

    pub fn requires(&self) -> Option<&Condition> {
        match self {
            Choice::Simple(_) => None,
            Choice::Rich(rich) => rich.requires.as_ref(),
        }
    }

    pub fn includes(&self) -> Option<&IncludeSpec> {
        match self {
            Choice::Simple(_) => None,
            Choice::Rich(rich) => rich.includes.as_ref(),
        }
    }

    /// Whether weighted selection can ever pick this choice
    pub fn is_selectable(&self) -> bool {
        self.weight() > 0.0
    }
}

/// Problems found while normalizing a definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionIssue {
    /// A clause of the choice could not be parsed; the choice is never eligible
    MalformedChoice { choice: String, error: ConditionError },
    /// The wildcard-level `includes` could not be parsed and is ignored
    MalformedIncludes { error: ConditionError },
    /// A later choice repeated an earlier value and was dropped
    DuplicateValue { value: String },
    /// Entry at `index` has no usable value and was dropped
    InvalidChoice { index: usize, reason: String },
}

impl fmt::Display for DefinitionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionIssue::MalformedChoice { choice, error } => write!(f, "choice '{}': {}", choice, error),
            DefinitionIssue::MalformedIncludes { error } => write!(f, "includes: {}", error),
            DefinitionIssue::DuplicateValue { value } => write!(f, "duplicate choice '{}' dropped", value),
            DefinitionIssue::InvalidChoice { index, reason } => write!(f, "choice #{}: {}", index + 1, reason),
        }
    }
}

/// A normalized wildcard definition
#[derive(Debug, Clone, PartialEq)]
pub struct WildcardDefinition {
    pub name: String,
    pub description: String,
    pub choices: Vec<Choice>,
    pub global_includes: Option<IncludeSpec>,
    pub issues: Vec<DefinitionIssue>,
    pub format: SourceFormat,
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    #[serde(default)]
    description: String,
    #[serde(default)]
    choices: Vec<Value>,
    #[serde(default)]
    includes: Option<Value>,
}

impl WildcardDefinition {
    /// Parse a JSON definition. Syntax errors are returned; clause errors become issues.
    pub fn from_json(name: &str, content: &str) -> Result<Self, serde_json::Error> {
        debug!(%name, content_len = content.len(), "WildcardDefinition::from_json: called");
        let value: Value = serde_json::from_str(content)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom(format!(
                "expected a definition object, got {}",
                json_kind(&value)
            )));
        }
        let raw: RawDefinition = serde_json::from_value(value)?;

        let mut issues = Vec::new();
        let global_includes = match raw.includes {
            None | Some(Value::Null) => None,
            Some(ref value) => match IncludeSpec::parse(value) {
                Ok(spec) => Some(spec),
                Err(error) => {
                    issues.push(DefinitionIssue::MalformedIncludes { error });
                    None
                }
            },
        };

        let mut choices: Vec<Choice> = Vec::with_capacity(raw.choices.len());
        for (index, entry) in raw.choices.iter().enumerate() {
            let Some(choice) = parse_choice(name, index, entry, &mut issues) else {
                continue;
            };
            if choices.iter().any(|c| c.value() == choice.value()) {
                issues.push(DefinitionIssue::DuplicateValue {
                    value: choice.value().to_string(),
                });
                continue;
            }
            choices.push(choice);
        }

        if !issues.is_empty() {
            warn!(%name, issue_count = issues.len(), "Wildcard definition has issues");
        }

        Ok(Self {
            name: name.to_string(),
            description: raw.description,
            choices,
            global_includes,
            issues,
            format: SourceFormat::Json,
        })
    }

    /// Build a definition from a legacy plain-text file: one choice per non-empty line
    pub fn from_lines(name: &str, content: &str) -> Self {
        debug!(%name, "WildcardDefinition::from_lines: called");
        let mut choices: Vec<Choice> = Vec::new();
        let mut issues = Vec::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if choices.iter().any(|c| c.value() == line) {
                issues.push(DefinitionIssue::DuplicateValue { value: line.to_string() });
                continue;
            }
            choices.push(Choice::Simple(line.to_string()));
        }

        Self {
            name: name.to_string(),
            description: format!("Legacy wildcard from {}.txt.", name),
            choices,
            global_includes: None,
            issues,
            format: SourceFormat::Text,
        }
    }

    /// Find a choice by its literal value
    pub fn choice(&self, value: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.value() == value)
    }

    /// All choice values, in definition order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.choices.iter().map(Choice::value)
    }

    /// Names referenced through `includes`
    pub fn included_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .global_includes
            .iter()
            .flat_map(IncludeSpec::referenced_names)
            .collect();
        for choice in &self.choices {
            if let Some(includes) = choice.includes() {
                names.extend(includes.referenced_names());
            }
        }
        names
    }

    /// Names referenced through `requires`
    pub fn required_names(&self) -> BTreeSet<String> {
        self.choices
            .iter()
            .filter_map(Choice::requires)
            .flat_map(Condition::referenced_wildcards)
            .collect()
    }
}

fn parse_choice(owner: &str, index: usize, entry: &Value, issues: &mut Vec<DefinitionIssue>) -> Option<Choice> {
    let map = match entry {
        Value::String(s) => return Some(Choice::Simple(s.clone())),
        Value::Number(n) => return Some(Choice::Simple(n.to_string())),
        Value::Object(map) => map,
        other => {
            issues.push(DefinitionIssue::InvalidChoice {
                index,
                reason: format!("expected a string or an object, got {}", json_kind(other)),
            });
            return None;
        }
    };

    let value = match map.get("value") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            issues.push(DefinitionIssue::InvalidChoice {
                index,
                reason: "missing string 'value'".to_string(),
            });
            return None;
        }
    };

    let mut errors: Vec<ConditionError> = Vec::new();

    let weight = match map.get("weight") {
        None | Some(Value::Null) => 1.0,
        Some(raw) => match raw.as_f64() {
            Some(w) if w.is_finite() && w >= 0.0 => w,
            _ => {
                errors.push(ConditionError::BadWeight);
                1.0
            }
        },
    };

    let tags = match map.get("tags") {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(Value::Array(items)) => items.iter().filter_map(|t| t.as_str().map(str::to_string)).collect(),
        Some(Value::String(tag)) => BTreeSet::from([tag.clone()]),
        Some(_) => {
            errors.push(ConditionError::BadTagClause);
            BTreeSet::new()
        }
    };

    let mut requires = match map.get("requires") {
        None | Some(Value::Null) => None,
        Some(raw) => match Condition::parse(raw, owner) {
            Ok(condition) => Some(condition),
            Err(error) => {
                errors.push(error);
                None
            }
        },
    };

    let includes = match map.get("includes") {
        None | Some(Value::Null) => None,
        Some(raw) => match IncludeSpec::parse(raw) {
            Ok(spec) => Some(spec),
            Err(error) => {
                errors.push(error);
                None
            }
        },
    };

    if !errors.is_empty() {
        requires = Some(Condition::never());
        for error in errors {
            debug!(%owner, %value, %error, "parse_choice: malformed clause");
            issues.push(DefinitionIssue::MalformedChoice {
                choice: value.clone(),
                error,
            });
        }
    }

    Some(Choice::Rich(RichChoice {
        value,
        weight,
        tags,
        requires,
        includes,
    }))
}
