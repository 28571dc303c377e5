//! Whole-corpus and pre-save validation

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::definition::{DefinitionIssue, WildcardDefinition};
use crate::graph::DependencyGraph;
use crate::store::WildcardSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// How a reference was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Include,
    Requires,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Include => write!(f, "includes"),
            ReferenceKind::Requires => write!(f, "requires"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// File could not be parsed
    Broken { reason: String },
    /// Problem found while normalizing the definition
    Definition(DefinitionIssue),
    /// Reference to a wildcard that is not loaded
    UnknownWildcard { referenced: String, via: ReferenceKind },
    /// `requires` names a value the referenced wildcard does not have
    UnknownValue { referenced: String, value: String },
    /// Dependency cycle through includes and/or requires
    Cycle { path: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub wildcard: String,
    pub kind: IssueKind,
}

impl ValidationIssue {
    fn new(wildcard: impl Into<String>, kind: IssueKind) -> Self {
        Self {
            wildcard: wildcard.into(),
            kind,
        }
    }

    pub fn severity(&self) -> Severity {
        match &self.kind {
            IssueKind::Broken { .. } | IssueKind::Cycle { .. } => Severity::Error,
            IssueKind::Definition(DefinitionIssue::MalformedChoice { .. }) => Severity::Error,
            IssueKind::Definition(_) | IssueKind::UnknownWildcard { .. } | IssueKind::UnknownValue { .. } => {
                Severity::Warning
            }
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Broken { reason } => write!(f, "{}: file is broken: {}", self.wildcard, reason),
            IssueKind::Definition(issue) => write!(f, "{}: {}", self.wildcard, issue),
            IssueKind::UnknownWildcard { referenced, via } => {
                write!(f, "{}: {} references unknown wildcard '{}'", self.wildcard, via, referenced)
            }
            IssueKind::UnknownValue { referenced, value } => write!(
                f,
                "{}: requires '{}' = '{}', but '{}' has no such choice",
                self.wildcard, referenced, value, referenced
            ),
            IssueKind::Cycle { path } => write!(f, "{}: dependency cycle {}", self.wildcard, path.join(" -> ")),
        }
    }
}

/// Validate every definition in the snapshot
pub fn validate_all(snapshot: &WildcardSnapshot) -> Vec<ValidationIssue> {
    debug!("validate_all: called");
    let mut issues: Vec<ValidationIssue> = snapshot
        .broken_entries()
        .map(|b| ValidationIssue::new(&b.name, IssueKind::Broken { reason: b.error.clone() }))
        .collect();

    for definition in snapshot.definitions() {
        issues.extend(definition_issues(definition));
        issues.extend(reference_issues(snapshot, definition));
    }

    for path in DependencyGraph::build(snapshot).find_cycles() {
        let owner = path[0].clone();
        issues.push(ValidationIssue::new(&owner, IssueKind::Cycle { path }));
    }

    info!(count = issues.len(), "Validation finished");
    issues
}

/// Validate an edited definition before it is saved, without touching the live snapshot
pub fn check_candidate(snapshot: &WildcardSnapshot, name: &str, raw_json: &str) -> Vec<ValidationIssue> {
    match WildcardDefinition::from_json(name, raw_json) {
        Ok(definition) => check_definition(snapshot, definition),
        Err(e) => vec![ValidationIssue::new(name, IssueKind::Broken { reason: e.to_string() })],
    }
}

/// Validate `definition` as if it replaced its namesake in `snapshot`
pub fn check_definition(snapshot: &WildcardSnapshot, definition: WildcardDefinition) -> Vec<ValidationIssue> {
    let name = definition.name.clone();
    debug!(%name, "check_definition: called");
    let candidate = snapshot.with_definition(definition);

    let mut issues = Vec::new();
    for definition in candidate.definitions() {
        let own = definition.name == name;
        if own {
            issues.extend(definition_issues(definition));
        }
        // Other wildcards may depend on values the edit removed
        issues.extend(
            reference_issues(&candidate, definition)
                .into_iter()
                .filter(|issue| own || references(issue, &name)),
        );
    }

    for path in DependencyGraph::build(&candidate).cycles_through(&name) {
        issues.push(ValidationIssue::new(&name, IssueKind::Cycle { path }));
    }
    issues
}

/// Whether any issue is an error
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity() == Severity::Error)
}

fn references(issue: &ValidationIssue, name: &str) -> bool {
    match &issue.kind {
        IssueKind::UnknownWildcard { referenced, .. } | IssueKind::UnknownValue { referenced, .. } => referenced == name,
        _ => false,
    }
}

fn definition_issues(definition: &WildcardDefinition) -> impl Iterator<Item = ValidationIssue> + '_ {
    definition
        .issues
        .iter()
        .map(|issue| ValidationIssue::new(&definition.name, IssueKind::Definition(issue.clone())))
}

fn reference_issues(snapshot: &WildcardSnapshot, definition: &WildcardDefinition) -> Vec<ValidationIssue> {
    let known = snapshot.list_names();
    let mut issues = Vec::new();

    for referenced in definition.included_names() {
        if !known.contains(&referenced) {
            issues.push(ValidationIssue::new(
                &definition.name,
                IssueKind::UnknownWildcard {
                    referenced,
                    via: ReferenceKind::Include,
                },
            ));
        }
    }

    let mut reported: BTreeSet<(String, String)> = BTreeSet::new();
    for condition in definition.choices.iter().filter_map(|c| c.requires()) {
        for referenced in condition.referenced_wildcards() {
            if !known.contains(&referenced) && reported.insert((referenced.clone(), String::new())) {
                issues.push(ValidationIssue::new(
                    &definition.name,
                    IssueKind::UnknownWildcard {
                        referenced,
                        via: ReferenceKind::Requires,
                    },
                ));
            }
        }
        for (referenced, value) in condition.referenced_values() {
            // Broken targets are reported on their own
            let Ok(target) = snapshot.get(referenced) else {
                continue;
            };
            if target.choice(value).is_none() && reported.insert((referenced.to_string(), value.to_string())) {
                issues.push(ValidationIssue::new(
                    &definition.name,
                    IssueKind::UnknownValue {
                        referenced: referenced.to_string(),
                        value: value.to_string(),
                    },
                ));
            }
        }
    }
    issues
}
