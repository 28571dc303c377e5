//! Error and warning types
//!
//! Only the two cycle errors in [`ExpandError`] abort an expansion. Everything else
//! degrades to a [`Warning`] so one bad definition cannot block a whole template.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the wildcard store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Wildcard not found: {name}")]
    MissingWildcard { name: String },

    #[error("Wildcard '{name}' is broken: {reason}")]
    Broken { name: String, reason: String },

    #[error("Invalid wildcard name '{name}' derived from {}", path.display())]
    InvalidName { name: String, path: PathBuf },

    #[error("Failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A `requires` or `includes` clause that could not be understood
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("requires clause must be an object, got {found}")]
    NotAnObject { found: String },

    #[error("'{op}' expects {expected}")]
    BadOperand { op: String, expected: String },

    #[error("value clause for '{wildcard}' must be a string, a list of strings, or {{\"any\"|\"not\": ...}}")]
    BadValueClause { wildcard: String },

    #[error("tags clause must be a string, a list, or {{\"any\"|\"all\": [...]}}")]
    BadTagClause,

    #[error("choice requires its own wildcard '{wildcard}'")]
    SelfReference { wildcard: String },

    #[error("includes must be a list of wildcard names or a template string")]
    BadIncludes,

    #[error("weight must be a non-negative number")]
    BadWeight,
}

/// Fatal expansion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("Circular include detected: {}", path.join(" -> "))]
    CircularInclude { name: String, path: Vec<String> },

    #[error("Circular requires dependency detected: {}", path.join(" -> "))]
    CircularDependency { name: String, path: Vec<String> },
}

impl ExpandError {
    /// The wildcard that closed the cycle
    pub fn wildcard(&self) -> &str {
        match self {
            ExpandError::CircularInclude { name, .. } => name,
            ExpandError::CircularDependency { name, .. } => name,
        }
    }

    /// The visiting chain that led back to [`ExpandError::wildcard`]
    pub fn path(&self) -> &[String] {
        match self {
            ExpandError::CircularInclude { path, .. } => path,
            ExpandError::CircularDependency { path, .. } => path,
        }
    }
}

/// Non-fatal conditions collected during an expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Token referenced an unknown or broken wildcard; rendered literally
    MissingWildcard { name: String },
    /// Every choice was filtered out; selection fell back to the full list
    EmptyCandidateSet { wildcard: String },
    /// A choice carried an unparsable clause and is never eligible
    MalformedChoice {
        wildcard: String,
        choice: String,
        error: ConditionError,
    },
    /// No choice has a positive weight; rendered like a missing wildcard
    NoSelectableChoice { wildcard: String },
    /// A forced swap named a value the wildcard does not have
    UnknownSwapValue { wildcard: String, value: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::MissingWildcard { name } => write!(f, "wildcard '{}' not found", name),
            Warning::EmptyCandidateSet { wildcard } => {
                write!(f, "no choice of '{}' satisfied its requires; picked from all choices", wildcard)
            }
            Warning::MalformedChoice {
                wildcard,
                choice,
                error,
            } => write!(f, "choice '{}' of '{}' is malformed: {}", choice, wildcard, error),
            Warning::NoSelectableChoice { wildcard } => {
                write!(f, "wildcard '{}' has no choice with a positive weight", wildcard)
            }
            Warning::UnknownSwapValue { wildcard, value } => {
                write!(f, "wildcard '{}' has no choice '{}' to swap to", wildcard, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_include_message() {
        let err = ExpandError::CircularInclude {
            name: "a".to_string(),
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };

        let msg = err.to_string();
        assert!(msg.contains("a -> b -> a"));
        assert_eq!(err.wildcard(), "a");
        assert_eq!(err.path().len(), 3);
    }

    #[test]
    fn test_store_error_messages() {
        let err = StoreError::Broken {
            name: "hat".to_string(),
            reason: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "Wildcard 'hat' is broken: expected value");

        let err = StoreError::InvalidName {
            name: "a b".to_string(),
            path: PathBuf::from("a b.json"),
        };
        assert!(err.to_string().contains("a b.json"));
    }

    #[test]
    fn test_warning_display() {
        let w = Warning::EmptyCandidateSet {
            wildcard: "hat".to_string(),
        };
        assert!(w.to_string().contains("hat"));
    }
}
