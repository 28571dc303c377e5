//! Wildforge - wildcard prompt template engine
//!
//! Expands templates such as `a __animal__ wearing __hat__` against a corpus of named
//! wildcards: weighted choice lists whose entries can be gated by `requires` conditions and
//! can pull in other wildcards through `includes`.
//!
//! # Architecture
//!
//! ```text
//! store ──> expander ──> selector ──> condition
//!   │          │
//!   │          └──> context (resolved values, seeded sub-RNGs, visiting stack)
//!   └──> graph / validate (structural analysis, never selects)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use wildforge::{DirectorySource, Engine, ExpandOptions};
//!
//! let engine = Engine::open(&DirectorySource::new(["wildcards".into()]))?;
//! let first = engine.expand("a __animal__ wearing __hat__", 42, &ExpandOptions::default())?;
//! println!("{}", first.text());
//!
//! // Same prompt with only the hat changed
//! let options = ExpandOptions::default().with_context(first.context).reroll("hat");
//! let second = engine.expand("a __animal__ wearing __hat__", 42, &options)?;
//! ```

pub mod cli;
pub mod condition;
pub mod config;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod expander;
pub mod graph;
pub mod selector;
pub mod store;
pub mod tokenizer;
pub mod validate;

pub use condition::{Condition, Resolver, TagMode};
pub use context::{GenerationContext, ResolvedValue};
pub use definition::{Choice, IncludeSpec, RichChoice, SourceFormat, WildcardDefinition};
pub use engine::Engine;
pub use error::{ConditionError, ExpandError, StoreError, Warning};
pub use expander::{ExpandOptions, Expansion, Segment};
pub use graph::{DependencyGraph, EdgeKind};
pub use store::{
    BrokenWildcard, DefinitionSource, DirectorySource, MemorySource, SourceEntry, WildcardSnapshot, WildcardStore,
};
pub use tokenizer::{TokenSyntax, referenced_names};
pub use validate::{IssueKind, Severity, ValidationIssue};
