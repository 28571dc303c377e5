//! Entry points used by applications
//!
//! [`Engine`] owns a [`WildcardStore`]. Every call captures the current snapshot once, so a
//! concurrent [`Engine::reload`] never changes definitions under a running expansion.

use std::sync::Arc;

use tracing::{debug, info};

use crate::context::GenerationContext;
use crate::error::{ExpandError, StoreError};
use crate::expander::{self, ExpandOptions, Expansion};
use crate::graph::DependencyGraph;
use crate::store::{DefinitionSource, WildcardSnapshot, WildcardStore};
use crate::validate::{self, ValidationIssue};

#[derive(Debug, Default)]
pub struct Engine {
    store: WildcardStore,
}

impl Engine {
    pub fn new(store: WildcardStore) -> Self {
        Self { store }
    }

    /// Load an engine from a definition source
    pub fn open(source: &dyn DefinitionSource) -> Result<Self, StoreError> {
        Ok(Self::new(WildcardStore::open(source)?))
    }

    pub fn store(&self) -> &WildcardStore {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<WildcardSnapshot> {
        self.store.snapshot()
    }

    /// Expand `template` with `seed`, reusing and rerolling per `options`
    pub fn expand(&self, template: &str, seed: u64, options: &ExpandOptions) -> Result<Expansion, ExpandError> {
        let snapshot = self.store.snapshot();
        expander::expand(&snapshot, template, seed, options)
    }

    /// Expand `count` prompts with consecutive seeds starting at `seed`
    pub fn expand_many(
        &self,
        template: &str,
        seed: u64,
        count: usize,
        options: &ExpandOptions,
    ) -> Result<Vec<(u64, Expansion)>, ExpandError> {
        debug!(seed, count, "Engine::expand_many: called");
        let snapshot = self.store.snapshot();
        (0..count as u64)
            .map(|offset| {
                let seed = seed.wrapping_add(offset);
                expander::expand(&snapshot, template, seed, options).map(|expansion| (seed, expansion))
            })
            .collect()
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::build(&self.store.snapshot())
    }

    /// Values a "swap" control could offer for `name` under `context`
    pub fn choice_options(&self, name: &str, context: &GenerationContext) -> Result<Vec<String>, ExpandError> {
        expander::choice_options(&self.store.snapshot(), name, context)
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        validate::validate_all(&self.store.snapshot())
    }

    /// Pre-save check of an edited definition
    pub fn check_candidate(&self, name: &str, raw_json: &str) -> Vec<ValidationIssue> {
        validate::check_candidate(&self.store.snapshot(), name, raw_json)
    }

    pub fn reload(&self, source: &dyn DefinitionSource) -> Result<(), StoreError> {
        self.store.reload(source)?;
        Ok(())
    }

    /// Reload when the source changed; returns whether it did
    pub fn refresh(&self, source: &dyn DefinitionSource) -> Result<bool, StoreError> {
        let reloaded = self.store.reload_if_changed(source)?;
        if reloaded {
            info!("Engine picked up changed wildcard definitions");
        }
        Ok(reloaded)
    }
}
