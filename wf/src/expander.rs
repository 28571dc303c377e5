//! Template expansion
//!
//! Each wildcard moves through `UNSEEN -> VISITING -> RESOLVED` within one call. Meeting a
//! `VISITING` wildcard again through an include is a [`ExpandError::CircularInclude`];
//! meeting it through a `requires` lookup is a [`ExpandError::CircularDependency`]. Nothing
//! else aborts: missing wildcards render as their literal placeholder and every other
//! problem is reported as a [`Warning`].

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::condition::Resolver;
use crate::context::{GenerationContext, ResolvedValue, derive_seed, rng_for};
use crate::definition::{Choice, DefinitionIssue, IncludeSpec, WildcardDefinition};
use crate::error::{ExpandError, Warning};
use crate::selector::{eligible, select};
use crate::store::WildcardSnapshot;
use crate::tokenizer::{Piece, TokenSyntax, placeholder, tokenize};

/// One piece of an expanded prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    /// Wildcard that produced this text; `None` for literal template text and separators
    pub wildcard_name: Option<String>,
    pub is_from_include: bool,
}

impl Segment {
    fn literal(text: impl Into<String>, is_from_include: bool) -> Self {
        Self {
            text: text.into(),
            wildcard_name: None,
            is_from_include,
        }
    }

    fn wildcard(text: impl Into<String>, name: &str, is_from_include: bool) -> Self {
        Self {
            text: text.into(),
            wildcard_name: Some(name.to_string()),
            is_from_include,
        }
    }

    fn separator() -> Self {
        Self::literal(" ", true)
    }
}

/// Knobs for one expansion call
#[derive(Debug, Clone, Default)]
pub struct ExpandOptions {
    /// Prior context whose values are reused verbatim
    pub existing_context: Option<GenerationContext>,
    /// Wildcards to resolve again from fresh entropy
    pub force_reroll: BTreeSet<String>,
    /// Wildcards pinned to a specific choice value
    pub force_swap: BTreeMap<String, String>,
    /// Entropy for forced rerolls; OS entropy when `None`
    pub reroll_seed: Option<u64>,
}

impl ExpandOptions {
    pub fn with_context(mut self, context: GenerationContext) -> Self {
        self.existing_context = Some(context);
        self
    }

    pub fn reroll(mut self, name: impl Into<String>) -> Self {
        self.force_reroll.insert(name.into());
        self
    }

    pub fn swap(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.force_swap.insert(name.into(), value.into());
        self
    }
}

/// Result of a successful expansion
#[derive(Debug, Clone)]
pub struct Expansion {
    pub segments: Vec<Segment>,
    pub context: GenerationContext,
    pub warnings: Vec<Warning>,
}

impl Expansion {
    /// The prompt as plain text
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Expand `template` against a snapshot
pub fn expand(
    snapshot: &WildcardSnapshot,
    template: &str,
    seed: u64,
    options: &ExpandOptions,
) -> Result<Expansion, ExpandError> {
    debug!(seed, template_len = template.len(), "expand: called");

    let context = match &options.existing_context {
        Some(prior) => GenerationContext::reroll_from(
            prior,
            seed,
            options.force_reroll.iter().chain(options.force_swap.keys()),
        ),
        None => GenerationContext::new(seed),
    };

    let mut expander = Expander::new(snapshot, context, options);
    let mut segments = Vec::new();
    expander.expand_text(template, TokenSyntax::Template, false, &mut segments)?;
    expander.append_global_includes(&mut segments)?;

    debug!(
        segments = segments.len(),
        warnings = expander.warnings.len(),
        "expand: finished"
    );
    Ok(Expansion {
        segments,
        context: expander.ctx,
        warnings: expander.warnings,
    })
}

/// Values of every eligible choice of `name` under `context`, in definition order.
///
/// Works on a copy of the context: wildcards resolved to evaluate `requires` are discarded.
/// Zero-weight choices are listed even though selection never picks them.
pub fn choice_options(
    snapshot: &WildcardSnapshot,
    name: &str,
    context: &GenerationContext,
) -> Result<Vec<String>, ExpandError> {
    let Ok(definition) = snapshot.get(name) else {
        debug!(%name, "choice_options: wildcard not found");
        return Ok(Vec::new());
    };

    let options = ExpandOptions::default();
    let mut scratch = context.clone();
    scratch.resolved.remove(name);
    let mut expander = Expander::new(snapshot, scratch, &options);

    expander.ctx.push_visiting(name);
    let candidates = eligible(&definition.choices, &mut expander)?;
    Ok(candidates.into_iter().map(|c| c.value().to_string()).collect())
}

struct Expander<'a> {
    snapshot: &'a WildcardSnapshot,
    ctx: GenerationContext,
    options: &'a ExpandOptions,
    warnings: Vec<Warning>,
    /// Wildcards that produced output, in order of first appearance
    touched: Vec<String>,
    /// Names that already have a segment, placeholders included
    emitted: BTreeSet<String>,
}

impl<'a> Expander<'a> {
    fn new(snapshot: &'a WildcardSnapshot, ctx: GenerationContext, options: &'a ExpandOptions) -> Self {
        Self {
            snapshot,
            ctx,
            options,
            warnings: Vec::new(),
            touched: Vec::new(),
            emitted: BTreeSet::new(),
        }
    }

    fn report(&mut self, warning: Warning) {
        if !self.warnings.contains(&warning) {
            warn!(%warning, "Expansion degraded");
            self.warnings.push(warning);
        }
    }

    fn expand_text(
        &mut self,
        text: &str,
        syntax: TokenSyntax,
        from_include: bool,
        out: &mut Vec<Segment>,
    ) -> Result<(), ExpandError> {
        for piece in tokenize(text, syntax) {
            match piece {
                Piece::Text(literal) => out.push(Segment::literal(literal, from_include)),
                Piece::Token(name) => self.expand_token(name, from_include, out)?,
            }
        }
        Ok(())
    }

    fn expand_token(&mut self, name: &str, from_include: bool, out: &mut Vec<Segment>) -> Result<(), ExpandError> {
        if self.ctx.is_visiting(name) {
            let path = self.ctx.cycle_path(name);
            debug!(%name, ?path, "expand_token: include cycle");
            return Err(ExpandError::CircularInclude {
                name: name.to_string(),
                path,
            });
        }

        self.emitted.insert(name.to_string());
        let Some(value) = self.resolve(name)? else {
            out.push(Segment::wildcard(placeholder(name), name, from_include));
            return Ok(());
        };

        if !self.touched.iter().any(|t| t == name) {
            self.touched.push(name.to_string());
        }
        out.push(Segment::wildcard(value.clone(), name, from_include));

        let includes = self
            .snapshot
            .get(name)
            .ok()
            .and_then(|definition| definition.choice(&value))
            .and_then(Choice::includes)
            .cloned();
        if let Some(includes) = includes {
            self.ctx.push_visiting(name);
            let result = self.expand_include(&includes, out);
            self.ctx.pop_visiting();
            result?;
        }
        Ok(())
    }

    fn expand_include(&mut self, includes: &IncludeSpec, out: &mut Vec<Segment>) -> Result<(), ExpandError> {
        match includes {
            IncludeSpec::Names(names) => {
                for name in names {
                    out.push(Segment::separator());
                    self.expand_token(name, true, out)?;
                }
                Ok(())
            }
            IncludeSpec::Template(template) => {
                if template.trim().is_empty() {
                    return Ok(());
                }
                if !joins_without_separator(template) {
                    out.push(Segment::separator());
                }
                self.expand_text(template, TokenSyntax::Include, true, out)
            }
        }
    }

    /// Append wildcard-level includes of every touched wildcard, once per included name
    fn append_global_includes(&mut self, out: &mut Vec<Segment>) -> Result<(), ExpandError> {
        let mut next = 0;
        while next < self.touched.len() {
            let owner = self.touched[next].clone();
            next += 1;

            let Some(includes) = self
                .snapshot
                .get(&owner)
                .ok()
                .and_then(|definition| definition.global_includes.clone())
            else {
                continue;
            };

            let names = includes.referenced_names();
            let pending: Vec<String> = names
                .iter()
                .filter(|name| !self.emitted.contains(*name))
                .cloned()
                .collect();
            if pending.is_empty() {
                continue;
            }
            debug!(%owner, ?pending, "append_global_includes: appending");

            // A template whose names are all new is appended as written. Otherwise only the
            // missing names are appended, list style.
            match &includes {
                IncludeSpec::Template(_) if pending.len() == names.len() => self.expand_include(&includes, out)?,
                _ => {
                    for name in &pending {
                        out.push(Segment::separator());
                        self.expand_token(name, true, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Value of `name`, selecting one if it is not resolved yet.
    ///
    /// `None` means the wildcard is missing, broken, or has nothing selectable.
    fn resolve(&mut self, name: &str) -> Result<Option<String>, ExpandError> {
        if let Some(resolved) = self.ctx.get(name) {
            debug!(%name, value = %resolved.value, "resolve: reusing context value");
            return Ok(Some(resolved.value.clone()));
        }

        let definition = match self.snapshot.get(name) {
            Ok(definition) => definition.clone(),
            Err(e) => {
                debug!(%name, error = %e, "resolve: unavailable");
                self.report(Warning::MissingWildcard { name: name.to_string() });
                return Ok(None);
            }
        };

        self.ctx.push_visiting(name);
        let picked = self.pick(name, &definition);
        self.ctx.pop_visiting();

        match picked? {
            Some(resolved) => {
                let value = resolved.value.clone();
                debug!(%name, %value, "resolve: selected");
                self.ctx.insert(name, resolved);
                Ok(Some(value))
            }
            None => {
                self.report(Warning::NoSelectableChoice {
                    wildcard: name.to_string(),
                });
                Ok(None)
            }
        }
    }

    fn pick(&mut self, name: &str, definition: &WildcardDefinition) -> Result<Option<ResolvedValue>, ExpandError> {
        for issue in &definition.issues {
            if let DefinitionIssue::MalformedChoice { choice, error } = issue {
                self.report(Warning::MalformedChoice {
                    wildcard: name.to_string(),
                    choice: choice.clone(),
                    error: error.clone(),
                });
            }
        }

        if let Some(value) = self.options.force_swap.get(name) {
            match definition.choice(value) {
                Some(choice) => return Ok(Some(ResolvedValue::new(choice.value(), choice.tags().clone()))),
                None => self.report(Warning::UnknownSwapValue {
                    wildcard: name.to_string(),
                    value: value.clone(),
                }),
            }
        }

        let mut rng = if self.options.force_reroll.contains(name) {
            let entropy = self.options.reroll_seed.unwrap_or_else(rand::random);
            StdRng::seed_from_u64(derive_seed(entropy, name))
        } else {
            rng_for(self.ctx.seed, name)
        };

        let Some(selection) = select(name, &definition.choices, self, &mut rng)? else {
            return Ok(None);
        };
        if selection.fallback {
            self.report(Warning::EmptyCandidateSet {
                wildcard: name.to_string(),
            });
        }
        let choice = selection.choice;
        Ok(Some(ResolvedValue::new(choice.value(), choice.tags().clone())))
    }
}

impl Resolver for Expander<'_> {
    fn resolve_value(&mut self, wildcard: &str) -> Result<Option<String>, ExpandError> {
        if let Some(value) = self.ctx.value(wildcard) {
            return Ok(Some(value.to_string()));
        }
        if self.ctx.is_visiting(wildcard) {
            let path = self.ctx.cycle_path(wildcard);
            debug!(%wildcard, ?path, "resolve_value: requires cycle");
            return Err(ExpandError::CircularDependency {
                name: wildcard.to_string(),
                path,
            });
        }
        self.resolve(wildcard)
    }

    fn accumulated_tags(&self) -> BTreeSet<String> {
        self.ctx.accumulated_tags()
    }
}

/// Include text that starts with whitespace or punctuation attaches directly
fn joins_without_separator(text: &str) -> bool {
    text.chars()
        .next()
        .is_some_and(|c| c.is_whitespace() || matches!(c, ',' | ';' | '.' | ':'))
}
