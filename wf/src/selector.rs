//! Constraint filtering and weighted selection
//!
//! Given the same candidate order and RNG state, selection is a pure function.

use rand::Rng;
use tracing::debug;

use crate::condition::Resolver;
use crate::definition::Choice;
use crate::error::ExpandError;

/// Outcome of a successful selection
#[derive(Debug, Clone, Copy)]
pub struct Selection<'d> {
    pub choice: &'d Choice,
    /// True when no choice was eligible and the pick came from the full list
    pub fallback: bool,
}

/// Choices whose `requires` holds (choices without one are always eligible)
pub fn eligible<'d, R: Resolver + ?Sized>(
    choices: &'d [Choice],
    resolver: &mut R,
) -> Result<Vec<&'d Choice>, ExpandError> {
    let mut result = Vec::with_capacity(choices.len());
    for choice in choices {
        let ok = match choice.requires() {
            Some(condition) => condition.evaluate(resolver)?,
            None => true,
        };
        if ok {
            result.push(choice);
        }
    }
    Ok(result)
}

/// Filter by constraint, fall back to the full list if nothing survives, then pick by weight.
///
/// Returns `Ok(None)` only when no choice at all has a positive weight.
pub fn select<'d, R: Resolver + ?Sized>(
    wildcard: &str,
    choices: &'d [Choice],
    resolver: &mut R,
    rng: &mut impl Rng,
) -> Result<Option<Selection<'d>>, ExpandError> {
    let candidates = eligible(choices, resolver)?;
    debug!(%wildcard, total = choices.len(), eligible = candidates.len(), "select: filtered");

    if let Some(choice) = weighted_pick(&candidates, rng) {
        return Ok(Some(Selection {
            choice,
            fallback: false,
        }));
    }

    debug!(%wildcard, "select: empty candidate set, falling back to all choices");
    let all: Vec<&Choice> = choices.iter().collect();
    Ok(weighted_pick(&all, rng).map(|choice| Selection { choice, fallback: true }))
}

/// Cumulative-weight draw over `candidates`; zero-weight entries can never win
pub fn weighted_pick<'d>(candidates: &[&'d Choice], rng: &mut impl Rng) -> Option<&'d Choice> {
    let positive = || candidates.iter().map(|c| c.weight()).filter(|w| *w > 0.0);
    let mut scale = 1.0;
    let mut total: f64 = positive().sum();
    if total <= 0.0 {
        return None;
    }
    if !total.is_finite() {
        // Huge weights overflow the sum; relative to the largest they stay in range
        let max = positive().fold(0.0, f64::max);
        scale = 1.0 / max;
        total = positive().map(|w| w * scale).sum();
    }

    let draw: f64 = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    let mut last_selectable = None;
    for choice in candidates.iter().copied().filter(|c| c.is_selectable()) {
        cumulative += choice.weight() * scale;
        if cumulative > draw {
            return Some(choice);
        }
        last_selectable = Some(choice);
    }
    // Rounding can leave the draw at the very top of the table
    last_selectable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::definition::{RichChoice, WildcardDefinition};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::{BTreeSet, HashMap};

    struct NoValues;

    impl Resolver for NoValues {
        fn resolve_value(&mut self, _wildcard: &str) -> Result<Option<String>, ExpandError> {
            Ok(None)
        }

        fn accumulated_tags(&self) -> BTreeSet<String> {
            BTreeSet::new()
        }
    }

    fn rich(value: &str, weight: f64, requires: Option<Condition>) -> Choice {
        Choice::Rich(RichChoice {
            value: value.to_string(),
            weight,
            tags: BTreeSet::new(),
            requires,
            includes: None,
        })
    }

    #[test]
    fn test_same_rng_state_same_pick() {
        let def = WildcardDefinition::from_lines("color", "red\nblue\ngreen\nyellow");
        let a = select("color", &def.choices, &mut NoValues, &mut StdRng::seed_from_u64(5))
            .unwrap()
            .unwrap();
        let b = select("color", &def.choices, &mut NoValues, &mut StdRng::seed_from_u64(5))
            .unwrap()
            .unwrap();
        assert_eq!(a.choice.value(), b.choice.value());
        assert!(!a.fallback);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let choices = vec![rich("never", 0.0, None), rich("always", 1.0, None)];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let picked = select("w", &choices, &mut NoValues, &mut rng).unwrap().unwrap();
            assert_eq!(picked.choice.value(), "always");
        }
    }

    #[test]
    fn test_fallback_when_nothing_eligible() {
        let choices = vec![
            rich("a", 1.0, Some(Condition::never())),
            rich("b", 1.0, Some(Condition::never())),
        ];
        let picked = select("w", &choices, &mut NoValues, &mut StdRng::seed_from_u64(3))
            .unwrap()
            .unwrap();
        assert!(picked.fallback);
        assert!(["a", "b"].contains(&picked.choice.value()));
    }

    #[test]
    fn test_no_positive_weight_is_none() {
        let choices = vec![rich("a", 0.0, None)];
        assert!(
            select("w", &choices, &mut NoValues, &mut StdRng::seed_from_u64(3))
                .unwrap()
                .is_none()
        );
        assert!(
            select("w", &[], &mut NoValues, &mut StdRng::seed_from_u64(3))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_filter_excludes_ineligible() {
        let choices = vec![rich("gated", 100.0, Some(Condition::never())), rich("open", 1.0, None)];
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let picked = select("w", &choices, &mut NoValues, &mut rng).unwrap().unwrap();
            assert_eq!(picked.choice.value(), "open");
        }
    }

    #[test]
    fn test_weighted_ratio() {
        let choices = vec![rich("heavy", 3.0, None), rich("light", 1.0, None)];
        let refs: Vec<&Choice> = choices.iter().collect();
        let mut rng = StdRng::seed_from_u64(2024);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for _ in 0..10_000 {
            let picked = weighted_pick(&refs, &mut rng).unwrap();
            *counts.entry(picked.value()).or_default() += 1;
        }
        let ratio = counts["heavy"] as f64 / counts["light"] as f64;
        assert!((2.6..3.4).contains(&ratio), "ratio was {}", ratio);
    }

    #[test]
    fn test_huge_weights_do_not_overflow() {
        let choices = vec![rich("a", 1e308, None), rich("b", 1e308, None), rich("tiny", 1.0, None)];
        let refs: Vec<&Choice> = choices.iter().collect();
        let mut rng = StdRng::seed_from_u64(8);
        let mut seen = BTreeSet::new();
        for _ in 0..200 {
            seen.insert(weighted_pick(&refs, &mut rng).unwrap().value());
        }
        assert!(seen.contains("a") && seen.contains("b"));
    }

    #[test]
    fn test_eligible_keeps_zero_weight() {
        let choices = vec![rich("rare", 0.0, None), rich("gated", 1.0, Some(Condition::never()))];
        let names: Vec<&str> = eligible(&choices, &mut NoValues)
            .unwrap()
            .into_iter()
            .map(Choice::value)
            .collect();
        assert_eq!(names, vec!["rare"]);
    }
}
