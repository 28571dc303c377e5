//! Per-expansion resolution state

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// The value a wildcard resolved to, with the tags of the chosen choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub value: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ResolvedValue {
    pub fn new(value: impl Into<String>, tags: BTreeSet<String>) -> Self {
        Self {
            value: value.into(),
            tags,
        }
    }
}

/// Resolution state threaded through one expansion call
///
/// Serializable so callers can persist it and pass it back as the prior context of a
/// later reroll. The visiting stack is transient and never serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub seed: u64,
    #[serde(default)]
    pub resolved: BTreeMap<String, ResolvedValue>,
    #[serde(skip)]
    visiting: Vec<String>,
}

impl GenerationContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            resolved: BTreeMap::new(),
            visiting: Vec::new(),
        }
    }

    /// Start a reroll from a prior context, dropping the names being rerolled
    pub fn reroll_from<'a>(prior: &GenerationContext, seed: u64, reroll: impl IntoIterator<Item = &'a String>) -> Self {
        let mut resolved = prior.resolved.clone();
        for name in reroll {
            resolved.remove(name);
        }
        Self {
            seed,
            resolved,
            visiting: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedValue> {
        self.resolved.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.resolved.get(name).map(|r| r.value.as_str())
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ResolvedValue) {
        self.resolved.insert(name.into(), value);
    }

    /// Union of the tags of every resolved wildcard
    pub fn accumulated_tags(&self) -> BTreeSet<String> {
        self.resolved.values().flat_map(|r| r.tags.iter().cloned()).collect()
    }

    pub fn is_visiting(&self, name: &str) -> bool {
        self.visiting.iter().any(|v| v == name)
    }

    pub(crate) fn push_visiting(&mut self, name: &str) {
        self.visiting.push(name.to_string());
    }

    pub(crate) fn pop_visiting(&mut self) {
        self.visiting.pop();
    }

    /// The visiting chain from the first visit of `name` back to `name`
    pub(crate) fn cycle_path(&self, name: &str) -> Vec<String> {
        let start = self.visiting.iter().position(|v| v == name).unwrap_or(0);
        let mut path: Vec<String> = self.visiting[start..].to_vec();
        path.push(name.to_string());
        path
    }
}

/// Seed of the sub-RNG used for `name` under `seed`
pub fn derive_seed(seed: u64, name: &str) -> u64 {
    splitmix64(seed ^ fnv1a(name.as_bytes()))
}

/// Deterministic RNG for one wildcard within one seeded expansion
pub fn rng_for(seed: u64, name: &str) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, name))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
