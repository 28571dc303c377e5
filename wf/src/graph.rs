//! Structural dependency analysis
//!
//! Edges come from `includes` (choice-level and wildcard-level) and from `requires`. Building
//! the graph never selects anything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::Serialize;
use tracing::debug;

use crate::store::WildcardSnapshot;

/// Why one wildcard depends on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Include,
    Requires,
    Both,
}

impl EdgeKind {
    fn merge(self, other: EdgeKind) -> EdgeKind {
        if self == other { self } else { EdgeKind::Both }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
    /// Every loaded wildcard, broken ones included
    pub nodes: BTreeSet<String>,
    /// name -> dependency -> kind
    pub edges: BTreeMap<String, BTreeMap<String, EdgeKind>>,
    /// Loaded but unusable wildcards
    pub broken: BTreeSet<String>,
}

/// Color of a node during depth-first search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Visiting,
    Done,
}

impl DependencyGraph {
    pub fn build(snapshot: &WildcardSnapshot) -> Self {
        let mut graph = DependencyGraph {
            nodes: snapshot.list_names(),
            broken: snapshot.broken_entries().map(|b| b.name.clone()).collect(),
            ..Default::default()
        };

        for definition in snapshot.definitions() {
            let targets = graph.edges.entry(definition.name.clone()).or_default();
            for name in definition.included_names() {
                targets.insert(name, EdgeKind::Include);
            }
            for name in definition.required_names() {
                targets
                    .entry(name)
                    .and_modify(|kind| *kind = kind.merge(EdgeKind::Requires))
                    .or_insert(EdgeKind::Requires);
            }
        }

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.values().map(BTreeMap::len).sum::<usize>(),
            "DependencyGraph::build: done"
        );
        graph
    }

    /// Names `name` points at
    pub fn dependencies(&self, name: &str) -> BTreeSet<&str> {
        self.edges
            .get(name)
            .map(|targets| targets.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Names that point at `name`
    pub fn dependents(&self, name: &str) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|(_, targets)| targets.contains_key(name))
            .map(|(source, _)| source.as_str())
            .collect()
    }

    /// Referenced names that are not loaded, with the wildcards referencing them
    pub fn unknown_references(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut unknown: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (source, targets) in &self.edges {
            for target in targets.keys().filter(|t| !self.nodes.contains(*t)) {
                unknown.entry(target.as_str()).or_default().insert(source.as_str());
            }
        }
        unknown
    }

    /// Every name reachable from `roots`, roots included
    pub fn reachable_from<I, S>(&self, roots: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<String> = roots.into_iter().map(|r| r.as_ref().to_string()).collect();

        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            stack.extend(
                self.dependencies(&name)
                    .into_iter()
                    .filter(|d| !seen.contains(*d))
                    .map(str::to_string),
            );
        }
        seen
    }

    /// Every cycle found by a three-color DFS, each as a closed path `[a, b, a]`.
    ///
    /// Deterministic: nodes and edges are visited in name order.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut colors: BTreeMap<&str, Color> = BTreeMap::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut cycles = Vec::new();

        for node in self.edges.keys() {
            if !colors.contains_key(node.as_str()) {
                self.cycle_dfs(node, &mut colors, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    /// Cycles that pass through `name`
    pub fn cycles_through(&self, name: &str) -> Vec<Vec<String>> {
        self.find_cycles()
            .into_iter()
            .filter(|cycle| cycle.iter().any(|n| n == name))
            .collect()
    }

    fn cycle_dfs<'a>(
        &'a self,
        node: &'a str,
        colors: &mut BTreeMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        colors.insert(node, Color::Visiting);
        stack.push(node);

        if let Some(targets) = self.edges.get(node) {
            for target in targets.keys() {
                match colors.get(target.as_str()) {
                    None => self.cycle_dfs(target, colors, stack, cycles),
                    Some(Color::Visiting) => {
                        let start = stack.iter().position(|n| *n == target.as_str()).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(target.clone());
                        debug!(?cycle, "cycle_dfs: back edge");
                        cycles.push(cycle);
                    }
                    Some(Color::Done) => {}
                }
            }
        }

        stack.pop();
        colors.insert(node, Color::Done);
    }

    /// Render as Graphviz DOT
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph wildcards {\n    rankdir=LR;\n");
        for node in &self.nodes {
            if self.broken.contains(node) {
                let _ = writeln!(out, "    \"{}\" [color=red, style=dashed];", node);
            } else {
                let _ = writeln!(out, "    \"{}\";", node);
            }
        }
        for target in self.unknown_references().keys() {
            let _ = writeln!(out, "    \"{}\" [shape=box, style=dotted];", target);
        }
        for (source, targets) in &self.edges {
            for (target, kind) in targets {
                let style = match kind {
                    EdgeKind::Include => "solid",
                    EdgeKind::Requires => "dashed",
                    EdgeKind::Both => "bold",
                };
                let _ = writeln!(out, "    \"{}\" -> \"{}\" [style={}];", source, target, style);
            }
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SourceEntry;

    fn graph(entries: &[(&str, &str)]) -> DependencyGraph {
        DependencyGraph::build(&WildcardSnapshot::from_entries(
            entries.iter().map(|(name, json)| SourceEntry::json(*name, *json)),
        ))
    }

    #[test]
    fn test_edges_from_includes_and_requires() {
        let g = graph(&[
            (
                "hat",
                r#"{"choices": [{"value": "straw hat", "requires": {"animal": "dog"}, "includes": "with [ribbon]"}], "includes": ["style"]}"#,
            ),
            ("animal", r#"{"choices": ["dog"]}"#),
            ("ribbon", r#"{"choices": ["red"]}"#),
        ]);

        assert_eq!(
            g.dependencies("hat").into_iter().collect::<Vec<_>>(),
            vec!["animal", "ribbon", "style"]
        );
        assert_eq!(g.edges["hat"]["animal"], EdgeKind::Requires);
        assert_eq!(g.edges["hat"]["ribbon"], EdgeKind::Include);
        assert_eq!(g.dependents("animal").into_iter().collect::<Vec<_>>(), vec!["hat"]);

        let unknown = g.unknown_references();
        assert_eq!(unknown.keys().copied().collect::<Vec<_>>(), vec!["style"]);
        assert!(unknown["style"].contains("hat"));
    }

    #[test]
    fn test_edge_kind_both() {
        let g = graph(&[(
            "a",
            r#"{"choices": [{"value": "x", "requires": {"b": "y"}, "includes": ["b"]}]}"#,
        )]);
        assert_eq!(g.edges["a"]["b"], EdgeKind::Both);
    }

    #[test]
    fn test_find_cycles() {
        let g = graph(&[
            ("a", r#"{"choices": [{"value": "1", "includes": ["b"]}]}"#),
            ("b", r#"{"choices": [{"value": "2", "requires": {"c": "3"}}]}"#),
            ("c", r#"{"choices": [{"value": "3", "includes": ["a"]}]}"#),
            ("d", r#"{"choices": [{"value": "4", "includes": ["a"]}]}"#),
        ]);
        assert_eq!(g.find_cycles(), vec![vec!["a", "b", "c", "a"]]);
        assert_eq!(g.cycles_through("c").len(), 1);
        assert!(g.cycles_through("d").is_empty());
    }

    #[test]
    fn test_acyclic_has_no_cycles() {
        let g = graph(&[
            ("a", r#"{"choices": [{"value": "1", "includes": ["b", "c"]}]}"#),
            ("b", r#"{"choices": [{"value": "2", "includes": ["c"]}]}"#),
            ("c", r#"{"choices": ["3"]}"#),
        ]);
        assert!(g.find_cycles().is_empty());
    }

    #[test]
    fn test_reachable_from() {
        let g = graph(&[
            ("a", r#"{"choices": [{"value": "1", "includes": ["b"]}]}"#),
            ("b", r#"{"choices": [{"value": "2", "includes": ["c"]}]}"#),
            ("c", r#"{"choices": ["3"]}"#),
            ("lonely", r#"{"choices": ["4"]}"#),
        ]);
        let reached = g.reachable_from(["a"]);
        assert_eq!(reached.into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_broken_nodes_and_dot() {
        let g = graph(&[("a", r#"{"choices": [{"value": "1", "includes": ["b"]}]}"#), ("b", "{oops")]);
        assert!(g.nodes.contains("b"));
        assert!(g.broken.contains("b"));
        assert!(g.unknown_references().is_empty());

        let dot = g.to_dot();
        assert!(dot.starts_with("digraph wildcards {"));
        assert!(dot.contains("\"a\" -> \"b\" [style=solid];"));
        assert!(dot.contains("\"b\" [color=red, style=dashed];"));
    }
}
