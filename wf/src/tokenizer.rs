//! Placeholder scanning
//!
//! Templates reference wildcards as `__name__`. Include strings additionally accept the
//! shorter `[name]` form, which would be ambiguous in free prompt text.

use std::sync::LazyLock;

use regex::Regex;

static TEMPLATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([A-Za-z0-9_.\-]+?)__").expect("template token regex"));

static INCLUDE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"__([A-Za-z0-9_.\-]+?)__|\[([A-Za-z0-9_.\-]+)\]").expect("include token regex")
});

/// Which placeholder forms are recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSyntax {
    /// `__name__` only
    Template,
    /// `__name__` and `[name]`
    Include,
}

impl TokenSyntax {
    fn regex(self) -> &'static Regex {
        match self {
            TokenSyntax::Template => &TEMPLATE_TOKEN,
            TokenSyntax::Include => &INCLUDE_TOKEN,
        }
    }
}

/// One piece of a scanned string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    /// Literal text between placeholders
    Text(&'a str),
    /// Wildcard name inside a placeholder
    Token(&'a str),
}

/// Split `input` into literal text and placeholder names, left to right
pub fn tokenize(input: &str, syntax: TokenSyntax) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut last = 0;

    for caps in syntax.regex().captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        if whole.start() > last {
            pieces.push(Piece::Text(&input[last..whole.start()]));
        }
        pieces.push(Piece::Token(name.as_str()));
        last = whole.end();
    }

    if last < input.len() {
        pieces.push(Piece::Text(&input[last..]));
    }
    pieces
}

/// Distinct wildcard names referenced by `input`, in order of first appearance
pub fn referenced_names(input: &str, syntax: TokenSyntax) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for piece in tokenize(input, syntax) {
        if let Piece::Token(name) = piece
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    names
}

/// The literal text emitted for an unresolvable placeholder
pub fn placeholder(name: &str) -> String {
    format!("__{}__", name)
}

/// Whether `name` can be used as a wildcard name
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}
