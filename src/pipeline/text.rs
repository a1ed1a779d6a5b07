use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9']+").unwrap());
static NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:[.,]\d+)?%?").unwrap());

pub fn tokens(text: &str) -> Vec<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Lowercased keyword vocabulary for density checks.
pub fn keyword_set<S: AsRef<str>>(keywords: &[S]) -> HashSet<String> {
    keywords
        .iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Fraction of tokens that are topic keywords. Zero without keywords or tokens.
pub fn keyword_density(text: &str, keywords: Option<&HashSet<String>>) -> f64 {
    let Some(vocab) = keywords.filter(|v| !v.is_empty()) else {
        return 0.0;
    };
    let lowered = text.to_lowercase();
    let toks = tokens(&lowered);
    if toks.is_empty() {
        return 0.0;
    }
    let hits = toks.iter().filter(|t| vocab.contains(**t)).count();
    hits as f64 / toks.len() as f64
}

/// Any numeric literal, percentages and decimals included.
pub fn has_number(text: &str) -> bool {
    NUM_RE.is_match(text)
}
