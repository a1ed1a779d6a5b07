//! Downstream threshold checks on finished step text: reading difficulty and
//! publishability (reading grade, token budget).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::text::{keyword_density, keyword_set};

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9']+").unwrap());
static SENTENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());

const MAX_READING_GRADE: f64 = 9.0;
const TOKENS_PER_WORD: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Master,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub ok: bool,
    pub reason: String,
}

/// Vowel-group estimate with silent trailing `e`; at least one per word.
fn syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let mut count = 0;
    let mut prev_vowel = false;
    for c in lower.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    if count > 1 && lower.ends_with('e') && !lower.ends_with("le") {
        count -= 1;
    }
    count.max(1)
}

/// Flesch-Kincaid grade level. Text without words grades 0.
pub fn flesch_kincaid_grade(text: &str) -> f64 {
    let words: Vec<&str> = WORD_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|w| w.chars().any(|c| c.is_alphabetic()))
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = SENTENCE_END_RE.find_iter(text).count().max(1) as f64;
    let syllable_total: usize = words.iter().map(|w| syllables(w)).sum();
    let n = words.len() as f64;
    0.39 * (n / sentences) + 11.8 * (syllable_total as f64 / n) - 15.59
}

/// Denser domain vocabulary and a higher grade both push toward Master.
pub fn determine_difficulty<S: AsRef<str>>(text: &str, domain_vocab: &[S]) -> Difficulty {
    let vocab: HashSet<String> = keyword_set(domain_vocab);
    let density = keyword_density(text, Some(&vocab));
    let grade = flesch_kincaid_grade(text);
    if density < 0.05 && grade <= 8.5 {
        Difficulty::Beginner
    } else if density < 0.1 && grade <= 10.0 {
        Difficulty::Intermediate
    } else {
        Difficulty::Master
    }
}

pub fn check_quality(text: &str, token_cap: usize) -> QualityVerdict {
    let grade = flesch_kincaid_grade(text);
    if grade > MAX_READING_GRADE {
        return QualityVerdict {
            ok: false,
            reason: format!("reading_grade_too_high:{:.2}", grade),
        };
    }
    let approx_tokens = (text.split_whitespace().count() as f64 * TOKENS_PER_WORD) as usize;
    if approx_tokens > token_cap {
        return QualityVerdict {
            ok: false,
            reason: format!("token_cap_exceeded:{}>{}", approx_tokens, token_cap),
        };
    }
    QualityVerdict {
        ok: true,
        reason: "ok".to_string(),
    }
}
