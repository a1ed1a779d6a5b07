use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::classify::Classification;
use super::info_type::InfoType;
use super::text::{has_number, keyword_density, tokens};

const BASE: f64 = 0.35;
const W_KEYWORD: f64 = 0.35;
const W_NUMBER: f64 = 0.10;
const W_LENGTH: f64 = 0.20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub keyword_density: f64,
    pub number_presence: u8,
    pub length_tokens: usize,
    pub length_bonus: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<InfoType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredUnit {
    pub text: String,
    pub score: f64,
    pub features: Features,
}

/// 8–30 tokens is the ideal window.
pub fn length_bonus(num_tokens: usize) -> f64 {
    match num_tokens {
        8..=30 => 1.0,
        5..=7 | 31..=40 => 0.85,
        _ => 0.6,
    }
}

/// Label prior scaled by classification confidence.
pub fn label_prior_boost(label: InfoType, probability: f64) -> f64 {
    label.prior() * (1.0 + 0.5 * probability.clamp(0.0, 1.0))
}

pub fn score(
    unit: &str,
    keywords: Option<&HashSet<String>>,
    classification: Option<&Classification>,
) -> ScoredUnit {
    let lowered = unit.to_lowercase();
    let length_tokens = tokens(&lowered).len();
    let kd = keyword_density(&lowered, keywords);
    let number_presence = u8::from(has_number(&lowered));
    let lb = length_bonus(length_tokens);

    let mut raw = BASE + W_KEYWORD * kd + W_NUMBER * f64::from(number_presence) + W_LENGTH * lb;
    if let Some(c) = classification {
        raw += label_prior_boost(c.label, c.probability);
    }

    ScoredUnit {
        text: unit.to_string(),
        score: round3(raw.clamp(0.0, 1.0)),
        features: Features {
            keyword_density: kd,
            number_presence,
            length_tokens,
            length_bonus: lb,
            label: classification.map(|c| c.label),
            probability: classification.map(|c| c.probability),
        },
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
