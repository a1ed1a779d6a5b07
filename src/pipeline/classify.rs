use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::info_type::InfoType;
use super::rules::score_rules;
use super::text::keyword_density;
use crate::error::FallbackError;

pub const FALLBACK_RULE_HIT: &str = "llm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Rules,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: InfoType,
    pub probability: f64,
    pub rule_hits: Vec<String>,
    pub source: Source,
}

/// A unit together with its classification, in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledUnit {
    pub text: String,
    #[serde(flatten)]
    pub classification: Classification,
}

/// External single-sentence classifier. Returns the raw response payload;
/// validation happens in [`Classifier`], so implementations only move bytes.
pub trait FallbackClassifier: Sync {
    fn classify_sentence(&self, text: &str, labels: &[InfoType]) -> Result<String, FallbackError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    pub score_threshold: f64,
    pub margin_threshold: f64,
    pub use_fallback: bool,
    /// Model calls allowed per `classify_all` batch. `None` is unbounded.
    pub max_fallback_calls: Option<usize>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.55,
            margin_threshold: 0.10,
            use_fallback: true,
            max_fallback_calls: Some(3),
        }
    }
}

impl ClassifierConfig {
    /// Confident means `top1 >= θ` and `top1 - top2 >= μ`.
    pub fn needs_fallback(&self, top1: f64, top2: f64) -> bool {
        !(top1 >= self.score_threshold && (top1 - top2) >= self.margin_threshold)
    }
}

/// Rule-based result with the calibrated distribution it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub classification: Classification,
    pub probabilities: [f64; 5],
}

impl RuleVerdict {
    /// Highest and second-highest probabilities.
    pub fn top_two(&self) -> (f64, f64) {
        let mut sorted = self.probabilities;
        sorted.sort_by(|a, b| b.total_cmp(a));
        (sorted[0], sorted[1])
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f64; 5]) -> [f64; 5] {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = scores.map(|s| (s - max).exp());
    let sum: f64 = exp.iter().sum();
    exp.map(|e| e / sum)
}

/// First maximal entry in `InfoType::ALL` order.
fn argmax(probs: &[f64; 5]) -> InfoType {
    let mut best = 0;
    for (i, p) in probs.iter().enumerate().skip(1) {
        if *p > probs[best] {
            best = i;
        }
    }
    InfoType::ALL[best]
}

/// Rules-only classification. Pure, so safe to run across units in parallel.
pub fn classify_rules(unit: &str, keywords: Option<&HashSet<String>>) -> RuleVerdict {
    let lowered = unit.trim().to_lowercase();
    let mut rules = score_rules(&lowered);

    // Uniform scaling sharpens margins without changing the ranking.
    let multiplier = 1.0 + 0.5 * keyword_density(&lowered, keywords);
    for s in rules.scores.iter_mut() {
        *s *= multiplier;
    }

    let probabilities = softmax(&rules.scores);
    let label = argmax(&probabilities);
    RuleVerdict {
        classification: Classification {
            label,
            probability: probabilities[label.index()],
            rule_hits: rules.hits.iter().map(|h| h.to_string()).collect(),
            source: Source::Rules,
        },
        probabilities,
    }
}

/// Decode and validate a fallback payload: a JSON object `{label, confidence}`.
pub fn parse_fallback_response(raw: &str) -> Result<(InfoType, f64), FallbackError> {
    #[derive(Deserialize)]
    struct Payload {
        label: String,
        confidence: f64,
    }

    let body = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw,
    };
    let payload: Payload =
        serde_json::from_str(body).map_err(|e| FallbackError::Parse(e.to_string()))?;
    let label = payload
        .label
        .parse::<InfoType>()
        .map_err(|_| FallbackError::InvalidLabel(payload.label.clone()))?;
    if !(0.0..=1.0).contains(&payload.confidence) {
        return Err(FallbackError::ConfidenceOutOfRange(payload.confidence));
    }
    Ok((label, payload.confidence))
}

pub struct Classifier<'a> {
    config: ClassifierConfig,
    fallback: Option<&'a dyn FallbackClassifier>,
}

impl<'a> Classifier<'a> {
    pub fn new(config: ClassifierConfig, fallback: Option<&'a dyn FallbackClassifier>) -> Self {
        Self { config, fallback }
    }

    /// Classify one unit, escalating at most once when the rules are not confident.
    pub fn classify(&self, unit: &str, keywords: Option<&HashSet<String>>) -> Classification {
        let verdict = classify_rules(unit, keywords);
        self.gate(unit, verdict, &mut None)
    }

    /// Classify a batch. The rule pass runs in parallel; escalations then run
    /// sequentially in input order so the call budget is spent deterministically.
    pub fn classify_all(
        &self,
        units: &[String],
        keywords: Option<&HashSet<String>>,
    ) -> Vec<LabeledUnit> {
        let verdicts: Vec<RuleVerdict> = units
            .par_iter()
            .map(|u| classify_rules(u, keywords))
            .collect();

        let mut budget = self.config.max_fallback_calls;
        units
            .iter()
            .zip(verdicts)
            .map(|(unit, verdict)| LabeledUnit {
                text: unit.clone(),
                classification: self.gate(unit, verdict, &mut budget),
            })
            .collect()
    }

    fn gate(&self, unit: &str, verdict: RuleVerdict, budget: &mut Option<usize>) -> Classification {
        let Some(fallback) = self.fallback.filter(|_| self.config.use_fallback) else {
            return verdict.classification;
        };
        let (top1, top2) = verdict.top_two();
        if !self.config.needs_fallback(top1, top2) {
            return verdict.classification;
        }
        if let Some(remaining) = budget {
            if *remaining == 0 {
                debug!(unit, "fallback budget spent, keeping rule label");
                return verdict.classification;
            }
            *remaining -= 1;
        }

        debug!(unit, top1, top2, "low confidence, asking fallback classifier");
        let outcome = fallback
            .classify_sentence(unit, &InfoType::ALL)
            .and_then(|raw| parse_fallback_response(&raw));
        match outcome {
            Ok((label, confidence)) => Classification {
                label,
                probability: confidence,
                rule_hits: vec![FALLBACK_RULE_HIT.to_string()],
                source: Source::Fallback,
            },
            Err(e) => {
                warn!(unit, error = %e, "fallback degraded to rule label");
                verdict.classification
            }
        }
    }
}
