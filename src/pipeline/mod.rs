pub mod classify;
pub mod gates;
pub mod info_type;
pub mod lesson;
pub mod rules;
pub mod score;
pub mod segment;
pub mod select;
pub mod steps;
pub mod templates;
pub mod text;

use std::collections::HashSet;

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

pub use classify::{Classifier, ClassifierConfig, LabeledUnit};
pub use info_type::InfoType;
pub use score::ScoredUnit;
pub use select::SelectedSet;
pub use templates::{MappedStep, Template};

/// Everything the core produces for one section, in stage order.
#[derive(Debug, Clone, Serialize)]
pub struct SectionOutput {
    pub units: Vec<String>,
    pub labeled: Vec<LabeledUnit>,
    pub scored: Vec<ScoredUnit>,
    pub selected: SelectedSet,
    pub step_count: usize,
    pub mapped: Vec<MappedStep>,
    pub skipped: Vec<InfoType>,
}

/// Scoring is per-unit independent; output keeps the labeled order.
pub fn score_all(labeled: &[LabeledUnit], keywords: Option<&HashSet<String>>) -> Vec<ScoredUnit> {
    labeled
        .par_iter()
        .map(|u| score::score(&u.text, keywords, Some(&u.classification)))
        .collect()
}

/// Segment → classify → score → select → plan → map.
pub fn process_section(
    text: &str,
    keywords: &[String],
    classifier: &Classifier,
    templates: &[Template],
) -> SectionOutput {
    let vocab = text::keyword_set(keywords);
    let vocab = Some(&vocab).filter(|v| !v.is_empty());

    let units = segment::segment(text);
    let labeled = classifier.classify_all(&units, vocab);
    let scored = score_all(&labeled, vocab);
    let selected = select::select_minimal_set(&labeled);
    let step_count = steps::decide_step_count(&selected);
    let mapping = templates::map_to_templates(&selected, templates);

    info!(
        units = units.len(),
        labels = selected.non_empty_labels(),
        step_count,
        mapped = mapping.steps.len(),
        "section processed"
    );

    SectionOutput {
        units,
        labeled,
        scored,
        selected,
        step_count,
        mapped: mapping.steps,
        skipped: mapping.skipped,
    }
}
