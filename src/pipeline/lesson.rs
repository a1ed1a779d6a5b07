use serde::{Deserialize, Serialize};
use tracing::debug;

use super::info_type::InfoType;
use super::templates::MappedStep;
use crate::error::FallbackError;

const REWRITE_INSTRUCTION: &str = "Rewrite the following content to be in a clear, concise \
    2nd-person conversational style without changing any facts. Keep it under the token cap.";

/// Free-form text completion. Implemented by the HTTP model client.
pub trait TextGenerator {
    fn generate(&self, prompt: &str, temperature: f64) -> Result<String, FallbackError>;
}

/// One persisted line of a lesson. `section_id` is the 1-based step index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonRow {
    pub lesson_id: i64,
    pub lesson_title: String,
    pub section_id: i64,
    pub section_style: InfoType,
    pub content: String,
}

/// Restate each line in second person. Any model failure aborts the batch.
pub fn micro_rewrite<G: TextGenerator + ?Sized>(
    texts: &[String],
    generator: &G,
    temperature: f64,
) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::with_capacity(texts.len());
    for text in texts {
        let prompt = format!("{}\n\n{}", REWRITE_INSTRUCTION, text);
        let completion = generator.generate(&prompt, temperature)?;
        debug!(chars = completion.len(), "rewrote line");
        out.push(completion.trim().to_string());
    }
    Ok(out)
}

pub fn rows_from_steps(lesson_id: i64, lesson_title: &str, steps: &[MappedStep]) -> Vec<LessonRow> {
    steps
        .iter()
        .enumerate()
        .flat_map(|(idx, step)| {
            step.content.iter().map(move |text| LessonRow {
                lesson_id,
                lesson_title: lesson_title.to_string(),
                section_id: idx as i64 + 1,
                section_style: step.info_type,
                content: text.clone(),
            })
        })
        .collect()
}

/// Plain lines (e.g. rewritten texts) become one step each, sharing a style.
pub fn rows_from_texts(
    lesson_id: i64,
    lesson_title: &str,
    style: InfoType,
    texts: &[String],
) -> Vec<LessonRow> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| LessonRow {
            lesson_id,
            lesson_title: lesson_title.to_string(),
            section_id: i as i64 + 1,
            section_style: style,
            content: text.clone(),
        })
        .collect()
}
