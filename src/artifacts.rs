//! JSON artifacts exchanged between CLI stages.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::RawSection;
use crate::error::InputError;
use crate::pipeline::classify::Classification;
use crate::pipeline::gates::Difficulty;
use crate::pipeline::score::Features;
use crate::pipeline::MappedStep;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).map_err(|e| {
        InputError::MalformedArtifact {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Pretty-printed, parent directories created as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("Failed to write {:?}", path))
}

/// Write the artifact, then print `summary -> path`. A failed write reports nothing.
pub fn write_reported<T: Serialize + ?Sized>(path: &Path, value: &T, summary: &str) -> Result<()> {
    write_json(path, value)?;
    println!("{} -> {:?}", summary, path);
    Ok(())
}

pub fn find_section(sections: &[RawSection], id: i64) -> Result<&RawSection, InputError> {
    sections
        .iter()
        .find(|s| s.section_id == id)
        .ok_or(InputError::SectionNotFound { id })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentencesArtifact {
    pub section_id: i64,
    pub sentences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub section_id: i64,
    pub text: String,
    #[serde(flatten)]
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub section_id: i64,
    pub text: String,
    pub score: f64,
    pub features: Features,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCountArtifact {
    pub step_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyArtifact {
    pub difficulty: Difficulty,
}

/// Text input for the gates: a list of lines or a single string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TextInput {
    Lines(Vec<String>),
    Single(String),
}

impl TextInput {
    pub fn joined(&self) -> String {
        match self {
            TextInput::Lines(lines) => lines.join("\n"),
            TextInput::Single(s) => s.clone(),
        }
    }

    pub fn into_lines(self) -> Vec<String> {
        match self {
            TextInput::Lines(lines) => lines,
            TextInput::Single(s) => vec![s],
        }
    }
}

/// Input of the rewrite and rows stages: mapped steps, or bare text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StepsOrTexts {
    Steps(Vec<MappedStep>),
    Texts(TextInput),
}

impl StepsOrTexts {
    pub fn into_lines(self) -> Vec<String> {
        match self {
            StepsOrTexts::Steps(steps) => steps.into_iter().flat_map(|s| s.content).collect(),
            StepsOrTexts::Texts(t) => t.into_lines(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::Source;
    use crate::pipeline::InfoType;

    fn section(id: i64) -> RawSection {
        RawSection {
            section_id: id,
            page_id: 1,
            page_title: None,
            title: None,
            text: "a funding rate is a fee.".into(),
            topic: None,
            keywords: vec![],
            status: "pending".into(),
        }
    }

    #[test]
    fn write_creates_directories_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/sections.json");
        let sections = vec![section(10_001), section(10_002)];
        write_json(&path, &sections).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  "));
        let back: Vec<RawSection> = read_json(&path).unwrap();
        assert_eq!(back, sections);
    }

    #[test]
    fn wrong_shape_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("step.json");
        std::fs::write(&path, r#"{"sentences": "not a list"}"#).unwrap();
        let err = read_json::<SentencesArtifact>(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::MalformedArtifact { .. })
        ));
        assert!(read_json::<SentencesArtifact>(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "a file, not a directory").unwrap();
        let out = blocker.join("sentences.json");
        let artifact = SentencesArtifact { section_id: 7, sentences: vec!["a.".into()] };

        assert!(write_reported(&out, &artifact, "Wrote 1 sentences").is_err());
        assert!(!out.exists());

        let ok = dir.path().join("step/sentences.json");
        write_reported(&ok, &artifact, "Wrote 1 sentences").unwrap();
        assert_eq!(read_json::<SentencesArtifact>(&ok).unwrap(), artifact);
    }

    #[test]
    fn missing_section_is_reported() {
        let sections = vec![section(10_001)];
        assert_eq!(find_section(&sections, 10_001).unwrap().section_id, 10_001);
        assert!(matches!(
            find_section(&sections, 42),
            Err(InputError::SectionNotFound { id: 42 })
        ));
    }

    #[test]
    fn labeled_record_is_flat() {
        let record = LabeledRecord {
            section_id: 5,
            text: "x".into(),
            classification: Classification {
                label: InfoType::Mechanism,
                probability: 0.7,
                rule_hits: vec!["mechanism".into()],
                source: Source::Rules,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["label"], "Mechanism");
        assert_eq!(json["rule_hits"][0], "mechanism");
        assert_eq!(json["section_id"], 5);
    }

    #[test]
    fn text_input_accepts_list_or_string() {
        let lines: TextInput = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(lines.joined(), "a\nb");
        let single: TextInput = serde_json::from_str(r#""solo""#).unwrap();
        assert_eq!(single.into_lines(), vec!["solo"]);
    }

    #[test]
    fn steps_or_texts() {
        let steps: StepsOrTexts = serde_json::from_str(
            r#"[{"template_id": "d", "info_type": "Definition", "content": ["a", "b"]},
                {"template_id": "m", "info_type": "Mechanism", "content": ["c"]}]"#,
        )
        .unwrap();
        assert!(matches!(steps, StepsOrTexts::Steps(_)));
        assert_eq!(steps.into_lines(), vec!["a", "b", "c"]);

        let texts: StepsOrTexts = serde_json::from_str(r#"["x", "y"]"#).unwrap();
        assert_eq!(texts.into_lines(), vec!["x", "y"]);
    }
}
