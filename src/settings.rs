use std::path::PathBuf;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::pipeline::ClassifierConfig;

const CONFIG_FILE: &str = "lesson_builder";
const ENV_PREFIX: &str = "LESSON";

/// Effective settings: defaults, then `lesson_builder.toml`, then `LESSON_*` env vars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline_version: String,
    pub log_level: String,
    pub language: String,
    pub token_cap_per_step: usize,
    pub classifier_use_llm_fallback: bool,
    pub classifier_score_threshold: f64,
    pub classifier_margin_threshold: f64,
    pub classifier_max_llm_calls_per_section: usize,
    pub local_llm_endpoint: String,
    pub local_llm_model: String,
    pub llm_temperature: f64,
    pub llm_timeout_secs: u64,
    pub output_dir: PathBuf,
    pub database_path: PathBuf,
    pub templates_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline_version: "0.1.0".into(),
            log_level: "info".into(),
            language: "en".into(),
            token_cap_per_step: 140,
            classifier_use_llm_fallback: true,
            classifier_score_threshold: 0.55,
            classifier_margin_threshold: 0.10,
            classifier_max_llm_calls_per_section: 3,
            local_llm_endpoint: "http://localhost:11434/api/generate".into(),
            local_llm_model: "qwen2.5:3b-instruct".into(),
            llm_temperature: 0.3,
            llm_timeout_secs: 60,
            output_dir: PathBuf::from("./.out"),
            database_path: PathBuf::from("data/lessons.sqlite"),
            templates_path: PathBuf::from("config/templates.json"),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_builder(
            Config::builder().add_source(File::with_name(CONFIG_FILE).required(false)),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to assemble settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            score_threshold: self.classifier_score_threshold,
            margin_threshold: self.classifier_margin_threshold,
            use_fallback: self.classifier_use_llm_fallback,
            max_fallback_calls: Some(self.classifier_max_llm_calls_per_section),
        }
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_toml(toml: &str) -> Result<Settings> {
        Settings::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn defaults_match_classifier_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.token_cap_per_step, 140);
        assert_eq!(settings.local_llm_model, "qwen2.5:3b-instruct");
        assert_eq!(settings.classifier_config(), ClassifierConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let settings = from_toml(
            "classifier_score_threshold = 0.7\n\
             classifier_use_llm_fallback = false\n\
             classifier_max_llm_calls_per_section = 0\n\
             templates_path = \"other/templates.json\"\n",
        )
        .unwrap();
        let cfg = settings.classifier_config();
        assert_eq!(cfg.score_threshold, 0.7);
        assert!(!cfg.use_fallback);
        assert_eq!(cfg.max_fallback_calls, Some(0));
        assert_eq!(cfg.margin_threshold, 0.10);
        assert_eq!(settings.templates_path, PathBuf::from("other/templates.json"));
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(from_toml("token_cap_per_step = \"lots\"").is_err());
    }
}
