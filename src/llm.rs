use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::FallbackError;
use crate::pipeline::classify::FallbackClassifier;
use crate::pipeline::lesson::TextGenerator;
use crate::pipeline::InfoType;
use crate::settings::Settings;

const CLASSIFY_TEMPERATURE: f64 = 0.1;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
    stream: bool,
}

/// Blocking client for a local generate endpoint (`{model, prompt, temperature}` in,
/// `{response}` or `{text}` out).
pub struct LlmClient {
    http: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("lesson_builder/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.local_llm_endpoint,
            &settings.local_llm_model,
            Duration::from_secs(settings.llm_timeout_secs),
        )
    }

    fn transport_error(&self, e: reqwest::Error) -> FallbackError {
        if e.is_timeout() {
            FallbackError::Timeout(self.timeout)
        } else {
            FallbackError::Transport(e.to_string())
        }
    }
}

impl TextGenerator for LlmClient {
    fn generate(&self, prompt: &str, temperature: f64) -> Result<String, FallbackError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            temperature,
            stream: false,
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FallbackError::Status(status.as_u16()));
        }
        let raw = resp.text().map_err(|e| self.transport_error(e))?;
        debug!(status = status.as_u16(), bytes = raw.len(), "model responded");
        Ok(extract_completion(&raw))
    }
}

impl FallbackClassifier for LlmClient {
    fn classify_sentence(&self, text: &str, labels: &[InfoType]) -> Result<String, FallbackError> {
        self.generate(&classification_prompt(text, labels), CLASSIFY_TEMPERATURE)
    }
}

pub fn classification_prompt(text: &str, labels: &[InfoType]) -> String {
    let names: Vec<&str> = labels.iter().map(|l| l.as_str()).collect();
    format!(
        "Classify the sentence into one label from this set: [{}].\n\
         Respond in strict JSON as {{\"label\": \"...\", \"confidence\": 0-1}}.\n\
         Sentence: {}",
        names.join(", "),
        text
    )
}

/// Completion text from `response`, else `text`, else the raw body.
fn extract_completion(raw: &str) -> String {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    ["response", "text"]
        .iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string())
}
