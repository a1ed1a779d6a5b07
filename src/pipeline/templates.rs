use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::info_type::InfoType;
use super::select::SelectedSet;
use crate::error::InputError;

/// Presentation slot for one info type. Extra keys are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub info_type: InfoType,
    #[serde(flatten)]
    pub slots: Map<String, Value>,
}

/// Template files in the wild carry both `"id": "def_card"` and `"id": 3`.
fn id_from_string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "template id must be a string or a number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedStep {
    pub template_id: String,
    pub info_type: InfoType,
    pub content: Vec<String>,
}

/// Mapped steps plus the labels that had content but no template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateMapping {
    pub steps: Vec<MappedStep>,
    pub skipped: Vec<InfoType>,
}

/// Parse a template definition: a non-empty JSON list of `{id, info_type, ..}`.
pub fn parse_templates(json: &str) -> Result<Vec<Template>, InputError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| InputError::MalformedTemplates(e.to_string()))?;
    match &value {
        Value::Array(items) if items.is_empty() => return Err(InputError::EmptyTemplates),
        Value::Array(_) => {}
        _ => return Err(InputError::EmptyTemplates),
    }
    serde_json::from_value(value).map_err(|e| InputError::MalformedTemplates(e.to_string()))
}

pub fn load_templates(path: &Path) -> anyhow::Result<Vec<Template>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read templates {:?}", path))?;
    Ok(parse_templates(&raw)?)
}

/// Bind each non-empty label to the first template of its info type, in label order.
pub fn map_to_templates(selected: &SelectedSet, templates: &[Template]) -> TemplateMapping {
    let mut mapping = TemplateMapping::default();
    for (info_type, content) in selected.iter().filter(|(_, c)| !c.is_empty()) {
        match templates.iter().find(|t| t.info_type == info_type) {
            Some(tpl) => mapping.steps.push(MappedStep {
                template_id: tpl.id.clone(),
                info_type,
                content: content.to_vec(),
            }),
            None => {
                debug!(%info_type, "no template for label, skipping");
                mapping.skipped.push(info_type);
            }
        }
    }
    if !mapping.skipped.is_empty() {
        info!(skipped = mapping.skipped.len(), "labels without a template");
    }
    mapping
}
