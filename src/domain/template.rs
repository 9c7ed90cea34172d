use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::RecipientName;

pub const NAME_PLACEHOLDER: &str = "[NAME]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(alias = "content")]
    pub body: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Template {
    /// Body with every `[NAME]` replaced by the display name (empty when absent).
    pub fn render(&self, name: Option<&RecipientName>) -> String {
        self.body
            .replace(NAME_PLACEHOLDER, name.map_or("", AsRef::as_ref))
    }

    /// The template's own subject wins over the campaign subject when set.
    pub fn subject_or<'a>(&'a self, campaign_subject: &'a str) -> &'a str {
        self.subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(campaign_subject)
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("At least one template is required")]
    Empty,
    #[error("Exactly one template must be marked as default, found {0}")]
    DefaultCount(usize),
    #[error("Template id {0:?} is used more than once")]
    DuplicateId(String),
    #[error("Template {0:?} has an empty body")]
    EmptyBody(String),
    #[error("Template ids must not be blank")]
    BlankId,
}

/// Non-empty set of templates with exactly one default.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    templates: Vec<Template>,
    default_index: usize,
}

impl TemplateSet {
    pub fn parse(templates: Vec<Template>) -> Result<Self, TemplateError> {
        if templates.is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut ids = HashSet::with_capacity(templates.len());
        for template in &templates {
            let id = template.id.trim();
            if id.is_empty() {
                return Err(TemplateError::BlankId);
            }
            if !ids.insert(id.to_ascii_lowercase()) {
                return Err(TemplateError::DuplicateId(template.id.clone()));
            }
            if template.body.trim().is_empty() {
                return Err(TemplateError::EmptyBody(template.id.clone()));
            }
        }

        let defaults: Vec<usize> = templates
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_default)
            .map(|(i, _)| i)
            .collect();
        match defaults.as_slice() {
            [default_index] => Ok(Self {
                default_index: *default_index,
                templates,
            }),
            other => Err(TemplateError::DefaultCount(other.len())),
        }
    }

    pub fn default_template(&self) -> &Template {
        &self.templates[self.default_index]
    }

    /// Template matching `key` by id, or the default one.
    pub fn resolve(&self, key: &str) -> &Template {
        let key = key.trim();
        self.templates
            .iter()
            .find(|t| t.id.trim().eq_ignore_ascii_case(key))
            .unwrap_or_else(|| self.default_template())
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            templates: vec![Template {
                id: "EN".into(),
                subject: None,
                body: "Default English template. Hello [NAME]".into(),
                is_default: true,
            }],
            default_index: 0,
        }
    }
}
