//! Prompt rendering for project evaluation.
//!
//! The template carries a `{{ project_json }}` placeholder that is replaced by
//! a pretty-printed JSON view of the project. Projects whose name contains an
//! entry from the known-scam list get those entries embedded as well.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::models::batch::ProjectRequest;

pub const DEFAULT_TEMPLATE: &str = include_str!("../../prompts/project_eval.md");

const PLACEHOLDER: &str = "{{ project_json }}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScamEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ScamList {
    #[serde(default)]
    scams: Vec<ScamEntry>,
}

#[derive(Serialize)]
struct PromptProject<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    known_scam_matches: Vec<&'a ScamEntry>,
}

pub struct PromptBuilder {
    template: String,
    scamlist: Vec<ScamEntry>,
    max_description_len: usize,
}

impl PromptBuilder {
    pub fn new(
        template: impl Into<String>,
        scamlist: Vec<ScamEntry>,
        max_description_len: usize,
    ) -> Result<Self, PromptError> {
        let template = template.into();
        if !template.contains(PLACEHOLDER) {
            return Err(PromptError::MissingPlaceholder);
        }

        let scamlist = scamlist
            .into_iter()
            .filter(|entry| !entry.name.trim().is_empty())
            .collect();

        Ok(Self {
            template,
            scamlist,
            max_description_len,
        })
    }

    /// Built-in template, no scam list.
    pub fn with_defaults(max_description_len: usize) -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            scamlist: Vec::new(),
            max_description_len,
        }
    }

    /// Load the template override and scam list named in the configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, PromptError> {
        let template = match &config.prompt_template_path {
            Some(path) => read_file(path)?,
            None => DEFAULT_TEMPLATE.to_string(),
        };

        let scamlist = match &config.scamlist_path {
            Some(path) => load_scamlist(path)?,
            None => Vec::new(),
        };

        tracing::info!(
            custom_template = config.prompt_template_path.is_some(),
            scamlist_entries = scamlist.len(),
            "Prompt builder ready"
        );

        Self::new(template, scamlist, config.max_description_len)
    }

    /// Cut a description to the configured number of characters.
    pub fn truncate_description<'a>(&self, description: &'a str) -> &'a str {
        match description.char_indices().nth(self.max_description_len) {
            Some((idx, _)) => &description[..idx],
            None => description,
        }
    }

    /// Known-scam entries whose name appears in the project name (case-insensitive).
    pub fn scam_matches(&self, project_name: &str) -> Vec<&ScamEntry> {
        let name = project_name.to_lowercase();
        self.scamlist
            .iter()
            .filter(|entry| name.contains(&entry.name.to_lowercase()))
            .collect()
    }

    pub fn render(&self, project: &ProjectRequest) -> Result<String, PromptError> {
        let view = PromptProject {
            name: &project.name,
            description: self.truncate_description(&project.description),
            known_scam_matches: self.scam_matches(&project.name),
        };
        let project_json = serde_json::to_string_pretty(&view).map_err(PromptError::Serialize)?;
        Ok(self.template.replace(PLACEHOLDER, &project_json))
    }
}

fn read_file(path: &Path) -> Result<String, PromptError> {
    std::fs::read_to_string(path).map_err(|source| PromptError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a scam list file. A missing file is an empty list.
pub fn load_scamlist(path: &Path) -> Result<Vec<ScamEntry>, PromptError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Scam list not found, continuing without it");
        return Ok(Vec::new());
    }
    let raw = read_file(path)?;
    let list: ScamList = serde_json::from_str(&raw).map_err(PromptError::Serialize)?;
    Ok(list.scams)
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Prompt template is missing the {{{{ project_json }}}} placeholder")]
    MissingPlaceholder,

    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),
}
