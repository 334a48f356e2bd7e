use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::models::verdict::VerdictRecord;

/// Lifecycle of a batch in the queue table.
///
/// `new -> process -> done | error`. Only the worker moves a batch past `new`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    New,
    Process,
    Done,
    Error,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// One project submitted for screening.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ProjectRequest {
    #[garde(length(chars, min = 1, max = 200))]
    pub name: String,

    #[garde(length(chars, max = 10_000))]
    #[serde(default)]
    pub description: String,
}

impl ProjectRequest {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A batch row as stored in the queue table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub payload: Vec<ProjectRequest>,
    pub result: Option<Vec<VerdictRecord>>,
    pub error: Option<String>,
}

/// A batch handed to exactly one worker by a successful claim.
///
/// `claimed_at` identifies this particular claim. A batch that was reclaimed
/// and claimed again gets a new timestamp, so a terminal write carrying the
/// old one is rejected.
#[derive(Debug, Clone)]
pub struct ClaimedBatch {
    pub id: i64,
    pub claimed_at: DateTime<Utc>,
    pub payload: Vec<ProjectRequest>,
}

/// Read-only projection served to status queries.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub id: i64,
    pub status: BatchStatus,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub error: Option<String>,
    pub result: Option<Vec<VerdictRecord>>,
}

/// Check an enqueue payload. Returns a human-readable reason on rejection.
pub fn validate_payload(payload: &[ProjectRequest]) -> Result<(), String> {
    if payload.is_empty() {
        return Err("batch must contain at least one project".to_string());
    }

    for (idx, project) in payload.iter().enumerate() {
        if let Err(report) = project.validate() {
            return Err(format!("project #{idx}: {report}"));
        }
        if project.name.trim().is_empty() {
            return Err(format!("project #{idx}: name must not be blank"));
        }
    }

    Ok(())
}
