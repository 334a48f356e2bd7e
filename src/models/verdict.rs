use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Scam-risk classification for one project.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Verdict {
    Green,
    Yellow,
    Red,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Outcome for one project inside a batch result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerdictRecord {
    pub name: String,
    pub verdict: Verdict,
    pub explanation: String,
    /// Tokens billed for the call; absent when no call could be attributed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<i64>,
}

impl VerdictRecord {
    pub fn error(name: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict: Verdict::Error,
            explanation: explanation.into(),
            tokens: None,
        }
    }
}

/// Latest verdict for a project, independent of the batch that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Judgement {
    pub project: String,
    pub verdict: Verdict,
    pub text: String,
}

impl From<&VerdictRecord> for Judgement {
    fn from(record: &VerdictRecord) -> Self {
        Self {
            project: record.name.clone(),
            verdict: record.verdict,
            text: record.explanation.clone(),
        }
    }
}
