use std::fmt;

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use super::TextAnchor;

/// Store-assigned id; larger ids were created later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClarificationId(pub u64);

impl fmt::Display for ClarificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clr_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClarificationStatus {
    Created,
    Submitting,
    Completed,
    Failed,
}

impl ClarificationStatus {
    /// States from which `submit` may start a new attempt.
    pub fn accepts_submit(self) -> bool {
        matches!(self, ClarificationStatus::Created | ClarificationStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clarification {
    pub id: ClarificationId,
    pub anchor: TextAnchor,
    #[serde(default)]
    pub request: String,
    #[serde(default)]
    pub response: Option<String>,
    pub status: ClarificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Clarification {
    pub fn new(id: ClarificationId, anchor: TextAnchor) -> Self {
        let now = Utc::now();
        Self {
            id,
            anchor,
            request: String::new(),
            response: None,
            status: ClarificationStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.anchor.message_id
    }
}
