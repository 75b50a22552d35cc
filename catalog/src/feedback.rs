//! Post-publication feedback, including rebuild requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::identity::VoterIdentity;

pub const MAX_FEEDBACK_TITLE_LEN: usize = 200;
pub const MAX_FEEDBACK_CONTENT_LEN: usize = 5000;

/// What kind of feedback this is. Rebuild requests feed the build pipeline;
/// the rest are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Bug,
    Suggestion,
    RebuildRequest,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Bug => "bug",
            FeedbackType::Suggestion => "suggestion",
            FeedbackType::RebuildRequest => "rebuild_request",
        }
    }
}

/// Triage priority, ordered so queues can sort urgent work first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackPriority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl FeedbackPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackPriority::Low => "low",
            FeedbackPriority::Medium => "medium",
            FeedbackPriority::High => "high",
        }
    }
}

impl Default for FeedbackPriority {
    fn default() -> Self {
        FeedbackPriority::Low
    }
}

/// A feedback entry against a listed app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub app_id: String,
    pub author: VoterIdentity,
    pub feedback_type: FeedbackType,
    pub title: String,
    pub content: String,
    pub priority: FeedbackPriority,
    /// Rebuild decision: None while undecided, Some(true) approved,
    /// Some(false) dismissed. Meaningless for non-rebuild feedback.
    pub rebuild_approved: Option<bool>,
    pub rebuild_approved_by: Option<String>,
    /// Set once a rebuild has actually been handed to the pipeline.
    pub triggers_rebuild: bool,
    pub rebuild_requested_at: Option<DateTime<Utc>>,
    /// The app request a triggered rebuild spawned.
    pub spawned_request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(app_id: impl Into<String>, author: VoterIdentity, input: &NewFeedback) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app_id.into(),
            author,
            feedback_type: input.feedback_type,
            title: input.title.clone(),
            content: input.content.clone(),
            priority: input.priority,
            rebuild_approved: None,
            rebuild_approved_by: None,
            triggers_rebuild: false,
            rebuild_requested_at: None,
            spawned_request_id: None,
            created_at: Utc::now(),
        }
    }

    /// Undecided rebuild requests are what the triage queue shows.
    pub fn is_pending_rebuild(&self) -> bool {
        self.feedback_type == FeedbackType::RebuildRequest && self.rebuild_approved.is_none()
    }
}

/// Input for submitting feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFeedback {
    pub feedback_type: FeedbackType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub priority: FeedbackPriority,
}

impl NewFeedback {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CatalogError::Validation("title is required".to_string()));
        }
        if self.title.chars().count() > MAX_FEEDBACK_TITLE_LEN {
            return Err(CatalogError::Validation(format!(
                "title exceeds {} characters",
                MAX_FEEDBACK_TITLE_LEN
            )));
        }
        if self.content.trim().is_empty() {
            return Err(CatalogError::Validation("content is required".to_string()));
        }
        if self.content.chars().count() > MAX_FEEDBACK_CONTENT_LEN {
            return Err(CatalogError::Validation(format!(
                "content exceeds {} characters",
                MAX_FEEDBACK_CONTENT_LEN
            )));
        }
        Ok(())
    }
}
