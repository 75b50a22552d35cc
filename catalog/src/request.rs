//! App build requests and their lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Hard cap on request titles.
pub const MAX_TITLE_LEN: usize = 200;
/// Hard cap on request prompts.
pub const MAX_PROMPT_LEN: usize = 10_000;

/// Lifecycle states for an app request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted, editable, awaiting review.
    Pending,
    /// Cleared for building; a build job is queued or about to be.
    Approved,
    /// A build is in flight.
    Building,
    /// Built and published.
    Completed,
    /// Declined by a reviewer.
    Rejected,
    /// The build failed or was cancelled.
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Building => "building",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Failed => "failed",
        }
    }

    /// Legal moves in the request lifecycle.
    ///
    /// `Approved -> Failed` covers builds that never start (scheduling
    /// faults, cancellation while still queued).
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Approved, RequestStatus::Building)
                | (RequestStatus::Approved, RequestStatus::Failed)
                | (RequestStatus::Building, RequestStatus::Completed)
                | (RequestStatus::Building, RequestStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Rejected | RequestStatus::Failed
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's request for the pipeline to build an app from a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRequest {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub category: Option<String>,
    /// Immutable for the life of the request.
    pub requester_id: String,
    pub status: RequestStatus,
    pub upvotes: u32,
    /// True once the classifier has produced a verdict for the current prompt.
    pub safety_checked: bool,
    /// None until checked; Some(false) permanently blocks approval.
    pub safety_passed: Option<bool>,
    pub safety_notes: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub build_started_at: Option<DateTime<Utc>>,
    pub build_completed_at: Option<DateTime<Utc>>,
    /// Full transcript of the most recent build attempt.
    pub build_log: Option<String>,
    /// Set exactly once, when a build publishes an app.
    pub resulting_app_id: Option<String>,
    /// For rebuild-driven requests: the app this is a fresh build of.
    /// Drives version bumping and subscriber notification.
    pub rebuild_of: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppRequest {
    pub fn new(
        requester_id: impl Into<String>,
        title: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            prompt: prompt.into(),
            category: None,
            requester_id: requester_id.into(),
            status: RequestStatus::Pending,
            upvotes: 0,
            safety_checked: false,
            safety_passed: None,
            safety_notes: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            build_started_at: None,
            build_completed_at: None,
            build_log: None,
            resulting_app_id: None,
            rebuild_of: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_rebuild_of(mut self, app_id: impl Into<String>) -> Self {
        self.rebuild_of = Some(app_id.into());
        self
    }

    /// Records a classifier verdict for the current prompt. `passed`
    /// is `None` when the verdict needs a human decision at approval
    /// time.
    pub fn stamp_safety(&mut self, passed: Option<bool>, notes: impl Into<String>) {
        self.safety_checked = true;
        self.safety_passed = passed;
        self.safety_notes = Some(notes.into());
        self.updated_at = Utc::now();
    }
}

/// Input for submitting a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppRequest {
    pub title: String,
    pub prompt: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl NewAppRequest {
    /// Field-level validation. Category membership is checked by the
    /// service against the configured list.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CatalogError::Validation("title is required".to_string()));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(CatalogError::Validation(format!(
                "title exceeds {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.prompt.trim().is_empty() {
            return Err(CatalogError::Validation("prompt is required".to_string()));
        }
        if self.prompt.chars().count() > MAX_PROMPT_LEN {
            return Err(CatalogError::Validation(format!(
                "prompt exceeds {} characters",
                MAX_PROMPT_LEN
            )));
        }
        Ok(())
    }
}

/// Partial update for a pending request. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPatch {
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub category: Option<String>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.prompt.is_none() && self.category.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(CatalogError::Validation("title cannot be empty".to_string()));
            }
            if title.chars().count() > MAX_TITLE_LEN {
                return Err(CatalogError::Validation(format!(
                    "title exceeds {} characters",
                    MAX_TITLE_LEN
                )));
            }
        }
        if let Some(prompt) = &self.prompt {
            if prompt.trim().is_empty() {
                return Err(CatalogError::Validation(
                    "prompt cannot be empty".to_string(),
                ));
            }
            if prompt.chars().count() > MAX_PROMPT_LEN {
                return Err(CatalogError::Validation(format!(
                    "prompt exceeds {} characters",
                    MAX_PROMPT_LEN
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_lattice() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Approved));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Rejected));
        assert!(RequestStatus::Approved.can_transition_to(RequestStatus::Building));
        assert!(RequestStatus::Approved.can_transition_to(RequestStatus::Failed));
        assert!(RequestStatus::Building.can_transition_to(RequestStatus::Completed));
        assert!(RequestStatus::Building.can_transition_to(RequestStatus::Failed));

        assert!(!RequestStatus::Completed.can_transition_to(RequestStatus::Building));
        assert!(!RequestStatus::Rejected.can_transition_to(RequestStatus::Approved));
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Building));
        assert!(!RequestStatus::Failed.can_transition_to(RequestStatus::Pending));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(!RequestStatus::Building.is_terminal());
    }

    #[test]
    fn test_new_request_validation() {
        let ok = NewAppRequest {
            title: "Weather Widget".to_string(),
            prompt: "A desktop widget showing the local forecast".to_string(),
            category: None,
        };
        assert!(ok.validate().is_ok());

        let empty_title = NewAppRequest {
            title: "   ".to_string(),
            prompt: "something".to_string(),
            category: None,
        };
        assert!(matches!(
            empty_title.validate(),
            Err(CatalogError::Validation(_))
        ));

        let long_prompt = NewAppRequest {
            title: "ok".to_string(),
            prompt: "x".repeat(MAX_PROMPT_LEN + 1),
            category: None,
        };
        assert!(matches!(
            long_prompt.validate(),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_safety_stamp() {
        let mut request = AppRequest::new("user-1", "Title", "Prompt");
        assert!(!request.safety_checked);
        request.stamp_safety(Some(true), "passed all safety checks");
        assert!(request.safety_checked);
        assert_eq!(request.safety_passed, Some(true));

        request.stamp_safety(None, "matches suspicious pattern: admin.*access");
        assert!(request.safety_checked);
        assert_eq!(request.safety_passed, None);
    }
}
