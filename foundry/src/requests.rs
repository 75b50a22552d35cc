//! App request lifecycle: submission, screening, approval, votes.
//!
//! Every prompt is screened synchronously on the way in, so a request
//! never sits in the queue without a verdict. Approval re-reads the
//! stored verdict and hands the request to the build orchestrator;
//! scheduling failures never roll an approval back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use catalog::{
    Actor, AppRequest, CatalogError, CatalogStore, NewAppRequest, RequestPatch, RequestStatus,
    Result, UserTier, VoterIdentity,
};
use foundry_agent::{SafetyClassifier, SafetyLevel, Verdict};

use crate::build::BuildOrchestrator;
use crate::config::FoundryConfig;

/// What pollers see of a request while its build runs.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    pub id: String,
    pub status: RequestStatus,
    pub safety_checked: bool,
    pub safety_passed: Option<bool>,
    pub safety_notes: Option<String>,
    pub build_started_at: Option<DateTime<Utc>>,
    pub build_completed_at: Option<DateTime<Utc>>,
    pub resulting_app_id: Option<String>,
}

#[derive(Clone)]
pub struct RequestService {
    store: CatalogStore,
    classifier: Arc<SafetyClassifier>,
    orchestrator: Arc<BuildOrchestrator>,
    config: FoundryConfig,
}

impl RequestService {
    pub fn new(
        config: FoundryConfig,
        store: CatalogStore,
        classifier: Arc<SafetyClassifier>,
        orchestrator: Arc<BuildOrchestrator>,
    ) -> Self {
        Self {
            store,
            classifier,
            orchestrator,
            config,
        }
    }

    /// Submit a new app request. Any account can submit; the prompt is
    /// screened before the request is stored.
    pub async fn submit(&self, actor: &Actor, new_request: NewAppRequest) -> Result<AppRequest> {
        let user = actor.require_user()?;
        new_request.validate()?;
        if let Some(category) = &new_request.category {
            if !self.config.is_valid_category(category) {
                return Err(CatalogError::Validation(format!(
                    "invalid category: {}",
                    category
                )));
            }
        }

        let mut request = AppRequest::new(
            &user.id,
            new_request.title.trim(),
            new_request.prompt.trim(),
        );
        if let Some(category) = new_request.category {
            request = request.with_category(category);
        }

        let verdict = self
            .classifier
            .classify_prompt(&request.title, &request.prompt)
            .await;
        if verdict.level == SafetyLevel::Unsafe {
            warn!(
                request_id = %request.id,
                notes = %verdict.notes(),
                "request failed safety screening"
            );
        }
        request.stamp_safety(verdict_gate(&verdict), verdict.notes());

        let request = self.store.insert_request(request).await?;
        info!(
            request_id = %request.id,
            requester = %user.id,
            title = %request.title,
            "request submitted"
        );
        Ok(request)
    }

    /// Edit a pending request. Only the requester (or an admin) may
    /// edit, and a prompt change re-runs the safety screening.
    pub async fn update(
        &self,
        actor: &Actor,
        request_id: &str,
        patch: RequestPatch,
    ) -> Result<AppRequest> {
        let user = actor.require_user()?;
        patch.validate()?;

        let request = self.store.request(request_id).await?;
        if request.requester_id != user.id && user.tier != UserTier::Admin {
            return Err(CatalogError::PermissionDenied(
                "only the requester can modify this request".to_string(),
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(CatalogError::Conflict(
                "cannot modify request after approval process started".to_string(),
            ));
        }
        if let Some(category) = &patch.category {
            if !self.config.is_valid_category(category) {
                return Err(CatalogError::Validation(format!(
                    "invalid category: {}",
                    category
                )));
            }
        }

        // A changed prompt invalidates the stored verdict, so screen
        // the effective title and prompt before applying the patch.
        let reverdict = match &patch.prompt {
            Some(prompt) => {
                let title = patch.title.as_deref().unwrap_or(&request.title);
                Some(self.classifier.classify_prompt(title, prompt).await)
            }
            None => None,
        };

        let patched = self
            .store
            .update_request(request_id, |r| {
                if let Some(title) = &patch.title {
                    r.title = title.trim().to_string();
                }
                if let Some(prompt) = &patch.prompt {
                    r.prompt = prompt.trim().to_string();
                }
                if let Some(category) = &patch.category {
                    r.category = Some(category.clone());
                }
                if let Some(verdict) = &reverdict {
                    r.stamp_safety(verdict_gate(verdict), verdict.notes());
                }
            })
            .await?;
        info!(request_id = %request_id, editor = %user.id, "request updated");
        Ok(patched)
    }

    /// Delete a request that is pending or rejected.
    pub async fn delete(&self, actor: &Actor, request_id: &str) -> Result<AppRequest> {
        let user = actor.require_user()?;
        let request = self.store.request(request_id).await?;
        if request.requester_id != user.id && user.tier != UserTier::Admin {
            return Err(CatalogError::PermissionDenied(
                "only the requester can delete this request".to_string(),
            ));
        }
        let removed = self
            .store
            .remove_request(
                request_id,
                &[RequestStatus::Pending, RequestStatus::Rejected],
            )
            .await?;
        info!(request_id = %request_id, "request deleted");
        Ok(removed)
    }

    /// Approve a pending request for building. Requires the promoted
    /// tier, a recorded safety verdict, and that the verdict did not
    /// fail. The build is queued after the approval lands.
    pub async fn approve(&self, actor: &Actor, request_id: &str) -> Result<AppRequest> {
        let approver = actor.require_tier(UserTier::Promoted)?;
        let request = self.store.request(request_id).await?;

        if request.status != RequestStatus::Pending {
            return Err(CatalogError::PreconditionFailed(
                "request is not pending approval".to_string(),
            ));
        }
        if !request.safety_checked {
            return Err(CatalogError::PreconditionFailed(
                "request has not been safety checked yet".to_string(),
            ));
        }
        if request.safety_passed == Some(false) {
            return Err(CatalogError::PreconditionFailed(
                "request failed safety check".to_string(),
            ));
        }

        let approver_id = approver.id.clone();
        let approved = self
            .store
            .transition_request(
                request_id,
                RequestStatus::Pending,
                RequestStatus::Approved,
                |r| {
                    r.approved_by = Some(approver_id);
                    r.approved_at = Some(Utc::now());
                },
            )
            .await?;
        info!(request_id = %request_id, approver = %approver.id, "request approved");

        // The approval is already durable; a scheduling hiccup leaves
        // the request approved for a later retry.
        match self.orchestrator.submit(&approved).await {
            Ok(job) => self.orchestrator.spawn(job.id.clone()),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "approved but could not queue build")
            }
        }

        Ok(approved)
    }

    /// Reject a pending request with a reason.
    pub async fn reject(&self, actor: &Actor, request_id: &str, reason: &str) -> Result<AppRequest> {
        let reviewer = actor.require_tier(UserTier::Promoted)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CatalogError::Validation(
                "rejection reason is required".to_string(),
            ));
        }

        let request = self.store.request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(CatalogError::PreconditionFailed(
                "request is not pending".to_string(),
            ));
        }

        let reviewer_id = reviewer.id.clone();
        let reason = reason.to_string();
        let rejected = self
            .store
            .transition_request(
                request_id,
                RequestStatus::Pending,
                RequestStatus::Rejected,
                |r| {
                    r.rejection_reason = Some(reason);
                    r.approved_by = Some(reviewer_id);
                    r.approved_at = Some(Utc::now());
                },
            )
            .await?;
        info!(request_id = %request_id, reviewer = %reviewer.id, "request rejected");
        Ok(rejected)
    }

    pub async fn upvote(&self, actor: &Actor, request_id: &str) -> Result<u32> {
        let user = actor.require_user()?;
        self.store
            .add_request_vote(request_id, &VoterIdentity::user(&user.id))
            .await
    }

    pub async fn remove_upvote(&self, actor: &Actor, request_id: &str) -> Result<u32> {
        let user = actor.require_user()?;
        self.store
            .remove_request_vote(request_id, &VoterIdentity::user(&user.id))
            .await
    }

    pub async fn request(&self, request_id: &str) -> Result<AppRequest> {
        self.store.request(request_id).await
    }

    /// Compact progress view, the shape clients poll while a build runs.
    pub async fn status_of(&self, request_id: &str) -> Result<RequestStatusView> {
        let request = self.store.request(request_id).await?;
        Ok(RequestStatusView {
            id: request.id,
            status: request.status,
            safety_checked: request.safety_checked,
            safety_passed: request.safety_passed,
            safety_notes: request.safety_notes,
            build_started_at: request.build_started_at,
            build_completed_at: request.build_completed_at,
            resulting_app_id: request.resulting_app_id,
        })
    }

    /// Public listing. Without a status filter, rejected and failed
    /// requests stay hidden.
    pub async fn list(
        &self,
        status: Option<RequestStatus>,
        sort_by_votes: bool,
    ) -> Vec<AppRequest> {
        let mut requests = match status {
            Some(status) => self.store.list_requests(Some(status)).await,
            None => self
                .store
                .list_requests(None)
                .await
                .into_iter()
                .filter(|r| {
                    !matches!(r.status, RequestStatus::Rejected | RequestStatus::Failed)
                })
                .collect(),
        };
        if sort_by_votes {
            requests.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
        }
        requests
    }

    /// Requests ready for a promoted user's decision: pending, screened,
    /// and passed outright. Ordered by community votes.
    pub async fn pending_approval(&self, actor: &Actor) -> Result<Vec<AppRequest>> {
        actor.require_tier(UserTier::Promoted)?;
        let mut pending: Vec<AppRequest> = self
            .store
            .list_requests(Some(RequestStatus::Pending))
            .await
            .into_iter()
            .filter(|r| r.safety_checked && r.safety_passed == Some(true))
            .collect();
        pending.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
        Ok(pending)
    }

    pub async fn my_requests(&self, actor: &Actor) -> Result<Vec<AppRequest>> {
        let user = actor.require_user()?;
        Ok(self.store.requests_by_requester(&user.id).await)
    }

    /// Build log for a request, readable by the requester and by
    /// reviewers. Falls through to the live job transcript while a
    /// build is still running.
    pub async fn build_log_of(&self, actor: &Actor, request_id: &str) -> Result<String> {
        let request = self.store.request(request_id).await?;
        let user = actor.require_user()?;
        if user.id != request.requester_id {
            actor.require_tier(UserTier::Promoted)?;
        }
        if let Some(log) = request.build_log {
            return Ok(log);
        }
        if let Some(job) = self.orchestrator.job_for_request(request_id).await {
            if !job.log.is_empty() {
                return Ok(job.transcript());
            }
        }
        Ok("No build log available yet.".to_string())
    }
}

/// Map a verdict onto the approval gate: a hard fail blocks approval,
/// a review verdict leaves the decision to the human approver.
fn verdict_gate(verdict: &Verdict) -> Option<bool> {
    match verdict.level {
        SafetyLevel::Safe => Some(true),
        SafetyLevel::NeedsReview => None,
        SafetyLevel::Unsafe => Some(false),
    }
}
