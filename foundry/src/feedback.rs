//! Feedback on listed apps and the rebuild loop it can trigger.
//!
//! Rebuild-type feedback from a promoted account goes straight to the
//! build pipeline; from anyone else it lands in a triage queue for a
//! promoted user to approve or dismiss. A triggered rebuild is an
//! ordinary app request, pre-approved and back-linked to the app it
//! rebuilds.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use catalog::{
    Actor, App, AppRequest, CatalogError, CatalogStore, Feedback, FeedbackType, NewFeedback,
    RequestStatus, Result, User, UserTier, VoterIdentity,
};
use crate::build::BuildOrchestrator;

#[derive(Clone)]
pub struct FeedbackService {
    store: CatalogStore,
    orchestrator: Arc<BuildOrchestrator>,
}

/// Per-app feedback counts.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackStats {
    pub total: usize,
    pub bugs: usize,
    pub suggestions: usize,
    pub rebuild_requests: usize,
    pub pending_rebuilds: usize,
}

impl FeedbackService {
    pub fn new(store: CatalogStore, orchestrator: Arc<BuildOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    /// Submit feedback for a listed app. Bug reports and suggestions are
    /// open to anonymous visitors; rebuild requests need an account.
    pub async fn submit(&self, actor: &Actor, slug: &str, input: NewFeedback) -> Result<Feedback> {
        let app = self.store.app_by_slug(slug).await?;
        if !app.status.is_listed() {
            return Err(CatalogError::PreconditionFailed(
                "app is not available for feedback".to_string(),
            ));
        }
        input.validate()?;

        if input.feedback_type == FeedbackType::RebuildRequest && actor.user().is_none() {
            return Err(CatalogError::PermissionDenied(
                "authentication required for rebuild requests".to_string(),
            ));
        }

        let mut feedback = Feedback::new(&app.id, actor.identity(), &input);

        // A promoted account's rebuild request skips the triage queue.
        if input.feedback_type == FeedbackType::RebuildRequest {
            if let Ok(promoted) = actor.require_tier(UserTier::Promoted) {
                match self.spawn_rebuild(&app, &feedback, promoted).await {
                    Ok(request) => {
                        feedback.rebuild_approved = Some(true);
                        feedback.rebuild_approved_by = Some(promoted.id.clone());
                        feedback.triggers_rebuild = true;
                        feedback.rebuild_requested_at = Some(Utc::now());
                        feedback.spawned_request_id = Some(request.id);
                    }
                    Err(e) => {
                        warn!(
                            app = %app.slug,
                            feedback_id = %feedback.id,
                            error = %e,
                            "rebuild not auto-triggered, left for triage"
                        );
                    }
                }
            }
        }

        let feedback = self.store.insert_feedback(feedback).await?;
        info!(
            app = %app.slug,
            feedback_id = %feedback.id,
            kind = feedback.feedback_type.as_str(),
            "feedback submitted"
        );
        Ok(feedback)
    }

    /// Approve a queued rebuild request and hand it to the pipeline.
    pub async fn approve_rebuild(&self, actor: &Actor, feedback_id: &str) -> Result<Feedback> {
        let approver = actor.require_tier(UserTier::Promoted)?;
        let feedback = self.store.feedback(feedback_id).await?;

        if feedback.feedback_type != FeedbackType::RebuildRequest {
            return Err(CatalogError::PreconditionFailed(
                "feedback is not a rebuild request".to_string(),
            ));
        }
        if feedback.rebuild_approved == Some(true) {
            return Err(CatalogError::Conflict(
                "rebuild already approved".to_string(),
            ));
        }

        let app = self.store.app(&feedback.app_id).await?;
        let request = self.spawn_rebuild(&app, &feedback, approver).await?;

        let approver_id = approver.id.clone();
        let request_id = request.id.clone();
        let updated = self
            .store
            .update_feedback(feedback_id, |f| {
                f.rebuild_approved = Some(true);
                f.rebuild_approved_by = Some(approver_id);
                f.triggers_rebuild = true;
                f.rebuild_requested_at = Some(Utc::now());
                f.spawned_request_id = Some(request_id);
            })
            .await?;
        info!(
            feedback_id = %feedback_id,
            approver = %approver.id,
            request_id = %request.id,
            "rebuild approved"
        );
        Ok(updated)
    }

    /// Dismiss a rebuild request. The dismissal is recorded, not final;
    /// a later approval can still revive it.
    pub async fn dismiss_rebuild(&self, actor: &Actor, feedback_id: &str) -> Result<Feedback> {
        let reviewer = actor.require_tier(UserTier::Promoted)?;
        let feedback = self.store.feedback(feedback_id).await?;
        if feedback.feedback_type != FeedbackType::RebuildRequest {
            return Err(CatalogError::PreconditionFailed(
                "feedback is not a rebuild request".to_string(),
            ));
        }

        let reviewer_id = reviewer.id.clone();
        let updated = self
            .store
            .update_feedback(feedback_id, |f| {
                f.rebuild_approved = Some(false);
                f.rebuild_approved_by = Some(reviewer_id);
                f.triggers_rebuild = false;
            })
            .await?;
        info!(feedback_id = %feedback_id, reviewer = %reviewer.id, "rebuild dismissed");
        Ok(updated)
    }

    /// Undecided rebuild requests, most urgent first.
    pub async fn rebuild_queue(&self, actor: &Actor) -> Result<Vec<Feedback>> {
        actor.require_tier(UserTier::Promoted)?;
        Ok(self.store.rebuild_queue().await)
    }

    pub async fn feedback(&self, feedback_id: &str) -> Result<Feedback> {
        self.store.feedback(feedback_id).await
    }

    pub async fn for_app(&self, slug: &str, kind: Option<FeedbackType>) -> Result<Vec<Feedback>> {
        let app = self.store.app_by_slug(slug).await?;
        Ok(self.store.feedback_for_app(&app.id, kind).await)
    }

    pub async fn my_feedback(&self, actor: &Actor) -> Vec<Feedback> {
        self.store.feedback_by_author(&actor.identity()).await
    }

    /// Delete feedback. Authors delete their own entries, anonymous
    /// authors by matching fingerprint; admins delete anything.
    pub async fn delete(&self, actor: &Actor, feedback_id: &str) -> Result<Feedback> {
        let feedback = self.store.feedback(feedback_id).await?;
        let is_admin = actor.tier() == UserTier::Admin;
        if feedback.author != actor.identity() && !is_admin {
            return Err(CatalogError::PermissionDenied(
                "only the author can delete this feedback".to_string(),
            ));
        }
        let removed = self.store.remove_feedback(feedback_id).await?;
        info!(feedback_id = %feedback_id, "feedback deleted");
        Ok(removed)
    }

    pub async fn stats(&self, slug: &str) -> Result<FeedbackStats> {
        let app = self.store.app_by_slug(slug).await?;
        let entries = self.store.feedback_for_app(&app.id, None).await;
        let count = |kind: FeedbackType| entries.iter().filter(|f| f.feedback_type == kind).count();
        Ok(FeedbackStats {
            total: entries.len(),
            bugs: count(FeedbackType::Bug),
            suggestions: count(FeedbackType::Suggestion),
            rebuild_requests: count(FeedbackType::RebuildRequest),
            pending_rebuilds: entries.iter().filter(|f| f.is_pending_rebuild()).count(),
        })
    }

    /// Compose and queue the rebuild request for a piece of feedback.
    ///
    /// The prompt is the app's original build prompt with the feedback
    /// appended. This is the trusted path: a promoted reviewer is
    /// vouching for the rebuild right here, so the prompt classifier is
    /// not consulted — the app already passed screening once, and
    /// feedback about it routinely names the symptoms the word lists
    /// would trip over.
    async fn spawn_rebuild(
        &self,
        app: &App,
        feedback: &Feedback,
        approver: &User,
    ) -> Result<AppRequest> {
        let requester_id = match &feedback.author {
            VoterIdentity::User(id) => id.clone(),
            VoterIdentity::Anonymous(_) => approver.id.clone(),
        };
        let base_prompt = match &app.source_request_id {
            Some(request_id) => match self.store.request(request_id).await {
                Ok(original) => original.prompt,
                Err(_) => app.description.clone(),
            },
            None => app.description.clone(),
        };
        let title = format!("Rebuild: {}", app.name);
        let prompt = format!(
            "{}\n\nRebuild this app incorporating the following feedback:\n{}: {}",
            base_prompt, feedback.title, feedback.content
        );

        let mut request = AppRequest::new(requester_id, title, prompt)
            .with_category(app.category.clone())
            .with_rebuild_of(&app.id);
        request.stamp_safety(
            Some(true),
            format!("rebuild approved by {}", approver.username),
        );
        request.status = RequestStatus::Approved;
        request.approved_by = Some(approver.id.clone());
        request.approved_at = Some(Utc::now());

        let request = self.store.insert_request(request).await?;
        info!(
            request_id = %request.id,
            app = %app.slug,
            feedback_id = %feedback.id,
            "rebuild queued from feedback"
        );
        match self.orchestrator.submit(&request).await {
            Ok(job) => self.orchestrator.spawn(job.id.clone()),
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "rebuild approved but could not queue build")
            }
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::MemoryJobStore;
    use crate::config::FoundryConfig;
    use catalog::{AppStatus, FeedbackPriority};
    use foundry_agent::{MockBuilder, SafetyClassifier};
    use tempfile::TempDir;

    struct Fixture {
        service: FeedbackService,
        store: CatalogStore,
        orchestrator: Arc<BuildOrchestrator>,
        casey: Actor,
        parker: Actor,
        avery: Actor,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new();
        let mut config = FoundryConfig::default();
        config.packages.dir = dir.path().to_path_buf();

        let orchestrator = Arc::new(BuildOrchestrator::new(
            &config,
            store.clone(),
            Arc::new(MemoryJobStore::new()),
            Arc::new(MockBuilder::new()),
            Arc::new(SafetyClassifier::new()),
        ));
        let service = FeedbackService::new(store.clone(), orchestrator.clone());

        let casey = Actor::User(
            store
                .insert_user(User::new("casey", UserTier::Limited))
                .await
                .unwrap(),
        );
        let parker = Actor::User(
            store
                .insert_user(User::new("parker", UserTier::Promoted))
                .await
                .unwrap(),
        );
        let avery = Actor::User(
            store
                .insert_user(User::new("avery", UserTier::Admin))
                .await
                .unwrap(),
        );

        Fixture {
            service,
            store,
            orchestrator,
            casey,
            parker,
            avery,
            _dir: dir,
        }
    }

    /// A listed app with the request it was built from, so rebuilds can
    /// recover the original prompt.
    async fn published_app(f: &Fixture, requester: &Actor) -> (AppRequest, App) {
        let requester_id = requester.user().unwrap().id.clone();
        let mut request = AppRequest::new(&requester_id, "Weather Widget", "Show the local forecast");
        request.status = RequestStatus::Completed;
        let request = f.store.insert_request(request).await.unwrap();

        let app = App::new("Weather Widget", "utilities")
            .with_description("Shows the local forecast")
            .with_author(&requester_id)
            .with_status(AppStatus::WildWest)
            .from_build(&request.id);
        let app = f.store.insert_app_with_slug(app, "weather-widget").await;
        (request, app)
    }

    fn bug(title: &str, content: &str) -> NewFeedback {
        NewFeedback {
            feedback_type: FeedbackType::Bug,
            title: title.to_string(),
            content: content.to_string(),
            priority: FeedbackPriority::Low,
        }
    }

    fn rebuild(title: &str, content: &str) -> NewFeedback {
        NewFeedback {
            feedback_type: FeedbackType::RebuildRequest,
            title: title.to_string(),
            content: content.to_string(),
            priority: FeedbackPriority::Medium,
        }
    }

    #[tokio::test]
    async fn test_feedback_is_limited_to_listed_apps() {
        let f = fixture().await;
        let hidden = f
            .store
            .insert_app_with_slug(App::new("Drafts", "utilities"), "drafts")
            .await;
        assert_eq!(hidden.status, AppStatus::Pending);

        let err = f
            .service
            .submit(&f.casey, "drafts", bug("Broken", "Does not open"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PreconditionFailed(_)));

        let (_, _app) = published_app(&f, &f.casey).await;
        let anon = Actor::anonymous("10.0.0.9", "curl/8");
        let feedback = f
            .service
            .submit(&anon, "weather-widget", bug("Broken", "Does not open"))
            .await
            .unwrap();
        assert!(feedback.author.is_anonymous());
    }

    #[tokio::test]
    async fn test_rebuild_feedback_requires_an_account() {
        let f = fixture().await;
        published_app(&f, &f.casey).await;

        let anon = Actor::anonymous("10.0.0.9", "curl/8");
        let err = f
            .service
            .submit(&anon, "weather-widget", rebuild("Redo", "Use metric units"))
            .await
            .unwrap_err();
        match err {
            CatalogError::PermissionDenied(msg) => {
                assert!(msg.contains("authentication required"))
            }
            other => panic!("expected permission denied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_promoted_rebuild_feedback_triggers_immediately() {
        let f = fixture().await;
        let (original_request, app) = published_app(&f, &f.casey).await;

        let feedback = f
            .service
            .submit(
                &f.parker,
                "weather-widget",
                rebuild("Settings crash", "The settings page crashes on open"),
            )
            .await
            .unwrap();

        assert_eq!(feedback.rebuild_approved, Some(true));
        assert!(feedback.triggers_rebuild);
        assert_eq!(
            feedback.rebuild_approved_by.as_deref(),
            f.parker.user().map(|u| u.id.as_str())
        );

        let spawned_id = feedback.spawned_request_id.unwrap();
        let spawned = f.store.request(&spawned_id).await.unwrap();
        assert_eq!(spawned.title, "Rebuild: Weather Widget");
        assert_eq!(spawned.rebuild_of.as_deref(), Some(app.id.as_str()));
        assert!(spawned.prompt.contains(&original_request.prompt));
        assert!(spawned.prompt.contains("The settings page crashes on open"));
        assert!(matches!(
            spawned.status,
            RequestStatus::Approved | RequestStatus::Building | RequestStatus::Completed
        ));
        assert!(f.orchestrator.job_for_request(&spawned_id).await.is_some());
    }

    #[tokio::test]
    async fn test_limited_rebuild_feedback_waits_for_triage() {
        let f = fixture().await;
        let (_, app) = published_app(&f, &f.casey).await;

        let feedback = f
            .service
            .submit(
                &f.casey,
                "weather-widget",
                rebuild("Wrong units", "Temperatures show in Kelvin"),
            )
            .await
            .unwrap();
        assert_eq!(feedback.rebuild_approved, None);
        assert!(!feedback.triggers_rebuild);

        let queue = f.service.rebuild_queue(&f.parker).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, feedback.id);

        let approved = f
            .service
            .approve_rebuild(&f.parker, &feedback.id)
            .await
            .unwrap();
        assert_eq!(approved.rebuild_approved, Some(true));

        // The requester stays the feedback author; the approver is recorded
        // on the spawned request.
        let spawned = f
            .store
            .request(&approved.spawned_request_id.unwrap())
            .await
            .unwrap();
        assert_eq!(spawned.requester_id, f.casey.user().unwrap().id);
        assert_eq!(
            spawned.approved_by.as_deref(),
            f.parker.user().map(|u| u.id.as_str())
        );
        assert_eq!(spawned.rebuild_of.as_deref(), Some(app.id.as_str()));

        let err = f
            .service
            .approve_rebuild(&f.parker, &feedback.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));

        assert!(f.service.rebuild_queue(&f.parker).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dismissed_rebuild_can_be_revived() {
        let f = fixture().await;
        published_app(&f, &f.casey).await;

        let feedback = f
            .service
            .submit(
                &f.casey,
                "weather-widget",
                rebuild("Wrong units", "Temperatures show in Kelvin"),
            )
            .await
            .unwrap();

        let dismissed = f
            .service
            .dismiss_rebuild(&f.parker, &feedback.id)
            .await
            .unwrap();
        assert_eq!(dismissed.rebuild_approved, Some(false));
        assert!(f.service.rebuild_queue(&f.parker).await.unwrap().is_empty());

        let revived = f
            .service
            .approve_rebuild(&f.avery, &feedback.id)
            .await
            .unwrap();
        assert_eq!(revived.rebuild_approved, Some(true));
        assert!(revived.spawned_request_id.is_some());
    }

    #[tokio::test]
    async fn test_trusted_rebuild_is_not_rescreened() {
        let f = fixture().await;
        published_app(&f, &f.casey).await;

        // Feedback about a vetted app routinely names symptoms the word
        // lists would trip over ("antivirus" contains "virus"). The
        // promoted path vouches for the rebuild, so it still triggers.
        let feedback = f
            .service
            .submit(
                &f.parker,
                "weather-widget",
                rebuild(
                    "False positive",
                    "My antivirus flags the app on launch, please rebuild",
                ),
            )
            .await
            .unwrap();

        assert_eq!(feedback.rebuild_approved, Some(true));
        assert!(feedback.triggers_rebuild);

        let spawned_id = feedback.spawned_request_id.unwrap();
        let spawned = f.store.request(&spawned_id).await.unwrap();
        assert!(spawned.safety_checked);
        assert_eq!(spawned.safety_passed, Some(true));
        assert!(matches!(
            spawned.status,
            RequestStatus::Approved | RequestStatus::Building | RequestStatus::Completed
        ));
        assert!(f.orchestrator.job_for_request(&spawned_id).await.is_some());
    }

    #[tokio::test]
    async fn test_queue_orders_urgent_first() {
        let f = fixture().await;
        published_app(&f, &f.casey).await;

        let low = f
            .service
            .submit(
                &f.casey,
                "weather-widget",
                NewFeedback {
                    priority: FeedbackPriority::Low,
                    ..rebuild("Minor", "Rounded corners please")
                },
            )
            .await
            .unwrap();
        let high = f
            .service
            .submit(
                &f.casey,
                "weather-widget",
                NewFeedback {
                    priority: FeedbackPriority::High,
                    ..rebuild("Crash", "Crashes on startup")
                },
            )
            .await
            .unwrap();

        let queue = f.service.rebuild_queue(&f.parker).await.unwrap();
        let ids: Vec<&str> = queue.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec![high.id.as_str(), low.id.as_str()]);

        let err = f.service.rebuild_queue(&f.casey).await.unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_delete_is_author_or_admin_only() {
        let f = fixture().await;
        published_app(&f, &f.casey).await;

        let feedback = f
            .service
            .submit(&f.casey, "weather-widget", bug("Broken", "Does not open"))
            .await
            .unwrap();

        let err = f
            .service
            .delete(&f.parker, &feedback.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));

        f.service.delete(&f.avery, &feedback.id).await.unwrap();
        assert!(matches!(
            f.service.feedback(&feedback.id).await.unwrap_err(),
            CatalogError::NotFound(_)
        ));

        // Anonymous authors are matched by fingerprint.
        let anon = Actor::anonymous("10.0.0.9", "curl/8");
        let other = f
            .service
            .submit(&anon, "weather-widget", bug("Typo", "Label says Whether"))
            .await
            .unwrap();
        let stranger = Actor::anonymous("10.0.0.10", "curl/8");
        assert!(f.service.delete(&stranger, &other.id).await.is_err());
        f.service.delete(&anon, &other.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_count_by_type() {
        let f = fixture().await;
        published_app(&f, &f.casey).await;

        f.service
            .submit(&f.casey, "weather-widget", bug("Broken", "Does not open"))
            .await
            .unwrap();
        f.service
            .submit(
                &f.casey,
                "weather-widget",
                NewFeedback {
                    feedback_type: FeedbackType::Suggestion,
                    ..bug("Dark mode", "Please add a dark theme")
                },
            )
            .await
            .unwrap();
        f.service
            .submit(
                &f.casey,
                "weather-widget",
                rebuild("Wrong units", "Temperatures show in Kelvin"),
            )
            .await
            .unwrap();

        let stats = f.service.stats("weather-widget").await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.bugs, 1);
        assert_eq!(stats.suggestions, 1);
        assert_eq!(stats.rebuild_requests, 1);
        assert_eq!(stats.pending_rebuilds, 1);
    }
}
