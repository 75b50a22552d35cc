//! Administrative operations: tier management, the app publication
//! lattice, and the dashboard.
//!
//! Tier changes never apply to the acting admin's own account, and the
//! store refuses any change that would leave it without an active admin.

use tracing::{info, warn};

use catalog::{
    Actor, App, AppStatus, AppRequest, CatalogError, CatalogStore, RequestStatus, Result,
    StoreStats, User, UserTier,
};

use crate::subscriptions::SubscriptionService;

#[derive(Clone)]
pub struct AdminService {
    store: CatalogStore,
    subscriptions: SubscriptionService,
}

impl AdminService {
    pub fn new(store: CatalogStore, subscriptions: SubscriptionService) -> Self {
        Self {
            store,
            subscriptions,
        }
    }

    // ---- users ----

    /// Raise a user's tier. Admins cannot be lowered through this
    /// operation; that path goes through [`AdminService::demote`].
    pub async fn promote(&self, actor: &Actor, user_id: &str, target: UserTier) -> Result<User> {
        let admin = actor.require_tier(UserTier::Admin)?;
        if target == UserTier::Anonymous {
            return Err(CatalogError::Validation(
                "tier must be limited, promoted, or admin".to_string(),
            ));
        }
        let subject = self.store.user(user_id).await?;
        if subject.id == admin.id {
            return Err(CatalogError::PermissionDenied(
                "cannot modify your own tier".to_string(),
            ));
        }
        if subject.tier == UserTier::Admin && target < UserTier::Admin {
            return Err(CatalogError::PermissionDenied(
                "admins cannot be demoted through promotion".to_string(),
            ));
        }

        let updated = self.store.set_user_tier(user_id, target).await?;
        info!(
            user_id = %user_id,
            tier = target.as_str(),
            by = %admin.id,
            "user tier raised"
        );
        Ok(updated)
    }

    /// Lower a user's tier. Requires an explicit confirmation flag.
    pub async fn demote(
        &self,
        actor: &Actor,
        user_id: &str,
        target: UserTier,
        confirm: bool,
    ) -> Result<User> {
        let admin = actor.require_tier(UserTier::Admin)?;
        if !confirm {
            return Err(CatalogError::PreconditionFailed(
                "demotion requires confirmation".to_string(),
            ));
        }
        if !matches!(target, UserTier::Limited | UserTier::Promoted) {
            return Err(CatalogError::Validation(
                "tier must be limited or promoted".to_string(),
            ));
        }
        let subject = self.store.user(user_id).await?;
        if subject.id == admin.id {
            return Err(CatalogError::PermissionDenied(
                "cannot modify your own tier".to_string(),
            ));
        }

        let updated = self.store.set_user_tier(user_id, target).await?;
        info!(
            user_id = %user_id,
            tier = target.as_str(),
            by = %admin.id,
            "user tier lowered"
        );
        Ok(updated)
    }

    pub async fn deactivate(&self, actor: &Actor, user_id: &str) -> Result<User> {
        let admin = actor.require_tier(UserTier::Admin)?;
        if user_id == admin.id {
            return Err(CatalogError::PermissionDenied(
                "cannot deactivate your own account".to_string(),
            ));
        }
        let updated = self.store.set_user_active(user_id, false).await?;
        info!(user_id = %user_id, by = %admin.id, "user deactivated");
        Ok(updated)
    }

    pub async fn activate(&self, actor: &Actor, user_id: &str) -> Result<User> {
        let admin = actor.require_tier(UserTier::Admin)?;
        let updated = self.store.set_user_active(user_id, true).await?;
        info!(user_id = %user_id, by = %admin.id, "user activated");
        Ok(updated)
    }

    pub async fn users(&self, actor: &Actor) -> Result<Vec<User>> {
        actor.require_tier(UserTier::Admin)?;
        Ok(self.store.list_users().await)
    }

    // ---- app lattice ----

    /// Apps awaiting their first approval, oldest first.
    pub async fn pending_apps(&self, actor: &Actor) -> Result<Vec<App>> {
        actor.require_tier(UserTier::Promoted)?;
        let mut apps = self.store.list_apps(Some(AppStatus::Pending), None).await;
        apps.reverse();
        Ok(apps)
    }

    pub async fn approve_to_wild_west(&self, actor: &Actor, slug: &str) -> Result<App> {
        let reviewer = actor.require_tier(UserTier::Promoted)?;
        let app = self.store.app_by_slug(slug).await?;
        let app = self
            .store
            .transition_app(&app.id, AppStatus::Pending, AppStatus::WildWest, |_| {})
            .await?;
        info!(slug = %slug, by = %reviewer.id, "app approved to wild west");
        Ok(app)
    }

    /// Promote a tested app to stable, notifying its subscribers.
    pub async fn promote_to_stable(&self, actor: &Actor, slug: &str) -> Result<App> {
        let reviewer = actor.require_tier(UserTier::Promoted)?;
        let app = self.store.app_by_slug(slug).await?;
        let app = self
            .store
            .transition_app(&app.id, AppStatus::WildWest, AppStatus::Stable, |_| {})
            .await?;
        info!(slug = %slug, by = %reviewer.id, "app promoted to stable");

        if let Err(e) = self
            .subscriptions
            .notify_promotion(&app, AppStatus::WildWest, AppStatus::Stable)
            .await
        {
            warn!(slug = %slug, error = %e, "promotion notifications failed");
        }
        Ok(app)
    }

    pub async fn reject_app(&self, actor: &Actor, slug: &str, reason: &str) -> Result<App> {
        let reviewer = actor.require_tier(UserTier::Promoted)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CatalogError::Validation(
                "rejection reason is required".to_string(),
            ));
        }
        let app = self.store.app_by_slug(slug).await?;
        let notes = format!("Rejected: {}", reason);
        let app = self
            .store
            .transition_app(&app.id, AppStatus::WildWest, AppStatus::Rejected, |a| {
                a.safety_notes = Some(notes);
            })
            .await?;
        info!(slug = %slug, by = %reviewer.id, reason = %reason, "app rejected");
        Ok(app)
    }

    /// Pull a stable app back into testing. Admin only.
    pub async fn demote_to_wild_west(
        &self,
        actor: &Actor,
        slug: &str,
        reason: Option<&str>,
    ) -> Result<App> {
        let admin = actor.require_tier(UserTier::Admin)?;
        let app = self.store.app_by_slug(slug).await?;
        let notes = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| format!("Demoted to Wild West: {}", r));
        let app = self
            .store
            .transition_app(&app.id, AppStatus::Stable, AppStatus::WildWest, |a| {
                if let Some(notes) = notes {
                    a.safety_notes = Some(notes);
                }
            })
            .await?;
        info!(slug = %slug, by = %admin.id, "app demoted to wild west");
        Ok(app)
    }

    /// Delete an app outright, along with its reviews, feedback, and
    /// subscriptions. The package file is removed best-effort.
    pub async fn delete_app(&self, actor: &Actor, slug: &str) -> Result<App> {
        let admin = actor.require_tier(UserTier::Admin)?;
        let app = self.store.app_by_slug(slug).await?;
        let removed = self.store.remove_app(&app.id).await?;
        info!(slug = %slug, by = %admin.id, "app deleted");
        Ok(removed)
    }

    // ---- requests ----

    /// Every request regardless of status; the public listing hides
    /// rejected and failed ones.
    pub async fn all_requests(
        &self,
        actor: &Actor,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AppRequest>> {
        actor.require_tier(UserTier::Admin)?;
        Ok(self.store.list_requests(status).await)
    }

    /// Escape hatch for builds finished outside the pipeline: links the
    /// app to the request and completes the request.
    pub async fn force_complete(
        &self,
        actor: &Actor,
        request_id: &str,
        app_slug: &str,
    ) -> Result<AppRequest> {
        let admin = actor.require_tier(UserTier::Admin)?;
        let app = self.store.app_by_slug(app_slug).await?;
        let request = self.store.force_complete_request(request_id, &app.id).await?;
        self.store
            .update_app(&app.id, |a| {
                a.source_request_id = Some(request_id.to_string());
                a.ai_generated = true;
            })
            .await?;
        info!(
            request_id = %request_id,
            app_slug = %app_slug,
            by = %admin.id,
            "request force-completed"
        );
        Ok(request)
    }

    pub async fn stats(&self, actor: &Actor) -> Result<StoreStats> {
        actor.require_tier(UserTier::Admin)?;
        Ok(self.store.stats().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::NotificationKind;

    struct Fixture {
        service: AdminService,
        subscriptions: SubscriptionService,
        store: CatalogStore,
        casey: Actor,
        parker: Actor,
        avery: Actor,
        blake: Actor,
    }

    async fn fixture() -> Fixture {
        let store = CatalogStore::new();
        let subscriptions = SubscriptionService::new(store.clone());
        let service = AdminService::new(store.clone(), subscriptions.clone());

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
        let blake = Actor::User(
            store
                .insert_user(User::new("blake", UserTier::Admin))
                .await
                .unwrap(),
        );

        Fixture {
            service,
            subscriptions,
            store,
            casey,
            parker,
            avery,
            blake,
        }
    }

    fn id_of(actor: &Actor) -> String {
        actor.user().unwrap().id.clone()
    }

    #[tokio::test]
    async fn test_promote_raises_tiers_only() {
        let f = fixture().await;
        let casey_id = id_of(&f.casey);

        let updated = f
            .service
            .promote(&f.avery, &casey_id, UserTier::Promoted)
            .await
            .unwrap();
        assert_eq!(updated.tier, UserTier::Promoted);

        // Promoted users cannot promote.
        let err = f
            .service
            .promote(&f.parker, &casey_id, UserTier::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));

        // Nobody assigns the anonymous tier.
        let err = f
            .service
            .promote(&f.avery, &casey_id, UserTier::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        // Admins cannot touch their own tier.
        let avery_id = id_of(&f.avery);
        let err = f
            .service
            .promote(&f.avery, &avery_id, UserTier::Limited)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));

        // Lowering an admin through promote is refused.
        let blake_id = id_of(&f.blake);
        let err = f
            .service
            .promote(&f.avery, &blake_id, UserTier::Promoted)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_demote_requires_confirmation() {
        let f = fixture().await;
        let parker_id = id_of(&f.parker);

        let err = f
            .service
            .demote(&f.avery, &parker_id, UserTier::Limited, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PreconditionFailed(_)));

        let updated = f
            .service
            .demote(&f.avery, &parker_id, UserTier::Limited, true)
            .await
            .unwrap();
        assert_eq!(updated.tier, UserTier::Limited);

        // Demoting to admin makes no sense here.
        let err = f
            .service
            .demote(&f.avery, &parker_id, UserTier::Admin, true)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn test_store_keeps_one_active_admin() {
        let f = fixture().await;
        let avery_id = id_of(&f.avery);
        let blake_id = id_of(&f.blake);

        // With two admins, one can be demoted.
        f.service
            .demote(&f.avery, &blake_id, UserTier::Promoted, true)
            .await
            .unwrap();
        assert_eq!(f.store.active_admin_count().await, 1);

        // The storage-level guard refuses to lower or deactivate the
        // last one, whatever path tries it.
        let err = f
            .store
            .set_user_tier(&avery_id, UserTier::Limited)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PreconditionFailed(_)));
        let err = f.store.set_user_active(&avery_id, false).await.unwrap_err();
        assert!(matches!(err, CatalogError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_deactivate_and_reactivate() {
        let f = fixture().await;
        let casey_id = id_of(&f.casey);
        let avery_id = id_of(&f.avery);

        let updated = f.service.deactivate(&f.avery, &casey_id).await.unwrap();
        assert!(!updated.active);

        // A deactivated account fails tier checks everywhere.
        let deactivated = Actor::User(updated);
        let err = deactivated.require_user().unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));

        let err = f.service.deactivate(&f.avery, &avery_id).await.unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));

        let restored = f.service.activate(&f.avery, &casey_id).await.unwrap();
        assert!(restored.active);
    }

    #[tokio::test]
    async fn test_app_lattice_walk() {
        let f = fixture().await;
        let app = f
            .store
            .insert_app_with_slug(App::new("Weather Widget", "utilities"), "weather-widget")
            .await;
        assert_eq!(app.status, AppStatus::Pending);

        // Stable requires passing through Wild West.
        let err = f
            .service
            .promote_to_stable(&f.parker, "weather-widget")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));

        let app = f
            .service
            .approve_to_wild_west(&f.parker, "weather-widget")
            .await
            .unwrap();
        assert_eq!(app.status, AppStatus::WildWest);

        f.subscriptions
            .subscribe(&f.casey, "weather-widget")
            .await
            .unwrap();

        let app = f
            .service
            .promote_to_stable(&f.parker, "weather-widget")
            .await
            .unwrap();
        assert_eq!(app.status, AppStatus::Stable);

        let notes = f.subscriptions.notifications(&f.casey, false).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::AppPromoted);
        assert!(notes[0].message.contains("Stable"));

        // Pulling back to testing is admin-only.
        let err = f
            .service
            .demote_to_wild_west(&f.parker, "weather-widget", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));

        let app = f
            .service
            .demote_to_wild_west(&f.avery, "weather-widget", Some("regression reports"))
            .await
            .unwrap();
        assert_eq!(app.status, AppStatus::WildWest);
        assert_eq!(
            app.safety_notes.as_deref(),
            Some("Demoted to Wild West: regression reports")
        );

        let app = f
            .service
            .reject_app(&f.parker, "weather-widget", "unfixable data leak")
            .await
            .unwrap();
        assert_eq!(app.status, AppStatus::Rejected);
        assert_eq!(
            app.safety_notes.as_deref(),
            Some("Rejected: unfixable data leak")
        );
    }

    #[tokio::test]
    async fn test_reject_needs_a_reason() {
        let f = fixture().await;
        f.store
            .insert_app_with_slug(
                App::new("Weather Widget", "utilities").with_status(AppStatus::WildWest),
                "weather-widget",
            )
            .await;

        let err = f
            .service
            .reject_app(&f.parker, "weather-widget", "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn test_force_complete_links_both_ways() {
        let f = fixture().await;
        let casey_id = id_of(&f.casey);
        let request = f
            .store
            .insert_request(AppRequest::new(&casey_id, "Weather Widget", "Show the forecast"))
            .await
            .unwrap();
        let app = f
            .store
            .insert_app_with_slug(
                App::new("Weather Widget", "utilities").with_status(AppStatus::WildWest),
                "weather-widget",
            )
            .await;

        let err = f
            .service
            .force_complete(&f.parker, &request.id, "weather-widget")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));

        let completed = f
            .service
            .force_complete(&f.avery, &request.id, "weather-widget")
            .await
            .unwrap();
        assert_eq!(completed.status, RequestStatus::Completed);
        assert_eq!(completed.resulting_app_id.as_deref(), Some(app.id.as_str()));
        assert!(completed.build_completed_at.is_some());

        let linked = f.store.app(&app.id).await.unwrap();
        assert_eq!(linked.source_request_id.as_deref(), Some(request.id.as_str()));
        assert!(linked.ai_generated);

        // Completing twice is refused.
        let err = f
            .service
            .force_complete(&f.avery, &request.id, "weather-widget")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_stats_is_admin_only() {
        let f = fixture().await;
        let err = f.service.stats(&f.parker).await.unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied(_)));

        let stats = f.service.stats(&f.avery).await.unwrap();
        assert_eq!(stats.total_users, 4);
        assert_eq!(stats.users_by_tier.get("admin"), Some(&2));
    }
}
