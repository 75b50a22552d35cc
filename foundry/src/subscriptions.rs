//! App subscriptions and notifications.
//!
//! Users subscribe to apps they care about; the build pipeline and the
//! admin service fan notifications out to subscribers when something
//! happens to those apps.

use tracing::info;

use catalog::{
    Actor, App, AppStatus, AppSubscription, CatalogStore, Notification, NotificationKind, Result,
};

#[derive(Debug, Clone)]
pub struct SubscriptionService {
    store: CatalogStore,
}

impl SubscriptionService {
    pub fn new(store: CatalogStore) -> Self {
        Self { store }
    }

    pub async fn subscribe(&self, actor: &Actor, slug: &str) -> Result<AppSubscription> {
        let user = actor.require_user()?;
        let app = self.store.app_by_slug(slug).await?;
        let subscription = self.store.subscribe(&app.id, &user.id).await?;
        info!(user_id = %user.id, app_id = %app.id, slug = %slug, "subscribed to app");
        Ok(subscription)
    }

    pub async fn unsubscribe(&self, actor: &Actor, slug: &str) -> Result<()> {
        let user = actor.require_user()?;
        let app = self.store.app_by_slug(slug).await?;
        self.store.unsubscribe(&app.id, &user.id).await?;
        info!(user_id = %user.id, app_id = %app.id, slug = %slug, "unsubscribed from app");
        Ok(())
    }

    pub async fn is_subscribed(&self, actor: &Actor, slug: &str) -> Result<bool> {
        let user = actor.require_user()?;
        let app = self.store.app_by_slug(slug).await?;
        Ok(self
            .store
            .subscriptions_for_user(&user.id)
            .await
            .iter()
            .any(|s| s.app_id == app.id))
    }

    pub async fn my_subscriptions(&self, actor: &Actor) -> Result<Vec<AppSubscription>> {
        let user = actor.require_user()?;
        Ok(self.store.subscriptions_for_user(&user.id).await)
    }

    pub async fn notifications(
        &self,
        actor: &Actor,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let user = actor.require_user()?;
        Ok(self.store.notifications_for(&user.id, unread_only).await)
    }

    pub async fn unread_count(&self, actor: &Actor) -> Result<usize> {
        let user = actor.require_user()?;
        Ok(self.store.unread_count(&user.id).await)
    }

    pub async fn mark_read(&self, actor: &Actor, notification_id: &str) -> Result<Notification> {
        let user = actor.require_user()?;
        self.store
            .mark_notification_read(notification_id, &user.id)
            .await
    }

    pub async fn mark_all_read(&self, actor: &Actor) -> Result<usize> {
        let user = actor.require_user()?;
        Ok(self.store.mark_all_read(&user.id).await)
    }

    pub async fn remove_notification(
        &self,
        actor: &Actor,
        notification_id: &str,
    ) -> Result<Notification> {
        let user = actor.require_user()?;
        self.store.remove_notification(notification_id, &user.id).await
    }

    /// Tell subscribers of an app that a fresh build of it shipped.
    /// Returns how many were notified.
    pub async fn notify_new_build(&self, subscribed_app_id: &str, released: &App) -> Result<usize> {
        let subscribed = self.store.app(subscribed_app_id).await?;
        let subscribers = self.store.subscribers_of(subscribed_app_id).await;
        for user_id in &subscribers {
            let note = Notification::new(
                user_id,
                NotificationKind::NewBuild,
                format!("New build: {}", subscribed.name),
                format!(
                    "{} has been rebuilt with version {}. Check it out!",
                    subscribed.name, released.version
                ),
            )
            .with_app(&released.id);
            self.store.insert_notification(note).await;
        }
        Ok(subscribers.len())
    }

    /// Tell subscribers their app moved up the publication ladder.
    pub async fn notify_promotion(
        &self,
        app: &App,
        from: AppStatus,
        to: AppStatus,
    ) -> Result<usize> {
        let subscribers = self.store.subscribers_of(&app.id).await;
        for user_id in &subscribers {
            let note = Notification::new(
                user_id,
                NotificationKind::AppPromoted,
                format!("{} promoted!", app.name),
                format!(
                    "{} has been promoted from {} to {}.",
                    app.name,
                    display_status(from),
                    display_status(to)
                ),
            )
            .with_app(&app.id);
            self.store.insert_notification(note).await;
        }
        Ok(subscribers.len())
    }
}

fn display_status(status: AppStatus) -> &'static str {
    match status {
        AppStatus::Pending => "Pending",
        AppStatus::WildWest => "Wild West (Testing)",
        AppStatus::Stable => "Stable",
        AppStatus::Rejected => "rejected",
    }
}
