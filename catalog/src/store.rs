//! In-memory catalog store.
//!
//! Every uniqueness and transition guarantee the services rely on lives
//! here: compare-and-swap status moves, atomic slug assignment, and
//! per-identity uniqueness for votes, reviews, and subscriptions. Mutating
//! methods hold the write lock for their whole check-then-mutate sequence,
//! so two racing callers observe exactly one winner and one typed error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::app::{App, AppStatus};
use crate::error::{CatalogError, Result};
use crate::feedback::{Feedback, FeedbackType};
use crate::identity::{User, UserTier, VoterIdentity};
use crate::notify::{AppSubscription, Notification};
use crate::request::{AppRequest, RequestStatus};
use crate::review::{Review, ReviewSummary};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    usernames: HashMap<String, String>,
    apps: HashMap<String, App>,
    slugs: HashMap<String, String>,
    requests: HashMap<String, AppRequest>,
    request_votes: HashSet<(String, VoterIdentity)>,
    reviews: HashMap<String, Review>,
    review_authors: HashSet<(String, VoterIdentity)>,
    review_votes: HashSet<(String, VoterIdentity)>,
    feedback: HashMap<String, Feedback>,
    subscriptions: HashMap<String, AppSubscription>,
    subscription_keys: HashSet<(String, String)>,
    notifications: HashMap<String, Notification>,
}

fn count_active_admins(tables: &Tables) -> usize {
    tables
        .users
        .values()
        .filter(|u| u.active && u.tier == UserTier::Admin)
        .count()
}

/// Counts for the admin dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_users: usize,
    pub active_users: usize,
    pub users_by_tier: HashMap<String, usize>,
    pub total_apps: usize,
    pub apps_by_status: HashMap<String, usize>,
    pub ai_generated_apps: usize,
    pub total_requests: usize,
    pub requests_by_status: HashMap<String, usize>,
    pub total_reviews: usize,
    pub total_feedback: usize,
    pub pending_rebuilds: usize,
}

/// Shared catalog state. Cloning is cheap and clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    tables: Arc<RwLock<Tables>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- users ----

    pub async fn insert_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Err(CatalogError::Conflict(format!(
                "user {} already exists",
                user.id
            )));
        }
        if tables.usernames.contains_key(&user.username) {
            return Err(CatalogError::Conflict(format!(
                "username {} is taken",
                user.username
            )));
        }
        tables
            .usernames
            .insert(user.username.clone(), user.id.clone());
        tables.users.insert(user.id.clone(), user.clone());
        debug!(user_id = %user.id, username = %user.username, "user inserted");
        Ok(user)
    }

    pub async fn user(&self, id: &str) -> Result<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("user {} not found", id)))
    }

    pub async fn user_by_username(&self, username: &str) -> Result<User> {
        let tables = self.tables.read().await;
        tables
            .usernames
            .get(username)
            .and_then(|id| tables.users.get(id))
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("user {} not found", username)))
    }

    pub async fn update_user<F>(&self, id: &str, mutate: F) -> Result<User>
    where
        F: FnOnce(&mut User),
    {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("user {} not found", id)))?;
        mutate(user);
        Ok(user.clone())
    }

    pub async fn list_users(&self) -> Vec<User> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        users
    }

    /// Sets a user's tier. Checked under the write lock so concurrent
    /// demotions cannot leave the store without an active admin.
    pub async fn set_user_tier(&self, id: &str, tier: UserTier) -> Result<User> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let lowering_admin = tables
            .users
            .get(id)
            .map(|u| u.active && u.tier == UserTier::Admin && tier < UserTier::Admin)
            .ok_or_else(|| CatalogError::NotFound(format!("user {} not found", id)))?;
        if lowering_admin && count_active_admins(tables) <= 1 {
            return Err(CatalogError::PreconditionFailed(
                "cannot demote the last active admin".to_string(),
            ));
        }
        let user = tables
            .users
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("user {} not found", id)))?;
        user.tier = tier;
        Ok(user.clone())
    }

    /// Flips a user's active flag, refusing to deactivate the last
    /// active admin.
    pub async fn set_user_active(&self, id: &str, active: bool) -> Result<User> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let deactivating_admin = tables
            .users
            .get(id)
            .map(|u| !active && u.active && u.tier == UserTier::Admin)
            .ok_or_else(|| CatalogError::NotFound(format!("user {} not found", id)))?;
        if deactivating_admin && count_active_admins(tables) <= 1 {
            return Err(CatalogError::PreconditionFailed(
                "cannot deactivate the last active admin".to_string(),
            ));
        }
        let user = tables
            .users
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("user {} not found", id)))?;
        user.active = active;
        Ok(user.clone())
    }

    /// Active admin accounts; used to keep the last admin standing.
    pub async fn active_admin_count(&self) -> usize {
        let tables = self.tables.read().await;
        count_active_admins(&tables)
    }

    // ---- apps ----

    /// Inserts an app with a slug already chosen by the caller.
    pub async fn insert_app(&self, app: App) -> Result<App> {
        let mut tables = self.tables.write().await;
        if app.slug.is_empty() {
            return Err(CatalogError::Validation("app slug is required".to_string()));
        }
        if tables.slugs.contains_key(&app.slug) {
            return Err(CatalogError::Conflict(format!(
                "slug {} is taken",
                app.slug
            )));
        }
        tables.slugs.insert(app.slug.clone(), app.id.clone());
        tables.apps.insert(app.id.clone(), app.clone());
        Ok(app)
    }

    /// Inserts an app, assigning the first free slug derived from
    /// `base_slug` (`base`, `base-1`, `base-2`, ...). Probe and insert
    /// happen under one write lock, so concurrent publications of the same
    /// name cannot collide.
    pub async fn insert_app_with_slug(&self, mut app: App, base_slug: &str) -> App {
        let mut tables = self.tables.write().await;
        let base = if base_slug.is_empty() { "app" } else { base_slug };
        let mut slug = base.to_string();
        let mut suffix = 1u32;
        while tables.slugs.contains_key(&slug) {
            slug = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        app.slug = slug;
        tables.slugs.insert(app.slug.clone(), app.id.clone());
        tables.apps.insert(app.id.clone(), app.clone());
        debug!(app_id = %app.id, slug = %app.slug, "app inserted");
        app
    }

    pub async fn app(&self, id: &str) -> Result<App> {
        let tables = self.tables.read().await;
        tables
            .apps
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("app {} not found", id)))
    }

    pub async fn app_by_slug(&self, slug: &str) -> Result<App> {
        let tables = self.tables.read().await;
        tables
            .slugs
            .get(slug)
            .and_then(|id| tables.apps.get(id))
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("app {} not found", slug)))
    }

    pub async fn update_app<F>(&self, id: &str, mutate: F) -> Result<App>
    where
        F: FnOnce(&mut App),
    {
        let mut tables = self.tables.write().await;
        let app = tables
            .apps
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("app {} not found", id)))?;
        mutate(app);
        app.updated_at = Utc::now();
        Ok(app.clone())
    }

    /// Compare-and-swap status transition. Fails with `Conflict` when the
    /// app is no longer in `from` or when the move is not in the lattice.
    pub async fn transition_app<F>(
        &self,
        id: &str,
        from: AppStatus,
        to: AppStatus,
        stamp: F,
    ) -> Result<App>
    where
        F: FnOnce(&mut App),
    {
        let mut tables = self.tables.write().await;
        let app = tables
            .apps
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("app {} not found", id)))?;
        if app.status != from {
            return Err(CatalogError::Conflict(format!(
                "app is {}, expected {}",
                app.status, from
            )));
        }
        if !from.can_transition_to(to) {
            return Err(CatalogError::Conflict(format!(
                "illegal app transition {} -> {}",
                from, to
            )));
        }
        app.status = to;
        stamp(app);
        app.updated_at = Utc::now();
        debug!(app_id = %id, from = %from, to = %to, "app transitioned");
        Ok(app.clone())
    }

    pub async fn list_apps(
        &self,
        status: Option<AppStatus>,
        category: Option<&str>,
    ) -> Vec<App> {
        let tables = self.tables.read().await;
        let mut apps: Vec<App> = tables
            .apps
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .filter(|a| category.map_or(true, |c| a.category == c))
            .cloned()
            .collect();
        apps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        apps
    }

    pub async fn record_download(&self, slug: &str) -> Result<u32> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let id = tables
            .slugs
            .get(slug)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("app {} not found", slug)))?;
        let app = tables
            .apps
            .get_mut(&id)
            .ok_or_else(|| CatalogError::NotFound(format!("app {} not found", slug)))?;
        app.downloads += 1;
        Ok(app.downloads)
    }

    /// Removes an app and everything keyed on it: slug, reviews and their
    /// votes, feedback, subscriptions. Notifications are left alone; they
    /// are per-user history.
    pub async fn remove_app(&self, id: &str) -> Result<App> {
        let mut tables = self.tables.write().await;
        let app = tables
            .apps
            .remove(id)
            .ok_or_else(|| CatalogError::NotFound(format!("app {} not found", id)))?;
        tables.slugs.remove(&app.slug);

        let review_ids: Vec<String> = tables
            .reviews
            .values()
            .filter(|r| r.app_id == id)
            .map(|r| r.id.clone())
            .collect();
        for review_id in &review_ids {
            tables.reviews.remove(review_id);
            tables.review_votes.retain(|(rid, _)| rid != review_id);
        }
        tables.review_authors.retain(|(app_id, _)| app_id != id);
        tables.feedback.retain(|_, f| f.app_id != id);
        tables.subscriptions.retain(|_, s| s.app_id != id);
        tables
            .subscription_keys
            .retain(|(app_id, _)| app_id != id);
        debug!(app_id = %id, slug = %app.slug, "app removed");
        Ok(app)
    }

    // ---- requests ----

    pub async fn insert_request(&self, request: AppRequest) -> Result<AppRequest> {
        let mut tables = self.tables.write().await;
        if tables.requests.contains_key(&request.id) {
            return Err(CatalogError::Conflict(format!(
                "request {} already exists",
                request.id
            )));
        }
        tables.requests.insert(request.id.clone(), request.clone());
        debug!(request_id = %request.id, "request inserted");
        Ok(request)
    }

    pub async fn request(&self, id: &str) -> Result<AppRequest> {
        let tables = self.tables.read().await;
        tables
            .requests
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("request {} not found", id)))
    }

    pub async fn update_request<F>(&self, id: &str, mutate: F) -> Result<AppRequest>
    where
        F: FnOnce(&mut AppRequest),
    {
        let mut tables = self.tables.write().await;
        let request = tables
            .requests
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("request {} not found", id)))?;
        mutate(request);
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    /// Compare-and-swap lifecycle transition. Concurrent callers racing the
    /// same move see one success; the rest get `Conflict`.
    pub async fn transition_request<F>(
        &self,
        id: &str,
        from: RequestStatus,
        to: RequestStatus,
        stamp: F,
    ) -> Result<AppRequest>
    where
        F: FnOnce(&mut AppRequest),
    {
        let mut tables = self.tables.write().await;
        let request = tables
            .requests
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("request {} not found", id)))?;
        if request.status != from {
            return Err(CatalogError::Conflict(format!(
                "request is {}, expected {}",
                request.status, from
            )));
        }
        if !from.can_transition_to(to) {
            return Err(CatalogError::Conflict(format!(
                "illegal request transition {} -> {}",
                from, to
            )));
        }
        request.status = to;
        stamp(request);
        request.updated_at = Utc::now();
        debug!(request_id = %id, from = %from, to = %to, "request transitioned");
        Ok(request.clone())
    }

    /// Removes a request if its status is one of `allowed_from`, purging its
    /// votes with it.
    pub async fn remove_request(
        &self,
        id: &str,
        allowed_from: &[RequestStatus],
    ) -> Result<AppRequest> {
        let mut tables = self.tables.write().await;
        let status = tables
            .requests
            .get(id)
            .map(|r| r.status)
            .ok_or_else(|| CatalogError::NotFound(format!("request {} not found", id)))?;
        if !allowed_from.contains(&status) {
            return Err(CatalogError::Conflict(format!(
                "request is {} and cannot be deleted",
                status
            )));
        }
        tables.request_votes.retain(|(rid, _)| rid != id);
        let removed = tables.requests.remove(id);
        removed.ok_or_else(|| CatalogError::NotFound(format!("request {} not found", id)))
    }

    /// Admin escape hatch: marks a request completed outside the normal
    /// pipeline, linking the app that fulfilled it.
    pub async fn force_complete_request(&self, id: &str, app_id: &str) -> Result<AppRequest> {
        let mut tables = self.tables.write().await;
        let request = tables
            .requests
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("request {} not found", id)))?;
        if request.status == RequestStatus::Completed {
            return Err(CatalogError::Conflict(
                "request is already completed".to_string(),
            ));
        }
        request.status = RequestStatus::Completed;
        request.resulting_app_id = Some(app_id.to_string());
        request.build_completed_at = Some(Utc::now());
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    pub async fn list_requests(&self, status: Option<RequestStatus>) -> Vec<AppRequest> {
        let tables = self.tables.read().await;
        let mut requests: Vec<AppRequest> = tables
            .requests
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests
    }

    pub async fn requests_by_requester(&self, user_id: &str) -> Vec<AppRequest> {
        let tables = self.tables.read().await;
        let mut requests: Vec<AppRequest> = tables
            .requests
            .values()
            .filter(|r| r.requester_id == user_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests
    }

    pub async fn add_request_vote(&self, request_id: &str, voter: &VoterIdentity) -> Result<u32> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let request = tables
            .requests
            .get_mut(request_id)
            .ok_or_else(|| CatalogError::NotFound(format!("request {} not found", request_id)))?;
        if !tables
            .request_votes
            .insert((request_id.to_string(), voter.clone()))
        {
            return Err(CatalogError::Conflict(
                "vote already recorded".to_string(),
            ));
        }
        request.upvotes += 1;
        request.updated_at = Utc::now();
        Ok(request.upvotes)
    }

    pub async fn remove_request_vote(
        &self,
        request_id: &str,
        voter: &VoterIdentity,
    ) -> Result<u32> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let request = tables
            .requests
            .get_mut(request_id)
            .ok_or_else(|| CatalogError::NotFound(format!("request {} not found", request_id)))?;
        if !tables
            .request_votes
            .remove(&(request_id.to_string(), voter.clone()))
        {
            return Err(CatalogError::NotFound("vote not found".to_string()));
        }
        request.upvotes = request.upvotes.saturating_sub(1);
        request.updated_at = Utc::now();
        Ok(request.upvotes)
    }

    // ---- reviews ----

    pub async fn insert_review(&self, review: Review) -> Result<Review> {
        let mut tables = self.tables.write().await;
        if !tables.apps.contains_key(&review.app_id) {
            return Err(CatalogError::NotFound(format!(
                "app {} not found",
                review.app_id
            )));
        }
        if !tables
            .review_authors
            .insert((review.app_id.clone(), review.reviewer.clone()))
        {
            return Err(CatalogError::Conflict(
                "this identity has already reviewed this app".to_string(),
            ));
        }
        tables.reviews.insert(review.id.clone(), review.clone());
        Ok(review)
    }

    pub async fn review(&self, id: &str) -> Result<Review> {
        let tables = self.tables.read().await;
        tables
            .reviews
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("review {} not found", id)))
    }

    pub async fn reviews_for_app(&self, app_id: &str) -> Vec<Review> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| r.app_id == app_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reviews
    }

    pub async fn remove_review(&self, id: &str) -> Result<Review> {
        let mut tables = self.tables.write().await;
        let review = tables
            .reviews
            .remove(id)
            .ok_or_else(|| CatalogError::NotFound(format!("review {} not found", id)))?;
        tables
            .review_authors
            .remove(&(review.app_id.clone(), review.reviewer.clone()));
        tables.review_votes.retain(|(rid, _)| rid != id);
        Ok(review)
    }

    pub async fn add_review_vote(&self, review_id: &str, voter: &VoterIdentity) -> Result<u32> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let review = tables
            .reviews
            .get_mut(review_id)
            .ok_or_else(|| CatalogError::NotFound(format!("review {} not found", review_id)))?;
        if !tables
            .review_votes
            .insert((review_id.to_string(), voter.clone()))
        {
            return Err(CatalogError::Conflict(
                "vote already recorded".to_string(),
            ));
        }
        review.helpful_count += 1;
        Ok(review.helpful_count)
    }

    pub async fn remove_review_vote(&self, review_id: &str, voter: &VoterIdentity) -> Result<u32> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let review = tables
            .reviews
            .get_mut(review_id)
            .ok_or_else(|| CatalogError::NotFound(format!("review {} not found", review_id)))?;
        if !tables
            .review_votes
            .remove(&(review_id.to_string(), voter.clone()))
        {
            return Err(CatalogError::NotFound("vote not found".to_string()));
        }
        review.helpful_count = review.helpful_count.saturating_sub(1);
        Ok(review.helpful_count)
    }

    pub async fn reviews_by_author(&self, reviewer: &VoterIdentity) -> Vec<Review> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| &r.reviewer == reviewer)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reviews
    }

    pub async fn review_summary(&self, app_id: &str) -> ReviewSummary {
        let tables = self.tables.read().await;
        let ratings: Vec<u8> = tables
            .reviews
            .values()
            .filter(|r| r.app_id == app_id)
            .map(|r| r.rating)
            .collect();
        ReviewSummary::from_ratings(&ratings)
    }

    // ---- feedback ----

    pub async fn insert_feedback(&self, feedback: Feedback) -> Result<Feedback> {
        let mut tables = self.tables.write().await;
        if !tables.apps.contains_key(&feedback.app_id) {
            return Err(CatalogError::NotFound(format!(
                "app {} not found",
                feedback.app_id
            )));
        }
        tables.feedback.insert(feedback.id.clone(), feedback.clone());
        Ok(feedback)
    }

    pub async fn feedback(&self, id: &str) -> Result<Feedback> {
        let tables = self.tables.read().await;
        tables
            .feedback
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("feedback {} not found", id)))
    }

    pub async fn update_feedback<F>(&self, id: &str, mutate: F) -> Result<Feedback>
    where
        F: FnOnce(&mut Feedback),
    {
        let mut tables = self.tables.write().await;
        let feedback = tables
            .feedback
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("feedback {} not found", id)))?;
        mutate(feedback);
        Ok(feedback.clone())
    }

    pub async fn feedback_for_app(
        &self,
        app_id: &str,
        kind: Option<FeedbackType>,
    ) -> Vec<Feedback> {
        let tables = self.tables.read().await;
        let mut entries: Vec<Feedback> = tables
            .feedback
            .values()
            .filter(|f| f.app_id == app_id)
            .filter(|f| kind.map_or(true, |k| f.feedback_type == k))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    pub async fn feedback_by_author(&self, author: &VoterIdentity) -> Vec<Feedback> {
        let tables = self.tables.read().await;
        let mut entries: Vec<Feedback> = tables
            .feedback
            .values()
            .filter(|f| &f.author == author)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    pub async fn remove_feedback(&self, id: &str) -> Result<Feedback> {
        let mut tables = self.tables.write().await;
        tables
            .feedback
            .remove(id)
            .ok_or_else(|| CatalogError::NotFound(format!("feedback {} not found", id)))
    }

    /// Undecided rebuild requests, most urgent first, oldest first within a
    /// priority band.
    pub async fn rebuild_queue(&self) -> Vec<Feedback> {
        let tables = self.tables.read().await;
        let mut queue: Vec<Feedback> = tables
            .feedback
            .values()
            .filter(|f| f.is_pending_rebuild())
            .cloned()
            .collect();
        queue.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        queue
    }

    // ---- subscriptions & notifications ----

    pub async fn subscribe(&self, app_id: &str, user_id: &str) -> Result<AppSubscription> {
        let mut tables = self.tables.write().await;
        if !tables.apps.contains_key(app_id) {
            return Err(CatalogError::NotFound(format!("app {} not found", app_id)));
        }
        if !tables.users.contains_key(user_id) {
            return Err(CatalogError::NotFound(format!(
                "user {} not found",
                user_id
            )));
        }
        if !tables
            .subscription_keys
            .insert((app_id.to_string(), user_id.to_string()))
        {
            return Err(CatalogError::Conflict("already subscribed".to_string()));
        }
        let subscription = AppSubscription::new(app_id, user_id);
        tables
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    pub async fn unsubscribe(&self, app_id: &str, user_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables
            .subscription_keys
            .remove(&(app_id.to_string(), user_id.to_string()))
        {
            return Err(CatalogError::NotFound("subscription not found".to_string()));
        }
        tables
            .subscriptions
            .retain(|_, s| !(s.app_id == app_id && s.user_id == user_id));
        Ok(())
    }

    pub async fn subscribers_of(&self, app_id: &str) -> Vec<String> {
        let tables = self.tables.read().await;
        tables
            .subscriptions
            .values()
            .filter(|s| s.app_id == app_id)
            .map(|s| s.user_id.clone())
            .collect()
    }

    pub async fn subscriptions_for_user(&self, user_id: &str) -> Vec<AppSubscription> {
        let tables = self.tables.read().await;
        let mut subs: Vec<AppSubscription> = tables
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        subs
    }

    pub async fn insert_notification(&self, notification: Notification) -> Notification {
        let mut tables = self.tables.write().await;
        tables
            .notifications
            .insert(notification.id.clone(), notification.clone());
        notification
    }

    pub async fn notifications_for(&self, user_id: &str, unread_only: bool) -> Vec<Notification> {
        let tables = self.tables.read().await;
        let mut notes: Vec<Notification> = tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .filter(|n| !unread_only || !n.read)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes
    }

    pub async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<Notification> {
        let mut tables = self.tables.write().await;
        let note = tables
            .notifications
            .get_mut(id)
            .filter(|n| n.user_id == user_id)
            .ok_or_else(|| CatalogError::NotFound(format!("notification {} not found", id)))?;
        note.read = true;
        Ok(note.clone())
    }

    pub async fn mark_all_read(&self, user_id: &str) -> usize {
        let mut tables = self.tables.write().await;
        let mut marked = 0;
        for note in tables
            .notifications
            .values_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            note.read = true;
            marked += 1;
        }
        marked
    }

    pub async fn unread_count(&self, user_id: &str) -> usize {
        let tables = self.tables.read().await;
        tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.read)
            .count()
    }

    pub async fn remove_notification(&self, id: &str, user_id: &str) -> Result<Notification> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .notifications
            .get(id)
            .map(|n| n.user_id == user_id)
            .ok_or_else(|| CatalogError::NotFound(format!("notification {} not found", id)))?;
        if !owned {
            return Err(CatalogError::NotFound(format!(
                "notification {} not found",
                id
            )));
        }
        tables
            .notifications
            .remove(id)
            .ok_or_else(|| CatalogError::NotFound(format!("notification {} not found", id)))
    }

    // ---- stats ----

    pub async fn stats(&self) -> StoreStats {
        let tables = self.tables.read().await;
        let mut stats = StoreStats {
            total_users: tables.users.len(),
            active_users: tables.users.values().filter(|u| u.active).count(),
            total_apps: tables.apps.len(),
            ai_generated_apps: tables.apps.values().filter(|a| a.ai_generated).count(),
            total_requests: tables.requests.len(),
            total_reviews: tables.reviews.len(),
            total_feedback: tables.feedback.len(),
            pending_rebuilds: tables
                .feedback
                .values()
                .filter(|f| f.is_pending_rebuild())
                .count(),
            ..Default::default()
        };
        for user in tables.users.values() {
            *stats
                .users_by_tier
                .entry(user.tier.as_str().to_string())
                .or_insert(0) += 1;
        }
        for app in tables.apps.values() {
            *stats
                .apps_by_status
                .entry(app.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        for request in tables.requests.values() {
            *stats
                .requests_by_status
                .entry(request.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }
}
