//! Reviews and helpfulness votes.
//!
//! Reviews are open to anonymous visitors, keyed on the same identity
//! scheme as votes so one client gets one review per app. Deleting a
//! review needs an account; helpfulness votes do not.

use tracing::info;

use catalog::{
    Actor, CatalogError, CatalogStore, NewReview, Result, Review, ReviewSummary, UserTier,
    VoterIdentity,
};

#[derive(Debug, Clone)]
pub struct ReviewsService {
    store: CatalogStore,
}

impl ReviewsService {
    pub fn new(store: CatalogStore) -> Self {
        Self { store }
    }

    /// Review a listed app. One review per identity per app.
    pub async fn submit(&self, actor: &Actor, slug: &str, input: NewReview) -> Result<Review> {
        let app = self.store.app_by_slug(slug).await?;
        if !app.status.is_listed() {
            return Err(CatalogError::PreconditionFailed(
                "app is not available for review".to_string(),
            ));
        }
        input.validate()?;

        let review = Review::new(&app.id, actor.identity(), &input);
        let review = self.store.insert_review(review).await?;
        info!(
            app = %app.slug,
            review_id = %review.id,
            rating = review.rating,
            "review submitted"
        );
        Ok(review)
    }

    pub async fn review(&self, review_id: &str) -> Result<Review> {
        self.store.review(review_id).await
    }

    /// Reviews for an app, newest first. Unlisted apps are hidden from
    /// everyone but admins.
    pub async fn for_app(&self, actor: &Actor, slug: &str) -> Result<Vec<Review>> {
        let app = self.store.app_by_slug(slug).await?;
        if !app.status.is_listed() && actor.tier() != UserTier::Admin {
            return Err(CatalogError::NotFound(format!("app {} not found", slug)));
        }
        Ok(self.store.reviews_for_app(&app.id).await)
    }

    pub async fn summary(&self, slug: &str) -> Result<ReviewSummary> {
        let app = self.store.app_by_slug(slug).await?;
        if !app.status.is_listed() {
            return Err(CatalogError::NotFound(format!("app {} not found", slug)));
        }
        Ok(self.store.review_summary(&app.id).await)
    }

    /// Delete a review. Needs an account: the author's, or an admin's.
    pub async fn delete(&self, actor: &Actor, review_id: &str) -> Result<Review> {
        let user = actor.require_user()?;
        let review = self.store.review(review_id).await?;
        let is_author = review.reviewer == VoterIdentity::user(&user.id);
        if !is_author && user.tier != UserTier::Admin {
            return Err(CatalogError::PermissionDenied(
                "only the author can delete this review".to_string(),
            ));
        }
        let removed = self.store.remove_review(review_id).await?;
        info!(review_id = %review_id, "review deleted");
        Ok(removed)
    }

    pub async fn mark_helpful(&self, actor: &Actor, review_id: &str) -> Result<u32> {
        self.store
            .add_review_vote(review_id, &actor.identity())
            .await
    }

    pub async fn unmark_helpful(&self, actor: &Actor, review_id: &str) -> Result<u32> {
        self.store
            .remove_review_vote(review_id, &actor.identity())
            .await
    }

    pub async fn by_username(&self, username: &str) -> Result<Vec<Review>> {
        let user = self.store.user_by_username(username).await?;
        Ok(self
            .store
            .reviews_by_author(&VoterIdentity::user(&user.id))
            .await)
    }

    pub async fn my_reviews(&self, actor: &Actor) -> Vec<Review> {
        self.store.reviews_by_author(&actor.identity()).await
    }
}
