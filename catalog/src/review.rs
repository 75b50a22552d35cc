//! App reviews and helpfulness votes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::identity::VoterIdentity;

pub const MAX_REVIEW_TITLE_LEN: usize = 100;
pub const MAX_REVIEW_CONTENT_LEN: usize = 2000;

/// A rating-plus-text review of a listed app. One per identity per app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub app_id: String,
    pub reviewer: VoterIdentity,
    /// 1 through 5, inclusive.
    pub rating: u8,
    pub title: Option<String>,
    pub content: String,
    pub helpful_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(app_id: impl Into<String>, reviewer: VoterIdentity, input: &NewReview) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app_id.into(),
            reviewer,
            rating: input.rating,
            title: input.title.clone(),
            content: input.content.clone(),
            helpful_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Input for submitting a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub rating: u8,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

impl NewReview {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(CatalogError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        if let Some(title) = &self.title {
            if title.chars().count() > MAX_REVIEW_TITLE_LEN {
                return Err(CatalogError::Validation(format!(
                    "title exceeds {} characters",
                    MAX_REVIEW_TITLE_LEN
                )));
            }
        }
        if self.content.trim().is_empty() {
            return Err(CatalogError::Validation("content is required".to_string()));
        }
        if self.content.chars().count() > MAX_REVIEW_CONTENT_LEN {
            return Err(CatalogError::Validation(format!(
                "content exceeds {} characters",
                MAX_REVIEW_CONTENT_LEN
            )));
        }
        Ok(())
    }
}

/// Aggregate rating for an app's review set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub count: usize,
    /// Mean rating rounded to one decimal; 0.0 when there are no reviews.
    pub average_rating: f32,
}

impl ReviewSummary {
    pub fn from_ratings(ratings: &[u8]) -> Self {
        if ratings.is_empty() {
            return Self::default();
        }
        let sum: u32 = ratings.iter().map(|r| *r as u32).sum();
        let mean = sum as f32 / ratings.len() as f32;
        Self {
            count: ratings.len(),
            average_rating: (mean * 10.0).round() / 10.0,
        }
    }
}
