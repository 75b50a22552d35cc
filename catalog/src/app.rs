//! Catalog entries and their publication lattice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publication states for a catalog entry.
///
/// The lattice is strict: entries climb `pending -> wild_west -> stable`,
/// a wild-west entry can be rejected outright, and a stable entry can be
/// demoted back to wild west. Every other move is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    /// Awaiting curation; not listed.
    Pending,
    /// Listed with a caveat badge; the landing state for AI builds.
    WildWest,
    /// Curator-vetted; fully listed.
    Stable,
    /// Removed from circulation.
    Rejected,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Pending => "pending",
            AppStatus::WildWest => "wild_west",
            AppStatus::Stable => "stable",
            AppStatus::Rejected => "rejected",
        }
    }

    /// Whether the entry shows up in public listings.
    pub fn is_listed(&self) -> bool {
        matches!(self, AppStatus::WildWest | AppStatus::Stable)
    }

    /// Legal moves in the publication lattice.
    pub fn can_transition_to(&self, next: AppStatus) -> bool {
        matches!(
            (self, next),
            (AppStatus::Pending, AppStatus::WildWest)
                | (AppStatus::WildWest, AppStatus::Stable)
                | (AppStatus::WildWest, AppStatus::Rejected)
                | (AppStatus::Stable, AppStatus::WildWest)
        )
    }
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A published (or publishable) application in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    /// Immutable once assigned; globally unique via the store's slug index.
    pub slug: String,
    pub description: String,
    pub version: String,
    /// Absent for imported or orphaned entries.
    pub author_id: Option<String>,
    pub category: String,
    pub status: AppStatus,
    /// Filesystem path of the packaged artifact, once one exists.
    pub package_path: Option<String>,
    pub downloads: u32,
    /// True when the package came out of the build pipeline.
    pub ai_generated: bool,
    /// Back-link to the request that produced this entry.
    pub source_request_id: Option<String>,
    pub safety_notes: Option<String>,
    /// Ordered screenshot paths.
    pub screenshots: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl App {
    /// Creates a pending entry. The slug is assigned by the store when the
    /// entry is inserted, so it starts empty here.
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            slug: String::new(),
            description: String::new(),
            version: "1.0.0".to_string(),
            author_id: None,
            category: category.into(),
            status: AppStatus::Pending,
            package_path: None,
            downloads: 0,
            ai_generated: false,
            source_request_id: None,
            safety_notes: None,
            screenshots: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_status(mut self, status: AppStatus) -> Self {
        self.status = status;
        self
    }

    /// Marks the entry as produced by the build pipeline for `request_id`.
    pub fn from_build(mut self, request_id: impl Into<String>) -> Self {
        self.ai_generated = true;
        self.source_request_id = Some(request_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lattice() {
        assert!(AppStatus::Pending.can_transition_to(AppStatus::WildWest));
        assert!(AppStatus::WildWest.can_transition_to(AppStatus::Stable));
        assert!(AppStatus::WildWest.can_transition_to(AppStatus::Rejected));
        assert!(AppStatus::Stable.can_transition_to(AppStatus::WildWest));

        assert!(!AppStatus::Pending.can_transition_to(AppStatus::Stable));
        assert!(!AppStatus::Stable.can_transition_to(AppStatus::Pending));
        assert!(!AppStatus::Rejected.can_transition_to(AppStatus::WildWest));
        assert!(!AppStatus::Pending.can_transition_to(AppStatus::Rejected));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&AppStatus::WildWest).unwrap(),
            "\"wild_west\""
        );
        assert_eq!(AppStatus::WildWest.as_str(), "wild_west");
    }

    #[test]
    fn test_listing_visibility() {
        assert!(AppStatus::WildWest.is_listed());
        assert!(AppStatus::Stable.is_listed());
        assert!(!AppStatus::Pending.is_listed());
        assert!(!AppStatus::Rejected.is_listed());
    }

    #[test]
    fn test_build_construction() {
        let app = App::new("Weather Widget", "utilities")
            .with_description("Shows the local forecast")
            .with_author("user-1")
            .with_status(AppStatus::WildWest)
            .from_build("req-1");
        assert!(app.ai_generated);
        assert_eq!(app.source_request_id.as_deref(), Some("req-1"));
        assert_eq!(app.version, "1.0.0");
        assert_eq!(app.status, AppStatus::WildWest);
    }
}
