//! Subscriptions and user notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A subscribed app shipped a new build.
    NewBuild,
    /// A subscribed app moved up the publication lattice.
    AppPromoted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewBuild => "new_build",
            NotificationKind::AppPromoted => "app_promoted",
        }
    }
}

/// A user's standing interest in one app. Unique per (app, user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSubscription {
    pub id: String,
    pub app_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl AppSubscription {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app_id.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// A delivered notification. Created by best-effort fan-out; losing one is
/// acceptable, losing a build is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub app_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            app_id: None,
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_construction() {
        let note = Notification::new(
            "user-1",
            NotificationKind::NewBuild,
            "New build available",
            "Weather Widget 1.1.0 is ready",
        )
        .with_app("app-1");
        assert!(!note.read);
        assert_eq!(note.app_id.as_deref(), Some("app-1"));
        assert_eq!(note.kind.as_str(), "new_build");
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::AppPromoted).unwrap(),
            "\"app_promoted\""
        );
    }
}
