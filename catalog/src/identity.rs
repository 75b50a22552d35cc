//! User identity and the tier-based privilege model.
//!
//! Tiers form a strict ladder; every privileged operation names the minimum
//! tier it requires and checks it with an ordered comparison. Anonymous
//! visitors participate in reviews and feedback through a stable fingerprint
//! derived from their connection details, so per-identity uniqueness rules
//! apply to them the same way they apply to accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CatalogError;

/// Privilege tiers, ordered from least to most trusted.
///
/// Ordering is meaningful: `tier >= UserTier::Promoted` is the canonical
/// "can review requests" check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    /// Unauthenticated visitor. Can browse, download, review, and file
    /// bug/suggestion feedback.
    Anonymous = 0,
    /// Authenticated account. Adds request submission and voting.
    Limited = 1,
    /// Trusted account. Adds request approval/rejection and app curation.
    Promoted = 2,
    /// Full control, including user management and forced transitions.
    Admin = 3,
}

impl UserTier {
    /// Numeric rank, higher is more privileged.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Anonymous => "anonymous",
            UserTier::Limited => "limited",
            UserTier::Promoted => "promoted",
            UserTier::Admin => "admin",
        }
    }

    /// All tiers in ascending order of privilege.
    pub fn all() -> Vec<UserTier> {
        vec![
            UserTier::Anonymous,
            UserTier::Limited,
            UserTier::Promoted,
            UserTier::Admin,
        ]
    }
}

impl std::fmt::Display for UserTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub tier: UserTier,
    /// Deactivated accounts keep their records but lose every privilege.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, tier: UserTier) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            tier,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// The identity a vote, review, or feedback entry is keyed on.
///
/// Anonymous identities carry the connection fingerprint so uniqueness
/// constraints treat repeat visits from the same client as one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum VoterIdentity {
    User(String),
    Anonymous(String),
}

impl VoterIdentity {
    pub fn user(id: impl Into<String>) -> Self {
        VoterIdentity::User(id.into())
    }

    pub fn anonymous(ip: &str, user_agent: &str) -> Self {
        VoterIdentity::Anonymous(anonymous_fingerprint(ip, user_agent))
    }

    /// The raw key string, regardless of kind.
    pub fn key(&self) -> &str {
        match self {
            VoterIdentity::User(id) | VoterIdentity::Anonymous(id) => id,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            VoterIdentity::User(id) => Some(id),
            VoterIdentity::Anonymous(_) => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, VoterIdentity::Anonymous(_))
    }
}

/// Stable fingerprint for an unauthenticated client: the first 32 hex
/// characters of SHA-256 over `"{ip}:{user_agent}"`.
pub fn anonymous_fingerprint(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", ip, user_agent).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..32].to_string()
}

/// The caller of a service operation: a resolved account or an anonymous
/// visitor identified by fingerprint.
#[derive(Debug, Clone)]
pub enum Actor {
    User(User),
    Anonymous { fingerprint: String },
}

impl Actor {
    pub fn anonymous(ip: &str, user_agent: &str) -> Self {
        Actor::Anonymous {
            fingerprint: anonymous_fingerprint(ip, user_agent),
        }
    }

    /// Effective tier: anonymous actors sit at the bottom of the ladder.
    pub fn tier(&self) -> UserTier {
        match self {
            Actor::User(user) => user.tier,
            Actor::Anonymous { .. } => UserTier::Anonymous,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Actor::User(user) => Some(user),
            Actor::Anonymous { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user().map(|u| u.id.as_str())
    }

    /// Identity used for vote/review/feedback uniqueness.
    pub fn identity(&self) -> VoterIdentity {
        match self {
            Actor::User(user) => VoterIdentity::User(user.id.clone()),
            Actor::Anonymous { fingerprint } => VoterIdentity::Anonymous(fingerprint.clone()),
        }
    }

    /// Returns the authenticated user when the actor holds `tier` or higher
    /// and the account is active.
    pub fn require_tier(&self, tier: UserTier) -> Result<&User, CatalogError> {
        match self {
            Actor::User(user) if !user.active => Err(CatalogError::PermissionDenied(
                "account is deactivated".to_string(),
            )),
            Actor::User(user) if user.tier >= tier => Ok(user),
            _ => Err(CatalogError::PermissionDenied(format!(
                "requires {} tier or higher",
                tier.as_str()
            ))),
        }
    }

    /// Returns the authenticated user, any tier, as long as it is active.
    pub fn require_user(&self) -> Result<&User, CatalogError> {
        self.require_tier(UserTier::Limited)
    }
}
