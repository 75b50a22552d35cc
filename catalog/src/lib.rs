//! Catalog domain model for the Foundry app store.
//!
//! This crate holds everything the rest of the workspace agrees on:
//!
//! - **Identity**: tiered users ([`UserTier`]), anonymous fingerprints, and
//!   the [`Actor`] type every service operation authorizes against
//! - **Entities**: apps and their publication lattice, build requests and
//!   their lifecycle, reviews, feedback, subscriptions, notifications
//! - **Store**: [`CatalogStore`], the in-memory store that enforces the
//!   constraints services rely on (compare-and-swap transitions, atomic
//!   slug assignment, per-identity vote/review/subscription uniqueness)
//! - **Errors**: [`CatalogError`], the shared taxonomy every fallible
//!   operation resolves to
//!
//! # Example
//!
//! ```ignore
//! use catalog::{Actor, CatalogStore, User, UserTier};
//!
//! let store = CatalogStore::new();
//! let user = store.insert_user(User::new("alice", UserTier::Limited)).await?;
//! let actor = Actor::User(user);
//! actor.require_tier(UserTier::Limited)?;
//! ```

pub mod app;
pub mod error;
pub mod feedback;
pub mod identity;
pub mod notify;
pub mod request;
pub mod review;
pub mod slug;
pub mod store;

// Re-export main types
pub use app::{App, AppStatus};
pub use error::{CatalogError, Result};
pub use feedback::{Feedback, FeedbackPriority, FeedbackType, NewFeedback};
pub use identity::{anonymous_fingerprint, Actor, User, UserTier, VoterIdentity};
pub use notify::{AppSubscription, Notification, NotificationKind};
pub use request::{AppRequest, NewAppRequest, RequestPatch, RequestStatus};
pub use review::{NewReview, Review, ReviewSummary};
pub use slug::slugify;
pub use store::{CatalogStore, StoreStats};
