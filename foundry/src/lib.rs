//! Foundry - app store backend with AI-built packages.
//!
//! Users file natural-language app requests; a reviewer approves them;
//! the build orchestrator drives an external build capability and
//! publishes the result into the catalog; community feedback can send
//! a published app back through the pipeline as a rebuild:
//!
//! - **Requests**: submission, safety screening, approval, votes
//! - **Build**: job tracking, orchestration, artifact packaging
//! - **Feedback**: bug reports, suggestions, the rebuild trigger
//! - **Curation**: reviews, subscriptions, tier and catalog admin
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Foundry                              │
//! │                                                             │
//! │  ┌──────────┐  ┌──────────┐  ┌─────────┐  ┌─────────────┐  │
//! │  │ Requests │  │ Feedback │  │ Reviews │  │ Admin/Subs  │  │
//! │  └────┬─────┘  └────┬─────┘  └─────────┘  └─────────────┘  │
//! │       │ approve     │ rebuild                               │
//! │       ▼             ▼                                       │
//! │  ┌───────────────────────┐      ┌───────────────────────┐  │
//! │  │   BuildOrchestrator   │─────▶│ BuildCapability (ext) │  │
//! │  └───────────┬───────────┘      └───────────────────────┘  │
//! │              ▼                                              │
//! │        CatalogStore                                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod admin;
pub mod build;
pub mod config;
pub mod feedback;
pub mod requests;
pub mod reviews;
pub mod service;
pub mod subscriptions;

// Re-export main types
pub use admin::AdminService;
pub use build::{BuildJob, BuildJobStatus, BuildOrchestrator, JobStore, MemoryJobStore};
pub use config::{ConfigError, FoundryConfig};
pub use feedback::{FeedbackService, FeedbackStats};
pub use requests::{RequestService, RequestStatusView};
pub use reviews::ReviewsService;
pub use service::{Foundry, FoundryBuilder};
pub use subscriptions::SubscriptionService;
