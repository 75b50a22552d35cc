//! Foundry Agent - safety classification and build capabilities
//!
//! Provides the AI-facing half of the Foundry store:
//! - Rule-based safety classification of build prompts and generated source
//! - Optional semantic analysis behind a trait (remote HTTP or mock)
//! - Trait-based build capability (remote generation service or mock)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          SafetyClassifier               │
//! │  (denylist → patterns → semantics)      │
//! └────────────────┬────────────────────────┘
//!                  │ optional
//!                  ▼
//!          ┌───────────────┐     ┌─────────────────┐
//!          │ Semantic      │     │ BuildCapability  │
//!          │ Analyzer      │     │ (Remote / Mock)  │
//!          │ (Remote/Mock) │     │                  │
//!          └───────────────┘     └─────────────────┘
//! ```

pub mod analysis;
pub mod builder;
pub mod classifier;
pub mod verdict;

// Re-export main types for convenience
pub use analysis::{AnalysisError, MockAnalyzer, RemoteAnalyzer, SemanticAnalyzer};
pub use builder::{
    ArtifactFile, BuildCapability, BuildError, BuildOutcome, BuildSpec, MockBuilder, RemoteBuilder,
};
pub use classifier::SafetyClassifier;
pub use verdict::{SafetyLevel, Verdict};
