//! Build capability abstraction.
//!
//! Provides a trait-based interface for app generation backends:
//! - Remote HTTP generation service
//! - Mock capability for testing

pub mod mock;
pub mod remote;
pub mod traits;

pub use mock::MockBuilder;
pub use remote::RemoteBuilder;
pub use traits::{ArtifactFile, BuildCapability, BuildError, BuildOutcome, BuildSpec};
