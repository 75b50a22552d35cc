//! Build pipeline: job tracking, packaging, and orchestration.

pub mod jobs;
pub mod orchestrator;
pub mod package;

pub use jobs::{BuildJob, BuildJobStatus, JobStore, MemoryJobStore};
pub use orchestrator::BuildOrchestrator;
pub use package::{BUILD_INSTRUCTION_FILE, REQUIRED_ARTIFACTS};
