//! Build job tracking.
//!
//! Every accepted build request gets a [`BuildJob`] that records its
//! progress through the pipeline stages. Jobs live in a [`JobStore`],
//! kept behind a trait so the in-memory store can be swapped for a
//! persistent one without touching the orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use catalog::{AppRequest, CatalogError, Result};

/// Stage a build job is currently in.
///
/// Stages only move forward; any non-terminal stage may drop to
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildJobStatus {
    /// Accepted, waiting for a build permit.
    Queued,
    /// Permit acquired, claiming the request.
    Starting,
    /// External build capability is producing artifacts.
    Generating,
    /// Artifacts are being validated and archived.
    Packaging,
    /// Generated code is under the post-build safety check.
    Checking,
    Completed,
    Failed,
}

impl BuildJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildJobStatus::Queued => "queued",
            BuildJobStatus::Starting => "starting",
            BuildJobStatus::Generating => "generating",
            BuildJobStatus::Packaging => "packaging",
            BuildJobStatus::Checking => "checking",
            BuildJobStatus::Completed => "completed",
            BuildJobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildJobStatus::Completed | BuildJobStatus::Failed)
    }

    /// Whether a job may move from this stage to `next`.
    pub fn can_advance_to(&self, next: BuildJobStatus) -> bool {
        use BuildJobStatus::*;
        if !self.is_terminal() && next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Queued, Starting)
                | (Starting, Generating)
                | (Generating, Packaging)
                | (Packaging, Checking)
                | (Checking, Completed)
        )
    }
}

impl std::fmt::Display for BuildJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tracked build, from queueing to completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    /// Deterministic id: first 16 hex chars of
    /// SHA-256("{request_id}:{prompt}:{queued_at}").
    pub id: String,
    pub request_id: String,
    pub title: String,
    pub prompt: String,
    pub category: Option<String>,
    /// Version the resulting app will carry.
    pub version: String,
    pub status: BuildJobStatus,
    /// Transcript lines, each stamped "[YYYY-MM-DD HH:MM:SS] message".
    pub log: Vec<String>,
    pub error: Option<String>,
    /// Web path of the finished package archive.
    pub artifact_path: Option<String>,
    /// Catalog entry published from this build.
    pub app_id: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildJob {
    /// Create a queued job for a request.
    pub fn for_request(request: &AppRequest, version: impl Into<String>) -> Self {
        let queued_at = Utc::now();
        Self {
            id: derive_job_id(&request.id, &request.prompt, &queued_at),
            request_id: request.id.clone(),
            title: request.title.clone(),
            prompt: request.prompt.clone(),
            category: request.category.clone(),
            version: version.into(),
            status: BuildJobStatus::Queued,
            log: Vec::new(),
            error: None,
            artifact_path: None,
            app_id: None,
            queued_at,
            started_at: None,
            finished_at: None,
        }
    }

    /// Full transcript as one newline-joined string, the form stored on
    /// the request when the job ends.
    pub fn transcript(&self) -> String {
        self.log.join("\n")
    }
}

/// Derive a stable job id from the request identity and queue time.
fn derive_job_id(request_id: &str, prompt: &str, queued_at: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_id.as_bytes());
    hasher.update(b":");
    hasher.update(prompt.as_bytes());
    hasher.update(b":");
    hasher.update(queued_at.to_rfc3339().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Stamp a transcript line the way the build log reads on disk.
pub(crate) fn log_line(message: &str) -> String {
    format!("[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), message)
}

/// Storage for build jobs.
///
/// `advance` is a compare-and-set: callers name the stage they believe
/// the job is in, and exactly one caller wins when two race.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: BuildJob) -> Result<()>;

    async fn get(&self, id: &str) -> Option<BuildJob>;

    /// Move a job from `from` to `to`, stamping timestamps as stages
    /// begin and end. `Conflict` when the job is not in `from` or the
    /// step is not a legal advance.
    async fn advance(&self, id: &str, from: BuildJobStatus, to: BuildJobStatus)
        -> Result<BuildJob>;

    /// Append a timestamped line to the job transcript.
    async fn append_log(&self, id: &str, message: &str) -> Result<()>;

    /// Fail a job from any non-terminal stage.
    async fn fail(&self, id: &str, error: &str) -> Result<BuildJob>;

    /// Complete a job out of the `Checking` stage, recording its
    /// package path and published app.
    async fn complete(&self, id: &str, artifact_path: &str, app_id: &str) -> Result<BuildJob>;

    async fn jobs_for_request(&self, request_id: &str) -> Vec<BuildJob>;

    async fn list(&self) -> Vec<BuildJob>;
}

/// In-memory job store.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<DashMap<String, BuildJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: BuildJob) -> Result<()> {
        if self.jobs.contains_key(&job.id) {
            return Err(CatalogError::Conflict(format!(
                "build job {} already exists",
                job.id
            )));
        }
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<BuildJob> {
        self.jobs.get(id).map(|j| j.clone())
    }

    async fn advance(
        &self,
        id: &str,
        from: BuildJobStatus,
        to: BuildJobStatus,
    ) -> Result<BuildJob> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("build job {} not found", id)))?;
        if job.status != from {
            return Err(CatalogError::Conflict(format!(
                "build job is {}, expected {}",
                job.status, from
            )));
        }
        if !from.can_advance_to(to) {
            return Err(CatalogError::Conflict(format!(
                "illegal build step: {} -> {}",
                from, to
            )));
        }
        job.status = to;
        if to == BuildJobStatus::Starting {
            job.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            job.finished_at = Some(Utc::now());
        }
        Ok(job.clone())
    }

    async fn append_log(&self, id: &str, message: &str) -> Result<()> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("build job {} not found", id)))?;
        job.log.push(log_line(message));
        Ok(())
    }

    async fn fail(&self, id: &str, error: &str) -> Result<BuildJob> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("build job {} not found", id)))?;
        if job.status.is_terminal() {
            return Err(CatalogError::Conflict(format!(
                "build job already {}",
                job.status
            )));
        }
        job.status = BuildJobStatus::Failed;
        job.error = Some(error.to_string());
        job.log.push(log_line(&format!("ERROR: {}", error)));
        job.finished_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn complete(&self, id: &str, artifact_path: &str, app_id: &str) -> Result<BuildJob> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("build job {} not found", id)))?;
        if job.status != BuildJobStatus::Checking {
            return Err(CatalogError::Conflict(format!(
                "build job is {}, expected checking",
                job.status
            )));
        }
        job.status = BuildJobStatus::Completed;
        job.artifact_path = Some(artifact_path.to_string());
        job.app_id = Some(app_id.to_string());
        job.finished_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn jobs_for_request(&self, request_id: &str) -> Vec<BuildJob> {
        let mut jobs: Vec<BuildJob> = self
            .jobs
            .iter()
            .filter(|j| j.request_id == request_id)
            .map(|j| j.clone())
            .collect();
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs
    }

    async fn list(&self) -> Vec<BuildJob> {
        let mut jobs: Vec<BuildJob> = self.jobs.iter().map(|j| j.clone()).collect();
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_job() -> BuildJob {
        let request = AppRequest::new("user-1", "Weather Widget", "Build a weather widget");
        BuildJob::for_request(&request, "1.0.0")
    }

    #[test]
    fn test_job_id_is_stable_hash_prefix() {
        let queued_at = Utc::now();
        let a = derive_job_id("req-1", "a prompt", &queued_at);
        let b = derive_job_id("req-1", "a prompt", &queued_at);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, derive_job_id("req-2", "a prompt", &queued_at));
    }

    #[test]
    fn test_stage_lattice() {
        use BuildJobStatus::*;
        assert!(Queued.can_advance_to(Starting));
        assert!(Generating.can_advance_to(Packaging));
        assert!(Checking.can_advance_to(Completed));
        assert!(Packaging.can_advance_to(Failed));
        assert!(!Queued.can_advance_to(Generating));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Queued));
    }

    #[tokio::test]
    async fn test_advance_is_compare_and_set() {
        let store = MemoryJobStore::new();
        let job = queued_job();
        let id = job.id.clone();
        store.insert(job).await.unwrap();

        let advanced = store
            .advance(&id, BuildJobStatus::Queued, BuildJobStatus::Starting)
            .await
            .unwrap();
        assert_eq!(advanced.status, BuildJobStatus::Starting);
        assert!(advanced.started_at.is_some());

        // A second claimant naming the old stage loses.
        let err = store
            .advance(&id, BuildJobStatus::Queued, BuildJobStatus::Starting)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_fail_guards_terminal_jobs() {
        let store = MemoryJobStore::new();
        let job = queued_job();
        let id = job.id.clone();
        store.insert(job).await.unwrap();

        let failed = store.fail(&id, "builder unreachable").await.unwrap();
        assert_eq!(failed.status, BuildJobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("builder unreachable"));
        assert!(failed.finished_at.is_some());
        assert!(failed.log.last().unwrap().contains("builder unreachable"));

        let err = store.fail(&id, "again").await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_complete_requires_checking_stage() {
        let store = MemoryJobStore::new();
        let job = queued_job();
        let id = job.id.clone();
        store.insert(job).await.unwrap();

        let err = store.complete(&id, "/packages/x.zip", "app-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));

        for (from, to) in [
            (BuildJobStatus::Queued, BuildJobStatus::Starting),
            (BuildJobStatus::Starting, BuildJobStatus::Generating),
            (BuildJobStatus::Generating, BuildJobStatus::Packaging),
            (BuildJobStatus::Packaging, BuildJobStatus::Checking),
        ] {
            store.advance(&id, from, to).await.unwrap();
        }

        let done = store.complete(&id, "/packages/x.zip", "app-1").await.unwrap();
        assert_eq!(done.status, BuildJobStatus::Completed);
        assert_eq!(done.artifact_path.as_deref(), Some("/packages/x.zip"));
        assert_eq!(done.app_id.as_deref(), Some("app-1"));
    }

    #[tokio::test]
    async fn test_transcript_joins_log_lines() {
        let store = MemoryJobStore::new();
        let job = queued_job();
        let id = job.id.clone();
        store.insert(job).await.unwrap();

        store.append_log(&id, "Starting build").await.unwrap();
        store.append_log(&id, "Build finished").await.unwrap();

        let job = store.get(&id).await.unwrap();
        let transcript = job.transcript();
        assert_eq!(transcript.lines().count(), 2);
        assert!(transcript.contains("Starting build"));
        for line in transcript.lines() {
            assert!(line.starts_with('['));
        }
    }
}
