//! Build pipeline orchestration.
//!
//! One orchestrator drives every accepted request through the same
//! stages: claim the request, call the build capability, validate and
//! archive the artifacts, run the post-build code check, then publish
//! the app into Wild West. A semaphore bounds how many builds run at
//! once and a wall-clock timeout bounds each external build call.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use catalog::{
    slugify, App, AppRequest, AppStatus, CatalogError, CatalogStore, RequestStatus, Result,
};
use foundry_agent::{BuildCapability, BuildSpec, SafetyClassifier, SafetyLevel};

use crate::build::jobs::{BuildJob, BuildJobStatus, JobStore};
use crate::build::package::{self, StagedPackage};
use crate::config::FoundryConfig;
use crate::subscriptions::SubscriptionService;

/// Category recorded when a request never declared one.
const FALLBACK_CATEGORY: &str = "other";

/// Drives approved requests through the build pipeline.
pub struct BuildOrchestrator {
    store: CatalogStore,
    jobs: Arc<dyn JobStore>,
    capability: Arc<dyn BuildCapability>,
    classifier: Arc<SafetyClassifier>,
    subscriptions: SubscriptionService,
    packages_dir: PathBuf,
    build_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl BuildOrchestrator {
    pub fn new(
        config: &FoundryConfig,
        store: CatalogStore,
        jobs: Arc<dyn JobStore>,
        capability: Arc<dyn BuildCapability>,
        classifier: Arc<SafetyClassifier>,
    ) -> Self {
        Self {
            subscriptions: SubscriptionService::new(store.clone()),
            store,
            jobs,
            capability,
            classifier,
            packages_dir: config.packages.dir.clone(),
            build_timeout: Duration::from_secs(config.builder.build_timeout_secs),
            permits: Arc::new(Semaphore::new(config.builder.max_concurrent_builds)),
        }
    }

    /// Queue a build for an approved request.
    ///
    /// Rebuilds carry the next minor version of the app they refresh;
    /// everything else starts at 1.0.0.
    pub async fn submit(&self, request: &AppRequest) -> Result<BuildJob> {
        if request.status != RequestStatus::Approved {
            return Err(CatalogError::PreconditionFailed(format!(
                "request is {}, expected approved",
                request.status
            )));
        }

        let version = match &request.rebuild_of {
            Some(app_id) => {
                let original = self.store.app(app_id).await?;
                next_minor_version(&original.version)
            }
            None => "1.0.0".to_string(),
        };

        let job = BuildJob::for_request(request, version);
        self.jobs.insert(job.clone()).await?;
        self.log_step(
            &job.id,
            &format!("Queued build for request {}: {}", request.id, request.title),
        )
        .await;
        info!(
            job_id = %job.id,
            request_id = %request.id,
            version = %job.version,
            "build queued"
        );
        Ok(job)
    }

    /// Run a queued job on a background task.
    pub fn spawn(self: &Arc<Self>, job_id: String) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run(&job_id).await;
        });
    }

    /// Run a queued job to completion or failure.
    ///
    /// Every exit path leaves the request in a terminal state with its
    /// transcript attached, unless a racing cancellation got there
    /// first.
    pub async fn run(&self, job_id: &str) {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(job_id = %job_id, "build permits closed");
                return;
            }
        };

        let job = match self.jobs.get(job_id).await {
            Some(job) => job,
            None => {
                warn!(job_id = %job_id, "build job disappeared before starting");
                return;
            }
        };

        if let Err(e) = self
            .jobs
            .advance(job_id, BuildJobStatus::Queued, BuildJobStatus::Starting)
            .await
        {
            // Usually a cancellation that beat us to the job.
            warn!(job_id = %job_id, error = %e, "build job is no longer queued, skipping");
            return;
        }

        // Claim the request. Exactly one build moves it out of approved.
        let request = match self
            .store
            .transition_request(
                &job.request_id,
                RequestStatus::Approved,
                RequestStatus::Building,
                |r| r.build_started_at = Some(Utc::now()),
            )
            .await
        {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    request_id = %job.request_id,
                    error = %e,
                    "failed to claim request for building"
                );
                if let Err(fail_err) = self
                    .jobs
                    .fail(job_id, &format!("could not claim request: {}", e))
                    .await
                {
                    warn!(job_id = %job_id, error = %fail_err, "failed to mark job failed");
                }
                return;
            }
        };

        self.log_step(
            job_id,
            &format!("Building request {}: {}", request.id, request.title),
        )
        .await;

        match self.execute(&job, &request).await {
            Ok(app) => {
                let transcript = match self.jobs.get(job_id).await {
                    Some(job) => job.transcript(),
                    None => String::new(),
                };
                if let Err(e) = self
                    .store
                    .transition_request(
                        &request.id,
                        RequestStatus::Building,
                        RequestStatus::Completed,
                        |r| {
                            r.build_log = Some(transcript);
                            r.resulting_app_id = Some(app.id.clone());
                            r.build_completed_at = Some(Utc::now());
                        },
                    )
                    .await
                {
                    warn!(
                        request_id = %request.id,
                        error = %e,
                        "request moved out of building before completion recorded"
                    );
                }

                // Rebuilds announce themselves to the original app's
                // subscribers. Failure here never fails the build.
                if let Some(original_id) = &request.rebuild_of {
                    match self.subscriptions.notify_new_build(original_id, &app).await {
                        Ok(notified) => {
                            info!(app_id = %app.id, notified, "notified subscribers of rebuild")
                        }
                        Err(e) => {
                            warn!(app_id = %app.id, error = %e, "failed to notify subscribers")
                        }
                    }
                }

                info!(job_id = %job_id, app_id = %app.id, slug = %app.slug, "build completed");
            }
            Err(e) => {
                if let Err(fail_err) = self.jobs.fail(job_id, &e.to_string()).await {
                    warn!(job_id = %job_id, error = %fail_err, "build job already finished");
                }
                let transcript = match self.jobs.get(job_id).await {
                    Some(job) => job.transcript(),
                    None => String::new(),
                };
                if let Err(te) = self
                    .store
                    .transition_request(
                        &request.id,
                        RequestStatus::Building,
                        RequestStatus::Failed,
                        |r| {
                            r.build_log = Some(transcript);
                            r.build_completed_at = Some(Utc::now());
                        },
                    )
                    .await
                {
                    warn!(
                        request_id = %request.id,
                        error = %te,
                        "request moved out of building before failure recorded"
                    );
                }
                warn!(job_id = %job_id, error = %e, "build failed");
            }
        }
    }

    /// Cancel a job that has not finished.
    ///
    /// The request is failed immediately, whether the job was still
    /// queued or already building; the running task notices at its next
    /// stage boundary and bails out.
    pub async fn cancel(&self, job_id: &str, reason: &str) -> Result<BuildJob> {
        let job = self
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| CatalogError::NotFound(format!("build job {} not found", job_id)))?;
        if job.status.is_terminal() {
            return Err(CatalogError::Conflict(format!(
                "build job already {}",
                job.status
            )));
        }

        let failed = self
            .jobs
            .fail(job_id, &format!("cancelled: {}", reason))
            .await?;
        let transcript = failed.transcript();

        let claimed = self
            .store
            .transition_request(
                &failed.request_id,
                RequestStatus::Building,
                RequestStatus::Failed,
                |r| {
                    r.build_log = Some(transcript.clone());
                    r.build_completed_at = Some(Utc::now());
                },
            )
            .await;
        if claimed.is_err() {
            // Job never claimed the request; it is still in the
            // approved queue.
            if let Err(e) = self
                .store
                .transition_request(
                    &failed.request_id,
                    RequestStatus::Approved,
                    RequestStatus::Failed,
                    |r| {
                        r.build_log = Some(transcript.clone());
                        r.build_completed_at = Some(Utc::now());
                    },
                )
                .await
            {
                warn!(
                    request_id = %failed.request_id,
                    error = %e,
                    "cancelled job but request was neither building nor queued"
                );
            }
        }

        info!(job_id = %job_id, reason = %reason, "build cancelled");
        Ok(failed)
    }

    /// Most recent job for a request, if any.
    pub async fn job_for_request(&self, request_id: &str) -> Option<BuildJob> {
        self.jobs.jobs_for_request(request_id).await.into_iter().next()
    }

    pub async fn job(&self, job_id: &str) -> Option<BuildJob> {
        self.jobs.get(job_id).await
    }

    pub async fn jobs(&self) -> Vec<BuildJob> {
        self.jobs.list().await
    }

    /// Generate, validate, package, check, and publish. Any error falls
    /// back to `run`, which records the failure on job and request.
    async fn execute(&self, job: &BuildJob, request: &AppRequest) -> Result<App> {
        self.jobs
            .advance(&job.id, BuildJobStatus::Starting, BuildJobStatus::Generating)
            .await?;
        self.log_step(
            &job.id,
            &format!("Starting build (timeout {}s)", self.build_timeout.as_secs()),
        )
        .await;

        let mut spec =
            BuildSpec::new(&job.request_id, &job.title, &job.prompt).with_version(&job.version);
        if let Some(category) = &job.category {
            spec = spec.with_category(category);
        }

        let outcome = match tokio::time::timeout(self.build_timeout, self.capability.run(spec))
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(CatalogError::BuildFailure(format!(
                    "build timed out after {}s",
                    self.build_timeout.as_secs()
                )))
            }
        };

        for line in &outcome.transcript {
            self.log_step(&job.id, line).await;
        }
        if !outcome.success {
            return Err(CatalogError::BuildFailure(
                "build did not produce a usable result".to_string(),
            ));
        }

        self.jobs
            .advance(&job.id, BuildJobStatus::Generating, BuildJobStatus::Packaging)
            .await?;

        let manifest = package::validate_artifacts(&outcome)
            .map_err(|e| CatalogError::BuildFailure(e.to_string()))?;
        self.log_step(&job.id, "Build validation passed").await;

        let staged = StagedPackage::new(
            self.packages_dir.join(format!(".stage-{}.zip", job.id)),
        );
        let added = package::write_archive(&outcome, staged.path())
            .map_err(|e| CatalogError::BuildFailure(e.to_string()))?;
        for name in &added {
            self.log_step(&job.id, &format!("Added: {}", name)).await;
        }

        self.jobs
            .advance(&job.id, BuildJobStatus::Packaging, BuildJobStatus::Checking)
            .await?;

        // Post-build check over everything that ships.
        let mut source = String::new();
        for artifact in &outcome.artifacts {
            if package::is_instruction_file(&artifact.path) {
                continue;
            }
            if let Some(text) = artifact.as_text() {
                source.push_str(text);
                source.push('\n');
            }
        }
        let verdict = self.classifier.classify_code(&source);
        let safety_notes = match verdict.level {
            SafetyLevel::Unsafe => {
                self.log_step(&job.id, "ERROR: generated code failed safety check")
                    .await;
                return Err(CatalogError::BuildFailure(format!(
                    "generated code failed safety check: {}",
                    verdict.notes()
                )));
            }
            SafetyLevel::NeedsReview => {
                self.log_step(&job.id, &format!("Code flagged for review: {}", verdict.notes()))
                    .await;
                Some(verdict.notes())
            }
            SafetyLevel::Safe => {
                self.log_step(&job.id, "Code passed basic safety checks").await;
                None
            }
        };

        let name = manifest.name.clone().unwrap_or_else(|| job.title.clone());
        let description = manifest
            .description
            .clone()
            .unwrap_or_else(|| job.prompt.chars().take(500).collect());
        let category = job
            .category
            .clone()
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());

        let mut app = App::new(&name, &category)
            .with_description(&description)
            .with_author(&request.requester_id)
            .with_version(&job.version)
            .with_status(AppStatus::WildWest)
            .from_build(&job.request_id);
        app.safety_notes = safety_notes;

        let app = self.store.insert_app_with_slug(app, &slugify(&name)).await;

        let file_name = package::package_file_name(&app.slug, &app.version);
        let final_path = self.packages_dir.join(&file_name);
        tokio::fs::rename(staged.path(), &final_path)
            .await
            .map_err(|e| {
                error!(
                    app_id = %app.id,
                    slug = %app.slug,
                    error = %e,
                    "failed to move package into place"
                );
                CatalogError::BuildFailure(format!("failed to move package into place: {}", e))
            })?;
        staged.keep();

        let web_path = package::package_web_path(&file_name);
        self.log_step(&job.id, &format!("Package created: {}", web_path))
            .await;

        let app = self
            .store
            .update_app(&app.id, |a| a.package_path = Some(web_path.clone()))
            .await?;
        self.jobs.complete(&job.id, &web_path, &app.id).await?;

        self.log_step(
            &job.id,
            &format!("SUCCESS! App '{}' created with slug '{}'", app.name, app.slug),
        )
        .await;
        self.log_step(&job.id, "App is now in Wild West for testing").await;

        Ok(app)
    }

    async fn log_step(&self, job_id: &str, message: &str) {
        if let Err(e) = self.jobs.append_log(job_id, message).await {
            warn!(job_id = %job_id, error = %e, "failed to append build log");
        }
    }
}

/// Next minor version for a rebuild, resetting the patch component.
fn next_minor_version(version: &str) -> String {
    let mut parts = version.split('.');
    let major = parts.next().and_then(|p| p.parse::<u64>().ok());
    let minor = parts.next().and_then(|p| p.parse::<u64>().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => format!("{}.{}.0", major, minor + 1),
        _ => "1.1.0".to_string(),
    }
}
