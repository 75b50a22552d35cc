//! Scriptable build capability for tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::*;

/// Mock capability: by default it synthesizes a minimal valid app for
/// whatever spec it receives; every part of the outcome can be scripted.
pub struct MockBuilder {
    available: AtomicBool,
    artifacts: Option<Vec<ArtifactFile>>,
    transcript: Vec<String>,
    succeed: bool,
    fail_with: Option<String>,
    delay: Option<Duration>,
    call_count: AtomicU32,
}

impl MockBuilder {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            artifacts: None,
            transcript: vec!["mock build complete".to_string()],
            succeed: true,
            fail_with: None,
            delay: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Replaces the synthesized artifacts with a scripted set.
    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactFile>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_transcript(mut self, transcript: Vec<String>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Produces an unsuccessful outcome (the backend ran but gave up).
    pub fn with_unsuccessful_outcome(mut self) -> Self {
        self.succeed = false;
        self
    }

    /// Fails the call itself with a request error.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Sleeps before answering; lets timeout and cancellation tests hold a
    /// build open.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn default_artifacts(spec: &BuildSpec) -> Vec<ArtifactFile> {
        let manifest = serde_json::json!({
            "name": spec.title,
            "version": spec.version,
            "app": { "entry": "app/main.qml" }
        });
        vec![
            ArtifactFile::text("manifest.json", manifest.to_string()),
            ArtifactFile::text(
                "app/main.qml",
                "import QtQuick\n\nRectangle {\n    width: 320\n    height: 240\n}\n",
            ),
            ArtifactFile::text("BUILD.md", format!("Build notes for {}\n", spec.title)),
        ]
    }
}

impl Default for MockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildCapability for MockBuilder {
    fn id(&self) -> &str {
        "mock-builder"
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn run(&self, spec: BuildSpec) -> Result<BuildOutcome, BuildError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(BuildError::Unavailable);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(BuildError::RequestFailed(message.clone()));
        }

        let artifacts = match &self.artifacts {
            Some(scripted) => scripted.clone(),
            None => Self::default_artifacts(&spec),
        };

        Ok(BuildOutcome {
            success: self.succeed,
            artifacts,
            transcript: self.transcript.clone(),
        })
    }
}
