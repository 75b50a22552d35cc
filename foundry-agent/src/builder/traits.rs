//! Build capability contract.
//!
//! The orchestrator drives any backend implementing [`BuildCapability`]:
//! production deployments point it at a remote generation service, tests
//! inject [`super::MockBuilder`]. Timeouts and cancellation are the
//! caller's responsibility; a capability just runs one build.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a build capability can produce. They surface to callers as
/// [`catalog::CatalogError::BuildFailure`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// Backend cannot be reached or refuses work right now.
    #[error("Build backend unavailable")]
    Unavailable,

    /// The backend accepted the request but the call failed.
    #[error("Build request failed: {0}")]
    RequestFailed(String),

    /// The backend refused the prompt outright.
    #[error("Build rejected: {0}")]
    Rejected(String),

    /// Transport-level failure.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The backend answered with something unintelligible.
    #[error("Failed to parse build response: {0}")]
    ParseError(String),
}

impl From<BuildError> for catalog::CatalogError {
    fn from(err: BuildError) -> Self {
        catalog::CatalogError::BuildFailure(err.to_string())
    }
}

/// What a capability is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    pub request_id: String,
    pub title: String,
    pub prompt: String,
    pub category: Option<String>,
    /// Version the produced package will carry.
    pub version: String,
}

impl BuildSpec {
    pub fn new(
        request_id: impl Into<String>,
        title: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            title: title.into(),
            prompt: prompt.into(),
            category: None,
            version: "1.0.0".to_string(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// One file produced by a build, with a package-relative path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Forward-slash relative path inside the package.
    pub path: String,
    pub contents: Vec<u8>,
}

impl ArtifactFile {
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn text(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into().into_bytes(),
        }
    }

    /// Contents as UTF-8, when they are text.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }
}

/// The result of one completed build invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// Whether the backend considers the build good. Failed outcomes still
    /// carry their transcript.
    pub success: bool,
    pub artifacts: Vec<ArtifactFile>,
    /// Backend log lines, oldest first.
    pub transcript: Vec<String>,
}

impl BuildOutcome {
    pub fn artifact(&self, path: &str) -> Option<&ArtifactFile> {
        self.artifacts.iter().find(|a| a.path == path)
    }
}

/// A backend able to turn an approved prompt into app artifacts.
#[async_trait]
pub trait BuildCapability: Send + Sync {
    /// Stable identifier for logs and job records.
    fn id(&self) -> &str;

    /// Cheap liveness probe.
    async fn is_available(&self) -> bool;

    /// Runs one build to completion.
    async fn run(&self, spec: BuildSpec) -> Result<BuildOutcome, BuildError>;
}
