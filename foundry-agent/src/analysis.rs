//! Optional semantic analysis behind the rule-based classifier.
//!
//! The rules are blunt by design; a deployment can point this trait at a
//! smarter service for prompts the rules have no opinion on. Analyzers may
//! abstain, and every failure mode degrades to the rule verdict.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::verdict::{SafetyLevel, Verdict};

/// Errors from a semantic analysis backend.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analyzer unavailable")]
    Unavailable,

    #[error("Analysis request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Failed to parse analyzer response: {0}")]
    ParseError(String),
}

/// A backend that can judge prompts the rule tables pass.
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    /// Stable identifier for logs.
    fn id(&self) -> &str;

    /// Cheap liveness probe; unavailable analyzers are skipped entirely.
    async fn is_available(&self) -> bool;

    /// Returns `Some(verdict)` when the analyzer reached a conclusion,
    /// `None` when it abstains.
    async fn analyze(&self, prompt: &str) -> Result<Option<Verdict>, AnalysisError>;
}

/// HTTP analyzer speaking a small JSON protocol: POST `/analyze` with the
/// prompt, receive an optional verdict.
pub struct RemoteAnalyzer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteAnalyzer {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn analyze_url(&self) -> String {
        format!("{}/analyze", self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    verdict: Option<VerdictResponse>,
}

#[derive(Debug, Deserialize)]
struct VerdictResponse {
    level: SafetyLevel,
    score: f32,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    needs_human_review: bool,
}

#[async_trait]
impl SemanticAnalyzer for RemoteAnalyzer {
    fn id(&self) -> &str {
        "remote-analyzer"
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let mut request = self.client.get(&url);

        if let Some(auth) = self.auth_header() {
            request = request.header(header::AUTHORIZATION, auth);
        }

        request
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn analyze(&self, prompt: &str) -> Result<Option<Verdict>, AnalysisError> {
        let mut request = self
            .client
            .post(self.analyze_url())
            .json(&AnalyzeRequest { prompt });

        if let Some(auth) = self.auth_header() {
            request = request.header(header::AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::RequestFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ParseError(e.to_string()))?;

        Ok(parsed.verdict.map(|v| Verdict {
            level: v.level,
            score: v.score,
            reasons: v.reasons,
            needs_human_review: v.needs_human_review,
        }))
    }
}

/// Scriptable analyzer for tests.
pub struct MockAnalyzer {
    available: AtomicBool,
    verdict: Option<Verdict>,
    fail_with: Option<String>,
    call_count: AtomicU32,
}

impl MockAnalyzer {
    /// Abstaining analyzer: available, reaches no conclusion.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            verdict: None,
            fail_with: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Always concludes with the given verdict.
    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Always fails with a request error.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemanticAnalyzer for MockAnalyzer {
    fn id(&self) -> &str {
        "mock-analyzer"
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn analyze(&self, _prompt: &str) -> Result<Option<Verdict>, AnalysisError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(AnalysisError::Unavailable);
        }
        if let Some(message) = &self.fail_with {
            return Err(AnalysisError::RequestFailed(message.clone()));
        }
        Ok(self.verdict.clone())
    }
}
