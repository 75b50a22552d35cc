//! HTTP build backend.
//!
//! Speaks a small JSON protocol with a generation service: POST `/build`
//! with the spec, receive success, files, and a log. File contents travel
//! as UTF-8 text; generated apps are text all the way down (QML, JSON,
//! markdown), so the wire format has no binary leg.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::*;

pub struct RemoteBuilder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteBuilder {
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

    fn build_url(&self) -> String {
        format!("{}/build", self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }
}

/// Build request body.
#[derive(Debug, Serialize)]
struct BuildRequest<'a> {
    request_id: &'a str,
    title: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    version: &'a str,
}

/// Build response body.
#[derive(Debug, Deserialize)]
struct BuildResponse {
    success: bool,
    #[serde(default)]
    files: Vec<FileResponse>,
    #[serde(default)]
    log: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    path: String,
    contents: String,
}

#[async_trait]
impl BuildCapability for RemoteBuilder {
    fn id(&self) -> &str {
        "remote-builder"
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

    async fn run(&self, spec: BuildSpec) -> Result<BuildOutcome, BuildError> {
        let body = BuildRequest {
            request_id: &spec.request_id,
            title: &spec.title,
            prompt: &spec.prompt,
            category: spec.category.as_deref(),
            version: &spec.version,
        };

        let mut request = self.client.post(self.build_url()).json(&body);

        if let Some(auth) = self.auth_header() {
            request = request.header(header::AUTHORIZATION, auth);
        }

        debug!(request_id = %spec.request_id, "dispatching build");

        let response = request
            .send()
            .await
            .map_err(|e| BuildError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 503 {
                return Err(BuildError::Unavailable);
            }
            if status.as_u16() == 422 {
                return Err(BuildError::Rejected(body));
            }
            return Err(BuildError::RequestFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let parsed: BuildResponse = response
            .json()
            .await
            .map_err(|e| BuildError::ParseError(e.to_string()))?;

        let mut transcript = parsed.log;
        if let Some(error) = parsed.error {
            transcript.push(error);
        }

        Ok(BuildOutcome {
            success: parsed.success,
            artifacts: parsed
                .files
                .into_iter()
                .map(|f| ArtifactFile::text(f.path, f.contents))
                .collect(),
            transcript,
        })
    }
}
