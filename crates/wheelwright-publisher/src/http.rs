//! HTTP index client speaking the PyPI legacy upload API.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::time::Duration;

use wheelwright_core::artifact::StoredArtifact;
use wheelwright_core::index::{IndexClient, UploadOutcome};
use wheelwright_core::release::{Credentials, Repository};
use wheelwright_core::{Error, Result};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Uploads artifacts with multipart POSTs the way twine does.
pub struct HttpIndexClient {
    client: reqwest::Client,
    package: String,
    version: String,
}

impl HttpIndexClient {
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("wheelwright/", env!("CARGO_PKG_VERSION")))
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            package: package.into(),
            version: version.into(),
        })
    }
}

#[async_trait]
impl IndexClient for HttpIndexClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn upload(
        &self,
        repository: &Repository,
        credentials: &Credentials,
        artifact: &StoredArtifact,
    ) -> Result<UploadOutcome> {
        let name = &artifact.reference.name;
        let bytes = tokio::fs::read(&artifact.path).await?;

        let form = Form::new()
            .text(":action", "file_upload")
            .text("protocol_version", "1")
            .text("name", self.package.clone())
            .text("version", self.version.clone())
            .text("filetype", filetype(name).to_string())
            .text("pyversion", pyversion(name).to_string())
            .text("sha256_digest", artifact.reference.digest.clone())
            .part(
                "content",
                Part::bytes(bytes)
                    .file_name(name.clone())
                    .mime_str("application/octet-stream")
                    .map_err(|e| Error::Internal(e.to_string()))?,
            );

        let response = self
            .client
            .post(repository.url.clone())
            .basic_auth(&credentials.username, Some(credentials.password.expose()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("{name}: request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_response(name, status, &body)
    }
}

/// Map an index response to an outcome.
///
/// PyPI signals a duplicate with `400 File already exists`; other indexes
/// use `409 Conflict`. Both count as [`UploadOutcome::AlreadyExists`] so
/// re-running a release is idempotent. `401`/`403` mean the credentials
/// themselves were rejected, which aborts the whole phase.
fn classify_response(name: &str, status: StatusCode, body: &str) -> Result<UploadOutcome> {
    if status.is_success() {
        return Ok(UploadOutcome::Uploaded);
    }
    if status == StatusCode::CONFLICT {
        return Ok(UploadOutcome::AlreadyExists);
    }
    if status == StatusCode::BAD_REQUEST && mentions_duplicate(body) {
        return Ok(UploadOutcome::AlreadyExists);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Credential(format!(
            "index returned {status} for {name}"
        )));
    }
    Err(Error::Publish(format!(
        "{name}: index returned {status}: {}",
        summarize(body)
    )))
}

fn mentions_duplicate(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("already exists") || lower.contains("duplicate")
}

/// First line of the body, truncated, for error messages.
fn summarize(body: &str) -> String {
    let line = body.lines().next().unwrap_or("").trim();
    if line.len() > 200 {
        format!("{}...", &line[..200])
    } else {
        line.to_string()
    }
}

fn filetype(name: &str) -> &'static str {
    if name.ends_with(".whl") {
        "bdist_wheel"
    } else {
        "sdist"
    }
}

/// The python tag from a wheel file name
/// (`{dist}-{version}[-{build}]-{python}-{abi}-{platform}.whl`),
/// or `source` for anything else.
fn pyversion(name: &str) -> &str {
    if !name.ends_with(".whl") {
        return "source";
    }
    let stem = name.trim_end_matches(".whl");
    let segments: Vec<&str> = stem.split('-').collect();
    if segments.len() >= 5 {
        segments[segments.len() - 3]
    } else {
        "source"
    }
}
