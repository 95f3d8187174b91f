//! Document processing records and the pipeline API client.
//!
//! Records are owned by the status poller and replaced wholesale on every
//! successful fetch; nothing merges them incrementally.

pub mod poller;

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Processing state reported by the ingestion pipeline.
///
/// `Pending` only appears in per-index states, before an index build has
/// been scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Ingesting,
    Completed,
    Error,
    Pending,
}

impl DocumentStatus {
    /// Terminal statuses never change without external re-submission.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Error)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Ingesting => "INGESTING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Error => "ERROR",
            DocumentStatus::Pending => "PENDING",
        };
        write!(f, "{label}")
    }
}

/// Per-index build state for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub contextual_retrieval: DocumentStatus,
    pub knowledge_base: DocumentStatus,
}

/// Token spend recorded during contextual enrichment.
///
/// The pipeline historically emitted these fields in several shapes; every
/// counter defaults to zero when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_write_input_tokens: u64,
}

/// One document tracked by the pipeline, as the status endpoint reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub file_name: String,
    /// ISO-8601 upload instant, passed through as reported.
    #[serde(default)]
    pub upload_time: String,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default)]
    pub s3_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_job_id: Option<String>,
    /// Raw ingestion-job status string from the backing service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_status: Option<IndexStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

/// True when the list is non-empty and every record is terminal — the
/// predicate that halts the poller.
pub fn all_terminal(records: &[DocumentRecord]) -> bool {
    !records.is_empty() && records.iter().all(|record| record.status.is_terminal())
}

/// Categories of status endpoint failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection or request timeout
    Timeout,
    /// Response body failed to parse
    Parse,
    /// Request never completed (DNS, refused connection, ...)
    Network,
    /// The request was rejected before leaving the client
    InvalidRequest,
}

/// Structured status endpoint error; surfaced inline and never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn http_status(status: u16) -> Self {
        Self::new(FetchErrorKind::HttpStatus, format!("HTTP {status}"))
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_decode() {
            FetchErrorKind::Parse
        } else {
            FetchErrorKind::Network
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FetchError {}

/// Receipt returned by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub document_id: String,
    pub file_name: String,
    #[serde(default)]
    pub s3_url: String,
    pub status: DocumentStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    file: String,
    file_name: &'a str,
    file_type: &'a str,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    documents: Vec<DocumentRecord>,
}

/// HTTP client for the document pipeline API.
#[derive(Debug, Clone)]
pub struct DocumentsClient {
    http: reqwest::Client,
    api_url: String,
}

impl DocumentsClient {
    pub fn new(api_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetches the full status list. The caller replaces any previous list
    /// wholesale with the result.
    ///
    /// # Errors
    /// Returns a `FetchError` on transport, HTTP status, or decode failure.
    pub async fn fetch_status(&self) -> Result<Vec<DocumentRecord>, FetchError> {
        let url = format!("{}/documents", self.api_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(&err))?;
        if !response.status().is_success() {
            return Err(FetchError::http_status(response.status().as_u16()));
        }
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|err| FetchError::from_reqwest(&err))?;
        Ok(body.documents)
    }

    /// Uploads a PDF for processing. The pipeline only accepts PDFs, so
    /// other file names are rejected before the request leaves the client.
    ///
    /// # Errors
    /// Returns a `FetchError` for non-PDF names and transport failures.
    pub async fn upload(
        &self,
        file_name: &str,
        content: &[u8],
    ) -> Result<UploadReceipt, FetchError> {
        if !file_name.to_ascii_lowercase().ends_with(".pdf") {
            return Err(FetchError::new(
                FetchErrorKind::InvalidRequest,
                "only PDF files are supported",
            ));
        }
        let request = UploadRequest {
            file: BASE64.encode(content),
            file_name,
            file_type: "application/pdf",
        };
        let url = format!("{}/documents", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(&err))?;
        if !response.status().is_success() {
            return Err(FetchError::http_status(response.status().as_u16()));
        }
        response
            .json()
            .await
            .map_err(|err| FetchError::from_reqwest(&err))
    }
}
