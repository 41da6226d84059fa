//! Screening of uploaded file descriptors.
//!
//! # Responsibilities
//! - Enforce the per-file size cap and filename length
//! - Refuse executable and script extensions outright
//! - Check the extension against the allowlist and the declared MIME type
//!   against the extension
//!
//! # Design Decisions
//! - Runs after body validation, so descriptors are already normalized and
//!   HTML-escaped; the only escape a MIME type can carry is the slash
//! - The executable denylist is checked before the allowlist so that a
//!   configured allowlist can never re-admit `.exe` or `.php`

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::UploadConfig;
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::sanitize::middleware::{is_json, parse_json, read_body};

/// Extensions accepted for document uploads by default.
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "jpg", "jpeg", "png", "gif",
];

pub const MAX_FILENAME_CHARS: usize = 255;

const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "pif", "scr", "vbs", "js", "jar", "php", "asp", "jsp",
];

const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/jpeg",
    "image/png",
    "image/gif",
    "text/plain",
];

const DESCRIPTOR_BODY_LIMIT: usize = 256 * 1024;

/// MIME types a given extension may declare.
fn expected_mime_types(extension: &str) -> Option<&'static [&'static str]> {
    Some(match extension {
        "pdf" => &["application/pdf"],
        "doc" | "docx" => &[
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ],
        "xls" | "xlsx" => &[
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ],
        "ppt" | "pptx" => &[
            "application/vnd.ms-powerpoint",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ],
        "jpg" | "jpeg" => &["image/jpeg"],
        "png" => &["image/png"],
        "gif" => &["image/gif"],
        "txt" => &["text/plain"],
        _ => return None,
    })
}

fn megabytes(bytes: &u64) -> u64 {
    (*bytes as f64 / (1024.0 * 1024.0)).round() as u64
}

/// Client-declared metadata of one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub original_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size: u64,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, mime_type: Option<&str>, size: u64) -> Self {
        Self {
            original_name: original_name.into(),
            mime_type: mime_type.map(str::to_string),
            size,
        }
    }

    /// Lowercased extension after the last dot.
    pub fn extension(&self) -> Option<String> {
        self.original_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    fn mime(&self) -> Option<String> {
        self.mime_type
            .as_deref()
            .map(|m| m.replace("&#x2F;", "/").trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
    }
}

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileRejection {
    #[error("File too large. Maximum size is {}MB", megabytes(.max_bytes))]
    TooLarge { size: u64, max_bytes: u64 },

    #[error("Filename too long (max 255 characters)")]
    NameTooLong,

    #[error("Suspicious file detected. Upload rejected for security reasons.")]
    Executable { filename: String },

    #[error("Invalid file type. Allowed types: {}", .allowed.join(", "))]
    ExtensionNotAllowed {
        extension: Option<String>,
        allowed: Vec<String>,
    },

    #[error("Invalid file type. Only PDF, Word, PowerPoint, Excel, images, and text files are allowed")]
    UnsupportedMimeType { mime_type: String },

    #[error("File extension and MIME type mismatch. Potential security risk detected.")]
    MimeMismatch { extension: String, mime_type: String },
}

impl FileRejection {
    /// Name of the security event logged for this rejection.
    pub fn security_event(&self) -> &'static str {
        match self {
            FileRejection::TooLarge { .. } => "file_size_exceeded",
            FileRejection::NameTooLong => "file_name_too_long",
            FileRejection::Executable { .. } => "suspicious_file_detected",
            FileRejection::ExtensionNotAllowed { .. } | FileRejection::UnsupportedMimeType { .. } => {
                "invalid_file_type"
            }
            FileRejection::MimeMismatch { .. } => "mime_type_mismatch",
        }
    }
}

/// Upload limits for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRules {
    allowed_extensions: Vec<String>,
    max_bytes: u64,
}

impl FileRules {
    pub fn new(allowed_extensions: &[&str], max_bytes: u64) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
            max_bytes,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_bytes: config.max_file_bytes,
        }
    }

    /// Screen one file; the first failed rule wins.
    pub fn check(&self, file: &UploadedFile) -> Result<(), FileRejection> {
        if file.size > self.max_bytes {
            return Err(FileRejection::TooLarge {
                size: file.size,
                max_bytes: self.max_bytes,
            });
        }
        if file.original_name.chars().count() > MAX_FILENAME_CHARS {
            return Err(FileRejection::NameTooLong);
        }

        let extension = file.extension();
        if extension
            .as_deref()
            .is_some_and(|ext| EXECUTABLE_EXTENSIONS.contains(&ext))
        {
            return Err(FileRejection::Executable {
                filename: file.original_name.clone(),
            });
        }
        let Some(extension) = extension.filter(|ext| self.allowed_extensions.contains(ext)) else {
            return Err(FileRejection::ExtensionNotAllowed {
                extension: file.extension(),
                allowed: self.allowed_extensions.clone(),
            });
        };

        if let Some(mime_type) = file.mime() {
            if !ACCEPTED_MIME_TYPES.contains(&mime_type.as_str()) {
                return Err(FileRejection::UnsupportedMimeType { mime_type });
            }
            if expected_mime_types(&extension).is_some_and(|expected| !expected.contains(&mime_type.as_str())) {
                return Err(FileRejection::MimeMismatch {
                    extension,
                    mime_type,
                });
            }
        }
        Ok(())
    }
}

impl Default for FileRules {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

/// File descriptors carried by a body under `file` or `files`.
fn descriptors(body: &Value) -> Result<Vec<UploadedFile>, serde_json::Error> {
    let mut files = Vec::new();
    if let Some(file) = body.get("file").filter(|v| !v.is_null()) {
        files.push(UploadedFile::deserialize(file)?);
    }
    if let Some(Value::Array(items)) = body.get("files") {
        for item in items {
            files.push(UploadedFile::deserialize(item)?);
        }
    }
    Ok(files)
}

async fn screen_upload(rules: &FileRules, request: Request<Body>) -> Result<Request<Body>, ApiError> {
    if !is_json(&request) {
        return Ok(request);
    }
    let (parts, bytes) = read_body(request, DESCRIPTOR_BODY_LIMIT).await?;
    let body = parse_json(&bytes)?;
    let files = descriptors(&body).map_err(|e| {
        tracing::debug!(error = %e, "Malformed file descriptor");
        ApiError::InvalidJson
    })?;

    for file in &files {
        if let Err(rejection) = rules.check(file) {
            tracing::warn!(
                security_event = rejection.security_event(),
                path = %parts.uri.path(),
                filename = %file.original_name,
                size = file.size,
                reason = %rejection,
                "Rejected file upload"
            );
            metrics::record_upload_rejected(rejection.security_event());
            return Err(ApiError::FileRejected(rejection));
        }
    }
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Refuse requests whose file descriptors break `rules`.
pub async fn file_upload_middleware(
    State(rules): State<Arc<FileRules>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match screen_upload(&rules, request).await {
        Ok(request) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Bytes, http::StatusCode, middleware, routing::post, Router};
    use serde_json::json;
    use tower::ServiceExt;

    const MB: u64 = 1024 * 1024;

    fn rules() -> FileRules {
        FileRules::new(&["pdf", "docx", "png"], 10 * MB)
    }

    #[test]
    fn test_accepts_matching_document() {
        assert_eq!(rules().check(&UploadedFile::new("Deck.PDF", Some("application/pdf"), MB)), Ok(()));
        assert_eq!(rules().check(&UploadedFile::new("logo.png", None, 10)), Ok(()));
    }

    #[test]
    fn test_size_cap() {
        let err = rules()
            .check(&UploadedFile::new("deck.pdf", Some("application/pdf"), 10 * MB + 1))
            .unwrap_err();
        assert_eq!(err.to_string(), "File too large. Maximum size is 10MB");
        assert_eq!(err.security_event(), "file_size_exceeded");
    }

    #[test]
    fn test_extension_allowlist() {
        let err = rules()
            .check(&UploadedFile::new("notes.txt", Some("text/plain"), 10))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid file type. Allowed types: pdf, docx, png");
        assert!(matches!(
            rules().check(&UploadedFile::new("README", None, 10)),
            Err(FileRejection::ExtensionNotAllowed { extension: None, .. })
        ));
    }

    #[test]
    fn test_executables_refused_even_when_allowed() {
        let permissive = FileRules::new(&["pdf", "js"], 10 * MB);
        let err = permissive
            .check(&UploadedFile::new("invoice.pdf.js", Some("text/plain"), 10))
            .unwrap_err();
        assert_eq!(err.security_event(), "suspicious_file_detected");
        assert!(matches!(
            rules().check(&UploadedFile::new("setup.EXE", None, 10)),
            Err(FileRejection::Executable { .. })
        ));
    }

    #[test]
    fn test_mime_must_match_extension() {
        let err = rules()
            .check(&UploadedFile::new("deck.pdf", Some("image/png"), 10))
            .unwrap_err();
        assert_eq!(
            err,
            FileRejection::MimeMismatch {
                extension: "pdf".into(),
                mime_type: "image/png".into(),
            }
        );
        // Escaped slashes from sanitized bodies are understood.
        assert_eq!(
            rules().check(&UploadedFile::new("deck.pdf", Some("application&#x2F;pdf"), 10)),
            Ok(())
        );
        assert!(matches!(
            rules().check(&UploadedFile::new("deck.pdf", Some("application/x-msdownload"), 10)),
            Err(FileRejection::UnsupportedMimeType { .. })
        ));
    }

    #[test]
    fn test_long_filename_refused() {
        let name = format!("{}.pdf", "a".repeat(MAX_FILENAME_CHARS));
        assert_eq!(
            rules().check(&UploadedFile::new(name, None, 10)),
            Err(FileRejection::NameTooLong)
        );
    }

    fn app() -> Router {
        Router::new()
            .route("/upload", post(|body: Bytes| async move { body }))
            .layer(middleware::from_fn_with_state(
                Arc::new(rules()),
                file_upload_middleware,
            ))
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_middleware_screens_every_descriptor() {
        let ok = json!({ "files": [
            { "originalName": "a.pdf", "mimeType": "application/pdf", "size": 10 },
            { "originalName": "b.png", "mimeType": "image/png", "size": 10 },
        ]});
        let response = app().oneshot(post_json(ok)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bad = json!({ "files": [
            { "originalName": "a.pdf", "mimeType": "application/pdf", "size": 10 },
            { "originalName": "run.bat", "size": 10 },
        ]});
        let response = app().oneshot(post_json(bad)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body["message"],
            "Suspicious file detected. Upload rejected for security reasons."
        );
    }

    #[tokio::test]
    async fn test_middleware_passes_bodies_without_files() {
        let response = app()
            .oneshot(post_json(json!({ "description": "no attachment" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
