//! Application error taxonomy shared by injected faults and host services.
//!
//! An [`AppError`] is what the injection middleware materializes when a rule
//! fires. Every [`ErrorKind`] maps to an HTTP status code through
//! [`ErrorKind::status_code`]; kinds the taxonomy does not know about are kept
//! verbatim as [`ErrorKind::Unknown`] and map to `500`.

use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Error kinds, grouped into client, server and storage-domain classes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    // Client
    BadRequest,
    NotFound,
    Conflict,
    // Server
    Internal,
    Timeout,
    DatabaseError,
    StorageError,
    // Storage domain
    BucketAlreadyExists,
    BucketNotFound,
    ObjectNotFound,
    /// A kind name outside the taxonomy, preserved as given.
    Unknown(String),
}

impl ErrorKind {
    /// Wire name of this kind (e.g. `STORAGE_ERROR`).
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::DatabaseError => "DATABASE_ERROR",
            ErrorKind::StorageError => "STORAGE_ERROR",
            ErrorKind::BucketAlreadyExists => "BUCKET_ALREADY_EXISTS",
            ErrorKind::BucketNotFound => "BUCKET_NOT_FOUND",
            ErrorKind::ObjectNotFound => "OBJECT_NOT_FOUND",
            ErrorKind::Unknown(name) => name,
        }
    }

    /// Parse a wire name. Matching is case-insensitive; anything
    /// unrecognized becomes [`ErrorKind::Unknown`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "BAD_REQUEST" => ErrorKind::BadRequest,
            "NOT_FOUND" => ErrorKind::NotFound,
            "CONFLICT" => ErrorKind::Conflict,
            "INTERNAL_ERROR" | "INTERNAL" => ErrorKind::Internal,
            "TIMEOUT" => ErrorKind::Timeout,
            "DATABASE_ERROR" => ErrorKind::DatabaseError,
            "STORAGE_ERROR" => ErrorKind::StorageError,
            "BUCKET_ALREADY_EXISTS" => ErrorKind::BucketAlreadyExists,
            "BUCKET_NOT_FOUND" => ErrorKind::BucketNotFound,
            "OBJECT_NOT_FOUND" => ErrorKind::ObjectNotFound,
            _ => ErrorKind::Unknown(name.to_string()),
        }
    }

    /// Nearest HTTP status for this kind. Total: unknown kinds are `500`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound | ErrorKind::BucketNotFound | ErrorKind::ObjectNotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorKind::Conflict | ErrorKind::BucketAlreadyExists => StatusCode::CONFLICT,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal
            | ErrorKind::DatabaseError
            | ErrorKind::StorageError
            | ErrorKind::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<String> for ErrorKind {
    fn from(value: String) -> Self {
        ErrorKind::parse(&value)
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A typed application error with an optional chained cause.
#[derive(Clone)]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    cause: Option<Cause>,
}

/// JSON shape of an [`AppError`] on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppErrorBody {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            request_id: None,
            cause: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, "CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "INTERNAL_ERROR", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, "TIMEOUT", message)
    }

    /// Attach the request id the error was raised for.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach an underlying cause for diagnostic chaining.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    pub fn body(&self) -> AppErrorBody {
        AppErrorBody {
            kind: self.kind.clone(),
            code: self.code.clone(),
            message: self.message.clone(),
            request_id: self.request_id.clone(),
        }
    }

    /// Serialized JSON body. Falls back to a minimal document if
    /// serialization fails.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.body())
            .unwrap_or_else(|_| format!("{{\"message\":\"{}\"}}", self.kind))
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("request_id", &self.request_id)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}
