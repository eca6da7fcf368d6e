//! Error types for reportfeed.
//!
//! One error type with explicit variants for authentication, store, write
//! and input validation failures. Nothing here is fatal: every variant is
//! recoverable by re-authenticating or retrying by hand.

use std::fmt;
use thiserror::Error;

use crate::types::{RecordId, TableName};

/// The unified error type for reportfeed operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication errors (bad credentials, missing or expired session).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Store errors (network failure, query rejection).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A create or update was rejected. The caller should keep its input.
    #[error("write error: {0}")]
    Write(#[from] WriteError),

    /// Input validation errors (table names, ids, URLs, form fields).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

impl Error {
    /// Returns true if recovering from this error requires signing in again.
    pub fn is_auth(&self) -> bool {
        match self {
            Error::Auth(_) => true,
            Error::Store(StoreError::Rejected(p)) => p.is_auth_error(),
            Error::Write(w) => matches!(&w.source, StoreError::Rejected(p) if p.is_auth_error()),
            _ => false,
        }
    }

    /// Converts a store failure raised during a create or update into a
    /// [`WriteError`]. Other variants pass through unchanged.
    pub fn into_write(self, table: &TableName) -> Self {
        match self {
            Error::Store(source) => Error::Write(WriteError {
                table: table.clone(),
                source,
            }),
            other => other,
        }
    }
}

/// Authentication-related errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Invalid credentials provided.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// No session is active.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Session has expired.
    #[error("session expired")]
    SessionExpired,

    /// The session is valid but not allowed to touch this resource.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// An account already exists for this email.
    #[error("an account already exists for {0}")]
    EmailTaken(String),

    /// The password does not satisfy the backend's policy.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Refresh token is invalid or expired.
    #[error("refresh token invalid")]
    RefreshTokenInvalid,
}

/// Store-level errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network connection failed.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// The backend answered with an error response.
    #[error("rejected: {0}")]
    Rejected(ProtocolError),

    /// The addressed row does not exist.
    #[error("{table}/{id} not found")]
    NotFound { table: TableName, id: RecordId },

    /// The backend answered with something that is not a valid row.
    #[error("malformed response: {message}")]
    Malformed { message: String },

    /// Local filesystem failure (file-backed store).
    #[error("IO error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Store(StoreError::from(err))
    }
}

/// A failed create or update against a table.
#[derive(Debug, Error)]
#[error("writing to {table} failed: {source}")]
pub struct WriteError {
    /// The table that rejected the write.
    pub table: TableName,
    /// The underlying store failure.
    #[source]
    pub source: StoreError,
}

/// An error response returned by the backend.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    /// HTTP status code.
    pub status: u16,
    /// Backend error code (if present).
    pub code: Option<String>,
    /// Error message from the server.
    pub message: Option<String>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Create a new protocol error.
    pub fn new(status: u16, code: Option<String>, message: Option<String>) -> Self {
        Self {
            status,
            code,
            message,
        }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        self.status == 401
            || self.code.as_deref() == Some("PGRST301")
            || self.code.as_deref() == Some("invalid_jwt")
    }
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid table name.
    #[error("invalid table name '{value}': {reason}")]
    TableName { value: String, reason: String },

    /// Invalid record id.
    #[error("invalid record id '{value}': {reason}")]
    RecordId { value: String, reason: String },

    /// Invalid user id.
    #[error("invalid user id '{value}': {reason}")]
    UserId { value: String, reason: String },

    /// Invalid backend URL.
    #[error("invalid backend URL '{value}': {reason}")]
    StoreUrl { value: String, reason: String },

    /// A row or record that does not have the required shape.
    #[error("invalid row: {reason}")]
    Row { reason: String },

    /// A form field that failed validation before reaching the backend.
    #[error("{field}: {reason}")]
    Field { field: &'static str, reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}
