//! Application error types for user-service
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Authentication-related errors
///
/// Credential and token failures are deliberately coarse: a caller can learn
/// that a login or a token was rejected, never which check rejected it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// A user with the same (normalized) email already exists
    #[error("user already exists")]
    Conflict,

    /// Unknown email or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token failed signature, algorithm, expiry, issuer or audience checks
    #[error("invalid or expired token")]
    InvalidToken,

    /// Authorization header absent or not of the form `Bearer <token>`
    #[error("missing or malformed authorization header")]
    MalformedHeader,

    /// Verified token carries no subject claim
    #[error("missing subject claim")]
    MissingSubject,

    /// Subject claim is present but not a non-empty string
    #[error("subject claim must be a non-empty string")]
    InvalidSubject,

    /// Per-client request quota exhausted
    #[error("rate limit exceeded")]
    RateLimited,

    /// Password hashing failed
    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// Token signing failed
    #[error("token generation failed: {0}")]
    TokenGeneration(String),

    /// Repository lookup or write failed
    #[error("storage error: {0}")]
    Storage(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Store could not be reached (connection dropped, pool closed)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Audit logging errors
#[derive(Debug, Error)]
pub enum AuditError {
    /// Event rejected before any write was attempted
    #[error("invalid audit event: {0}")]
    Validation(String),

    /// Event store rejected the write (after retries, when transient)
    #[error("audit store error: {0}")]
    Store(#[from] DbError),
}

/// Request payload validation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Required field is missing or blank
    #[error("{0} is required")]
    Required(&'static str),

    /// Email does not look like an address
    #[error("invalid email format: {0}")]
    InvalidEmail(String),

    /// Password shorter than the minimum length
    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for DbError {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection-class failures
            DbError::Unavailable(_) => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),

            DbError::Sqlite(_) => false,
            DbError::ConstraintViolation(_) => false,
            DbError::Migration(_) => false,
        }
    }
}

impl From<tokio_rusqlite::Error> for DbError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(err) => DbError::Sqlite(err),
            // Background connection thread is gone
            other => DbError::Unavailable(other.to_string()),
        }
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        AuthError::Storage(err.to_string())
    }
}
