//! Database layer for user-service
//!
//! This module defines the storage traits and their SQLite implementation.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteDatabase;

use async_trait::async_trait;

use crate::error::DbError;
use crate::models::{AuthEvent, NewUser, User};

/// User persistence
///
/// Emails are compared in normalized (trimmed, lowercase) form.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user and return the stored record
    ///
    /// Fails with `DbError::ConstraintViolation` when the email is taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, DbError>;

    /// Look up a user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    /// Look up a user by id
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DbError>;

    /// Check the store is reachable
    async fn ping(&self) -> Result<(), DbError>;
}

/// Append-only storage for authentication audit events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event, returning its row id
    async fn insert_event(&self, event: &AuthEvent) -> Result<i64, DbError>;

    /// Most recent events for a user, newest first
    async fn list_events(&self, user_id: &str, limit: u32) -> Result<Vec<AuthEvent>, DbError>;
}
