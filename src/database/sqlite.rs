//! SQLite implementation of the storage traits
//!
//! This module provides a SQLite-based implementation of `UserRepository`
//! and `EventStore` using rusqlite and tokio-rusqlite for async operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::migrations::{migration_version, CREATE_SCHEMA};
use super::{EventStore, UserRepository};
use crate::error::DbError;
use crate::models::{normalize_email, AuthEvent, NewUser, User};

/// SQLite database implementation
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Create a new SQLite database connection
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            conn.pragma_update(None, "user_version", migration_version())?;
            Ok(())
        })
        .await
        .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }
}

#[async_trait]
impl UserRepository for SqliteDatabase {
    async fn create_user(&self, user: &NewUser) -> Result<User, DbError> {
        let record = User {
            id: Uuid::new_v4().to_string(),
            email: normalize_email(&user.email),
            password_hash: user.password_hash.clone(),
            role: user.role.clone(),
            created_at: Utc::now(),
        };

        let id = record.id.clone();
        let email = record.email.clone();
        let password_hash = record.password_hash.clone();
        let role = record.role.clone();
        let created_at = record.created_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO users (id, email, password_hash, role, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    rusqlite::params![id, email, password_hash, role, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| classify_write_error(e.into()))?;

        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let email = normalize_email(email);

        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        r#"
                        SELECT id, email, password_hash, role, created_at
                        FROM users
                        WHERE email = ?1
                        "#,
                        [&email],
                        user_from_row,
                    )
                    .optional()?;

                Ok(user)
            })
            .await
            .map_err(Into::into)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DbError> {
        let id = id.to_string();

        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        r#"
                        SELECT id, email, password_hash, role, created_at
                        FROM users
                        WHERE id = ?1
                        "#,
                        [&id],
                        user_from_row,
                    )
                    .optional()?;

                Ok(user)
            })
            .await
            .map_err(Into::into)
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl EventStore for SqliteDatabase {
    async fn insert_event(&self, event: &AuthEvent) -> Result<i64, DbError> {
        let event_type = event.event_type.clone();
        let user_id = event.user_id.clone();
        let timestamp = event.timestamp.to_rfc3339();
        let ip = event.ip.clone();
        let metadata = event.metadata.as_ref().map(|m| m.to_string());

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO auth_events (event_type, user_id, timestamp, ip, metadata)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    rusqlite::params![event_type, user_id, timestamp, ip, metadata],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| classify_write_error(e.into()))
    }

    async fn list_events(&self, user_id: &str, limit: u32) -> Result<Vec<AuthEvent>, DbError> {
        let user_id = user_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, event_type, user_id, timestamp, ip, metadata
                    FROM auth_events
                    WHERE user_id = ?1
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ?2
                    "#,
                )?;

                let events = stmt
                    .query_map(rusqlite::params![user_id, limit], |row| {
                        Ok(AuthEvent {
                            id: Some(row.get(0)?),
                            event_type: row.get(1)?,
                            user_id: row.get(2)?,
                            timestamp: parse_datetime(row.get::<_, Option<String>>(3)?)
                                .unwrap_or_else(Utc::now),
                            ip: row.get(4)?,
                            metadata: row
                                .get::<_, Option<String>>(5)?
                                .and_then(|m| serde_json::from_str(&m).ok()),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(events)
            })
            .await
            .map_err(Into::into)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        created_at: parse_datetime(row.get::<_, Option<String>>(4)?).unwrap_or_else(Utc::now),
    })
}

/// Surface SQLite constraint failures as `DbError::ConstraintViolation`
fn classify_write_error(err: DbError) -> DbError {
    match err {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, message))
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::ConstraintViolation(message.unwrap_or_else(|| failure.to_string()))
        }
        other => other,
    }
}

/// Parse a datetime string to DateTime<Utc>
fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                // Try parsing SQLite's datetime format
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    })
}
