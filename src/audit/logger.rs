//! Authentication audit logger

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::retry::RetryPolicy;
use crate::database::EventStore;
use crate::error::AuditError;
use crate::models::AuthEvent;

/// Persists authentication events to an append-only store
///
/// Events missing a type or subject are rejected without touching the store.
/// Transient store failures are retried according to the [`RetryPolicy`].
/// There is no ordering guarantee across events.
pub struct AuditLogger {
    store: Arc<dyn EventStore>,
    retry: RetryPolicy,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn EventStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Create a logger with the default retry policy
    pub fn with_defaults(store: Arc<dyn EventStore>) -> Self {
        Self::new(store, RetryPolicy::default())
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Log an event, returning the stored row id
    pub async fn log(&self, mut event: AuthEvent) -> Result<i64, AuditError> {
        if event.event_type.trim().is_empty() {
            return Err(AuditError::Validation("event type is required".to_string()));
        }
        if event.user_id.trim().is_empty() {
            return Err(AuditError::Validation("user id is required".to_string()));
        }

        event.timestamp = Utc::now();

        let id = self
            .retry
            .execute(|| self.store.insert_event(&event))
            .await?;

        debug!(
            event_type = %event.event_type,
            user_id = %event.user_id,
            event_id = id,
            "Audit event stored"
        );

        Ok(id)
    }
}
