//! Authentication audit event models

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of authentication action being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthEventType {
    Register,
    Login,
}

impl AuthEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEventType::Register => "register",
            AuthEventType::Login => "login",
        }
    }
}

impl fmt::Display for AuthEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of an authentication action
///
/// Append-only. `timestamp` is overwritten by the audit logger at log time,
/// so whatever a caller puts there is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthEvent {
    /// Row id assigned by the event store (None until persisted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Event type, the string form of [`AuthEventType`]
    pub event_type: String,

    /// Subject user id
    pub user_id: String,

    /// Server-assigned time of logging
    pub timestamp: DateTime<Utc>,

    /// Origin address of the request, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuthEvent {
    /// Create a new event for a user
    pub fn new(event_type: AuthEventType, user_id: impl Into<String>) -> Self {
        Self {
            id: None,
            event_type: event_type.as_str().to_string(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            ip: None,
            metadata: None,
        }
    }

    /// Set the origin address
    pub fn with_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.ip = ip.map(|ip| ip.to_string());
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
