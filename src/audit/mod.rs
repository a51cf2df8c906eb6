//! Audit logging of authentication events
//!
//! - Event validation and persistence
//! - Fixed-delay retry of transient store failures

pub mod logger;
pub mod retry;

pub use logger::AuditLogger;
pub use retry::RetryPolicy;
