//! Domain models for user-service
//!
//! This module contains the core domain models used throughout the application.

pub mod event;
pub mod user;

// Re-export commonly used types
pub use event::{AuthEvent, AuthEventType};
pub use user::{
    normalize_email, LoginRequest, LoginResponse, NewUser, RegisterRequest, User, UserResponse,
};
