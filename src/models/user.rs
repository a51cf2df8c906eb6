//! User-related domain models
//!
//! This module defines the stored user record and the request/response
//! payloads of the registration and login endpoints.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minimum accepted password length at registration
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Normalize an email for storage and lookup
///
/// Both sides of every comparison must go through this function.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn email_regex() -> &'static regex_lite::Regex {
    static RE: OnceLock<regex_lite::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex_lite::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .expect("Invalid regex pattern for email validation")
    })
}

/// Check that a string looks like an email address
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

/// User record stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Storage-assigned identifier (UUID v4)
    pub id: String,

    /// Normalized (lowercase) email, unique
    pub email: String,

    /// Argon2id PHC hash of the password
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Role label, e.g. "user" or "admin"
    pub role: String,

    /// When the user was created
    pub created_at: DateTime<Utc>,
}

/// User data handed to the repository on registration
///
/// The repository assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

impl NewUser {
    /// Create a new user record, normalizing the email
    pub fn new(
        email: impl AsRef<str>,
        password_hash: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            email: normalize_email(email.as_ref()),
            password_hash: password_hash.into(),
            role: role.into(),
        }
    }
}

/// Registration request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
}

impl RegisterRequest {
    /// Create a registration request
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: role.into(),
        }
    }

    /// Validate field formats
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::Required("email"));
        }
        if !is_valid_email(&self.email) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        if self.password.is_empty() {
            return Err(ValidationError::Required("password"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LENGTH));
        }
        if self.role.trim().is_empty() {
            return Err(ValidationError::Required("role"));
        }
        Ok(())
    }
}

/// Login request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// Create a login request
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Validate field formats
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::Required("email"));
        }
        if !is_valid_email(&self.email) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        if self.password.is_empty() {
            return Err(ValidationError::Required("password"));
        }
        Ok(())
    }
}

/// Public view of a user, returned by registration and the profile route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

/// Login response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Signed bearer token
    pub token: String,
}
