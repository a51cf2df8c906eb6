//! Authentication system for user-service
//!
//! This module provides authentication and authorization functionality:
//! - Password hashing and verification
//! - Signed token generation and validation
//! - Registration and login
//! - Per-client request rate limiting

pub mod jwt;
pub mod password;
pub mod ratelimit;
pub mod service;

pub use jwt::{Claims, JwtService, TokenService, VerifiedClaims};
pub use password::PasswordHasher;
pub use ratelimit::{Clock, ManualClock, RateLimitConfig, RateLimiter, SystemClock};
pub use service::AuthService;
