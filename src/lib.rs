//! user-service - User registration, login and bearer-token verification
//!
//! This crate issues signed tokens to registered users and verifies them on
//! protected routes. Passwords are stored as Argon2id hashes, authentication
//! events are written to an append-only audit log, and requests are rate
//! limited per client address.

pub mod audit;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod otel;
pub mod server;
