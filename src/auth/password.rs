//! Password hashing and verification
//!
//! Passwords are hashed with Argon2id into PHC strings. The configurable work
//! factor is the Argon2 time cost; memory and parallelism use library defaults.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::warn;

use crate::error::AuthError;

/// Resolve a configured work factor
///
/// Out-of-range values fall back to the default time cost.
pub fn resolve_cost(cost: Option<u32>) -> u32 {
    match cost {
        Some(cost) if (Params::MIN_T_COST..=Params::MAX_T_COST).contains(&cost) => cost,
        Some(cost) => {
            warn!(
                cost = cost,
                default = Params::DEFAULT_T_COST,
                "Hash cost out of range, using default"
            );
            Params::DEFAULT_T_COST
        }
        None => Params::DEFAULT_T_COST,
    }
}

/// Parse a raw work factor from the environment
///
/// Unparseable input falls back to the default time cost.
pub fn parse_cost(raw: Option<&str>) -> u32 {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<u32>() {
            Ok(cost) => resolve_cost(Some(cost)),
            Err(_) => {
                warn!(value = raw, "Unparseable hash cost, using default");
                Params::DEFAULT_T_COST
            }
        },
        None => Params::DEFAULT_T_COST,
    }
}

/// Argon2id password hasher
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Create a hasher with the given work factor (see [`resolve_cost`])
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: resolve_cost(cost),
        }
    }

    /// Effective work factor
    pub fn cost(&self) -> u32 {
        self.cost
    }

    fn argon2(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(
            Params::DEFAULT_M_COST,
            self.cost,
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|e| AuthError::Hashing(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a plaintext password
    ///
    /// # Returns
    ///
    /// The Argon2id hash string (PHC format)
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()?
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Verify a plaintext password against a stored hash
    ///
    /// Parameters are read from the stored hash, so hashes produced under a
    /// different cost still verify. A malformed hash never matches.
    pub fn verify(&self, hash: &str, plaintext: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };

        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(Some(1))
    }

    // Test 1: hash produces an Argon2id PHC string
    #[test]
    fn test_hash_is_argon2id() {
        let hash = fast_hasher().hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("t=1"));
    }

    // Test 2: verify accepts the right password only
    #[test]
    fn test_verify_password() {
        let hasher = fast_hasher();
        let hash = hasher.hash("correct horse").unwrap();

        assert!(hasher.verify(&hash, "correct horse"));
        assert!(!hasher.verify(&hash, "wrong horse"));
        assert!(!hasher.verify(&hash, ""));
    }

    // Test 3: same password hashes differently (random salt)
    #[test]
    fn test_hash_is_salted() {
        let hasher = fast_hasher();
        let h1 = hasher.hash("password").unwrap();
        let h2 = hasher.hash("password").unwrap();
        assert_ne!(h1, h2);
    }

    // Test 4: malformed hash never matches
    #[test]
    fn test_verify_malformed_hash() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("not-a-hash", "password"));
        assert!(!hasher.verify("", "password"));
        assert!(!hasher.verify("$argon2id$v=19$broken", "password"));
    }

    // Test 5: hashes from another cost still verify
    #[test]
    fn test_verify_across_costs() {
        let hash = PasswordHasher::new(Some(2)).hash("password").unwrap();
        assert!(fast_hasher().verify(&hash, "password"));
    }

    // Test 6: out-of-range cost falls back to default
    #[test]
    fn test_resolve_cost() {
        assert_eq!(resolve_cost(None), Params::DEFAULT_T_COST);
        assert_eq!(resolve_cost(Some(4)), 4);
        assert_eq!(resolve_cost(Some(0)), Params::DEFAULT_T_COST);
        assert_eq!(PasswordHasher::new(Some(0)).cost(), Params::DEFAULT_T_COST);
    }

    // Test 7: unparseable cost falls back to default
    #[test]
    fn test_parse_cost() {
        assert_eq!(parse_cost(Some("3")), 3);
        assert_eq!(parse_cost(Some(" 5 ")), 5);
        assert_eq!(parse_cost(Some("fast")), Params::DEFAULT_T_COST);
        assert_eq!(parse_cost(Some("-1")), Params::DEFAULT_T_COST);
        assert_eq!(parse_cost(Some("")), Params::DEFAULT_T_COST);
        assert_eq!(parse_cost(None), Params::DEFAULT_T_COST);
    }
}
