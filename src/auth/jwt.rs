//! Signed access tokens
//!
//! Tokens are HMAC-signed JWTs. Validation pins the accepted algorithms to the
//! HMAC family so that `none` or asymmetric headers never verify, and every
//! rejection surfaces as the same [`AuthError::InvalidToken`].

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::JwtConfig;
use crate::error::AuthError;

/// Algorithm used when signing
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Algorithms accepted when validating
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Claims placed in issued tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    /// Role label of the subject
    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Issued at (seconds since epoch)
    pub iat: i64,

    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Full claim set of a token that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims(Map<String, Value>);

impl VerifiedClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Raw `sub` claim, whatever its JSON type
    pub fn subject(&self) -> Option<&Value> {
        self.0.get("sub")
    }

    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.0.get("exp").and_then(Value::as_i64)
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }
}

impl From<Claims> for VerifiedClaims {
    fn from(claims: Claims) -> Self {
        match serde_json::to_value(claims) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self(Map::new()),
        }
    }
}

/// Token issuing and validation capability
#[cfg_attr(test, mockall::automock)]
pub trait TokenService: Send + Sync {
    /// Sign a fresh token for a subject
    fn generate(&self, subject: &str, role: &str) -> Result<String, AuthError>;

    /// Verify a token and return its claims
    fn validate(&self, token: &str) -> Result<VerifiedClaims, AuthError>;
}

/// HMAC JWT implementation of [`TokenService`]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.leeway = 0;

        if !config.issuer.is_empty() {
            validation.set_issuer(&[config.issuer.as_str()]);
        }
        // Without a configured audience any `aud` claim is accepted
        if config.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&[config.audience.as_str()]);
        }

        Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    fn build_claims(&self, subject: &str, role: &str) -> Claims {
        let now = Utc::now().timestamp();
        let lifetime = i64::try_from(self.config.expiration_hours.saturating_mul(3600))
            .unwrap_or(i64::MAX);

        Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            iss: non_empty(&self.config.issuer),
            aud: non_empty(&self.config.audience),
            iat: now,
            exp: now.saturating_add(lifetime),
        }
    }
}

impl TokenService for JwtService {
    fn generate(&self, subject: &str, role: &str) -> Result<String, AuthError> {
        if self.config.secret.is_empty() {
            return Err(AuthError::TokenGeneration(
                "signing secret is empty".to_string(),
            ));
        }

        let claims = self.build_claims(subject, role);
        encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    fn validate(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        if self.config.secret.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(reason = %e, "Token rejected");
                AuthError::InvalidToken
            })?;

        let claims = VerifiedClaims::new(data.claims);

        // Valid strictly before expiry
        match claims.expires_at() {
            Some(exp) if Utc::now().timestamp() < exp => Ok(claims),
            _ => {
                debug!("Token rejected: expired");
                Err(AuthError::InvalidToken)
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
