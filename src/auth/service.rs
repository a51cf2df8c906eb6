//! Registration and login orchestration
//!
//! This module provides the main authentication interface for the application.
//! It looks users up through the repository, hashes and verifies passwords,
//! issues tokens and emits audit events.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::database::UserRepository;
use crate::error::{AuthError, DbError};
use crate::models::{normalize_email, AuthEvent, AuthEventType, NewUser, User};
use crate::otel::Metrics;

use super::jwt::{TokenService, VerifiedClaims};
use super::password::PasswordHasher;

/// Authentication service
///
/// Holds no state of its own beyond its collaborators.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenService>,
    audit: Arc<AuditLogger>,
    hasher: PasswordHasher,
    metrics: Arc<Metrics>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenService>,
        audit: Arc<AuditLogger>,
        hasher: PasswordHasher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            users,
            tokens,
            audit,
            hasher,
            metrics,
        }
    }

    /// Register a new user
    ///
    /// Fails with `Conflict` when the normalized email is already taken.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
        origin: Option<IpAddr>,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict);
        }

        let hasher = self.hasher.clone();
        let plaintext = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))??;

        let user = self
            .users
            .create_user(&NewUser::new(&email, password_hash, role))
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration
                DbError::ConstraintViolation(_) => AuthError::Conflict,
                other => other.into(),
            })?;

        info!(user_id = %user.id, role = %user.role, "User registered");
        self.metrics.record_registration();

        self.emit(
            AuthEvent::new(AuthEventType::Register, &user.id)
                .with_ip(origin)
                .with_metadata(serde_json::json!({ "role": user.role })),
        )
        .await;

        Ok(user)
    }

    /// Authenticate a user and issue a token
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        origin: Option<IpAddr>,
    ) -> Result<String, AuthError> {
        let result = self.authenticate(email, password).await;

        let user = match result {
            Ok(user) => user,
            Err(err) => {
                self.metrics.record_login("failure");
                return Err(err);
            }
        };

        let token = self.tokens.generate(&user.id, &user.role).map_err(|e| {
            self.metrics.record_login("failure");
            e
        })?;

        info!(user_id = %user.id, "User logged in");
        self.metrics.record_login("success");

        self.emit(AuthEvent::new(AuthEventType::Login, &user.id).with_ip(origin))
            .await;

        Ok(token)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        // Argon2 is CPU-bound; keep it off the async workers
        let hasher = self.hasher.clone();
        let stored = user.password_hash.clone();
        let plaintext = password.to_owned();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&stored, &plaintext))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Validate a bearer token
    pub fn validate_token(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        self.tokens.validate(token)
    }

    /// Look up a user by id
    pub async fn find_user(&self, id: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.find_by_id(id).await?)
    }

    // Audit failures never fail the action being audited; they are logged
    // and counted instead.
    async fn emit(&self, event: AuthEvent) {
        let event_type = event.event_type.clone();
        let user_id = event.user_id.clone();

        if let Err(e) = self.audit.log(event).await {
            warn!(
                event_type = %event_type,
                user_id = %user_id,
                error = %e,
                "Failed to record audit event"
            );
            self.metrics.record_audit_failure(&event_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RetryPolicy;
    use crate::auth::jwt::MockTokenService;
    use crate::database::{MockEventStore, MockUserRepository};
    use chrono::Utc;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn test_ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(Some(1))
    }

    fn stored_user(email: &str, password: &str) -> User {
        User {
            id: "user-1".to_string(),
            email: email.to_string(),
            password_hash: hasher().hash(password).unwrap(),
            role: "user".to_string(),
            created_at: Utc::now(),
        }
    }

    fn events_ok() -> MockEventStore {
        let mut store = MockEventStore::new();
        store.expect_insert_event().returning(|_| Ok(1));
        store
    }

    fn create_test_service(
        repo: MockUserRepository,
        tokens: MockTokenService,
        events: MockEventStore,
    ) -> AuthService {
        let audit = AuditLogger::new(Arc::new(events), RetryPolicy::new(3, Duration::ZERO));
        AuthService::new(
            Arc::new(repo),
            Arc::new(tokens),
            Arc::new(audit),
            hasher(),
            Arc::new(Metrics::noop()),
        )
    }

    // Test 1: Register normalizes email and returns the stored user
    #[tokio::test]
    async fn test_register_success() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email()
            .withf(|email| email == "alice@example.com")
            .times(1)
            .returning(|_| Ok(None));
        repo.expect_create_user()
            .withf(|u| u.email == "alice@example.com" && u.password_hash.starts_with("$argon2id$"))
            .times(1)
            .returning(|u| {
                Ok(User {
                    id: "new-id".to_string(),
                    email: u.email.clone(),
                    password_hash: u.password_hash.clone(),
                    role: u.role.clone(),
                    created_at: Utc::now(),
                })
            });

        let mut events = MockEventStore::new();
        events
            .expect_insert_event()
            .withf(|e| {
                e.event_type == "register"
                    && e.user_id == "new-id"
                    && e.ip.as_deref() == Some("10.0.0.1")
            })
            .times(1)
            .returning(|_| Ok(1));

        let service = create_test_service(repo, MockTokenService::new(), events);
        let user = service
            .register(" Alice@Example.com ", "secret1", "admin", Some(test_ip()))
            .await
            .unwrap();

        assert_eq!(user.id, "new-id");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, "admin");
    }

    // Test 2: Register with an existing email is a conflict
    #[tokio::test]
    async fn test_register_conflict() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email()
            .returning(|_| Ok(Some(stored_user("bob@example.com", "secret1"))));
        repo.expect_create_user().never();

        let mut events = MockEventStore::new();
        events.expect_insert_event().never();

        let service = create_test_service(repo, MockTokenService::new(), events);
        let result = service
            .register("BOB@example.com", "secret1", "user", None)
            .await;

        assert_eq!(result.unwrap_err(), AuthError::Conflict);
    }

    // Test 3: Unique violation on insert is a conflict
    #[tokio::test]
    async fn test_register_race_is_conflict() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email().returning(|_| Ok(None));
        repo.expect_create_user()
            .returning(|_| Err(DbError::ConstraintViolation("users.email".to_string())));

        let service = create_test_service(repo, MockTokenService::new(), events_ok());
        let result = service.register("c@example.com", "secret1", "user", None).await;

        assert_eq!(result.unwrap_err(), AuthError::Conflict);
    }

    // Test 4: Storage failure surfaces as storage error
    #[tokio::test]
    async fn test_register_storage_failure() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email()
            .returning(|_| Err(DbError::Unavailable("closed".to_string())));

        let service = create_test_service(repo, MockTokenService::new(), events_ok());
        let result = service.register("d@example.com", "secret1", "user", None).await;

        assert!(matches!(result, Err(AuthError::Storage(_))));
    }

    // Test 5: Audit failure does not fail registration
    #[tokio::test]
    async fn test_register_succeeds_when_audit_fails() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email().returning(|_| Ok(None));
        repo.expect_create_user().returning(|u| {
            Ok(User {
                id: "id-5".to_string(),
                email: u.email.clone(),
                password_hash: u.password_hash.clone(),
                role: u.role.clone(),
                created_at: Utc::now(),
            })
        });

        let mut events = MockEventStore::new();
        events
            .expect_insert_event()
            .times(3)
            .returning(|_| Err(DbError::Unavailable("down".to_string())));

        let service = create_test_service(repo, MockTokenService::new(), events);
        let user = service
            .register("e@example.com", "secret1", "user", None)
            .await
            .unwrap();

        assert_eq!(user.id, "id-5");
    }

    // Test 6: Login issues a token for the stored user
    #[tokio::test]
    async fn test_login_success() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email()
            .withf(|email| email == "alice@example.com")
            .returning(|_| Ok(Some(stored_user("alice@example.com", "secret1"))));

        let mut tokens = MockTokenService::new();
        tokens
            .expect_generate()
            .withf(|sub, role| sub == "user-1" && role == "user")
            .times(1)
            .returning(|_, _| Ok("signed.token.value".to_string()));

        let mut events = MockEventStore::new();
        events
            .expect_insert_event()
            .withf(|e| e.event_type == "login" && e.user_id == "user-1")
            .times(1)
            .returning(|_| Ok(1));

        let service = create_test_service(repo, tokens, events);
        let token = service
            .login("ALICE@example.com", "secret1", Some(test_ip()))
            .await
            .unwrap();

        assert_eq!(token, "signed.token.value");
    }

    // Test 7: Wrong password and unknown email fail identically
    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email().returning(|email| {
            if email == "alice@example.com" {
                Ok(Some(stored_user("alice@example.com", "secret1")))
            } else {
                Ok(None)
            }
        });

        let mut tokens = MockTokenService::new();
        tokens.expect_generate().never();

        let mut events = MockEventStore::new();
        events.expect_insert_event().never();

        let service = create_test_service(repo, tokens, events);

        let wrong_password = service
            .login("alice@example.com", "wrong-password", None)
            .await
            .unwrap_err();
        let unknown_email = service
            .login("nobody@example.com", "secret1", None)
            .await
            .unwrap_err();

        assert_eq!(wrong_password, AuthError::InvalidCredentials);
        assert_eq!(wrong_password, unknown_email);
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    // Test 8: Malformed stored hash fails as invalid credentials
    #[tokio::test]
    async fn test_login_malformed_hash() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email().returning(|_| {
            let mut user = stored_user("alice@example.com", "secret1");
            user.password_hash = "corrupted".to_string();
            Ok(Some(user))
        });

        let service = create_test_service(repo, MockTokenService::new(), events_ok());
        let result = service.login("alice@example.com", "secret1", None).await;

        assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
    }

    // Test 9: Audit failure does not fail login
    #[tokio::test]
    async fn test_login_succeeds_when_audit_fails() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email()
            .returning(|_| Ok(Some(stored_user("alice@example.com", "secret1"))));

        let mut tokens = MockTokenService::new();
        tokens
            .expect_generate()
            .returning(|_, _| Ok("token".to_string()));

        let mut events = MockEventStore::new();
        events
            .expect_insert_event()
            .times(1)
            .returning(|_| Err(DbError::ConstraintViolation("bad".to_string())));

        let service = create_test_service(repo, tokens, events);
        assert!(service.login("alice@example.com", "secret1", None).await.is_ok());
    }

    // Test 10: Token validation delegates to the token service
    #[tokio::test]
    async fn test_validate_token_delegates() {
        let mut tokens = MockTokenService::new();
        tokens
            .expect_validate()
            .withf(|t| t == "good")
            .returning(|_| {
                let mut claims = serde_json::Map::new();
                claims.insert("sub".to_string(), serde_json::Value::from("user-1"));
                Ok(VerifiedClaims::new(claims))
            });
        tokens
            .expect_validate()
            .withf(|t| t != "good")
            .returning(|_| Err(AuthError::InvalidToken));

        let service = create_test_service(MockUserRepository::new(), tokens, events_ok());

        let claims = service.validate_token("good").unwrap();
        assert_eq!(claims.subject(), Some(&serde_json::Value::from("user-1")));
        assert_eq!(
            service.validate_token("bad").unwrap_err(),
            AuthError::InvalidToken
        );
    }

    // Test 11: find_user passes through the repository
    #[tokio::test]
    async fn test_find_user() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .withf(|id| id == "user-1")
            .returning(|_| Ok(Some(stored_user("alice@example.com", "secret1"))));
        repo.expect_find_by_id()
            .withf(|id| id != "user-1")
            .returning(|_| Ok(None));

        let service = create_test_service(repo, MockTokenService::new(), events_ok());

        assert!(service.find_user("user-1").await.unwrap().is_some());
        assert!(service.find_user("ghost").await.unwrap().is_none());
    }

    // Test 12: Password verification does not stall other tasks
    #[tokio::test(flavor = "current_thread")]
    async fn test_login_does_not_block_executor() {
        let password_hash = PasswordHasher::new(None).hash("secret1").unwrap();

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_email().returning(move |_| {
            Ok(Some(User {
                id: "user-1".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: password_hash.clone(),
                role: "user".to_string(),
                created_at: Utc::now(),
            }))
        });

        let mut tokens = MockTokenService::new();
        tokens
            .expect_generate()
            .returning(|_, _| Ok("token".to_string()));

        let service = Arc::new(create_test_service(repo, tokens, events_ok()));

        let logins: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.login("alice@example.com", "secret1", None).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(
            logins.iter().any(|login| !login.is_finished()),
            "timer fired only after every login had finished"
        );

        for login in logins {
            assert_eq!(login.await.unwrap().unwrap(), "token");
        }
    }
}
