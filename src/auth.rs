//! Account signup, login and bearer-token verification

use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::AccountStore;

/// Verified identity of the caller, keyed by account id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues and checks bearer tokens against the account store
pub struct AuthService {
    store: AccountStore,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(store: AccountStore, token_ttl: Duration) -> Self {
        Self { store, token_ttl }
    }

    /// Register a new account, returning its id
    pub fn signup(&self, username: &str, password: &str) -> Result<i64> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(Error::invalid_input("Username and password required"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::storage(format!("password hashing failed: {}", e)))?
            .to_string();

        let id = self.store.insert_user(username, &password_hash)?;
        tracing::info!(user_id = id, "account created");
        Ok(id)
    }

    /// Check credentials and issue a bearer token
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let user = self
            .store
            .find_user(username)?
            .ok_or(Error::InvalidCredentials)?;

        let parsed = PasswordHash::new(&user.password_hash)
            .map_err(|e| Error::storage(format!("stored password hash is invalid: {}", e)))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            return Err(Error::InvalidCredentials);
        }

        let ttl = chrono::Duration::from_std(self.token_ttl)
            .map_err(|e| Error::config(format!("token ttl out of range: {}", e)))?;
        let token = Uuid::new_v4().simple().to_string();
        self.store.save_session(&token, user.id, Utc::now() + ttl)?;

        tracing::info!(user_id = user.id, "token issued");
        Ok(token)
    }

    /// Resolve an `Authorization` header value to the caller's identity
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<UserId> {
        self.authenticate_at(authorization, Utc::now())
    }

    pub fn authenticate_at(&self, authorization: Option<&str>, now: DateTime<Utc>) -> Result<UserId> {
        let token = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(Error::MissingToken)?;

        let session = self.store.find_session(token)?.ok_or(Error::InvalidToken)?;
        if session.expires_at <= now {
            return Err(Error::ExpiredToken);
        }

        Ok(UserId(session.user_id.to_string()))
    }

    /// Drop expired tokens from the store
    pub fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired_sessions(Utc::now())
    }
}
