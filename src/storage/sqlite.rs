//! SQLite storage for user accounts and issued tokens

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::config::Config;
use crate::error::{Error, Result};

/// SQLite account store
pub struct AccountStore {
    conn: Arc<Mutex<Connection>>,
}

impl AccountStore {
    /// Open the account database at the configured location
    pub fn new(config: &Config) -> Result<Self> {
        Self::open(config.sqlite_path())
    }

    /// Open an account database at `path`, creating the schema if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Initialize schema
        conn.execute_batch(include_str!("schema.sql"))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a new user, returning its id
    pub fn insert_user(&self, username: &str, password_hash: &str) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        let inserted = conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, password_hash, Utc::now().to_rfc3339()],
        );

        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::UserExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by name
    pub fn find_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        conn.query_row(
            "SELECT id, username, password_hash FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Record an issued bearer token
    pub fn save_session(&self, token: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, timestamp(expires_at)],
        )?;

        Ok(())
    }

    /// Look up an issued bearer token
    pub fn find_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(user_id, expires_at)| {
            Ok(SessionRecord {
                user_id,
                expires_at: DateTime::parse_from_rfc3339(&expires_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| Error::storage(e.to_string()))?,
            })
        })
        .transpose()
    }

    /// Remove tokens that expired before `now`, returning how many were removed
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![timestamp(now)],
        )?;
        Ok(removed)
    }
}

// Fixed-width so that string comparison in SQL orders by time
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// User row stored in SQLite
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// Issued token row stored in SQLite
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}
