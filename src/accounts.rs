//! Optional user accounts: registration and credential checks against a
//! local SQLite store, with Argon2id password hashes.

use std::path::Path;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use log::{debug, info};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::{
    error::{ApiError, Result},
    sqlite::SharedConnection,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY NOT NULL,
    password_hash TEXT NOT NULL
)";

/// Hash a password with a fresh random salt, in PHC string format.
///
/// # Errors
///
/// Returns [`ApiError::Internal`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC hash. Malformed hashes never match.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Credential store keyed by username.
#[derive(Debug, Clone)]
pub struct UserStore {
    connection: SharedConnection,
}

impl UserStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::QueryFailed`] if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening user store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Store that lives only as long as the process.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::QueryFailed`] if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection.execute(SCHEMA, [])?;
        Ok(Self {
            connection: SharedConnection::new(connection),
        })
    }

    /// Register a new user.
    ///
    /// The password is hashed on its own blocking task, outside the store lock.
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidInput`] for an empty username or password
    /// - [`ApiError::UserExists`] if the username is taken
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        let (username, password) = validate_credentials(username, password)?;

        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await??;
        self.connection
            .run(move |conn| insert_user(conn, &username, &hash))
            .await
    }

    /// Check a username and password.
    ///
    /// Only the hash lookup holds the store lock; verification runs afterwards
    /// on its own blocking task.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidCredentials`] for an unknown user or wrong
    /// password; the two cases are indistinguishable to the caller.
    pub async fn verify(&self, username: &str, password: &str) -> Result<()> {
        let (username, password) = validate_credentials(username, password)?;

        let lookup = username.clone();
        let stored = self
            .connection
            .run(move |conn| stored_hash(conn, &lookup))
            .await?
            .ok_or(ApiError::InvalidCredentials)?;

        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await?;
        if !valid {
            return Err(ApiError::InvalidCredentials);
        }

        debug!("User {username} logged in");
        Ok(())
    }
}

fn insert_user(conn: &Connection, username: &str, hash: &str) -> Result<()> {
    match conn.execute(
        "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
        params![username, hash],
    ) {
        Ok(_) => {
            info!("Registered user {username}");
            Ok(())
        }
        Err(rusqlite::Error::SqliteFailure(failure, _))
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Err(ApiError::UserExists)
        }
        Err(err) => Err(err.into()),
    }
}

fn stored_hash(conn: &Connection, username: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT password_hash FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )
        .optional()?)
}

fn validate_credentials(username: &str, password: &str) -> Result<(String, String)> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::InvalidInput(
            "username and password are required".to_string(),
        ));
    }
    Ok((username.to_string(), password.to_string()))
}
