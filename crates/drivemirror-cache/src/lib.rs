//! DriveMirror Cache - Local state persistence
//!
//! SQLite-based storage for:
//! - Linked Drive accounts and their encrypted OAuth credentials
//! - File records (downloadable files and their tracked remote copy)
//!
//! ## Architecture
//!
//! This crate implements the `IStateRepository` port from `drivemirror-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture. Credentials are encrypted with a
//! [`CredentialCipher`](drivemirror_core::credentials::CredentialCipher)
//! on write and decrypted on read, so callers only ever see plaintext.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteStateRepository`] - Full `IStateRepository` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use drivemirror_cache::{DatabasePool, SqliteStateRepository};
//! use drivemirror_core::credentials::CredentialCipher;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/drivemirror/drivemirror.db")).await?;
//! let cipher = CredentialCipher::from_secret("server secret")?;
//! let repo = SqliteStateRepository::new(pool.pool().clone(), cipher);
//! // Use repo as IStateRepository...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

use drivemirror_core::credentials::CryptoError;

pub use pool::DatabasePool;
pub use repository::SqliteStateRepository;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped back to a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A stored credential could not be encrypted or decrypted
    #[error("Credential cipher error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
