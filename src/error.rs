//! Crate-wide error type.
//!
//! Most failure paths in the sync layer are swallowed and logged so the host
//! keeps running in local-only mode. The variants below are what still reaches
//! a caller: local I/O, identity actions and the migration commit.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote backend is not configured")]
    NotConfigured,

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("No migration is pending")]
    NoPendingMigration,
}

pub type SyncResult<T> = Result<T, SyncError>;
