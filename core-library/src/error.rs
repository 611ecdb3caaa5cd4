use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Cannot prepare database directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LibraryError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Lock contention or pool exhaustion; the same statement may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            LibraryError::Database(sqlx::Error::PoolTimedOut) => true,
            LibraryError::Database(sqlx::Error::Io(_)) => true,
            LibraryError::Database(sqlx::Error::Database(db)) => {
                let message = db.message();
                message.contains("database is locked") || message.contains("busy")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
