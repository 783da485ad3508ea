use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot prepare database location '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value could not be mapped onto the domain model.
    #[error("Invalid value '{value}' in column '{column}' of job {job_id}")]
    InvalidValue {
        job_id: i64,
        column: &'static str,
        value: String,
    },

    /// A thread panicked while holding the connection.
    #[error("Job store connection lock poisoned")]
    LockPoisoned,
}
