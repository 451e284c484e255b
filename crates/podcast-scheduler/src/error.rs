use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A connection mutex was poisoned by a panicking holder.
    #[error("Scheduler store lock poisoned")]
    LockPoisoned,

    /// The provided trigger definition is invalid or unsupported.
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// A job with this id exists and the registration asked not to replace it.
    #[error("Job already registered: {id}")]
    ConflictingJob { id: String },

    /// A retention window reaching back past the earliest representable time.
    #[error("Invalid retention window: {0}")]
    InvalidRetention(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
