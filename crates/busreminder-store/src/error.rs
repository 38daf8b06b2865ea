use busreminder_scheduler::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt value for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// A favorite with this id already exists.
    #[error("Favorite already exists: {id}")]
    Duplicate { id: String },

    /// No favorite with the given id exists.
    #[error("Favorite not found: {id}")]
    NotFound { id: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) fn settings_read(e: StoreError) -> SchedulerError {
    SchedulerError::SettingsRead(e.to_string())
}

pub(crate) fn settings_write(e: StoreError) -> SchedulerError {
    SchedulerError::SettingsWrite(e.to_string())
}

pub(crate) fn favorites_err(e: StoreError) -> SchedulerError {
    SchedulerError::Favorites(e.to_string())
}
