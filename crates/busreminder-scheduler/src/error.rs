use busreminder_core::InvalidFavorite;
use thiserror::Error;

/// Errors that can occur within the scheduling engine or its collaborators.
///
/// None of these escape a batch: the reconciler and lifecycle manager log
/// them per favorite and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A favorite failed validation and cannot be scheduled.
    #[error("Invalid favorite data: {0}")]
    InvalidFavorite(#[from] InvalidFavorite),

    /// The timer service refused the request (e.g. exact alarms not granted).
    #[error("Timer service permission denied: {0}")]
    TimerPermissionDenied(String),

    /// The timer service could not be reached or rejected the call.
    #[error("Timer service unavailable: {0}")]
    TimerUnavailable(String),

    /// The settings store could not be read.
    #[error("Settings read failed: {0}")]
    SettingsRead(String),

    /// The settings store could not be written.
    #[error("Settings write failed: {0}")]
    SettingsWrite(String),

    /// The favorites store could not be queried.
    #[error("Favorites store error: {0}")]
    Favorites(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
