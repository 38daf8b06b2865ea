use thiserror::Error;

/// Why a favorite departure cannot be scheduled.
///
/// Never fatal: the favorite is logged, skipped, and left without a timer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidFavorite {
    #[error("favorite id is blank")]
    BlankId,

    #[error("favorite {favorite_id} has a blank route id")]
    BlankRoute { favorite_id: String },

    #[error("malformed departure time {value:?} (expected HH:MM)")]
    MalformedTime { value: String },

    #[error("base weekday {value} is outside 1..=7")]
    WeekdayOutOfRange { value: u8 },
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid favorite data: {0}")]
    InvalidFavorite(#[from] InvalidFavorite),
}

impl ReminderError {
    /// Short error code string, stable across releases, for log aggregation.
    pub fn code(&self) -> &'static str {
        match self {
            ReminderError::Config(_) => "CONFIG_ERROR",
            ReminderError::InvalidFavorite(_) => "INVALID_FAVORITE",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReminderError>;
