//! `busreminder-core`: shared domain types, configuration, and errors for the
//! bus departure reminder engine.

pub mod config;
pub mod error;
pub mod policy;
pub mod reminder;
pub mod types;

pub use error::{InvalidFavorite, ReminderError, Result};
pub use policy::{PolicyScope, QuietSuppression, RecurrenceMode, RecurrencePolicy};
pub use reminder::{Reminder, ReminderPayload};
pub use types::{DaySet, DepartureTime, FavoriteDeparture, FavoriteId, ValidatedDeparture};
