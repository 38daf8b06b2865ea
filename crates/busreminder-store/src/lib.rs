//! `busreminder-store`: SQLite-backed favorites and settings collaborators
//! for the reminder engine.

pub mod db;
pub mod error;
pub mod favorites;
pub mod settings;

pub use error::{Result, StoreError};
pub use favorites::SqliteFavoritesStore;
pub use settings::SqliteSettingsStore;
