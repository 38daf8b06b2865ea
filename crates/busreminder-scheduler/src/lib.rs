//! `busreminder-scheduler`: turns favorite bus departures into one-shot
//! reminder timers and keeps those timers consistent with the latest settings.
//!
//! # Overview
//!
//! | Component                      | Role                                                   |
//! |--------------------------------|--------------------------------------------------------|
//! | [`schedule`]                   | Pure next-departure calculator                         |
//! | [`RecurrencePreferencesCache`] | Synchronous, atomically swapped settings snapshot      |
//! | [`TimerLifecycleManager`]      | Cancel-then-register protocol, one timer per favorite  |
//! | [`BatchReconciler`]            | Per-favorite isolated sweep after settings change      |
//! | [`FireHandler`]                | Fire-time re-check and re-arm (non-blocking)           |
//! | [`ReminderService`]            | Lifecycle hooks and event loop tying it together       |
//!
//! The settings store, favorites store, and timer service are collaborators
//! behind the [`SettingsStore`], [`FavoritesStore`], and [`TimerService`] traits.

pub mod cache;
pub mod clock;
pub mod error;
pub mod favorites;
pub mod fire;
pub mod lifecycle;
pub mod reconciler;
pub mod schedule;
pub mod service;
pub mod settings;
pub mod timer;

#[cfg(test)]
mod testing;

pub use cache::{PreferencesSnapshot, RecurrencePreferencesCache};
pub use clock::{Clock, SystemClock};
pub use error::{Result, SchedulerError};
pub use favorites::{FavoriteChange, FavoritesStore};
pub use fire::{FireDecision, FireHandler, SkipReason};
pub use lifecycle::{ScheduleOutcome, TimerLifecycleManager};
pub use reconciler::{BatchReconciler, ReconcileReport};
pub use schedule::{compute, next_occurrence, NoOccurrence, HORIZON_DAYS};
pub use service::ReminderService;
pub use settings::{SettingsChange, SettingsStore, SettingsUpdate};
pub use timer::{TimerKey, TimerPrecision, TimerService, TIMER_NAMESPACE};
