//! Recurrence policy and quiet suppression: the settings the engine resolves
//! per favorite.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::DaySet;

/// Effective notification behaviour for one favorite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrencePolicy {
    /// Every day at the departure time.
    #[default]
    AllDays,
    /// Monday through Friday only.
    Weekdays,
    /// Only on an explicit (possibly empty) set of weekdays.
    SelectedDays { days: DaySet },
    /// Never fires.
    Disabled,
}

impl RecurrencePolicy {
    pub fn is_disabled(&self) -> bool {
        matches!(self, RecurrencePolicy::Disabled)
    }

    /// Whether a reminder may fire on `day` under this policy.
    pub fn allows(&self, day: Weekday) -> bool {
        match self {
            RecurrencePolicy::AllDays => true,
            RecurrencePolicy::Weekdays => DaySet::working_week().contains(day),
            RecurrencePolicy::SelectedDays { days } => days.contains(day),
            RecurrencePolicy::Disabled => false,
        }
    }

    /// Two-level resolution: a per-route override wins over the global default.
    pub fn resolve(route: Option<&RecurrencePolicy>, global: &RecurrencePolicy) -> RecurrencePolicy {
        route.unwrap_or(global).clone()
    }
}

/// Stored form of a policy. `SelectedDays` is paired with the day set stored
/// under the same scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceMode {
    AllDays,
    Weekdays,
    SelectedDays,
    Disabled,
}

impl RecurrenceMode {
    pub fn with_days(self, days: DaySet) -> RecurrencePolicy {
        match self {
            RecurrenceMode::AllDays => RecurrencePolicy::AllDays,
            RecurrenceMode::Weekdays => RecurrencePolicy::Weekdays,
            RecurrenceMode::SelectedDays => RecurrencePolicy::SelectedDays { days },
            RecurrenceMode::Disabled => RecurrencePolicy::Disabled,
        }
    }
}

impl std::fmt::Display for RecurrenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecurrenceMode::AllDays => "all_days",
            RecurrenceMode::Weekdays => "weekdays",
            RecurrenceMode::SelectedDays => "selected_days",
            RecurrenceMode::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RecurrenceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all_days" => Ok(RecurrenceMode::AllDays),
            "weekdays" => Ok(RecurrenceMode::Weekdays),
            "selected_days" => Ok(RecurrenceMode::SelectedDays),
            "disabled" => Ok(RecurrenceMode::Disabled),
            other => Err(format!("unknown recurrence mode: {other}")),
        }
    }
}

/// Which level of the two-level policy a stored setting belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "route_id", rename_all = "snake_case")]
pub enum PolicyScope {
    Global,
    Route(String),
}

/// Global override that silences reminders regardless of policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuietSuppression {
    /// Reminders are delivered.
    #[default]
    Enabled,
    /// All reminders suppressed until switched back.
    Disabled,
    /// Suppressed until `until`, then reverts to `Enabled`.
    SuppressedUntil { until: DateTime<Utc> },
}

impl QuietSuppression {
    /// True once a timed suppression has run out (`now >= until`).
    ///
    /// Shared by the cache read path and the store-correcting write path.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self, QuietSuppression::SuppressedUntil { until } if now >= *until)
    }

    /// The value as it should be treated at `now`.
    pub fn effective_at(self, now: DateTime<Utc>) -> QuietSuppression {
        if self.is_expired_at(now) {
            QuietSuppression::Enabled
        } else {
            self
        }
    }

    /// Whether a reminder firing at `now` must be swallowed.
    pub fn suppresses_at(&self, now: DateTime<Utc>) -> bool {
        !matches!(self.effective_at(now), QuietSuppression::Enabled)
    }
}
