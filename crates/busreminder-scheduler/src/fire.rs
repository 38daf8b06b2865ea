//! Timer-fired handling.
//!
//! Runs on the timer service's callback context, which forbids blocking or
//! suspending work: everything here is synchronous and reads only the
//! in-memory preferences cache.

use std::sync::Arc;

use busreminder_core::{QuietSuppression, Reminder, ReminderPayload};
use chrono::{Datelike, TimeZone, Weekday};
use tracing::{debug, info};

use crate::cache::RecurrencePreferencesCache;
use crate::clock::Clock;
use crate::lifecycle::{ScheduleOutcome, TimerLifecycleManager};

/// Why a fired reminder was not surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The route's (or global) policy was disabled after registration.
    PolicyDisabled,
    /// The departure falls on a day the current policy no longer allows.
    DayNotAllowed(Weekday),
    /// The favorite was deleted after the timer was registered.
    FavoriteRemoved,
    /// The favorite was paused after the timer was registered.
    FavoriteInactive,
    /// The favorite was edited after the timer was registered; the payload's
    /// departure is stale.
    FavoriteChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireDecision {
    Notify(Reminder),
    Suppressed(QuietSuppression),
    Skipped(SkipReason),
}

pub struct FireHandler<Tz: TimeZone> {
    manager: Arc<TimerLifecycleManager<Tz>>,
    cache: Arc<RecurrencePreferencesCache>,
    clock: Arc<dyn Clock>,
}

impl<Tz: TimeZone> FireHandler<Tz> {
    pub fn new(
        manager: Arc<TimerLifecycleManager<Tz>>,
        cache: Arc<RecurrencePreferencesCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { manager, cache, clock }
    }

    /// Decide whether to surface the reminder, re-checking live policy and
    /// quiet suppression, then re-arm the one-shot timer for the next
    /// departure unless the policy is now disabled.
    pub fn on_timer_fired(&self, payload: &ReminderPayload) -> FireDecision {
        let favorite = &payload.favorite;
        let policy = self.cache.policy(&favorite.route_id);
        let quiet = self.cache.quiet_suppression();
        let departure_day = payload
            .departure_at
            .with_timezone(self.manager.zone())
            .weekday();

        let decision = if policy.is_disabled() {
            FireDecision::Skipped(SkipReason::PolicyDisabled)
        } else if quiet.suppresses_at(self.clock.now()) {
            FireDecision::Suppressed(quiet)
        } else if !policy.allows(departure_day) {
            FireDecision::Skipped(SkipReason::DayNotAllowed(departure_day))
        } else {
            FireDecision::Notify(Reminder::from_payload(payload))
        };

        match &decision {
            FireDecision::Notify(_) => info!(favorite_id = %favorite.id, "reminder fired"),
            other => info!(favorite_id = %favorite.id, decision = ?other, "reminder fired but not surfaced"),
        }

        if !policy.is_disabled() {
            let outcome = self.manager.schedule_after(favorite, payload.departure_at);
            if let ScheduleOutcome::Scheduled { fire_at, .. } = outcome {
                debug!(favorite_id = %favorite.id, %fire_at, "reminder re-armed");
            }
        }

        decision
    }
}
