use std::sync::Arc;

use busreminder_core::config::EngineConfig;
use busreminder_core::{FavoriteDeparture, FavoriteId, ReminderPayload};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::cache::RecurrencePreferencesCache;
use crate::clock::Clock;
use crate::error::{Result, SchedulerError};
use crate::schedule::{next_occurrence, NoOccurrence};
use crate::timer::{TimerKey, TimerPrecision, TimerService};

/// What a call to [`TimerLifecycleManager::schedule`] left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Exactly one live registration exists for the favorite.
    Scheduled {
        key: TimerKey,
        fire_at: DateTime<Utc>,
        departure_at: DateTime<Utc>,
        precision: TimerPrecision,
    },
    /// Nothing to schedule; the favorite has no registration.
    NotScheduled(NoOccurrence),
    /// The timer service failed; the favorite has no registration.
    Failed(SchedulerError),
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled { .. })
    }
}

/// Owns the register/cancel protocol against the timer service and keeps at
/// most one live registration per favorite.
///
/// Holds no state of its own beyond configuration; everything is recomputed
/// from the favorite, the preferences cache, and the clock.
pub struct TimerLifecycleManager<Tz: TimeZone> {
    timers: Arc<dyn TimerService>,
    cache: Arc<RecurrencePreferencesCache>,
    clock: Arc<dyn Clock>,
    /// Zone whose wall-clock days departures are expressed in.
    zone: Tz,
    lead_time: Duration,
    tolerance: Duration,
}

impl<Tz: TimeZone> TimerLifecycleManager<Tz> {
    pub fn new(
        timers: Arc<dyn TimerService>,
        cache: Arc<RecurrencePreferencesCache>,
        clock: Arc<dyn Clock>,
        zone: Tz,
        config: &EngineConfig,
    ) -> Self {
        Self {
            timers,
            cache,
            clock,
            zone,
            lead_time: config.lead_time(),
            tolerance: config.inexact_tolerance(),
        }
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    pub fn zone(&self) -> &Tz {
        &self.zone
    }

    /// Cancel any registration for `id`. Missing registrations are a no-op.
    pub fn cancel(&self, id: &FavoriteId) -> Result<()> {
        let key = TimerKey::for_favorite(id);
        match self.timers.cancel(&key) {
            Ok(()) => {
                debug!(favorite_id = %id, key = %key, "timer cancelled");
                Ok(())
            }
            Err(e) => {
                warn!(favorite_id = %id, key = %key, error = %e, "timer cancel failed");
                Err(e)
            }
        }
    }

    /// Cancel, recompute, and re-register the timer for `favorite`.
    ///
    /// Idempotent: calling it twice leaves exactly one registration. Never
    /// returns an error; failures are logged and reported in the outcome.
    pub fn schedule(&self, favorite: &FavoriteDeparture) -> ScheduleOutcome {
        self.schedule_after(favorite, self.clock.now())
    }

    /// Like [`schedule`](Self::schedule), but the departure must also be
    /// strictly after `not_before`. Used to re-arm from a fired reminder,
    /// whose own departure is still a few minutes ahead.
    pub fn schedule_after(&self, favorite: &FavoriteDeparture, not_before: DateTime<Utc>) -> ScheduleOutcome {
        let id = &favorite.id;

        // The old registration must be gone before a new one can exist.
        if let Err(e) = self.cancel(id) {
            return ScheduleOutcome::Failed(e);
        }

        let validated = match favorite.validate() {
            Ok(v) => v,
            Err(e) => {
                warn!(favorite_id = %id, error = %e, "favorite skipped: invalid data");
                return ScheduleOutcome::NotScheduled(e.into());
            }
        };

        let now = self.clock.now();
        let reference = now.max(not_before).with_timezone(&self.zone);
        let policy = self.cache.policy(&favorite.route_id);

        let departure_at = match next_occurrence(validated.time, &policy, &reference) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(reason) => {
                info!(favorite_id = %id, route_id = %favorite.route_id, %reason, "no occurrence to schedule");
                return ScheduleOutcome::NotScheduled(reason);
            }
        };

        let fire_at = departure_at - self.lead_time;
        if fire_at <= now {
            info!(favorite_id = %id, %departure_at, %fire_at, "departure too soon to notify");
            return ScheduleOutcome::NotScheduled(NoOccurrence::TooSoon { fire_at });
        }

        let key = TimerKey::for_favorite(id);
        let payload = ReminderPayload {
            favorite: favorite.clone(),
            departure_at,
            fire_at,
        };

        match self.register(&key, fire_at, payload) {
            Ok(precision) => {
                info!(
                    favorite_id = %id,
                    key = %key,
                    %fire_at,
                    %departure_at,
                    exact = matches!(precision, TimerPrecision::Exact),
                    "reminder scheduled"
                );
                ScheduleOutcome::Scheduled {
                    key,
                    fire_at,
                    departure_at,
                    precision,
                }
            }
            Err(e) => {
                warn!(favorite_id = %id, key = %key, error = %e, "reminder could not be registered");
                ScheduleOutcome::Failed(e)
            }
        }
    }

    /// Register exactly when the platform allows it, otherwise (or when the
    /// exact request is denied) inexactly within `±tolerance`.
    fn register(&self, key: &TimerKey, at: DateTime<Utc>, payload: ReminderPayload) -> Result<TimerPrecision> {
        if self.timers.supports_exact_scheduling() {
            match self.timers.register_exact(key, at, payload.clone()) {
                Ok(()) => return Ok(TimerPrecision::Exact),
                Err(SchedulerError::TimerPermissionDenied(reason)) => {
                    warn!(key = %key, %reason, "exact timer denied; degrading to inexact");
                }
                Err(e) => return Err(e),
            }
        } else {
            info!(
                key = %key,
                tolerance_secs = self.tolerance.num_seconds(),
                "exact timers unsupported; precision degraded"
            );
        }
        self.timers.register_inexact(key, at, self.tolerance, payload)?;
        Ok(TimerPrecision::Inexact {
            tolerance: self.tolerance,
        })
    }
}
