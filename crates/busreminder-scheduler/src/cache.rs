use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use busreminder_core::{PolicyScope, QuietSuppression, RecurrencePolicy};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::settings::SettingsStore;

/// Immutable view of every setting the engine reads, swapped as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferencesSnapshot {
    /// 0 until the first successful refresh; then +1 per refresh.
    pub version: u64,
    pub global: RecurrencePolicy,
    /// Per-route overrides, already paired with their selected days.
    pub routes: HashMap<String, RecurrencePolicy>,
    /// As stored; expiry is applied on read.
    pub quiet: QuietSuppression,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl PreferencesSnapshot {
    pub fn policy(&self, route_id: &str) -> RecurrencePolicy {
        RecurrencePolicy::resolve(self.routes.get(route_id), &self.global)
    }
}

/// In-memory snapshot of the asynchronously persisted settings.
///
/// `refresh` is the only writer. Every other method is synchronous and
/// non-blocking beyond a brief read lock, so it is safe from the timer-fired
/// callback context.
pub struct RecurrencePreferencesCache {
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Arc<PreferencesSnapshot>>,
    /// Serialises refreshes so snapshots are installed in read order.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl RecurrencePreferencesCache {
    pub fn new(store: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            snapshot: RwLock::new(Arc::new(PreferencesSnapshot::default())),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Pull the latest values from the settings store and install them.
    ///
    /// On a read failure the previous snapshot stays in place (stale but
    /// valid) and the error is returned for the caller to log.
    pub async fn refresh(&self) -> Result<u64> {
        let _gate = self.refresh_gate.lock().await;

        let mut next = match self.read_store().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, version = self.version(), "settings refresh failed; keeping last snapshot");
                return Err(e);
            }
        };

        let mut slot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        next.version = slot.version + 1;
        next.refreshed_at = Some(self.clock.now());
        let version = next.version;
        *slot = Arc::new(next);
        debug!(version, "preferences snapshot refreshed");
        Ok(version)
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<PreferencesSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Effective policy for `route_id`: route override, else global default.
    pub fn policy(&self, route_id: &str) -> RecurrencePolicy {
        self.snapshot().policy(route_id)
    }

    /// Current quiet state; a `SuppressedUntil` that has run out reads as
    /// `Enabled`. The store itself is not touched.
    pub fn quiet_suppression(&self) -> QuietSuppression {
        self.snapshot().quiet.effective_at(self.clock.now())
    }

    async fn read_store(&self) -> Result<PreferencesSnapshot> {
        let store = &self.store;
        let global_days = store.selected_days(&PolicyScope::Global).await?;
        let global = store.global_mode().await?.with_days(global_days);

        let mut routes = HashMap::new();
        for route_id in store.routes_with_overrides().await? {
            let Some(mode) = store.route_mode(&route_id).await? else {
                continue;
            };
            let days = store
                .selected_days(&PolicyScope::Route(route_id.clone()))
                .await?;
            routes.insert(route_id, mode.with_days(days));
        }

        let quiet = store.quiet_suppression().await?;

        Ok(PreferencesSnapshot {
            version: 0,
            global,
            routes,
            quiet,
            refreshed_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{utc, FixedClock, MemorySettingsStore};
    use busreminder_core::{DaySet, RecurrenceMode};
    use chrono::{Duration, Weekday};
    use std::sync::atomic::Ordering;

    fn cache_with(store: Arc<MemorySettingsStore>, clock: Arc<FixedClock>) -> RecurrencePreferencesCache {
        RecurrencePreferencesCache::new(store, clock)
    }

    #[tokio::test]
    async fn defaults_before_first_refresh() {
        let cache = cache_with(
            Arc::new(MemorySettingsStore::default()),
            Arc::new(FixedClock::new(utc(2, 8, 0))),
        );
        assert_eq!(cache.version(), 0);
        assert_eq!(cache.policy("any"), RecurrencePolicy::AllDays);
        assert_eq!(cache.quiet_suppression(), QuietSuppression::Enabled);
    }

    #[tokio::test]
    async fn route_override_wins_over_global() {
        let store = Arc::new(MemorySettingsStore::default());
        store.set_global_mode(RecurrenceMode::Weekdays).await.unwrap();
        store
            .set_route_mode("r-7", Some(RecurrenceMode::SelectedDays))
            .await
            .unwrap();
        let tue: DaySet = [Weekday::Tue].into_iter().collect();
        store
            .set_selected_days(&PolicyScope::Route("r-7".to_string()), tue)
            .await
            .unwrap();

        let cache = cache_with(store, Arc::new(FixedClock::new(utc(2, 8, 0))));
        assert_eq!(cache.refresh().await.unwrap(), 1);

        assert_eq!(cache.policy("r-1"), RecurrencePolicy::Weekdays);
        assert_eq!(cache.policy("r-7"), RecurrencePolicy::SelectedDays { days: tue });
    }

    #[tokio::test]
    async fn refresh_is_not_visible_until_called() {
        let store = Arc::new(MemorySettingsStore::default());
        let cache = cache_with(Arc::clone(&store), Arc::new(FixedClock::new(utc(2, 8, 0))));
        cache.refresh().await.unwrap();

        store.set_global_mode(RecurrenceMode::Disabled).await.unwrap();
        assert_eq!(cache.policy("r-1"), RecurrencePolicy::AllDays);

        cache.refresh().await.unwrap();
        assert_eq!(cache.policy("r-1"), RecurrencePolicy::Disabled);
        assert_eq!(cache.version(), 2);
    }

    #[tokio::test]
    async fn read_failure_keeps_last_good_snapshot() {
        let store = Arc::new(MemorySettingsStore::default());
        store.set_global_mode(RecurrenceMode::Weekdays).await.unwrap();
        let cache = cache_with(Arc::clone(&store), Arc::new(FixedClock::new(utc(2, 8, 0))));
        cache.refresh().await.unwrap();

        store.fail_reads.store(true, Ordering::SeqCst);
        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.version(), 1);
        assert_eq!(cache.policy("r-1"), RecurrencePolicy::Weekdays);
    }

    #[tokio::test]
    async fn expired_suppression_reads_as_enabled() {
        let store = Arc::new(MemorySettingsStore::default());
        let until = utc(2, 9, 0);
        store
            .set_quiet_suppression(QuietSuppression::SuppressedUntil { until })
            .await
            .unwrap();
        let clock = Arc::new(FixedClock::new(until - Duration::minutes(1)));
        let cache = cache_with(Arc::clone(&store), Arc::clone(&clock));
        cache.refresh().await.unwrap();

        assert_eq!(cache.quiet_suppression(), QuietSuppression::SuppressedUntil { until });

        clock.set(until + Duration::minutes(1));
        assert_eq!(cache.quiet_suppression(), QuietSuppression::Enabled);
        // The cache never writes back.
        assert_eq!(
            store.quiet_suppression().await.unwrap(),
            QuietSuppression::SuppressedUntil { until }
        );
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_refresh() {
        let store = Arc::new(MemorySettingsStore::default());
        let cache = cache_with(Arc::clone(&store), Arc::new(FixedClock::new(utc(2, 8, 0))));
        cache.refresh().await.unwrap();
        let held = cache.snapshot();

        store.set_global_mode(RecurrenceMode::Disabled).await.unwrap();
        cache.refresh().await.unwrap();

        assert_eq!(held.version, 1);
        assert_eq!(held.global, RecurrencePolicy::AllDays);
        assert_eq!(cache.snapshot().global, RecurrencePolicy::Disabled);
    }
}
