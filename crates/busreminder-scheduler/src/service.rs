use std::sync::Arc;

use busreminder_core::config::ReminderConfig;
use busreminder_core::{FavoriteDeparture, QuietSuppression, Reminder, ReminderPayload};
use chrono::TimeZone;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

use crate::cache::RecurrencePreferencesCache;
use crate::clock::Clock;
use crate::error::Result;
use crate::favorites::{FavoriteChange, FavoritesStore};
use crate::fire::{FireDecision, FireHandler, SkipReason};
use crate::lifecycle::TimerLifecycleManager;
use crate::reconciler::{BatchReconciler, ReconcileReport};
use crate::settings::{SettingsChange, SettingsStore, SettingsUpdate};
use crate::timer::TimerService;

/// Wires the cache, lifecycle manager, reconciler, and fire handler to the
/// application's lifecycle hooks: start, settings changed, favorite changed,
/// and timer fired.
pub struct ReminderService<Tz: TimeZone> {
    settings: Arc<dyn SettingsStore>,
    favorites: Arc<dyn FavoritesStore>,
    clock: Arc<dyn Clock>,
    cache: Arc<RecurrencePreferencesCache>,
    manager: Arc<TimerLifecycleManager<Tz>>,
    reconciler: BatchReconciler<Tz>,
    fire: FireHandler<Tz>,
    resync_every: Option<std::time::Duration>,
}

impl<Tz: TimeZone> ReminderService<Tz> {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        favorites: Arc<dyn FavoritesStore>,
        timers: Arc<dyn TimerService>,
        clock: Arc<dyn Clock>,
        zone: Tz,
        config: &ReminderConfig,
    ) -> Self {
        let cache = Arc::new(RecurrencePreferencesCache::new(
            Arc::clone(&settings),
            Arc::clone(&clock),
        ));
        let manager = Arc::new(TimerLifecycleManager::new(
            timers,
            Arc::clone(&cache),
            Arc::clone(&clock),
            zone,
            &config.engine,
        ));
        let reconciler = BatchReconciler::new(Arc::clone(&manager), Arc::clone(&cache));
        let fire = FireHandler::new(Arc::clone(&manager), Arc::clone(&cache), Arc::clone(&clock));
        let resync_every = match config.daemon.resync_interval_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        };

        Self {
            settings,
            favorites,
            clock,
            cache,
            manager,
            reconciler,
            fire,
            resync_every,
        }
    }

    pub fn cache(&self) -> &Arc<RecurrencePreferencesCache> {
        &self.cache
    }

    pub fn manager(&self) -> &Arc<TimerLifecycleManager<Tz>> {
        &self.manager
    }

    /// App start: registrations are not assumed to have survived, so correct
    /// stale settings, refresh, and reconcile everything.
    pub async fn start(&self) -> Result<ReconcileReport> {
        if let Err(e) = self.expire_quiet_suppression().await {
            warn!(error = %e, "could not correct expired quiet suppression");
        }
        self.resync().await
    }

    /// Write a settings change, then refresh the cache, then reconcile.
    ///
    /// The store write completes before the refresh starts, and the refresh
    /// before the reconcile, so reconciliation never reads stale settings.
    pub async fn apply(&self, update: SettingsUpdate) -> Result<ReconcileReport> {
        update.write_to(self.settings.as_ref()).await?;
        info!(?update, "settings updated");
        self.on_settings_changed(&update.change()).await
    }

    /// Refresh the cache and reconcile whatever the change affects.
    pub async fn on_settings_changed(&self, change: &SettingsChange) -> Result<ReconcileReport> {
        if let Err(e) = self.cache.refresh().await {
            // Stale but valid: carry on with the last good snapshot.
            warn!(error = %e, "reconciling against last good settings snapshot");
        }

        match change {
            SettingsChange::GlobalPolicy => self.reconcile_all().await,
            SettingsChange::RoutePolicy { route_id } => {
                let on_route: Vec<FavoriteDeparture> = self
                    .favorites
                    .list_active()
                    .await?
                    .into_iter()
                    .filter(|f| &f.route_id == route_id)
                    .collect();
                let mut report = ReconcileReport::default();
                for favorite in &on_route {
                    report.merge(self.reconciler.reconcile_one(favorite));
                }
                info!(%route_id, favorites = on_route.len(), "route policy reconciled");
                Ok(report)
            }
            // Checked at fire time; nothing to reschedule.
            SettingsChange::QuietSuppression => {
                self.expire_quiet_suppression().await?;
                Ok(ReconcileReport::default())
            }
        }
    }

    pub async fn on_favorite_changed(&self, change: &FavoriteChange) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        match change {
            FavoriteChange::Added { id }
            | FavoriteChange::Updated { id }
            | FavoriteChange::ActivityToggled { id, active: true } => {
                match self.favorites.get(id).await? {
                    Some(favorite) => report = self.reconciler.reconcile_one(&favorite),
                    None => {
                        warn!(favorite_id = %id, "changed favorite no longer exists; cancelling");
                        self.cancel_counted(id, &mut report);
                    }
                }
            }
            FavoriteChange::Removed { id } | FavoriteChange::ActivityToggled { id, active: false } => {
                self.cancel_counted(id, &mut report);
                if report.failed == 0 {
                    report.inactive += 1;
                }
            }
        }
        Ok(report)
    }

    /// Synchronous fire hook. Safe on a non-blocking callback context.
    pub fn on_timer_fired(&self, payload: &ReminderPayload) -> FireDecision {
        self.fire.on_timer_fired(payload)
    }

    /// Fire hook for the service loop, which may await the favorites store.
    ///
    /// A payload only reaches [`on_timer_fired`](Self::on_timer_fired) when
    /// its favorite still exists, is active, and matches the registered copy.
    /// Removed or paused favorites have their timer cancelled; an edited one
    /// is reconciled from its current state instead of the stale payload.
    pub async fn handle_fired(&self, payload: &ReminderPayload) -> FireDecision {
        let id = &payload.favorite.id;
        let current = match self.favorites.get(id).await {
            Ok(current) => current,
            Err(e) => {
                warn!(favorite_id = %id, error = %e, "favorite lookup failed; using registered copy");
                return self.on_timer_fired(payload);
            }
        };

        let reason = match current {
            None => SkipReason::FavoriteRemoved,
            Some(f) if !f.is_active => SkipReason::FavoriteInactive,
            Some(f) if f != payload.favorite => {
                self.reconciler.reconcile_one(&f);
                SkipReason::FavoriteChanged
            }
            Some(_) => return self.on_timer_fired(payload),
        };

        if !matches!(reason, SkipReason::FavoriteChanged) {
            // Nothing may stay armed for a favorite that is gone or paused.
            let _ = self.manager.cancel(id);
        }
        info!(favorite_id = %id, ?reason, "fired reminder dropped");
        FireDecision::Skipped(reason)
    }

    /// Refresh, then reconcile every favorite.
    pub async fn resync(&self) -> Result<ReconcileReport> {
        if let Err(e) = self.cache.refresh().await {
            warn!(error = %e, "reconciling against last good settings snapshot");
        }
        self.reconcile_all().await
    }

    /// Reconcile every favorite against the current snapshot. Active ones are
    /// scheduled; inactive ones are cancelled, which also clears timers left
    /// by changes made outside this process.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let all = self.favorites.list_all().await?;
        Ok(self.reconciler.reconcile_all(&all))
    }

    /// Write `Enabled` back to the store when a timed suppression has run out.
    ///
    /// Uses the same `now >= until` condition as the cache's read path.
    /// Returns whether a correction was written.
    pub async fn expire_quiet_suppression(&self) -> Result<bool> {
        let stored = self.settings.quiet_suppression().await?;
        if !stored.is_expired_at(self.clock.now()) {
            return Ok(false);
        }
        self.settings
            .set_quiet_suppression(QuietSuppression::Enabled)
            .await?;
        info!("quiet suppression expired; re-enabled reminders");
        if let Err(e) = self.cache.refresh().await {
            warn!(error = %e, "cache refresh after quiet expiry failed");
        }
        Ok(true)
    }

    fn cancel_counted(&self, id: &busreminder_core::FavoriteId, report: &mut ReconcileReport) {
        if self.manager.cancel(id).is_err() {
            report.failed += 1;
        }
    }
}

impl<Tz> ReminderService<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    /// Event loop. Runs until `shutdown` broadcasts `true`.
    ///
    /// Reacts to the settings and favorites change streams, handles fired
    /// timers from `fired_rx`, forwards surfaced reminders to `notify_tx`
    /// (non-blocking), and optionally re-syncs everything on a fixed interval.
    pub async fn run(
        self: Arc<Self>,
        mut fired_rx: mpsc::Receiver<ReminderPayload>,
        notify_tx: mpsc::Sender<Reminder>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("reminder service started");
        let mut settings_rx = self.settings.subscribe();
        let mut favorites_rx = self.favorites.subscribe();
        let mut settings_open = true;
        let mut favorites_open = true;

        let mut resync = self.resync_every.map(|every| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                change = settings_rx.recv(), if settings_open => match change {
                    Ok(change) => {
                        if let Err(e) = self.on_settings_changed(&change).await {
                            error!(error = %e, ?change, "settings change handling failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "settings changes lagged; full resync");
                        self.resync_logged().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => settings_open = false,
                },
                change = favorites_rx.recv(), if favorites_open => match change {
                    Ok(change) => {
                        if let Err(e) = self.on_favorite_changed(&change).await {
                            error!(error = %e, ?change, "favorite change handling failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "favorite changes lagged; full resync");
                        self.resync_logged().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => favorites_open = false,
                },
                Some(payload) = fired_rx.recv() => {
                    if let FireDecision::Notify(reminder) = self.handle_fired(&payload).await {
                        // try_send never blocks the loop; drop with a warning if full.
                        if notify_tx.try_send(reminder).is_err() {
                            warn!(favorite_id = %payload.favorite.id, "notification channel full or closed; reminder dropped");
                        }
                    }
                }
                _ = next_tick(&mut resync) => {
                    self.resync_logged().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder service shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn resync_logged(&self) {
        if let Err(e) = self.resync().await {
            error!(error = %e, "resync failed");
        }
    }
}

async fn next_tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
