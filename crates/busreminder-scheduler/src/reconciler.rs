use std::sync::Arc;

use busreminder_core::FavoriteDeparture;
use chrono::TimeZone;
use tracing::{debug, info, warn};

use crate::cache::RecurrencePreferencesCache;
use crate::lifecycle::{ScheduleOutcome, TimerLifecycleManager};
use crate::schedule::NoOccurrence;

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// A registration now exists.
    pub scheduled: usize,
    /// Policy resolved to `Disabled`; cancelled only.
    pub disabled: usize,
    /// Inactive favorite; cancelled only.
    pub inactive: usize,
    /// Valid, but no occurrence in the horizon or too soon to notify.
    pub no_occurrence: usize,
    /// Failed validation.
    pub invalid: usize,
    /// Timer service error.
    pub failed: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.scheduled + self.disabled + self.inactive + self.no_occurrence + self.invalid + self.failed
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.scheduled += other.scheduled;
        self.disabled += other.disabled;
        self.inactive += other.inactive;
        self.no_occurrence += other.no_occurrence;
        self.invalid += other.invalid;
        self.failed += other.failed;
    }
}

/// Best-effort sweep that brings timer registrations back in line with the
/// current favorites and settings. Not a transaction: each favorite succeeds
/// or fails on its own.
pub struct BatchReconciler<Tz: TimeZone> {
    manager: Arc<TimerLifecycleManager<Tz>>,
    cache: Arc<RecurrencePreferencesCache>,
}

impl<Tz: TimeZone> BatchReconciler<Tz> {
    pub fn new(manager: Arc<TimerLifecycleManager<Tz>>, cache: Arc<RecurrencePreferencesCache>) -> Self {
        Self { manager, cache }
    }

    /// Reconcile every favorite in `favorites`. The cache must already be
    /// refreshed for the settings change that triggered this pass.
    pub fn reconcile_all(&self, favorites: &[FavoriteDeparture]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for favorite in favorites {
            self.reconcile_item(favorite, &mut report);
        }
        info!(
            version = self.cache.version(),
            total = report.total(),
            scheduled = report.scheduled,
            disabled = report.disabled,
            inactive = report.inactive,
            no_occurrence = report.no_occurrence,
            invalid = report.invalid,
            failed = report.failed,
            "reconciliation complete"
        );
        report
    }

    /// Single-favorite variant, used when one favorite or one route changes.
    pub fn reconcile_one(&self, favorite: &FavoriteDeparture) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        self.reconcile_item(favorite, &mut report);
        report
    }

    fn reconcile_item(&self, favorite: &FavoriteDeparture, report: &mut ReconcileReport) {
        let id = &favorite.id;

        if let Err(e) = self.manager.cancel(id) {
            warn!(favorite_id = %id, error = %e, "reconcile: cancel failed; skipping favorite");
            report.failed += 1;
            return;
        }

        if !favorite.is_active {
            debug!(favorite_id = %id, "reconcile: inactive, left cancelled");
            report.inactive += 1;
            return;
        }

        if self.cache.policy(&favorite.route_id).is_disabled() {
            debug!(favorite_id = %id, route_id = %favorite.route_id, "reconcile: policy disabled");
            report.disabled += 1;
            return;
        }

        match self.manager.schedule(favorite) {
            ScheduleOutcome::Scheduled { .. } => report.scheduled += 1,
            ScheduleOutcome::NotScheduled(NoOccurrence::InvalidFavorite(_)) => report.invalid += 1,
            ScheduleOutcome::NotScheduled(NoOccurrence::Disabled) => report.disabled += 1,
            ScheduleOutcome::NotScheduled(_) => report.no_occurrence += 1,
            ScheduleOutcome::Failed(_) => report.failed += 1,
        }
    }
}
