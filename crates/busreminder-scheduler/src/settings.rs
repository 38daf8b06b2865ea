//! Settings collaborator: asynchronously persisted recurrence and quiet
//! preferences, plus a change stream.

use async_trait::async_trait;
use busreminder_core::{DaySet, PolicyScope, QuietSuppression, RecurrenceMode};
use tokio::sync::broadcast;

use crate::error::Result;

/// Which setting changed. Emitted only after the write has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsChange {
    /// Global mode or global selected days.
    GlobalPolicy,
    /// One route's override mode or selected days.
    RoutePolicy { route_id: String },
    QuietSuppression,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn global_mode(&self) -> Result<RecurrenceMode>;
    async fn set_global_mode(&self, mode: RecurrenceMode) -> Result<()>;

    /// `None` means the route has no override.
    async fn route_mode(&self, route_id: &str) -> Result<Option<RecurrenceMode>>;
    async fn set_route_mode(&self, route_id: &str, mode: Option<RecurrenceMode>) -> Result<()>;

    async fn selected_days(&self, scope: &PolicyScope) -> Result<DaySet>;
    async fn set_selected_days(&self, scope: &PolicyScope, days: DaySet) -> Result<()>;

    async fn quiet_suppression(&self) -> Result<QuietSuppression>;
    async fn set_quiet_suppression(&self, value: QuietSuppression) -> Result<()>;

    /// Every route that currently has an override mode stored.
    async fn routes_with_overrides(&self) -> Result<Vec<String>>;

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange>;
}

/// A single settings mutation, applied through [`crate::ReminderService::apply`]
/// so the write, the cache refresh, and the reconcile happen in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsUpdate {
    GlobalMode(RecurrenceMode),
    RouteMode {
        route_id: String,
        mode: Option<RecurrenceMode>,
    },
    SelectedDays {
        scope: PolicyScope,
        days: DaySet,
    },
    Quiet(QuietSuppression),
}

impl SettingsUpdate {
    pub async fn write_to(&self, store: &dyn SettingsStore) -> Result<()> {
        match self {
            SettingsUpdate::GlobalMode(mode) => store.set_global_mode(*mode).await,
            SettingsUpdate::RouteMode { route_id, mode } => store.set_route_mode(route_id, *mode).await,
            SettingsUpdate::SelectedDays { scope, days } => store.set_selected_days(scope, *days).await,
            SettingsUpdate::Quiet(value) => store.set_quiet_suppression(*value).await,
        }
    }

    /// The change notification this update corresponds to.
    pub fn change(&self) -> SettingsChange {
        match self {
            SettingsUpdate::GlobalMode(_)
            | SettingsUpdate::SelectedDays {
                scope: PolicyScope::Global,
                ..
            } => SettingsChange::GlobalPolicy,
            SettingsUpdate::RouteMode { route_id, .. }
            | SettingsUpdate::SelectedDays {
                scope: PolicyScope::Route(route_id),
                ..
            } => SettingsChange::RoutePolicy {
                route_id: route_id.clone(),
            },
            SettingsUpdate::Quiet(_) => SettingsChange::QuietSuppression,
        }
    }
}
