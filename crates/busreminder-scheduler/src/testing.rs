//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use busreminder_core::{
    DaySet, FavoriteDeparture, FavoriteId, PolicyScope, QuietSuppression, RecurrenceMode,
    ReminderPayload,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::error::{Result, SchedulerError};
use crate::favorites::{FavoriteChange, FavoritesStore};
use crate::settings::{SettingsChange, SettingsStore};
use crate::timer::{TimerKey, TimerPrecision, TimerService};

/// 2026-03-02 is a Monday.
pub fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
}

pub fn favorite(id: &str, route: &str, time: &str) -> FavoriteDeparture {
    FavoriteDeparture::new(id, route, time, 2)
}

pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub at: DateTime<Utc>,
    pub precision: TimerPrecision,
    pub payload: ReminderPayload,
}

/// Timer service that records live registrations and every call made to it.
#[derive(Default)]
pub struct RecordingTimerService {
    pub exact_supported: bool,
    pub deny_exact: bool,
    pub fail_cancel: AtomicBool,
    live: Mutex<HashMap<TimerKey, Registration>>,
    fail_register: Mutex<HashSet<TimerKey>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingTimerService {
    pub fn exact() -> Self {
        Self {
            exact_supported: true,
            ..Default::default()
        }
    }

    pub fn inexact() -> Self {
        Self::default()
    }

    /// Claims exact support but rejects every exact request.
    pub fn denying_exact() -> Self {
        Self {
            deny_exact: true,
            ..Self::exact()
        }
    }

    pub fn fail_register_for(&self, key: TimerKey) {
        self.fail_register.lock().unwrap().insert(key);
    }

    pub fn live(&self) -> HashMap<TimerKey, Registration> {
        self.live.lock().unwrap().clone()
    }

    pub fn registration(&self, id: &str) -> Option<Registration> {
        self.live
            .lock()
            .unwrap()
            .get(&TimerKey::for_favorite(&FavoriteId::from(id)))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn insert(&self, key: &TimerKey, registration: Registration) -> Result<()> {
        if self.fail_register.lock().unwrap().contains(key) {
            return Err(SchedulerError::TimerUnavailable("injected".to_string()));
        }
        let mut live = self.live.lock().unwrap();
        // Catch any caller that registers over a live key without cancelling.
        assert!(!live.contains_key(key), "duplicate live registration for {key}");
        live.insert(key.clone(), registration);
        Ok(())
    }
}

impl TimerService for RecordingTimerService {
    fn supports_exact_scheduling(&self) -> bool {
        self.exact_supported
    }

    fn register_exact(&self, key: &TimerKey, at: DateTime<Utc>, payload: ReminderPayload) -> Result<()> {
        self.calls.lock().unwrap().push(format!("exact {key}"));
        if self.deny_exact {
            return Err(SchedulerError::TimerPermissionDenied("exact alarms not granted".to_string()));
        }
        self.insert(
            key,
            Registration {
                at,
                precision: TimerPrecision::Exact,
                payload,
            },
        )
    }

    fn register_inexact(
        &self,
        key: &TimerKey,
        at: DateTime<Utc>,
        tolerance: Duration,
        payload: ReminderPayload,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(format!("inexact {key}"));
        self.insert(
            key,
            Registration {
                at,
                precision: TimerPrecision::Inexact { tolerance },
                payload,
            },
        )
    }

    fn cancel(&self, key: &TimerKey) -> Result<()> {
        self.calls.lock().unwrap().push(format!("cancel {key}"));
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(SchedulerError::TimerUnavailable("injected".to_string()));
        }
        self.live.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct SettingsState {
    global: Option<RecurrenceMode>,
    routes: HashMap<String, RecurrenceMode>,
    days: HashMap<PolicyScope, DaySet>,
    quiet: QuietSuppression,
}

pub struct MemorySettingsStore {
    state: Mutex<SettingsState>,
    pub fail_reads: AtomicBool,
    tx: broadcast::Sender<SettingsChange>,
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(SettingsState::default()),
            fail_reads: AtomicBool::new(false),
            tx,
        }
    }
}

impl MemorySettingsStore {
    fn read_guard(&self) -> Result<std::sync::MutexGuard<'_, SettingsState>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SchedulerError::SettingsRead("injected".to_string()));
        }
        Ok(self.state.lock().unwrap())
    }

    fn emit(&self, change: SettingsChange) {
        let _ = self.tx.send(change);
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn global_mode(&self) -> Result<RecurrenceMode> {
        Ok(self.read_guard()?.global.unwrap_or(RecurrenceMode::AllDays))
    }

    async fn set_global_mode(&self, mode: RecurrenceMode) -> Result<()> {
        self.state.lock().unwrap().global = Some(mode);
        self.emit(SettingsChange::GlobalPolicy);
        Ok(())
    }

    async fn route_mode(&self, route_id: &str) -> Result<Option<RecurrenceMode>> {
        Ok(self.read_guard()?.routes.get(route_id).copied())
    }

    async fn set_route_mode(&self, route_id: &str, mode: Option<RecurrenceMode>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            match mode {
                Some(m) => state.routes.insert(route_id.to_string(), m),
                None => state.routes.remove(route_id),
            };
        }
        self.emit(SettingsChange::RoutePolicy {
            route_id: route_id.to_string(),
        });
        Ok(())
    }

    async fn selected_days(&self, scope: &PolicyScope) -> Result<DaySet> {
        Ok(self.read_guard()?.days.get(scope).copied().unwrap_or_default())
    }

    async fn set_selected_days(&self, scope: &PolicyScope, days: DaySet) -> Result<()> {
        self.state.lock().unwrap().days.insert(scope.clone(), days);
        self.emit(match scope {
            PolicyScope::Global => SettingsChange::GlobalPolicy,
            PolicyScope::Route(route_id) => SettingsChange::RoutePolicy {
                route_id: route_id.clone(),
            },
        });
        Ok(())
    }

    async fn quiet_suppression(&self) -> Result<QuietSuppression> {
        Ok(self.read_guard()?.quiet)
    }

    async fn set_quiet_suppression(&self, value: QuietSuppression) -> Result<()> {
        self.state.lock().unwrap().quiet = value;
        self.emit(SettingsChange::QuietSuppression);
        Ok(())
    }

    async fn routes_with_overrides(&self) -> Result<Vec<String>> {
        Ok(self.read_guard()?.routes.keys().cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.tx.subscribe()
    }
}

pub struct MemoryFavoritesStore {
    favorites: Mutex<Vec<FavoriteDeparture>>,
    tx: broadcast::Sender<FavoriteChange>,
}

impl MemoryFavoritesStore {
    pub fn new(favorites: Vec<FavoriteDeparture>) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            favorites: Mutex::new(favorites),
            tx,
        }
    }

    pub fn add(&self, favorite: FavoriteDeparture) {
        let id = favorite.id.clone();
        self.favorites.lock().unwrap().push(favorite);
        let _ = self.tx.send(FavoriteChange::Added { id });
    }

    pub fn set_active(&self, id: &str, active: bool) {
        for f in self.favorites.lock().unwrap().iter_mut() {
            if f.id.as_str() == id {
                f.is_active = active;
            }
        }
        let _ = self.tx.send(FavoriteChange::ActivityToggled {
            id: FavoriteId::from(id),
            active,
        });
    }

    /// Replace the stored favorite with the same id.
    pub fn update(&self, favorite: FavoriteDeparture) {
        let id = favorite.id.clone();
        for f in self.favorites.lock().unwrap().iter_mut() {
            if f.id == id {
                *f = favorite.clone();
            }
        }
        let _ = self.tx.send(FavoriteChange::Updated { id });
    }

    /// Mutate without notifying, as a write from another process would.
    pub fn set_active_silently(&self, id: &str, active: bool) {
        for f in self.favorites.lock().unwrap().iter_mut() {
            if f.id.as_str() == id {
                f.is_active = active;
            }
        }
    }

    pub fn remove_silently(&self, id: &str) {
        self.favorites.lock().unwrap().retain(|f| f.id.as_str() != id);
    }

    pub fn remove(&self, id: &str) {
        self.favorites.lock().unwrap().retain(|f| f.id.as_str() != id);
        let _ = self.tx.send(FavoriteChange::Removed {
            id: FavoriteId::from(id),
        });
    }
}

#[async_trait]
impl FavoritesStore for MemoryFavoritesStore {
    async fn list_active(&self) -> Result<Vec<FavoriteDeparture>> {
        Ok(self
            .favorites
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.is_active)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<FavoriteDeparture>> {
        Ok(self.favorites.lock().unwrap().clone())
    }

    async fn get(&self, id: &FavoriteId) -> Result<Option<FavoriteDeparture>> {
        Ok(self
            .favorites
            .lock()
            .unwrap()
            .iter()
            .find(|f| &f.id == id)
            .cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<FavoriteChange> {
        self.tx.subscribe()
    }
}
