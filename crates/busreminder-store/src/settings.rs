use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use busreminder_core::{DaySet, PolicyScope, QuietSuppression, RecurrenceMode};
use busreminder_scheduler::{SettingsChange, SettingsStore};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::broadcast;
use tracing::debug;

use crate::db::init_db;
use crate::error::{settings_read, settings_write, Result, StoreError};

const GLOBAL_MODE: &str = "recurrence.global.mode";
const GLOBAL_DAYS: &str = "recurrence.global.days";
const QUIET: &str = "quiet.state";
const ROUTE_PREFIX: &str = "recurrence.route.";
const MODE_SUFFIX: &str = ".mode";
const DAYS_SUFFIX: &str = ".days";

fn route_mode_key(route_id: &str) -> String {
    format!("{ROUTE_PREFIX}{route_id}{MODE_SUFFIX}")
}

fn days_key(scope: &PolicyScope) -> String {
    match scope {
        PolicyScope::Global => GLOBAL_DAYS.to_string(),
        PolicyScope::Route(route_id) => format!("{ROUTE_PREFIX}{route_id}{DAYS_SUFFIX}"),
    }
}

/// Settings store persisted to the `preferences` key/value table.
///
/// Missing keys read as defaults: global mode `all_days`, no route
/// overrides, empty day sets, quiet suppression `enabled`.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
    tx: broadcast::Sender<SettingsChange>,
}

impl SqliteSettingsStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        let (tx, _) = broadcast::channel(64);
        Ok(Self {
            conn: Mutex::new(conn),
            tx,
        })
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let value = conn
            .query_row("SELECT value FROM preferences WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value, Utc::now().to_rfc3339()],
        )?;
        debug!(%key, %value, "preference written");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute("DELETE FROM preferences WHERE key = ?1", [key])?;
        Ok(())
    }

    fn get_mode(&self, key: &str) -> Result<Option<RecurrenceMode>> {
        self.get(key)?
            .map(|v| {
                v.parse::<RecurrenceMode>().map_err(|reason| StoreError::Corrupt {
                    key: key.to_string(),
                    reason,
                })
            })
            .transpose()
    }

    /// Every `recurrence.route.*` key. Any row error fails the whole read.
    fn route_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt =
            conn.prepare("SELECT key FROM preferences WHERE key LIKE 'recurrence.route.%' ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn emit(&self, change: SettingsChange) {
        // No subscribers is fine.
        let _ = self.tx.send(change);
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn global_mode(&self) -> busreminder_scheduler::Result<RecurrenceMode> {
        Ok(self
            .get_mode(GLOBAL_MODE)
            .map_err(settings_read)?
            .unwrap_or(RecurrenceMode::AllDays))
    }

    async fn set_global_mode(&self, mode: RecurrenceMode) -> busreminder_scheduler::Result<()> {
        self.put(GLOBAL_MODE, &mode.to_string())
            .map_err(settings_write)?;
        self.emit(SettingsChange::GlobalPolicy);
        Ok(())
    }

    async fn route_mode(&self, route_id: &str) -> busreminder_scheduler::Result<Option<RecurrenceMode>> {
        self.get_mode(&route_mode_key(route_id)).map_err(settings_read)
    }

    async fn set_route_mode(
        &self,
        route_id: &str,
        mode: Option<RecurrenceMode>,
    ) -> busreminder_scheduler::Result<()> {
        let key = route_mode_key(route_id);
        match mode {
            Some(m) => self.put(&key, &m.to_string()),
            None => self.delete(&key),
        }
        .map_err(settings_write)?;
        self.emit(SettingsChange::RoutePolicy {
            route_id: route_id.to_string(),
        });
        Ok(())
    }

    async fn selected_days(&self, scope: &PolicyScope) -> busreminder_scheduler::Result<DaySet> {
        let key = days_key(scope);
        match self.get(&key).map_err(settings_read)? {
            None => Ok(DaySet::empty()),
            Some(v) => DaySet::parse_numbers(&v)
                .map_err(|reason| settings_read(StoreError::Corrupt { key, reason })),
        }
    }

    async fn set_selected_days(&self, scope: &PolicyScope, days: DaySet) -> busreminder_scheduler::Result<()> {
        self.put(&days_key(scope), &days.to_numbers())
            .map_err(settings_write)?;
        self.emit(match scope {
            PolicyScope::Global => SettingsChange::GlobalPolicy,
            PolicyScope::Route(route_id) => SettingsChange::RoutePolicy {
                route_id: route_id.clone(),
            },
        });
        Ok(())
    }

    async fn quiet_suppression(&self) -> busreminder_scheduler::Result<QuietSuppression> {
        match self.get(QUIET).map_err(settings_read)? {
            None => Ok(QuietSuppression::Enabled),
            Some(v) => serde_json::from_str(&v).map_err(|e| {
                settings_read(StoreError::Corrupt {
                    key: QUIET.to_string(),
                    reason: e.to_string(),
                })
            }),
        }
    }

    async fn set_quiet_suppression(&self, value: QuietSuppression) -> busreminder_scheduler::Result<()> {
        let json = serde_json::to_string(&value).map_err(|e| {
            settings_write(StoreError::Corrupt {
                key: QUIET.to_string(),
                reason: e.to_string(),
            })
        })?;
        self.put(QUIET, &json).map_err(settings_write)?;
        self.emit(SettingsChange::QuietSuppression);
        Ok(())
    }

    async fn routes_with_overrides(&self) -> busreminder_scheduler::Result<Vec<String>> {
        let keys = self.route_keys().map_err(settings_read)?;
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(ROUTE_PREFIX)?.strip_suffix(MODE_SUFFIX))
            .map(String::from)
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.tx.subscribe()
    }
}
