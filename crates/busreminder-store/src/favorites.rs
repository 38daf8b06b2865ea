use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use busreminder_core::{FavoriteDeparture, FavoriteId};
use busreminder_scheduler::{FavoriteChange, FavoritesStore};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::db::init_db;
use crate::error::{favorites_err, Result, StoreError};

const COLUMNS: &str = "id, route_id, departure_time, base_weekday, is_active, route_name, stop_name";

fn row_to_favorite(row: &Row<'_>) -> rusqlite::Result<FavoriteDeparture> {
    let id: String = row.get(0)?;
    let is_active: i64 = row.get(4)?;
    let base_weekday: i64 = row.get(3)?;
    Ok(FavoriteDeparture {
        id: FavoriteId::from(id),
        route_id: row.get(1)?,
        departure_time: row.get(2)?,
        // Out-of-range values survive as 0 and fail validation at schedule time.
        base_weekday: u8::try_from(base_weekday).unwrap_or(0),
        is_active: is_active != 0,
        route_name: row.get(5)?,
        stop_name: row.get(6)?,
    })
}

/// Favorites persisted in the `favorites` table.
///
/// Rows are stored as entered; validation happens when the engine schedules
/// them so one bad row never blocks the rest.
pub struct SqliteFavoritesStore {
    conn: Mutex<Connection>,
    tx: broadcast::Sender<FavoriteChange>,
}

impl SqliteFavoritesStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        let (tx, _) = broadcast::channel(64);
        Ok(Self {
            conn: Mutex::new(conn),
            tx,
        })
    }

    fn emit(&self, change: FavoriteChange) {
        let _ = self.tx.send(change);
    }

    /// Insert a new favorite. Fails with [`StoreError::Duplicate`] if the id is taken.
    pub fn add(&self, favorite: &FavoriteDeparture) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Utc::now().to_rfc3339();
            let inserted = conn.execute(
                "INSERT INTO favorites
                 (id, route_id, departure_time, base_weekday, is_active, route_name, stop_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    favorite.id.as_str(),
                    favorite.route_id,
                    favorite.departure_time,
                    favorite.base_weekday,
                    favorite.is_active,
                    favorite.route_name,
                    favorite.stop_name,
                    now,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::Duplicate {
                    id: favorite.id.to_string(),
                });
            }
        }
        info!(favorite_id = %favorite.id, route_id = %favorite.route_id, "favorite added");
        self.emit(FavoriteChange::Added {
            id: favorite.id.clone(),
        });
        Ok(())
    }

    /// Replace the editable fields of an existing favorite.
    pub fn update(&self, favorite: &FavoriteDeparture) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = conn.execute(
                "UPDATE favorites
                 SET route_id = ?2, departure_time = ?3, base_weekday = ?4, is_active = ?5,
                     route_name = ?6, stop_name = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    favorite.id.as_str(),
                    favorite.route_id,
                    favorite.departure_time,
                    favorite.base_weekday,
                    favorite.is_active,
                    favorite.route_name,
                    favorite.stop_name,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    id: favorite.id.to_string(),
                });
            }
        }
        debug!(favorite_id = %favorite.id, "favorite updated");
        self.emit(FavoriteChange::Updated {
            id: favorite.id.clone(),
        });
        Ok(())
    }

    pub fn remove(&self, id: &FavoriteId) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let deleted = conn.execute("DELETE FROM favorites WHERE id = ?1", [id.as_str()])?;
            if deleted == 0 {
                return Err(StoreError::NotFound { id: id.to_string() });
            }
        }
        info!(favorite_id = %id, "favorite removed");
        self.emit(FavoriteChange::Removed { id: id.clone() });
        Ok(())
    }

    /// Toggle whether the favorite receives reminders.
    pub fn set_active(&self, id: &FavoriteId, active: bool) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = conn.execute(
                "UPDATE favorites SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.as_str(), active, Utc::now().to_rfc3339()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound { id: id.to_string() });
            }
        }
        info!(favorite_id = %id, active, "favorite activity toggled");
        self.emit(FavoriteChange::ActivityToggled {
            id: id.clone(),
            active,
        });
        Ok(())
    }

    /// Every favorite, active or not, oldest first.
    pub fn list(&self) -> Result<Vec<FavoriteDeparture>> {
        self.query(&format!(
            "SELECT {COLUMNS} FROM favorites ORDER BY created_at, id"
        ))
    }

    pub fn find(&self, id: &FavoriteId) -> Result<Option<FavoriteDeparture>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let favorite = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM favorites WHERE id = ?1"),
                [id.as_str()],
                row_to_favorite,
            )
            .optional()?;
        Ok(favorite)
    }

    fn query(&self, sql: &str) -> Result<Vec<FavoriteDeparture>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_favorite)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl FavoritesStore for SqliteFavoritesStore {
    async fn list_active(&self) -> busreminder_scheduler::Result<Vec<FavoriteDeparture>> {
        self.query(&format!(
            "SELECT {COLUMNS} FROM favorites WHERE is_active = 1 ORDER BY created_at, id"
        ))
        .map_err(favorites_err)
    }

    async fn list_all(&self) -> busreminder_scheduler::Result<Vec<FavoriteDeparture>> {
        SqliteFavoritesStore::list(self).map_err(favorites_err)
    }

    async fn get(&self, id: &FavoriteId) -> busreminder_scheduler::Result<Option<FavoriteDeparture>> {
        self.find(id).map_err(favorites_err)
    }

    fn subscribe(&self) -> broadcast::Receiver<FavoriteChange> {
        self.tx.subscribe()
    }
}
