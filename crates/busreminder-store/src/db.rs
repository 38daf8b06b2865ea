use rusqlite::Connection;

use crate::error::Result;

/// Initialise the favorites and preferences schema in `conn`.
///
/// Idempotent; safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS favorites (
            id              TEXT    NOT NULL PRIMARY KEY,
            route_id        TEXT    NOT NULL,
            departure_time  TEXT    NOT NULL,   -- HH:MM as entered; validated at schedule time
            base_weekday    INTEGER NOT NULL,   -- 1 = Sunday … 7 = Saturday
            is_active       INTEGER NOT NULL DEFAULT 1,
            route_name      TEXT,
            stop_name       TEXT,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_favorites_active ON favorites (is_active);

        -- Flat key/value preferences, e.g. recurrence.global.mode = 'weekdays'
        CREATE TABLE IF NOT EXISTS preferences (
            key         TEXT NOT NULL PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('favorites', 'preferences')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);
    }
}
