//! Embedded transactional store. Holds one `rusqlite::Connection` behind a
//! mutex — single-writer, matching the concurrency model in spec §5. Readers
//! and writers alike go through `Store`; there is no separate pool because
//! SQLite WAL mode already lets a writer and readers coexist on one handle
//! for an embedded, single-process kernel.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;
use crate::model::*;
use crate::schema;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON")?;
        let store = Store { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON")?;
        let store = Store { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        for stmt in schema::SCHEMA_STATEMENTS {
            tx.execute_batch(stmt)?;
        }
        let current: Option<String> = tx
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .ok();
        let applied: i32 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
        for migration in schema::MIGRATIONS {
            if migration.version > applied {
                tx.execute_batch(migration.sql)?;
            }
        }
        tx.execute(
            "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![schema::CURRENT_SCHEMA_VERSION.to_string()],
        )?;
        for (key, value) in schema::DEFAULT_SETTINGS {
            tx.execute(
                "INSERT OR IGNORE INTO settings (key, value_json) VALUES (?1, ?2)",
                rusqlite::params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Run `f` inside one write transaction. Committed on `Ok`, rolled back on `Err`.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&rusqlite::Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Borrow the connection for read-only queries.
    pub fn read(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    // -- bulk row loaders, used by the pure-function engines over snapshots --

    pub fn load_items(conn: &Connection) -> Result<Vec<Item>> {
        let mut stmt = conn.prepare(
            "SELECT id, item_type, title, parent_id, status, priority, due_at, estimate_mode,
                    estimate_minutes, health, health_mode, notes, sort_order, completed_at,
                    archived_at, created_at, updated_at FROM items",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Item {
                id: row.get(0)?,
                item_type: ItemType::parse(&row.get::<_, String>(1)?).unwrap_or(ItemType::Task),
                title: row.get(2)?,
                parent_id: row.get(3)?,
                status: Status::parse(&row.get::<_, String>(4)?).unwrap_or(Status::Backlog),
                priority: row.get(5)?,
                due_at: row.get(6)?,
                estimate_mode: EstimateMode::parse(&row.get::<_, String>(7)?).unwrap_or(EstimateMode::Manual),
                estimate_minutes: row.get(8)?,
                health: Health::parse(&row.get::<_, String>(9)?).unwrap_or(Health::Unknown),
                health_mode: HealthMode::parse(&row.get::<_, String>(10)?).unwrap_or(HealthMode::Auto),
                notes: row.get(11)?,
                sort_order: row.get(12)?,
                completed_at: row.get(13)?,
                archived_at: row.get(14)?,
                created_at: row.get(15)?,
                updated_at: row.get(16)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_item(conn: &Connection, id: &str) -> Result<Option<Item>> {
        Ok(Self::load_items(conn)?.into_iter().find(|i| i.id == id))
    }

    pub fn load_dependencies(conn: &Connection) -> Result<Vec<DependencyEdge>> {
        let mut stmt = conn.prepare("SELECT successor_id, predecessor_id, dep_type, lag_minutes FROM dependencies")?;
        let rows = stmt.query_map([], |row| {
            Ok(DependencyEdge {
                successor_id: row.get(0)?,
                predecessor_id: row.get(1)?,
                dep_type: DependencyType::normalize(Some(&row.get::<_, String>(2)?)),
                lag_minutes: row.get(3)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_blockers(conn: &Connection) -> Result<Vec<Blocker>> {
        let mut stmt = conn.prepare("SELECT blocker_id, item_id, kind, text, created_at, cleared_at FROM blockers")?;
        let rows = stmt.query_map([], |row| {
            Ok(Blocker {
                blocker_id: row.get(0)?,
                item_id: row.get(1)?,
                kind: row.get(2)?,
                text: row.get(3)?,
                created_at: row.get(4)?,
                cleared_at: row.get(5)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_scheduled_blocks(conn: &Connection) -> Result<Vec<ScheduledBlock>> {
        let mut stmt = conn.prepare(
            "SELECT block_id, item_id, start_at, duration_minutes, locked, source FROM scheduled_blocks",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ScheduledBlock {
                block_id: row.get(0)?,
                item_id: row.get(1)?,
                start_at: row.get(2)?,
                duration_minutes: row.get(3)?,
                locked: row.get::<_, i64>(4)? != 0,
                source: row.get(5)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_time_entries(conn: &Connection) -> Result<Vec<TimeEntry>> {
        let mut stmt = conn.prepare(
            "SELECT entry_id, item_id, start_at, end_at, duration_minutes, note, source FROM time_entries",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TimeEntry {
                entry_id: row.get(0)?,
                item_id: row.get(1)?,
                start_at: row.get(2)?,
                end_at: row.get(3)?,
                duration_minutes: row.get(4)?,
                note: row.get(5)?,
                source: row.get(6)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_running_timers(conn: &Connection) -> Result<Vec<RunningTimer>> {
        let mut stmt = conn.prepare("SELECT item_id, start_at, note FROM running_timers")?;
        let rows = stmt.query_map([], |row| {
            Ok(RunningTimer { item_id: row.get(0)?, start_at: row.get(1)?, note: row.get(2)? })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_assignees(conn: &Connection) -> Result<Vec<ItemAssignee>> {
        let mut stmt = conn.prepare("SELECT item_id, assignee_id FROM item_assignees")?;
        let rows = stmt.query_map([], |row| {
            Ok(ItemAssignee { item_id: row.get(0)?, assignee_id: row.get(1)? })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_tags(conn: &Connection) -> Result<Vec<ItemTag>> {
        let mut stmt = conn.prepare("SELECT item_id, tag FROM item_tags")?;
        let rows = stmt.query_map([], |row| Ok(ItemTag { item_id: row.get(0)?, tag: row.get(1)? }))?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_settings(conn: &Connection) -> Result<Vec<Setting>> {
        let mut stmt = conn.prepare("SELECT key, value_json FROM settings")?;
        let rows = stmt.query_map([], |row| Ok(Setting { key: row.get(0)?, value_json: row.get(1)? }))?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
        conn.query_row("SELECT value_json FROM settings WHERE key = ?1", rusqlite::params![key], |row| row.get(0))
            .map(Some)
            .or_else(|e| if matches!(e, rusqlite::Error::QueryReturnedNoRows) { Ok(None) } else { Err(e.into()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_has_default_settings() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.read();
        let val = Store::get_setting(&conn, "capacity_minutes_per_day").unwrap();
        assert_eq!(val.as_deref(), Some("480"));
    }

    #[test]
    fn reopen_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.init_schema().unwrap();
        let conn = store.read();
        assert_eq!(Store::load_items(&conn).unwrap().len(), 0);
    }
}
