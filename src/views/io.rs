//! Import/export snapshot round-trip (spec §4.J).

use rusqlite::{params, Connection, Transaction};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::model::{new_id, DependencyType};
use crate::store::Store;

pub fn export_data(conn: &Connection, exported_at: i64) -> Result<Value> {
    let items = Store::load_items(conn)?;
    let deps = Store::load_dependencies(conn)?;
    let blockers = Store::load_blockers(conn)?;
    let blocks = Store::load_scheduled_blocks(conn)?;
    let entries = Store::load_time_entries(conn)?;
    let timers = Store::load_running_timers(conn)?;
    let tags = Store::load_tags(conn)?;
    let assignees = Store::load_assignees(conn)?;
    let settings = Store::load_settings(conn)?;

    Ok(json!({
        "exported_at": exported_at,
        "items": items,
        "dependencies": deps,
        "blockers": blockers,
        "scheduled_blocks": blocks,
        "time_entries": entries,
        "running_timers": timers,
        "item_tags": tags,
        "item_assignees": assignees,
        "settings": settings,
    }))
}

/// Truncate every domain table and reinsert from `payload`, in dependency
/// order (items first, so foreign-key-shaped references resolve).
pub fn import_data(tx: &Transaction, payload: &Value) -> Result<()> {
    for table in [
        "item_assignees", "item_tags", "running_timers", "time_entries",
        "scheduled_blocks", "blockers", "dependencies", "items", "settings",
    ] {
        tx.execute(&format!("DELETE FROM {table}"), [])?;
    }

    for row in payload.get("items").and_then(Value::as_array).cloned().unwrap_or_default() {
        tx.execute(
            "INSERT INTO items (id, item_type, title, parent_id, status, priority, due_at, estimate_mode,
                                 estimate_minutes, health, health_mode, notes, sort_order, completed_at,
                                 archived_at, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                str_field(&row, "id")?, str_field(&row, "item_type")?, str_field(&row, "title")?,
                opt_str_field(&row, "parent_id"), str_field(&row, "status")?, i64_field(&row, "priority").unwrap_or(0),
                opt_i64_field(&row, "due_at"), str_field(&row, "estimate_mode")?, i64_field(&row, "estimate_minutes").unwrap_or(0),
                str_field(&row, "health")?, str_field(&row, "health_mode")?, opt_str_field(&row, "notes"),
                i64_field(&row, "sort_order").unwrap_or(0), opt_i64_field(&row, "completed_at"),
                opt_i64_field(&row, "archived_at"), i64_field(&row, "created_at").unwrap_or(0),
                i64_field(&row, "updated_at").unwrap_or(0),
            ],
        )?;
    }

    for row in payload.get("dependencies").and_then(Value::as_array).cloned().unwrap_or_default() {
        let dep_type = DependencyType::normalize(row.get("type").or_else(|| row.get("dep_type")).and_then(Value::as_str));
        tx.execute(
            "INSERT OR IGNORE INTO dependencies (successor_id, predecessor_id, dep_type, lag_minutes) VALUES (?1,?2,?3,?4)",
            params![
                str_field(&row, "successor_id")?, str_field(&row, "predecessor_id")?,
                dep_type.as_str(), i64_field(&row, "lag_minutes").unwrap_or(0),
            ],
        )?;
    }

    for row in payload.get("blockers").and_then(Value::as_array).cloned().unwrap_or_default() {
        let text = row.get("text").and_then(Value::as_str).or_else(|| row.get("reason").and_then(Value::as_str)).unwrap_or("").to_string();
        let kind = row.get("kind").and_then(Value::as_str).unwrap_or("general").to_string();
        tx.execute(
            "INSERT INTO blockers (blocker_id, item_id, kind, text, created_at, cleared_at) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                str_field(&row, "blocker_id").unwrap_or_else(|_| new_id()), str_field(&row, "item_id")?,
                kind, text, i64_field(&row, "created_at").unwrap_or(0), opt_i64_field(&row, "cleared_at"),
            ],
        )?;
    }

    for row in payload.get("scheduled_blocks").and_then(Value::as_array).cloned().unwrap_or_default() {
        tx.execute(
            "INSERT INTO scheduled_blocks (block_id, item_id, start_at, duration_minutes, locked, source) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                str_field(&row, "block_id").unwrap_or_else(|_| new_id()), str_field(&row, "item_id")?,
                i64_field(&row, "start_at")?, i64_field(&row, "duration_minutes")?,
                row.get("locked").and_then(Value::as_bool).unwrap_or(false),
                row.get("source").and_then(Value::as_str).unwrap_or("user").to_string(),
            ],
        )?;
    }

    for row in payload.get("time_entries").and_then(Value::as_array).cloned().unwrap_or_default() {
        tx.execute(
            "INSERT INTO time_entries (entry_id, item_id, start_at, end_at, duration_minutes, note, source) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                str_field(&row, "entry_id").unwrap_or_else(|_| new_id()), str_field(&row, "item_id")?,
                i64_field(&row, "start_at")?, i64_field(&row, "end_at")?, i64_field(&row, "duration_minutes")?,
                opt_str_field(&row, "note"), row.get("source").and_then(Value::as_str).unwrap_or("manual").to_string(),
            ],
        )?;
    }

    for row in payload.get("running_timers").and_then(Value::as_array).cloned().unwrap_or_default() {
        tx.execute(
            "INSERT INTO running_timers (item_id, start_at, note) VALUES (?1,?2,?3)",
            params![str_field(&row, "item_id")?, i64_field(&row, "start_at")?, opt_str_field(&row, "note")],
        )?;
    }

    for row in payload.get("item_tags").and_then(Value::as_array).cloned().unwrap_or_default() {
        tx.execute(
            "INSERT INTO item_tags (item_id, tag) VALUES (?1,?2)",
            params![str_field(&row, "item_id")?, str_field(&row, "tag")?],
        )?;
    }

    for row in payload.get("item_assignees").and_then(Value::as_array).cloned().unwrap_or_default() {
        tx.execute(
            "INSERT INTO item_assignees (item_id, assignee_id) VALUES (?1,?2)",
            params![str_field(&row, "item_id")?, str_field(&row, "assignee_id")?],
        )?;
    }

    for row in payload.get("settings").and_then(Value::as_array).cloned().unwrap_or_default() {
        let value_json = row.get("value_json").cloned().unwrap_or(Value::Null);
        let value_json = value_json.as_str().map(str::to_string).unwrap_or_else(|| value_json.to_string());
        tx.execute(
            "INSERT INTO settings (key, value_json) VALUES (?1,?2)",
            params![str_field(&row, "key")?, value_json],
        )?;
    }

    Ok(())
}

fn str_field(row: &Value, field: &str) -> Result<String> {
    row.get(field).and_then(Value::as_str).map(str::to_string).ok_or_else(|| Error::validation(field, "missing in import payload"))
}

fn opt_str_field(row: &Value, field: &str) -> Option<String> {
    row.get(field).and_then(Value::as_str).map(str::to_string)
}

fn i64_field(row: &Value, field: &str) -> Result<i64> {
    row.get(field).and_then(Value::as_i64).ok_or_else(|| Error::validation(field, "missing in import payload"))
}

fn opt_i64_field(row: &Value, field: &str) -> Option<i64> {
    row.get(field).and_then(Value::as_i64)
}
