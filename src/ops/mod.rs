//! Operation executor (spec §4.H). One function per operation name; every
//! function runs inside the caller's open `rusqlite::Transaction` and returns
//! an `OpOutcome` the router wraps into the response envelope.

pub mod args;

use rusqlite::{params, Transaction};
use serde_json::{json, Value};

use crate::blocked;
use crate::dependency;
use crate::error::{Error, Result};
use crate::health::ceil_div;
use crate::model::{new_id, DependencyType, EstimateMode, Health, HealthMode, ItemType, Status};
use crate::store::Store;
use args::Args;

pub struct Actor {
    pub actor_type: String,
    pub actor_id: Option<String>,
}

impl Actor {
    pub fn label(&self) -> String {
        match &self.actor_id {
            Some(id) => format!("{}:{}", self.actor_type, id),
            None => self.actor_type.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpOutcome {
    pub result: Value,
    pub warnings: Vec<String>,
    pub invalidate: Vec<String>,
}

impl OpOutcome {
    fn new(result: Value) -> Self {
        OpOutcome { result, warnings: Vec::new(), invalidate: Vec::new() }
    }

    fn with_invalidate(mut self, tags: Vec<String>) -> Self {
        self.invalidate = tags;
        self
    }

    fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

fn item_tag(id: &str) -> String {
    format!("item:{id}")
}

fn require_item_exists(tx: &Transaction, id: &str) -> Result<()> {
    let exists: Option<i64> = tx
        .query_row("SELECT 1 FROM items WHERE id = ?1", params![id], |row| row.get(0))
        .ok();
    if exists.is_none() {
        return Err(Error::NotFound(format!("item not found: {id}")));
    }
    Ok(())
}

fn next_sort_order(tx: &Transaction, parent_id: Option<&str>) -> Result<i64> {
    let max: Option<i64> = match parent_id {
        Some(pid) => tx.query_row(
            "SELECT MAX(sort_order) FROM items WHERE parent_id = ?1",
            params![pid],
            |row| row.get(0),
        ),
        None => tx.query_row("SELECT MAX(sort_order) FROM items WHERE parent_id IS NULL", [], |row| row.get(0)),
    }
    .unwrap_or(None);
    Ok(max.map(|m| m + 1).unwrap_or(0))
}

/// `has_active_blocker OR has_unmet_dep` for a single item, computed live
/// against the transaction's current rows.
fn item_is_blocked(tx: &Transaction, id: &str) -> Result<bool> {
    let status: String = tx.query_row("SELECT status FROM items WHERE id = ?1", params![id], |row| row.get(0))?;
    let status = Status::parse(&status)?;

    let has_active_blocker: bool = tx
        .query_row(
            "SELECT COUNT(*) FROM blockers WHERE item_id = ?1 AND cleared_at IS NULL",
            params![id],
            |row| row.get::<_, i64>(0),
        )
        .map(|c| c > 0)?;

    let deps = Store::load_dependencies(tx)?;
    let mut status_by_id = std::collections::HashMap::new();
    {
        let mut stmt = tx.prepare("SELECT id, status FROM items")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (item_id, status_str) = row?;
            status_by_id.insert(item_id, Status::parse(&status_str).unwrap_or(Status::Backlog));
        }
    }
    let unmet = blocked::unmet_dependency_flags(&deps, &status_by_id);
    let has_unmet_dep = unmet.get(id).copied().unwrap_or(false);

    Ok(blocked::is_blocked(status, has_active_blocker, has_unmet_dep))
}

pub fn create_item(tx: &Transaction, args: &Value, now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let item_type = ItemType::parse(&args.str("type")?)?;
    let title = args.str("title")?;
    crate::validation::non_empty("title", &title)?;
    let parent_id = args.opt_str("parent_id");
    if let Some(parent) = &parent_id {
        require_item_exists(tx, parent)?;
    }
    let due_at = args.opt_i64("due_at");
    let estimate_minutes = crate::validation::non_negative_integer("estimate_minutes", args.opt_i64("estimate_minutes").unwrap_or(0))?;
    let estimate_mode = match args.opt_str("estimate_mode") {
        Some(s) => EstimateMode::parse(&s)?,
        None => EstimateMode::Manual,
    };
    let status = match args.opt_str("status") {
        Some(s) => Status::parse(&s)?,
        None => Status::Backlog,
    };
    let priority = crate::validation::priority_in_range(args.opt_i32("priority").unwrap_or(0))?;
    let health = match args.opt_str("health") {
        Some(s) => Health::parse(&s)?,
        None => Health::Unknown,
    };
    let health_mode = match args.opt_str("health_mode") {
        Some(s) => HealthMode::parse(&s)?,
        None => HealthMode::Auto,
    };
    let notes = args.opt_str("notes");

    let id = new_id();
    let sort_order = next_sort_order(tx, parent_id.as_deref())?;
    let completed_at = if status == Status::Done { Some(now) } else { None };

    tx.execute(
        "INSERT INTO items (id, item_type, title, parent_id, status, priority, due_at, estimate_mode,
                             estimate_minutes, health, health_mode, notes, sort_order, completed_at,
                             archived_at, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,NULL,?15,?15)",
        params![
            id, item_type.as_str(), title, parent_id, status.as_str(), priority, due_at,
            estimate_mode.as_str(), estimate_minutes, health.as_str(), health_mode.as_str(),
            notes, sort_order, completed_at, now,
        ],
    )?;

    Ok(OpOutcome::new(json!({"id": id})).with_invalidate(vec!["items".into(), item_tag(&id)]))
}

pub fn update_item_fields(tx: &Transaction, args: &Value, now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let id = args.str("id")?;
    require_item_exists(tx, &id)?;
    let fields = args.0.get("fields").cloned().unwrap_or(json!({}));
    let fields = Args::new(&fields);

    if fields.has("title") {
        let title = fields.str("title")?;
        crate::validation::non_empty("title", &title)?;
        tx.execute("UPDATE items SET title = ?2 WHERE id = ?1", params![id, title])?;
    }
    if fields.has("due_at") {
        let due_at = fields.opt_i64("due_at");
        tx.execute("UPDATE items SET due_at = ?2 WHERE id = ?1", params![id, due_at])?;
    }
    if fields.has("estimate_minutes") {
        let v = crate::validation::non_negative_integer("estimate_minutes", fields.i64("estimate_minutes")?)?;
        tx.execute("UPDATE items SET estimate_minutes = ?2 WHERE id = ?1", params![id, v])?;
    }
    if fields.has("estimate_mode") {
        let mode = EstimateMode::parse(&fields.str("estimate_mode")?)?;
        tx.execute("UPDATE items SET estimate_mode = ?2 WHERE id = ?1", params![id, mode.as_str()])?;
    }
    if fields.has("priority") {
        let p = crate::validation::priority_in_range(fields.i32("priority")?)?;
        tx.execute("UPDATE items SET priority = ?2 WHERE id = ?1", params![id, p])?;
    }
    if fields.has("health") {
        let h = Health::parse(&fields.str("health")?)?;
        tx.execute("UPDATE items SET health = ?2 WHERE id = ?1", params![id, h.as_str()])?;
    }
    if fields.has("health_mode") {
        let hm = HealthMode::parse(&fields.str("health_mode")?)?;
        tx.execute("UPDATE items SET health_mode = ?2 WHERE id = ?1", params![id, hm.as_str()])?;
    }
    if fields.has("notes") {
        let notes = fields.opt_str("notes");
        tx.execute("UPDATE items SET notes = ?2 WHERE id = ?1", params![id, notes])?;
    }
    tx.execute("UPDATE items SET updated_at = ?2 WHERE id = ?1", params![id, now])?;

    Ok(OpOutcome::new(json!({"id": id})).with_invalidate(vec!["items".into(), item_tag(&id)]))
}

pub fn set_status(tx: &Transaction, args: &Value, now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let id = args.str("id")?;
    require_item_exists(tx, &id)?;
    let status = Status::parse(&args.str("status")?)?;
    let override_block = args.bool_or("override", false);

    if status == Status::InProgress && !override_block && item_is_blocked(tx, &id)? {
        return Err(Error::blocked());
    }

    let existing_completed_at: Option<i64> =
        tx.query_row("SELECT completed_at FROM items WHERE id = ?1", params![id], |row| row.get(0))?;
    let completed_at = if status == Status::Done { Some(existing_completed_at.unwrap_or(now)) } else { existing_completed_at };

    tx.execute(
        "UPDATE items SET status = ?2, completed_at = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, status.as_str(), completed_at, now],
    )?;

    let mut invalidate = vec!["items".into(), item_tag(&id)];
    if status == Status::Done {
        let auto_archive = Store::get_setting(tx, "ui.auto_archive_on_complete")?.as_deref() == Some("true");
        if auto_archive {
            archive_subtree(tx, &id, now)?;
            invalidate.push("items".into());
        }
    }

    Ok(OpOutcome::new(json!({"id": id, "status": status.as_str()})).with_invalidate(invalidate))
}

fn subtree_ids(tx: &Transaction, seed: &str) -> Result<Vec<String>> {
    let items = Store::load_items(tx)?;
    let index = crate::hierarchy::HierarchyIndex::build(&items);
    Ok(index.subtree_of(&[seed.to_string()]).into_iter().collect())
}

fn archive_subtree(tx: &Transaction, seed: &str, now: i64) -> Result<()> {
    for id in subtree_ids(tx, seed)? {
        let existing: Option<i64> =
            tx.query_row("SELECT archived_at FROM items WHERE id = ?1", params![id], |row| row.get(0))?;
        let archived_at = existing.unwrap_or(now);
        tx.execute("UPDATE items SET archived_at = ?2 WHERE id = ?1", params![id, archived_at])?;
    }
    Ok(())
}

fn restore_subtree(tx: &Transaction, seed: &str) -> Result<()> {
    for id in subtree_ids(tx, seed)? {
        tx.execute("UPDATE items SET archived_at = NULL WHERE id = ?1", params![id])?;
    }
    Ok(())
}

pub fn item_archive(tx: &Transaction, args: &Value, now: i64) -> Result<OpOutcome> {
    let id = Args::new(args).str("id")?;
    require_item_exists(tx, &id)?;
    archive_subtree(tx, &id, now)?;
    Ok(OpOutcome::new(json!({"id": id})).with_invalidate(vec!["items".into()]))
}

pub fn items_archive_many(tx: &Transaction, args: &Value, now: i64) -> Result<OpOutcome> {
    let ids = Args::new(args).str_array("ids");
    for id in &ids {
        require_item_exists(tx, id)?;
        archive_subtree(tx, id, now)?;
    }
    Ok(OpOutcome::new(json!({"ids": ids})).with_invalidate(vec!["items".into()]))
}

pub fn item_restore(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let id = Args::new(args).str("id")?;
    require_item_exists(tx, &id)?;
    restore_subtree(tx, &id)?;
    Ok(OpOutcome::new(json!({"id": id})).with_invalidate(vec!["items".into()]))
}

pub fn items_restore_many(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let ids = Args::new(args).str_array("ids");
    for id in &ids {
        require_item_exists(tx, id)?;
        restore_subtree(tx, id)?;
    }
    Ok(OpOutcome::new(json!({"ids": ids})).with_invalidate(vec!["items".into()]))
}

/// Deletes children before parents: `ids` arrives in arbitrary (hash-set)
/// order, but `items.parent_id` is a foreign key with no `ON DELETE CASCADE`,
/// so deleting a parent row while a child still references it fails under
/// `PRAGMA foreign_keys=ON`.
fn cascade_delete(tx: &Transaction, ids: &[String]) -> Result<()> {
    let items = Store::load_items(tx)?;
    let index = crate::hierarchy::HierarchyIndex::build(&items);
    let mut ordered: Vec<&String> = ids.iter().collect();
    ordered.sort_by_key(|id| std::cmp::Reverse(index.depth(id)));

    for id in &ordered {
        tx.execute("DELETE FROM dependencies WHERE successor_id = ?1 OR predecessor_id = ?1", params![id])?;
        tx.execute("DELETE FROM blockers WHERE item_id = ?1", params![id])?;
        tx.execute("DELETE FROM scheduled_blocks WHERE item_id = ?1", params![id])?;
        tx.execute("DELETE FROM time_entries WHERE item_id = ?1", params![id])?;
        tx.execute("DELETE FROM running_timers WHERE item_id = ?1", params![id])?;
        tx.execute("DELETE FROM item_tags WHERE item_id = ?1", params![id])?;
        tx.execute("DELETE FROM item_assignees WHERE item_id = ?1", params![id])?;
    }
    for id in &ordered {
        tx.execute("DELETE FROM items WHERE id = ?1", params![id])?;
    }
    Ok(())
}

pub fn delete_item(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let id = Args::new(args).str("id")?;
    require_item_exists(tx, &id)?;
    let ids = subtree_ids(tx, &id)?;
    cascade_delete(tx, &ids)?;
    Ok(OpOutcome::new(json!({"ids": ids})).with_invalidate(vec!["items".into()]))
}

pub fn items_delete_many(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let seeds = Args::new(args).str_array("ids");
    let mut all: Vec<String> = Vec::new();
    for seed in &seeds {
        require_item_exists(tx, seed)?;
        all.extend(subtree_ids(tx, seed)?);
    }
    all.sort();
    all.dedup();
    cascade_delete(tx, &all)?;
    Ok(OpOutcome::new(json!({"ids": all})).with_invalidate(vec!["items".into()]))
}

/// Sibling ordering used by `reorder_item`/list views: sort_order asc,
/// due_at asc (nulls last), title asc.
fn ordered_siblings(tx: &Transaction, parent_id: Option<&str>) -> Result<Vec<(String, i64)>> {
    let mut stmt = match parent_id {
        Some(_) => tx.prepare(
            "SELECT id, sort_order FROM items WHERE parent_id = ?1
             ORDER BY sort_order ASC, (due_at IS NULL) ASC, due_at ASC, title ASC",
        )?,
        None => tx.prepare(
            "SELECT id, sort_order FROM items WHERE parent_id IS NULL
             ORDER BY sort_order ASC, (due_at IS NULL) ASC, due_at ASC, title ASC",
        )?,
    };
    let rows = match parent_id {
        Some(pid) => stmt.query_map(params![pid], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?,
        None => stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?,
    }
    .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn reorder_item(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let id = args.str("id")?;
    require_item_exists(tx, &id)?;
    let direction = args.str("direction")?;
    let parent_id: Option<String> =
        tx.query_row("SELECT parent_id FROM items WHERE id = ?1", params![id], |row| row.get(0))?;

    let siblings = ordered_siblings(tx, parent_id.as_deref())?;
    let pos = siblings.iter().position(|(sid, _)| sid == &id).ok_or_else(|| Error::NotFound("item not found".into()))?;
    let swap_with = match direction.as_str() {
        "up" => pos.checked_sub(1),
        "down" => if pos + 1 < siblings.len() { Some(pos + 1) } else { None },
        other => return Err(Error::validation("direction", format!("must be up|down, got {other}"))),
    };
    if let Some(other_pos) = swap_with {
        let (a_id, a_order) = siblings[pos].clone();
        let (b_id, b_order) = siblings[other_pos].clone();
        tx.execute("UPDATE items SET sort_order = ?2 WHERE id = ?1", params![a_id, b_order])?;
        tx.execute("UPDATE items SET sort_order = ?2 WHERE id = ?1", params![b_id, a_order])?;
    }
    Ok(OpOutcome::new(json!({"id": id})).with_invalidate(vec!["items".into()]))
}

pub fn move_item(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let id = args.str("id")?;
    require_item_exists(tx, &id)?;
    let requested_parent = args.opt_str("parent_id");
    let current_parent: Option<String> =
        tx.query_row("SELECT parent_id FROM items WHERE id = ?1", params![id], |row| row.get(0))?;
    if requested_parent != current_parent {
        return Err(Error::validation("parent_id", "reparenting is out of scope for move_item; parent must match current parent"));
    }

    let mut siblings = ordered_siblings(tx, current_parent.as_deref())?;
    siblings.retain(|(sid, _)| sid != &id);
    let before_id = args.opt_str("before_id");
    let after_id = args.opt_str("after_id");
    let insert_at = if let Some(before) = &before_id {
        siblings.iter().position(|(sid, _)| sid == before).unwrap_or(siblings.len())
    } else if let Some(after) = &after_id {
        siblings.iter().position(|(sid, _)| sid == after).map(|p| p + 1).unwrap_or(siblings.len())
    } else {
        siblings.len()
    };
    siblings.insert(insert_at, (id.clone(), 0));

    for (index, (sid, _)) in siblings.iter().enumerate() {
        tx.execute("UPDATE items SET sort_order = ?2 WHERE id = ?1", params![sid, (index as i64 + 1) * 10])?;
    }
    Ok(OpOutcome::new(json!({"id": id})).with_invalidate(vec!["items".into()]))
}

pub fn scheduled_block_create(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let item_id = args.str("item_id")?;
    require_item_exists(tx, &item_id)?;
    let start_at = args.i64("start_at")?;
    let duration_minutes = resolve_duration(&args, start_at)?;
    crate::validation::positive_integer("duration_minutes", duration_minutes)?;
    let locked = args.bool_or("locked", false);
    let source = args.opt_str("source").unwrap_or_else(|| "user".into());

    tx.execute("DELETE FROM scheduled_blocks WHERE item_id = ?1", params![item_id])?;
    let block_id = new_id();
    tx.execute(
        "INSERT INTO scheduled_blocks (block_id, item_id, start_at, duration_minutes, locked, source)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![block_id, item_id, start_at, duration_minutes, locked, source],
    )?;
    Ok(OpOutcome::new(json!({"block_id": block_id})).with_invalidate(vec!["blocks".into(), item_tag(&item_id)]))
}

fn resolve_duration(args: &Args, start_at: i64) -> Result<i64> {
    if let Some(minutes) = args.opt_i64("duration_minutes") {
        return Ok(minutes);
    }
    let end_at = args.i64("end_at")?;
    Ok(ceil_div(end_at - start_at, 60_000))
}

pub fn scheduled_block_update(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let block_id = args.str("block_id")?;
    let existing_start: i64 = tx
        .query_row("SELECT start_at FROM scheduled_blocks WHERE block_id = ?1", params![block_id], |row| row.get(0))
        .map_err(|_| Error::NotFound("scheduled block not found".into()))?;
    let start_at = args.opt_i64("start_at").unwrap_or(existing_start);
    let duration_minutes = resolve_duration(&args, start_at).unwrap_or_else(|_| {
        tx.query_row("SELECT duration_minutes FROM scheduled_blocks WHERE block_id = ?1", params![block_id], |row| row.get(0))
            .unwrap_or(0)
    });
    crate::validation::positive_integer("duration_minutes", duration_minutes)?;
    if let Some(locked) = args.0.get("locked").and_then(Value::as_bool) {
        tx.execute("UPDATE scheduled_blocks SET locked = ?2 WHERE block_id = ?1", params![block_id, locked])?;
    }
    tx.execute(
        "UPDATE scheduled_blocks SET start_at = ?2, duration_minutes = ?3 WHERE block_id = ?1",
        params![block_id, start_at, duration_minutes],
    )?;
    Ok(OpOutcome::new(json!({"block_id": block_id})).with_invalidate(vec!["blocks".into()]))
}

pub fn scheduled_block_delete(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let block_id = Args::new(args).str("block_id")?;
    tx.execute("DELETE FROM scheduled_blocks WHERE block_id = ?1", params![block_id])?;
    Ok(OpOutcome::new(json!({"block_id": block_id})).with_invalidate(vec!["blocks".into()]))
}

pub fn add_time_entry(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let item_id = args.str("item_id")?;
    require_item_exists(tx, &item_id)?;
    let start_at = args.i64("start_at")?;
    let end_at = args.i64("end_at")?;
    if end_at < start_at {
        return Err(Error::validation("end_at", "must be >= start_at"));
    }
    let duration_minutes = ceil_div(end_at - start_at, 60_000);
    let note = args.opt_str("note");
    let source = args.opt_str("source").unwrap_or_else(|| "manual".into());
    let entry_id = new_id();
    tx.execute(
        "INSERT INTO time_entries (entry_id, item_id, start_at, end_at, duration_minutes, note, source)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![entry_id, item_id, start_at, end_at, duration_minutes, note, source],
    )?;
    Ok(OpOutcome::new(json!({"entry_id": entry_id})).with_invalidate(vec!["time_entries".into(), item_tag(&item_id)]))
}

pub fn start_timer(tx: &Transaction, args: &Value, now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let item_id = args.str("item_id")?;
    require_item_exists(tx, &item_id)?;
    let running: i64 = tx.query_row("SELECT COUNT(*) FROM running_timers", [], |row| row.get(0))?;
    if running > 0 {
        return Err(Error::timer_already_running());
    }
    let note = args.opt_str("note");
    tx.execute(
        "INSERT INTO running_timers (item_id, start_at, note) VALUES (?1,?2,?3)",
        params![item_id, now, note],
    )?;
    Ok(OpOutcome::new(json!({"item_id": item_id, "start_at": now})).with_invalidate(vec!["running_timers".into()]))
}

pub fn stop_timer(tx: &Transaction, _args: &Value, now: i64) -> Result<OpOutcome> {
    let row: Option<(String, i64, Option<String>)> = tx
        .query_row("SELECT item_id, start_at, note FROM running_timers LIMIT 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .ok();
    let (item_id, start_at, note) = row.ok_or_else(Error::no_running_timer)?;
    let duration_minutes = ceil_div(now - start_at, 60_000);
    let entry_id = new_id();
    tx.execute(
        "INSERT INTO time_entries (entry_id, item_id, start_at, end_at, duration_minutes, note, source)
         VALUES (?1,?2,?3,?4,?5,?6,'timer')",
        params![entry_id, item_id, start_at, now, duration_minutes, note],
    )?;
    tx.execute("DELETE FROM running_timers WHERE item_id = ?1", params![item_id])?;
    Ok(OpOutcome::new(json!({"entry_id": entry_id, "duration_minutes": duration_minutes}))
        .with_invalidate(vec!["running_timers".into(), "time_entries".into(), item_tag(&item_id)]))
}

pub fn dependency_create(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let successor_id = args.opt_str("successor_id").or_else(|| args.opt_str("succ")).ok_or_else(|| Error::validation("successor_id", "required"))?;
    let predecessor_id = args.opt_str("predecessor_id").or_else(|| args.opt_str("pred")).ok_or_else(|| Error::validation("predecessor_id", "required"))?;
    if successor_id == predecessor_id {
        return Err(Error::Conflict("cannot depend on itself".into()));
    }
    require_item_exists(tx, &successor_id)?;
    require_item_exists(tx, &predecessor_id)?;
    let dep_type = DependencyType::normalize(args.opt_str("type").as_deref());
    let lag_minutes = crate::validation::non_negative_integer("lag_minutes", args.opt_i64("lag_minutes").unwrap_or(0))?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM dependencies WHERE successor_id = ?1 AND predecessor_id = ?2",
            params![successor_id, predecessor_id],
            |row| row.get(0),
        )
        .ok();
    if existing.is_some() {
        return Ok(OpOutcome::new(json!({"successor_id": successor_id, "predecessor_id": predecessor_id}))
            .with_invalidate(vec!["items".into()]));
    }

    let edges = Store::load_dependencies(tx)?;
    if dependency::would_create_cycle(&edges, &successor_id, &predecessor_id) {
        return Err(Error::Conflict("dependency cycle detected".into()));
    }

    tx.execute(
        "INSERT INTO dependencies (successor_id, predecessor_id, dep_type, lag_minutes) VALUES (?1,?2,?3,?4)",
        params![successor_id, predecessor_id, dep_type.as_str(), lag_minutes],
    )?;
    Ok(OpOutcome::new(json!({"successor_id": successor_id, "predecessor_id": predecessor_id}))
        .with_invalidate(vec!["items".into(), item_tag(&successor_id)]))
}

pub fn dependency_update(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let successor_id = args.str("successor_id")?;
    let predecessor_id = args.str("predecessor_id")?;
    let existing: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM dependencies WHERE successor_id = ?1 AND predecessor_id = ?2",
            params![successor_id, predecessor_id],
            |row| row.get(0),
        )
        .ok();
    if existing.is_none() {
        return Err(Error::NotFound("dependency not found".into()));
    }
    if let Some(t) = args.opt_str("type") {
        let dep_type = DependencyType::normalize(Some(&t));
        tx.execute(
            "UPDATE dependencies SET dep_type = ?3 WHERE successor_id = ?1 AND predecessor_id = ?2",
            params![successor_id, predecessor_id, dep_type.as_str()],
        )?;
    }
    if let Some(lag) = args.opt_i64("lag_minutes") {
        let lag = crate::validation::non_negative_integer("lag_minutes", lag)?;
        tx.execute(
            "UPDATE dependencies SET lag_minutes = ?3 WHERE successor_id = ?1 AND predecessor_id = ?2",
            params![successor_id, predecessor_id, lag],
        )?;
    }
    Ok(OpOutcome::new(json!({"successor_id": successor_id, "predecessor_id": predecessor_id})).with_invalidate(vec!["items".into()]))
}

pub fn dependency_delete(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let successor_id = args.opt_str("successor_id").or_else(|| args.opt_str("succ")).ok_or_else(|| Error::validation("successor_id", "required"))?;
    let predecessor_id = args.opt_str("predecessor_id").or_else(|| args.opt_str("pred")).ok_or_else(|| Error::validation("predecessor_id", "required"))?;
    tx.execute(
        "DELETE FROM dependencies WHERE successor_id = ?1 AND predecessor_id = ?2",
        params![successor_id, predecessor_id],
    )?;
    Ok(OpOutcome::new(json!({"successor_id": successor_id, "predecessor_id": predecessor_id})).with_invalidate(vec!["items".into()]))
}

pub fn add_blocker(tx: &Transaction, args: &Value, now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let item_id = args.str("item_id")?;
    require_item_exists(tx, &item_id)?;
    let kind = args.opt_str("kind").unwrap_or_else(|| "general".into());
    let text = args.opt_str("text").or_else(|| args.opt_str("reason")).unwrap_or_default();
    crate::validation::non_empty("text", &text)?;
    let blocker_id = new_id();
    tx.execute(
        "INSERT INTO blockers (blocker_id, item_id, kind, text, created_at, cleared_at) VALUES (?1,?2,?3,?4,?5,NULL)",
        params![blocker_id, item_id, kind, text, now],
    )?;
    Ok(OpOutcome::new(json!({"blocker_id": blocker_id})).with_invalidate(vec!["items".into(), item_tag(&item_id)]))
}

pub fn clear_blocker(tx: &Transaction, args: &Value, now: i64) -> Result<OpOutcome> {
    let blocker_id = Args::new(args).str("blocker_id")?;
    let updated = tx.execute(
        "UPDATE blockers SET cleared_at = ?2 WHERE blocker_id = ?1 AND cleared_at IS NULL",
        params![blocker_id, now],
    )?;
    if updated == 0 {
        return Err(Error::NotFound("blocker not found".into()));
    }
    Ok(OpOutcome::new(json!({"blocker_id": blocker_id})).with_invalidate(vec!["items".into()]))
}

pub fn set_item_tags(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let item_id = args.str("item_id")?;
    require_item_exists(tx, &item_id)?;
    let mut tags: Vec<String> = args.str_array("tags").into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
    tags.sort();
    tags.dedup();
    tx.execute("DELETE FROM item_tags WHERE item_id = ?1", params![item_id])?;
    for tag in &tags {
        tx.execute("INSERT INTO item_tags (item_id, tag) VALUES (?1,?2)", params![item_id, tag])?;
    }
    Ok(OpOutcome::new(json!({"item_id": item_id, "tags": tags})).with_invalidate(vec!["items".into(), item_tag(&item_id)]))
}

fn load_users_registry(tx: &Transaction) -> Result<Vec<Value>> {
    let raw = Store::get_setting(tx, "users_registry")?.unwrap_or_else(|| "[]".into());
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

fn save_users_registry(tx: &Transaction, users: &[Value]) -> Result<()> {
    let raw = serde_json::to_string(users)?;
    tx.execute(
        "INSERT INTO settings (key, value_json) VALUES ('users_registry', ?1)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![raw],
    )?;
    Ok(())
}

pub fn user_create(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let display_name = args.str("display_name")?;
    crate::validation::non_empty("display_name", &display_name)?;
    let user_id = args.opt_str("user_id").unwrap_or_else(new_id);
    let avatar_url = args.opt_str("avatar_url");
    let mut users = load_users_registry(tx)?;
    users.retain(|u| u.get("user_id").and_then(Value::as_str) != Some(user_id.as_str()));
    users.push(json!({"user_id": user_id, "display_name": display_name, "avatar_url": avatar_url}));
    save_users_registry(tx, &users)?;
    Ok(OpOutcome::new(json!({"user_id": user_id})).with_invalidate(vec!["users".into()]))
}

pub fn user_update(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let user_id = args.str("user_id")?;
    let mut users = load_users_registry(tx)?;
    let existing = users.iter().position(|u| u.get("user_id").and_then(Value::as_str) == Some(user_id.as_str()));
    let Some(idx) = existing else {
        return Err(Error::NotFound("user not found".into()));
    };
    if let Some(name) = args.opt_str("display_name") {
        users[idx]["display_name"] = json!(name);
    }
    if args.has("avatar_url") {
        users[idx]["avatar_url"] = json!(args.opt_str("avatar_url"));
    }
    save_users_registry(tx, &users)?;
    Ok(OpOutcome::new(json!({"user_id": user_id})).with_invalidate(vec!["users".into()]))
}

pub fn item_set_assignee(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let item_id = args.str("item_id")?;
    require_item_exists(tx, &item_id)?;
    tx.execute("DELETE FROM item_assignees WHERE item_id = ?1", params![item_id])?;
    if let Some(assignee_id) = args.opt_str("assignee_id") {
        tx.execute("INSERT INTO item_assignees (item_id, assignee_id) VALUES (?1,?2)", params![item_id, assignee_id])?;
    }
    Ok(OpOutcome::new(json!({"item_id": item_id})).with_invalidate(vec!["items".into(), item_tag(&item_id)]))
}

/// Accepts a list per the wire format but collapses it to the first id — the
/// store only ever holds one assignee row per item (spec §9 Open Question b).
pub fn item_set_item_assignees(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let item_id = args.str("item_id")?;
    require_item_exists(tx, &item_id)?;
    let ids = args.str_array("assignee_ids");
    tx.execute("DELETE FROM item_assignees WHERE item_id = ?1", params![item_id])?;
    let mut outcome = OpOutcome::new(json!({"item_id": item_id}));
    if let Some(first) = ids.first() {
        tx.execute("INSERT INTO item_assignees (item_id, assignee_id) VALUES (?1,?2)", params![item_id, first])?;
        if ids.len() > 1 {
            outcome = outcome.with_warning(format!(
                "{} extra assignee id(s) ignored; only one assignee is stored per item",
                ids.len() - 1
            ));
        }
    }
    Ok(outcome.with_invalidate(vec!["items".into(), item_tag(&item_id)]))
}

pub fn set_setting(tx: &Transaction, args: &Value, _now: i64) -> Result<OpOutcome> {
    let args = Args::new(args);
    let key = args.str("key")?;
    let value = args.0.get("value").cloned().unwrap_or(Value::Null);
    let raw = serde_json::to_string(&value)?;
    tx.execute(
        "INSERT INTO settings (key, value_json) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, raw],
    )?;
    Ok(OpOutcome::new(json!({"key": key})).with_invalidate(vec!["settings".into()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn now() -> i64 {
        1_700_000_000_000
    }

    #[test]
    fn create_item_allocates_id_and_default_sort_order() {
        let store = Store::open_in_memory().unwrap();
        let outcome = store
            .with_transaction(|tx| create_item(tx, &json!({"type": "task", "title": "T", "estimate_minutes": 10}), now()))
            .unwrap();
        assert!(outcome.result.get("id").is_some());
    }

    #[test]
    fn set_status_blocks_transition_to_in_progress_when_blocked() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .with_transaction(|tx| create_item(tx, &json!({"type": "task", "title": "T", "status": "blocked", "estimate_minutes": 0}), now()))
            .unwrap()
            .result["id"]
            .as_str()
            .unwrap()
            .to_string();
        let result = store.with_transaction(|tx| set_status(tx, &json!({"id": id, "status": "in_progress"}), now()));
        assert!(result.is_err());
    }

    #[test]
    fn start_timer_twice_without_stop_fails() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .with_transaction(|tx| create_item(tx, &json!({"type": "task", "title": "T", "estimate_minutes": 0}), now()))
            .unwrap()
            .result["id"]
            .as_str()
            .unwrap()
            .to_string();
        store.with_transaction(|tx| start_timer(tx, &json!({"item_id": id}), now())).unwrap();
        let second = store.with_transaction(|tx| start_timer(tx, &json!({"item_id": id}), now() + 1));
        assert!(second.is_err());
    }

    #[test]
    fn stop_timer_without_running_timer_errors() {
        let store = Store::open_in_memory().unwrap();
        let result = store.with_transaction(|tx| stop_timer(tx, &json!({}), now()));
        assert!(result.is_err());
    }

    #[test]
    fn dependency_create_rejects_self_dependency() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .with_transaction(|tx| create_item(tx, &json!({"type": "task", "title": "T", "estimate_minutes": 0}), now()))
            .unwrap()
            .result["id"]
            .as_str()
            .unwrap()
            .to_string();
        let result = store.with_transaction(|tx| {
            dependency_create(tx, &json!({"successor_id": id, "predecessor_id": id}), now())
        });
        assert!(result.is_err());
    }

    #[test]
    fn dependency_create_rejects_cycles() {
        let store = Store::open_in_memory().unwrap();
        let mk = |title: &str| {
            store
                .with_transaction(|tx| create_item(tx, &json!({"type": "task", "title": title, "estimate_minutes": 0}), now()))
                .unwrap()
                .result["id"]
                .as_str()
                .unwrap()
                .to_string()
        };
        let a = mk("A");
        let b = mk("B");
        let c = mk("C");
        store.with_transaction(|tx| dependency_create(tx, &json!({"successor_id": b, "predecessor_id": a}), now())).unwrap();
        store.with_transaction(|tx| dependency_create(tx, &json!({"successor_id": c, "predecessor_id": b}), now())).unwrap();
        let cyclic = store.with_transaction(|tx| dependency_create(tx, &json!({"successor_id": a, "predecessor_id": c}), now()));
        assert!(cyclic.is_err());
    }

    #[test]
    fn repeat_add_dependency_is_a_no_op() {
        let store = Store::open_in_memory().unwrap();
        let mk = |title: &str| {
            store
                .with_transaction(|tx| create_item(tx, &json!({"type": "task", "title": title, "estimate_minutes": 0}), now()))
                .unwrap()
                .result["id"]
                .as_str()
                .unwrap()
                .to_string()
        };
        let a = mk("A");
        let b = mk("B");
        store.with_transaction(|tx| dependency_create(tx, &json!({"successor_id": a, "predecessor_id": b}), now())).unwrap();
        let second = store.with_transaction(|tx| dependency_create(tx, &json!({"successor_id": a, "predecessor_id": b}), now()));
        assert!(second.is_ok());
        let conn = store.read();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn scheduled_block_create_enforces_single_block_per_item() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .with_transaction(|tx| create_item(tx, &json!({"type": "task", "title": "T", "estimate_minutes": 0}), now()))
            .unwrap()
            .result["id"]
            .as_str()
            .unwrap()
            .to_string();
        store
            .with_transaction(|tx| scheduled_block_create(tx, &json!({"item_id": id, "start_at": 0, "duration_minutes": 60}), now()))
            .unwrap();
        store
            .with_transaction(|tx| {
                scheduled_block_create(tx, &json!({"item_id": id, "start_at": 120 * 60_000, "duration_minutes": 30}), now())
            })
            .unwrap();
        let conn = store.read();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scheduled_blocks WHERE item_id = ?1", params![id], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
