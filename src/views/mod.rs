//! View builders (spec §4.I). Pure, read-only functions composing the
//! hierarchy/rollup/dependency/blocked/schedule/sequence/health engines over
//! a snapshot pulled from the store.

pub mod io;

use std::collections::HashMap;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

use crate::blocked;
use crate::dependency::{self, DependencyIndex, ScheduleAnchors};
use crate::health::{self, DueMetrics};
use crate::hierarchy::{self, HierarchyIndex};
use crate::model::{ArchiveFilter, Health, HealthMode, Item, Scope, Status};
use crate::rollup::{self, RollupFacts, RollupResult};
use crate::schedule::{self, ScheduleSummary};
use crate::sequence;
use crate::store::Store;
use crate::error::{Error, Result};

/// Everything the view layer needs, loaded once per call.
pub struct Snapshot {
    pub items: Vec<Item>,
    pub deps: Vec<crate::model::DependencyEdge>,
    pub blockers: Vec<crate::model::Blocker>,
    pub blocks: Vec<crate::model::ScheduledBlock>,
    pub assignees: HashMap<String, String>,
    pub tags: HashMap<String, Vec<String>>,
    pub status_by_id: HashMap<String, Status>,
    pub capacity_minutes_per_day: Option<f64>,
}

impl Snapshot {
    pub fn load(conn: &Connection) -> Result<Self> {
        let items = Store::load_items(conn)?;
        let deps = Store::load_dependencies(conn)?;
        let blockers = Store::load_blockers(conn)?;
        let blocks = Store::load_scheduled_blocks(conn)?;
        let assignees: HashMap<String, String> =
            Store::load_assignees(conn)?.into_iter().map(|a| (a.item_id, a.assignee_id)).collect();
        let mut tags: HashMap<String, Vec<String>> = HashMap::new();
        for t in Store::load_tags(conn)? {
            tags.entry(t.item_id).or_default().push(t.tag);
        }
        let status_by_id = items.iter().map(|i| (i.id.clone(), i.status)).collect();
        let capacity_minutes_per_day = Store::get_setting(conn, "capacity_minutes_per_day")?.and_then(|v| v.parse().ok());
        Ok(Snapshot { items, deps, blockers, blocks, assignees, tags, status_by_id, capacity_minutes_per_day })
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }
}

/// Derived per-item facts shared by most views.
pub struct Derived {
    pub schedules: HashMap<String, ScheduleSummary>,
    pub active_blocker: HashMap<String, bool>,
    pub unmet_dep: HashMap<String, bool>,
    pub rollups: HashMap<String, RollupResult>,
    pub dep_index: DependencyIndex,
}

impl Derived {
    pub fn compute(snapshot: &Snapshot, now: i64) -> Self {
        let schedules = schedule::summarize(&snapshot.blocks);
        let active_blocker = blocked::active_blocker_flags(&snapshot.blockers);
        let unmet_dep = blocked::unmet_dependency_flags(&snapshot.deps, &snapshot.status_by_id);

        let actual_minutes: HashMap<String, i64> =
            schedules.iter().map(|(id, s)| (id.clone(), s.total_minutes)).collect();
        let schedule_start: HashMap<String, i64> =
            schedules.iter().filter_map(|(id, s)| s.earliest_start.map(|v| (id.clone(), v))).collect();
        let schedule_end: HashMap<String, i64> =
            schedules.iter().filter_map(|(id, s)| s.latest_end.map(|v| (id.clone(), v))).collect();
        let is_blocked: HashMap<String, bool> = snapshot
            .items
            .iter()
            .map(|i| {
                let b = blocked::is_blocked(
                    i.status,
                    active_blocker.get(&i.id).copied().unwrap_or(false),
                    unmet_dep.get(&i.id).copied().unwrap_or(false),
                );
                (i.id.clone(), b)
            })
            .collect();
        let is_overdue: HashMap<String, bool> = snapshot
            .items
            .iter()
            .map(|i| (i.id.clone(), health::due_metrics(i.due_at, now, i.status).is_overdue))
            .collect();

        let facts = RollupFacts {
            actual_minutes: &actual_minutes,
            schedule_start: &schedule_start,
            schedule_end: &schedule_end,
            is_blocked: &is_blocked,
            is_overdue: &is_overdue,
        };
        let rollups = rollup::compute_rollups(&snapshot.items, &facts);
        let dep_index = DependencyIndex::build(&snapshot.deps);

        Derived { schedules, active_blocker, unmet_dep, rollups, dep_index }
    }

    pub fn is_blocked(&self, item: &Item) -> bool {
        blocked::is_blocked(
            item.status,
            self.active_blocker.get(&item.id).copied().unwrap_or(false),
            self.unmet_dep.get(&item.id).copied().unwrap_or(false),
        )
    }

    pub fn due_metrics(&self, item: &Item, now: i64) -> DueMetrics {
        health::due_metrics(item.due_at, now, item.status)
    }
}

#[derive(Serialize)]
pub struct ItemRow {
    pub id: String,
    pub item_type: &'static str,
    pub title: String,
    pub parent_id: Option<String>,
    pub status: &'static str,
    pub priority: i32,
    pub due_at: Option<i64>,
    pub project_id: String,
    pub depth: u32,
    pub rollup: RollupView,
    pub schedule: ScheduleView,
    pub is_blocked: bool,
    pub assignee_id: Option<String>,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
    pub sequence_rank: f64,
    pub health: &'static str,
    pub is_overdue: bool,
    pub days_until_due: i64,
    pub days_overdue: i64,
}

#[derive(Serialize, Default)]
pub struct RollupView {
    pub total_estimate_minutes: i64,
    pub total_actual_minutes: i64,
    pub remaining_minutes: i64,
    pub rollup_start: Option<i64>,
    pub rollup_end: Option<i64>,
    pub blocked_count: i64,
    pub overdue_count: i64,
}

impl From<RollupResult> for RollupView {
    fn from(r: RollupResult) -> Self {
        RollupView {
            total_estimate_minutes: r.total_estimate_minutes,
            total_actual_minutes: r.total_actual_minutes,
            remaining_minutes: r.remaining_minutes(),
            rollup_start: r.rollup_start,
            rollup_end: r.rollup_end,
            blocked_count: r.blocked_count,
            overdue_count: r.overdue_count,
        }
    }
}

#[derive(Serialize, Default)]
pub struct ScheduleView {
    pub count: i64,
    pub total_minutes: i64,
    pub earliest_start: Option<i64>,
    pub latest_end: Option<i64>,
}

impl From<ScheduleSummary> for ScheduleView {
    fn from(s: ScheduleSummary) -> Self {
        ScheduleView { count: s.count, total_minutes: s.total_minutes, earliest_start: s.earliest_start, latest_end: s.latest_end }
    }
}

/// Health shown where `health_mode = manual` is the item's own stored value;
/// otherwise the `auto_health` formula over this item's rollup (spec §4.I).
fn computed_health(item: &Item, rollup: &RollupResult, due: &DueMetrics, capacity_per_day: Option<f64>) -> Health {
    if item.health_mode == HealthMode::Manual {
        return item.health;
    }
    health::auto_health(due.is_overdue, capacity_per_day, rollup.remaining_minutes(), due.days_until_due)
}

fn build_row(item: &Item, snapshot: &Snapshot, derived: &Derived, index: &HierarchyIndex, now: i64) -> ItemRow {
    let is_blocked = derived.is_blocked(item);
    let due = derived.due_metrics(item, now);
    let depends_on = derived.dep_index.depends_on.get(&item.id).cloned().unwrap_or_default();
    let rank = sequence::sequence_rank(
        due.is_overdue,
        is_blocked,
        item.due_at,
        item.priority,
        derived.dep_index.dependents_count(&item.id) as i64,
    );
    let rollup: RollupResult = derived.rollups.get(&item.id).copied().unwrap_or_default();
    let health = computed_health(item, &rollup, &due, snapshot.capacity_minutes_per_day);
    ItemRow {
        id: item.id.clone(),
        item_type: item.item_type.as_str(),
        title: item.title.clone(),
        parent_id: item.parent_id.clone(),
        status: item.status.as_str(),
        priority: item.priority,
        due_at: item.due_at,
        project_id: index.project_of(&item.id),
        depth: index.depth(&item.id),
        rollup: rollup.into(),
        schedule: derived.schedules.get(&item.id).copied().unwrap_or_default().into(),
        is_blocked,
        assignee_id: snapshot.assignees.get(&item.id).cloned(),
        tags: snapshot.tags.get(&item.id).cloned().unwrap_or_default(),
        depends_on,
        sequence_rank: rank,
        health: health.as_str(),
        is_overdue: due.is_overdue,
        days_until_due: due.days_until_due,
        days_overdue: due.days_overdue,
    }
}

#[derive(Default)]
pub struct ListFilters {
    pub status: Vec<Status>,
    pub assignee_id: Option<String>,
    pub tag: Option<String>,
    pub search_text: Option<String>,
    pub include_done: bool,
    pub include_canceled: bool,
    /// Preserved-not-endorsed: when set alongside a `Scope::Project` scope,
    /// unions in the ungrouped subtree rather than narrowing to the project
    /// (spec §9 Open Question a).
    pub include_ungrouped: bool,
}

pub fn list_items(
    conn: &Connection,
    scope: &Scope,
    archive_filter: ArchiveFilter,
    filters: &ListFilters,
    sort_key: &str,
    descending: bool,
    now: i64,
) -> Result<Vec<ItemRow>> {
    let snapshot = Snapshot::load(conn)?;
    let index = HierarchyIndex::build(&snapshot.items);
    let derived = Derived::compute(&snapshot, now);
    let mut in_scope = hierarchy::resolve_scope(&snapshot.items, &snapshot.assignees, scope, archive_filter);
    if filters.include_ungrouped && matches!(scope, crate::model::Scope::Project { id } if id != hierarchy::UNGROUPED) {
        let ungrouped_scope = crate::model::Scope::Project { id: hierarchy::UNGROUPED.to_string() };
        in_scope.extend(hierarchy::resolve_scope(&snapshot.items, &snapshot.assignees, &ungrouped_scope, archive_filter));
    }

    let mut rows: Vec<ItemRow> = snapshot
        .items
        .iter()
        .filter(|i| in_scope.contains(&i.id))
        .filter(|i| filters.status.is_empty() || filters.status.contains(&i.status))
        .filter(|i| filters.include_done || i.status != Status::Done)
        .filter(|i| filters.include_canceled || i.status != Status::Canceled)
        .filter(|i| match &filters.assignee_id {
            None => true,
            Some(want) if want == "unassigned" => !snapshot.assignees.contains_key(&i.id),
            Some(want) => snapshot.assignees.get(&i.id) == Some(want),
        })
        .filter(|i| match &filters.tag {
            None => true,
            Some(tag) => snapshot.tags.get(&i.id).map(|t| t.contains(tag)).unwrap_or(false),
        })
        .filter(|i| match &filters.search_text {
            None => true,
            Some(q) if q.is_empty() => true,
            Some(q) => {
                let q = q.to_lowercase();
                i.title.to_lowercase().contains(&q) || i.notes.as_deref().unwrap_or("").to_lowercase().contains(&q)
            }
        })
        .map(|i| build_row(i, &snapshot, &derived, &index, now))
        .collect();

    rows.sort_by(|a, b| {
        let primary = match sort_key {
            "sequence_rank" => a.sequence_rank.partial_cmp(&b.sequence_rank).unwrap(),
            "title" => a.title.cmp(&b.title),
            "updated_at" => std::cmp::Ordering::Equal,
            "due_at" => a.due_at.unwrap_or(i64::MAX).cmp(&b.due_at.unwrap_or(i64::MAX)),
            _ => std::cmp::Ordering::Equal,
        };
        let primary = if descending { primary.reverse() } else { primary };
        primary.then_with(|| a.title.cmp(&b.title))
    });
    Ok(rows)
}

#[derive(Serialize)]
pub struct KanbanColumn {
    pub status: &'static str,
    pub items: Vec<ItemRow>,
}

#[derive(Serialize)]
pub struct SwimLane {
    pub key: String,
    pub columns: Vec<KanbanColumn>,
}

/// Swimlane key for a row under the given dimension (`none|assignee|project|health`).
fn swimlane_key(row: &ItemRow, swimlane: &str) -> String {
    match swimlane {
        "assignee" => row.assignee_id.clone().unwrap_or_else(|| "unassigned".into()),
        "project" => row.project_id.clone(),
        "health" => row.health.to_string(),
        _ => "none".into(),
    }
}

pub fn kanban_view(
    conn: &Connection,
    scope: &Scope,
    archive_filter: ArchiveFilter,
    include_canceled: bool,
    swimlane: &str,
    now: i64,
) -> Result<Vec<SwimLane>> {
    let filters = ListFilters { include_done: true, include_canceled, ..Default::default() };
    let mut rows = list_items(conn, scope, archive_filter, &filters, "sort_order", false, now)?;
    rows.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.due_at.unwrap_or(i64::MAX).cmp(&b.due_at.unwrap_or(i64::MAX)))
            .then_with(|| a.title.cmp(&b.title))
    });
    let columns = Status::kanban_order(include_canceled);

    let mut lane_keys: Vec<String> = Vec::new();
    for row in &rows {
        let key = swimlane_key(row, swimlane);
        if !lane_keys.contains(&key) {
            lane_keys.push(key);
        }
    }
    if lane_keys.is_empty() {
        lane_keys.push("none".into());
    }
    lane_keys.sort();

    Ok(lane_keys
        .into_iter()
        .map(|key| {
            let lane_columns = columns
                .iter()
                .map(|status| KanbanColumn {
                    status: status.as_str(),
                    items: rows
                        .iter()
                        .filter(|r| r.status == status.as_str() && swimlane_key(r, swimlane) == key)
                        .map(clone_row)
                        .collect(),
                })
                .collect();
            SwimLane { key, columns: lane_columns }
        })
        .collect())
}

fn clone_row(row: &ItemRow) -> ItemRow {
    ItemRow {
        id: row.id.clone(),
        item_type: row.item_type,
        title: row.title.clone(),
        parent_id: row.parent_id.clone(),
        status: row.status,
        priority: row.priority,
        due_at: row.due_at,
        project_id: row.project_id.clone(),
        depth: row.depth,
        rollup: RollupView {
            total_estimate_minutes: row.rollup.total_estimate_minutes,
            total_actual_minutes: row.rollup.total_actual_minutes,
            remaining_minutes: row.rollup.remaining_minutes,
            rollup_start: row.rollup.rollup_start,
            rollup_end: row.rollup.rollup_end,
            blocked_count: row.rollup.blocked_count,
            overdue_count: row.rollup.overdue_count,
        },
        schedule: ScheduleView {
            count: row.schedule.count,
            total_minutes: row.schedule.total_minutes,
            earliest_start: row.schedule.earliest_start,
            latest_end: row.schedule.latest_end,
        },
        is_blocked: row.is_blocked,
        assignee_id: row.assignee_id.clone(),
        tags: row.tags.clone(),
        depends_on: row.depends_on.clone(),
        sequence_rank: row.sequence_rank,
        health: row.health,
        is_overdue: row.is_overdue,
        days_until_due: row.days_until_due,
        days_overdue: row.days_overdue,
    }
}

pub fn get_item_details(conn: &Connection, item_id: &str, now: i64) -> Result<Value> {
    let snapshot = Snapshot::load(conn)?;
    let index = HierarchyIndex::build(&snapshot.items);
    let derived = Derived::compute(&snapshot, now);
    let item = snapshot.item(item_id).ok_or_else(|| Error::NotFound(format!("item not found: {item_id}")))?;

    let row = build_row(item, &snapshot, &derived, &index, now);
    let anchors = |id: &str| -> ScheduleAnchors {
        let s = derived.schedules.get(id).copied().unwrap_or_default();
        ScheduleAnchors { start: s.earliest_start, end: s.latest_end }
    };
    let edges: Vec<Value> = snapshot
        .deps
        .iter()
        .filter(|e| e.successor_id == item_id)
        .map(|e| {
            let status = dependency::evaluate_edge(e, anchors(&e.predecessor_id), anchors(&item_id.to_string()));
            let pred_title = snapshot.item(&e.predecessor_id).map(|i| i.title.clone());
            json!({
                "edge_id": e.edge_id(),
                "predecessor_id": e.predecessor_id,
                "predecessor_title": pred_title,
                "type": e.dep_type.as_str(),
                "lag_minutes": e.lag_minutes,
                "status": format!("{:?}", status).to_lowercase(),
            })
        })
        .collect();

    let blockers: Vec<&crate::model::Blocker> = snapshot.blockers.iter().filter(|b| b.item_id == item_id && b.is_active()).collect();
    let mut entries: Vec<&crate::model::TimeEntry> = Vec::new();
    let time_entries_stmt = Store::load_time_entries(conn)?;
    for e in &time_entries_stmt {
        if e.item_id == item_id {
            entries.push(e);
        }
    }
    entries.sort_by_key(|e| std::cmp::Reverse(e.end_at));
    entries.truncate(10);

    let running_timer = Store::load_running_timers(conn)?.into_iter().find(|t| t.item_id == item_id);

    Ok(json!({
        "item": row,
        "dependencies": edges,
        "active_blockers": blockers,
        "recent_time_entries": entries,
        "running_timer": running_timer,
    }))
}

pub fn get_project_tree(conn: &Connection, project_id: &str, now: i64) -> Result<Vec<ItemRow>> {
    let snapshot = Snapshot::load(conn)?;
    let index = HierarchyIndex::build(&snapshot.items);
    let derived = Derived::compute(&snapshot, now);
    let ids = index.subtree_of(&[project_id.to_string()]);
    let mut items: Vec<&Item> = snapshot.items.iter().filter(|i| ids.contains(&i.id)).collect();
    items.sort_by_key(|i| i.sort_order);
    let rows: Vec<ItemRow> = items.into_iter().map(|i| build_row(i, &snapshot, &derived, &index, now)).collect();
    Ok(rows)
}

pub fn search_items(conn: &Connection, query: &str, scope_id: Option<&str>, limit: usize) -> Result<Vec<Value>> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let snapshot = Snapshot::load(conn)?;
    let index = HierarchyIndex::build(&snapshot.items);
    let q = query.to_lowercase();
    let mut matches: Vec<(&Item, bool, bool)> = snapshot
        .items
        .iter()
        .filter(|i| i.item_type != crate::model::ItemType::Project)
        .filter_map(|i| {
            let title = i.title.to_lowercase();
            if title.starts_with(&q) {
                Some((i, true, scope_id.map(|s| index.project_of(&i.id) == s).unwrap_or(false)))
            } else if title.contains(&q) {
                Some((i, false, scope_id.map(|s| index.project_of(&i.id) == s).unwrap_or(false)))
            } else {
                None
            }
        })
        .collect();
    matches.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| a.0.title.len().cmp(&b.0.title.len()))
            .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
            .then_with(|| a.0.title.cmp(&b.0.title))
    });
    matches.truncate(limit);
    Ok(matches.into_iter().map(|(i, _, _)| json!({"id": i.id, "title": i.title, "status": i.status.as_str()})).collect())
}

pub fn due_overdue(conn: &Connection, now: i64, due_soon_days: i64) -> Result<Value> {
    let snapshot = Snapshot::load(conn)?;
    let day = health::DAY_MS;
    let cutoff = now + due_soon_days * day;
    let due_soon: Vec<&Item> = snapshot
        .items
        .iter()
        .filter(|i| i.due_at.map(|d| d >= now && d < cutoff).unwrap_or(false))
        .collect();
    let overdue: Vec<&Item> = snapshot.items.iter().filter(|i| i.due_at.map(|d| d < now).unwrap_or(false)).collect();
    let projects: Vec<Value> = snapshot
        .items
        .iter()
        .filter(|i| i.item_type == crate::model::ItemType::Project && i.due_at.is_some())
        .map(|i| {
            let metrics = health::due_metrics(i.due_at, now, i.status);
            json!({"id": i.id, "title": i.title, "due_at": i.due_at, "days_until_due": metrics.days_until_due, "days_overdue": metrics.days_overdue})
        })
        .collect();
    Ok(json!({
        "due_soon": due_soon.iter().map(|i| json!({"id": i.id, "title": i.title, "due_at": i.due_at})).collect::<Vec<_>>(),
        "overdue": overdue.iter().map(|i| json!({"id": i.id, "title": i.title, "due_at": i.due_at})).collect::<Vec<_>>(),
        "projects": projects,
    }))
}

pub fn blocked_view(conn: &Connection, now: i64) -> Result<Value> {
    let snapshot = Snapshot::load(conn)?;
    let derived = Derived::compute(&snapshot, now);
    let blocked_items: Vec<&Item> = snapshot.items.iter().filter(|i| derived.is_blocked(i)).collect();
    let blocked_by_dependencies: Vec<Value> = blocked_items
        .iter()
        .filter(|i| derived.unmet_dep.get(&i.id).copied().unwrap_or(false))
        .map(|i| json!({"id": i.id, "title": i.title}))
        .collect();
    let blocked_by_blockers: Vec<Value> = blocked_items
        .iter()
        .filter(|i| derived.active_blocker.get(&i.id).copied().unwrap_or(false))
        .map(|i| json!({"id": i.id, "title": i.title}))
        .collect();
    let scheduled_but_blocked: Vec<Value> = blocked_items
        .iter()
        .filter(|i| derived.schedules.contains_key(&i.id))
        .map(|i| json!({"id": i.id, "title": i.title}))
        .collect();
    Ok(json!({
        "blocked_by_dependencies": blocked_by_dependencies,
        "blocked_by_blockers": blocked_by_blockers,
        "scheduled_but_blocked": scheduled_but_blocked,
    }))
}

pub struct ExecutionWindowLimits {
    pub scheduled_max: i64,
    pub actionable_max: i64,
    pub unscheduled_max: i64,
    pub next_up_hours: i64,
}

pub fn execution_window(conn: &Connection, time_min: i64, time_max: i64, now: i64, limits: &ExecutionWindowLimits) -> Result<Value> {
    if time_max <= time_min {
        return Err(Error::validation("time_max", "must be greater than time_min"));
    }
    let snapshot = Snapshot::load(conn)?;
    let derived = Derived::compute(&snapshot, now);
    let next_up_cutoff = now + limits.next_up_hours * 3_600_000;

    let mut scheduled: Vec<(&crate::model::ScheduledBlock, &str)> = snapshot
        .blocks
        .iter()
        .filter(|b| b.start_at < time_max && b.end_at() > time_min)
        .map(|b| {
            let bucket = if b.start_at <= now && now < b.end_at() {
                "active"
            } else if b.start_at >= now && b.start_at < next_up_cutoff {
                "upcoming"
            } else {
                "later"
            };
            (b, bucket)
        })
        .collect();
    let bucket_rank = |b: &str| match b { "active" => 0, "upcoming" => 1, _ => 2 };
    scheduled.sort_by(|(a, ab), (b, bb)| {
        bucket_rank(ab).cmp(&bucket_rank(bb)).then_with(|| a.start_at.cmp(&b.start_at)).then_with(|| a.item_id.cmp(&b.item_id))
    });
    let scheduled_total = scheduled.len();
    let scheduled_cap = limits.scheduled_max as usize;
    let scheduled_truncated = scheduled_total > scheduled_cap;
    scheduled.truncate(scheduled_cap);

    let scheduled_item_ids: std::collections::HashSet<String> = snapshot
        .blocks
        .iter()
        .filter(|b| b.start_at < time_max && b.end_at() > time_min)
        .map(|b| b.item_id.clone())
        .collect();

    let mut candidates: Vec<&Item> = snapshot
        .items
        .iter()
        .filter(|i| matches!(i.status, Status::Ready | Status::InProgress | Status::Review))
        .filter(|i| !derived.is_blocked(i))
        .filter(|i| !scheduled_item_ids.contains(&i.id))
        .collect();

    let slack_minutes = |item: &Item| -> Option<i64> {
        let planned_end = derived.schedules.get(&item.id).and_then(|s| s.latest_end);
        match (item.due_at, planned_end) {
            (Some(due), Some(end)) => Some((due - end) / 60_000),
            _ => None,
        }
    };

    candidates.sort_by(|a, b| {
        slack_minutes(a)
            .unwrap_or(i64::MAX)
            .cmp(&slack_minutes(b).unwrap_or(i64::MAX))
            .then_with(|| a.due_at.unwrap_or(i64::MAX).cmp(&b.due_at.unwrap_or(i64::MAX)))
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.title.cmp(&b.title))
    });

    let actionable_total = candidates.len();
    let actionable_cap = limits.actionable_max as usize;
    let actionable_truncated = actionable_total > actionable_cap;
    let actionable_now: Vec<&Item> = candidates.iter().take(actionable_cap).copied().collect();
    let actionable_ids: std::collections::HashSet<&str> = actionable_now.iter().map(|i| i.id.as_str()).collect();

    let mut unscheduled: Vec<&Item> = snapshot
        .items
        .iter()
        .filter(|i| matches!(i.status, Status::Ready | Status::InProgress | Status::Review))
        .filter(|i| !derived.is_blocked(i))
        .filter(|i| !scheduled_item_ids.contains(&i.id))
        .filter(|i| !actionable_ids.contains(i.id.as_str()))
        .collect();
    unscheduled.sort_by(|a, b| {
        let a_rank = sequence::sequence_rank(
            derived.due_metrics(a, now).is_overdue,
            derived.is_blocked(a),
            a.due_at,
            a.priority,
            derived.dep_index.dependents_count(&a.id) as i64,
        );
        let b_rank = sequence::sequence_rank(
            derived.due_metrics(b, now).is_overdue,
            derived.is_blocked(b),
            b.due_at,
            b.priority,
            derived.dep_index.dependents_count(&b.id) as i64,
        );
        a_rank
            .partial_cmp(&b_rank)
            .unwrap()
            .then_with(|| slack_minutes(a).unwrap_or(i64::MAX).cmp(&slack_minutes(b).unwrap_or(i64::MAX)))
            .then_with(|| a.due_at.unwrap_or(i64::MAX).cmp(&b.due_at.unwrap_or(i64::MAX)))
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.title.cmp(&b.title))
    });
    let unscheduled_total = unscheduled.len();
    let unscheduled_cap = limits.unscheduled_max as usize;
    let unscheduled_truncated = unscheduled_total > unscheduled_cap;
    unscheduled.truncate(unscheduled_cap);

    Ok(json!({
        "scheduled": scheduled.iter().map(|(b, bucket)| json!({
            "block_id": b.block_id, "item_id": b.item_id, "start_at": b.start_at,
            "end_at": b.end_at(), "bucket": bucket,
        })).collect::<Vec<_>>(),
        "actionable_now": actionable_now.iter().map(|i| json!({"id": i.id, "title": i.title})).collect::<Vec<_>>(),
        "unscheduled_ready": unscheduled.iter().map(|i| json!({"id": i.id, "title": i.title})).collect::<Vec<_>>(),
        "meta": {
            "scheduled_total": scheduled_total, "scheduled_truncated": scheduled_truncated,
            "actionable_total": actionable_total, "actionable_truncated": actionable_truncated,
            "unscheduled_total": unscheduled_total, "unscheduled_truncated": unscheduled_truncated,
        }
    }))
}

/// `listGantt` / `gantt_range`: bar envelope per item (task = its own
/// schedule, everything else = its rollup span) plus the edges touching it.
pub fn gantt_range(conn: &Connection, scope: &Scope, archive_filter: ArchiveFilter, time_min: Option<i64>, time_max: Option<i64>, now: i64) -> Result<Value> {
    let snapshot = Snapshot::load(conn)?;
    let derived = Derived::compute(&snapshot, now);
    let in_scope = hierarchy::resolve_scope(&snapshot.items, &snapshot.assignees, scope, archive_filter);

    let bars: Vec<Value> = snapshot
        .items
        .iter()
        .filter(|i| in_scope.contains(&i.id))
        .filter_map(|i| {
            let (bar_start, bar_end) = if i.item_type == crate::model::ItemType::Task {
                let s = derived.schedules.get(&i.id).copied().unwrap_or_default();
                (s.earliest_start, s.latest_end)
            } else {
                let r = derived.rollups.get(&i.id).copied().unwrap_or_default();
                (r.rollup_start, r.rollup_end)
            };
            let in_window = match (time_min, time_max, bar_start, bar_end) {
                (Some(min), Some(max), Some(s), Some(e)) => s < max && e > min,
                _ => true,
            };
            if !in_window {
                return None;
            }
            let edges: Vec<Value> = snapshot
                .deps
                .iter()
                .filter(|e| e.successor_id == i.id || e.predecessor_id == i.id)
                .map(|e| json!({"edge_id": e.edge_id(), "successor_id": e.successor_id, "predecessor_id": e.predecessor_id, "type": e.dep_type.as_str()}))
                .collect();
            Some(json!({
                "id": i.id, "title": i.title, "item_type": i.item_type.as_str(),
                "bar_start_at": bar_start, "bar_end_at": bar_end, "edges": edges,
            }))
        })
        .collect();
    Ok(json!({"bars": bars}))
}

/// `listCalendarBlocks` / `calendar_range` / `calendar_range_user(s)`:
/// scheduled blocks plus due items overlapping `[time_min, time_max)`.
pub fn calendar_range(conn: &Connection, scope: &Scope, archive_filter: ArchiveFilter, time_min: i64, time_max: i64, now: i64) -> Result<Value> {
    let snapshot = Snapshot::load(conn)?;
    let in_scope = hierarchy::resolve_scope(&snapshot.items, &snapshot.assignees, scope, archive_filter);
    let _ = now;

    let blocks: Vec<Value> = snapshot
        .blocks
        .iter()
        .filter(|b| in_scope.contains(&b.item_id))
        .filter(|b| b.start_at < time_max && b.end_at() > time_min)
        .map(|b| json!({"block_id": b.block_id, "item_id": b.item_id, "start_at": b.start_at, "end_at": b.end_at()}))
        .collect();
    let due_items: Vec<Value> = snapshot
        .items
        .iter()
        .filter(|i| in_scope.contains(&i.id))
        .filter(|i| i.due_at.map(|d| d >= time_min && d < time_max).unwrap_or(false))
        .map(|i| json!({"id": i.id, "title": i.title, "due_at": i.due_at}))
        .collect();
    Ok(json!({"blocks": blocks, "due_items": due_items}))
}

/// `contributions_range(day_start_local, day_count, flags)`: completions per
/// 24h bucket starting at `day_start_local`, honoring the three type flags.
pub fn contributions_range(
    conn: &Connection,
    scope: &Scope,
    archive_filter: ArchiveFilter,
    day_start_local: i64,
    day_count: i64,
    include_subtasks: bool,
    include_milestones: bool,
    include_projects: bool,
) -> Result<Value> {
    let snapshot = Snapshot::load(conn)?;
    let in_scope = hierarchy::resolve_scope(&snapshot.items, &snapshot.assignees, scope, archive_filter);
    let day_ms = health::DAY_MS;
    let mut buckets = vec![0i64; day_count.max(0) as usize];
    for item in &snapshot.items {
        if !in_scope.contains(&item.id) {
            continue;
        }
        let allowed = match item.item_type {
            crate::model::ItemType::Task => include_subtasks,
            crate::model::ItemType::Milestone => include_milestones,
            crate::model::ItemType::Project => include_projects,
        };
        if !allowed {
            continue;
        }
        if let Some(completed_at) = item.completed_at {
            if completed_at >= day_start_local {
                let bucket = ((completed_at - day_start_local) / day_ms) as usize;
                if bucket < buckets.len() {
                    buckets[bucket] += 1;
                }
            }
        }
    }
    let days: Vec<Value> = buckets
        .iter()
        .enumerate()
        .map(|(i, count)| json!({"day_start_at": day_start_local + i as i64 * day_ms, "count": count}))
        .collect();
    Ok(json!({"days": days}))
}

/// `list_view_complete` / `list_view_scope`: flat scope listing with each
/// item's scheduled blocks and its dependency neighbours' satisfaction status.
pub fn list_view_scope(conn: &Connection, scope: &Scope, archive_filter: ArchiveFilter, now: i64) -> Result<Value> {
    let snapshot = Snapshot::load(conn)?;
    let index = HierarchyIndex::build(&snapshot.items);
    let derived = Derived::compute(&snapshot, now);
    let in_scope = hierarchy::resolve_scope(&snapshot.items, &snapshot.assignees, scope, archive_filter);

    let anchors = |id: &str| -> ScheduleAnchors {
        let s = derived.schedules.get(id).copied().unwrap_or_default();
        ScheduleAnchors { start: s.earliest_start, end: s.latest_end }
    };

    let rows: Vec<Value> = snapshot
        .items
        .iter()
        .filter(|i| in_scope.contains(&i.id))
        .map(|item| {
            let row = build_row(item, &snapshot, &derived, &index, now);
            let blocks: Vec<Value> = snapshot
                .blocks
                .iter()
                .filter(|b| b.item_id == item.id)
                .map(|b| json!({"block_id": b.block_id, "start_at": b.start_at, "end_at": b.end_at()}))
                .collect();
            let blocking: Vec<Value> = snapshot
                .deps
                .iter()
                .filter(|e| e.predecessor_id == item.id)
                .map(|e| {
                    let status = dependency::evaluate_edge(e, anchors(&item.id), anchors(&e.successor_id));
                    json!({"item_id": e.successor_id, "type": e.dep_type.as_str(), "status": format!("{:?}", status).to_lowercase()})
                })
                .collect();
            let blocked_by: Vec<Value> = snapshot
                .deps
                .iter()
                .filter(|e| e.successor_id == item.id)
                .map(|e| {
                    let status = dependency::evaluate_edge(e, anchors(&e.predecessor_id), anchors(&item.id));
                    json!({"item_id": e.predecessor_id, "type": e.dep_type.as_str(), "status": format!("{:?}", status).to_lowercase()})
                })
                .collect();
            json!({"item": row, "scheduled_blocks": blocks, "blocked_by": blocked_by, "blocking": blocking})
        })
        .collect();
    Ok(json!({"items": rows}))
}

pub fn users_list(conn: &Connection) -> Result<Value> {
    let raw = Store::get_setting(conn, "users_registry")?.unwrap_or_else(|| "[]".into());
    let registry: Vec<Value> = serde_json::from_str(&raw).unwrap_or_default();
    let current_user_id = Store::get_setting(conn, "current_user_id")?
        .and_then(|v| serde_json::from_str::<String>(&v).ok())
        .unwrap_or_default();
    let registered_ids: std::collections::HashSet<String> = registry
        .iter()
        .filter_map(|u| u.get("user_id").and_then(Value::as_str).map(str::to_string))
        .collect();
    let assignee_ids: std::collections::HashSet<String> =
        Store::load_assignees(conn)?.into_iter().map(|a| a.assignee_id).collect();

    let mut users = registry.clone();
    for id in assignee_ids.difference(&registered_ids) {
        let placeholder = format!("User {}", &id[..id.len().min(6)]);
        users.push(json!({"user_id": id, "display_name": placeholder, "avatar_url": Value::Null}));
    }
    Ok(json!({"users": users, "current_user_id": current_user_id}))
}
