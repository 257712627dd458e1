//! `debug.verify_integrity` (spec §4.J): a list of findings, each
//! `{code, message, count?, sample[]}`. An empty list means the store is
//! healthy.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::dependency;
use crate::error::Result;
use crate::model::Status;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub code: &'static str,
    pub message: String,
    pub count: Option<usize>,
    pub sample: Vec<Value>,
}

const SAMPLE_CAP: usize = 5;

pub fn verify_integrity(conn: &Connection) -> Result<Vec<Finding>> {
    let items = Store::load_items(conn)?;
    let item_ids: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
    let deps = Store::load_dependencies(conn)?;
    let blockers = Store::load_blockers(conn)?;
    let blocks = Store::load_scheduled_blocks(conn)?;
    let entries = Store::load_time_entries(conn)?;
    let timers = Store::load_running_timers(conn)?;

    let mut findings = Vec::new();

    let bad_durations: Vec<Value> = blocks
        .iter()
        .filter(|b| b.duration_minutes <= 0)
        .take(SAMPLE_CAP)
        .map(|b| serde_json::json!({"block_id": b.block_id, "duration_minutes": b.duration_minutes}))
        .collect();
    let bad_duration_count = blocks.iter().filter(|b| b.duration_minutes <= 0).count();
    if bad_duration_count > 0 {
        findings.push(Finding {
            code: "invalid_block_duration",
            message: format!("{bad_duration_count} scheduled block(s) have non-positive duration"),
            count: Some(bad_duration_count),
            sample: bad_durations,
        });
    }

    push_dangling(
        &mut findings, &blocks, "blocks_missing_items", "scheduled block(s) reference a missing item",
        |b| &b.item_id, &item_ids, |b| serde_json::json!({"block_id": b.block_id, "item_id": b.item_id}),
    );
    push_dangling(
        &mut findings, &blockers, "blockers_missing_items", "blocker(s) reference a missing item",
        |b| &b.item_id, &item_ids, |b| serde_json::json!({"blocker_id": b.blocker_id, "item_id": b.item_id}),
    );
    push_dangling(
        &mut findings, &entries, "time_entries_missing_items", "time entries reference a missing item",
        |e| &e.item_id, &item_ids, |e| serde_json::json!({"entry_id": e.entry_id, "item_id": e.item_id}),
    );

    let dangling_deps: Vec<Value> = deps
        .iter()
        .filter(|d| !item_ids.contains(d.successor_id.as_str()) || !item_ids.contains(d.predecessor_id.as_str()))
        .take(SAMPLE_CAP)
        .map(|d| serde_json::json!({"successor_id": d.successor_id, "predecessor_id": d.predecessor_id}))
        .collect();
    let dangling_dep_count = deps
        .iter()
        .filter(|d| !item_ids.contains(d.successor_id.as_str()) || !item_ids.contains(d.predecessor_id.as_str()))
        .count();
    if dangling_dep_count > 0 {
        findings.push(Finding {
            code: "dependencies_missing_items",
            message: format!("{dangling_dep_count} dependency edge(s) reference a missing item"),
            count: Some(dangling_dep_count),
            sample: dangling_deps,
        });
    }

    let cycles = dependency::find_cycles(&deps, 5);
    if !cycles.is_empty() {
        findings.push(Finding {
            code: "dependency_cycles",
            message: format!("{} dependency cycle(s) detected", cycles.len()),
            count: Some(cycles.len()),
            sample: cycles.into_iter().map(|c| serde_json::json!(c)).collect(),
        });
    }

    let mut by_item: HashMap<&str, Vec<&crate::model::TimeEntry>> = HashMap::new();
    for entry in &entries {
        by_item.entry(entry.item_id.as_str()).or_default().push(entry);
    }
    let mut overlap_samples = Vec::new();
    let mut overlap_count = 0usize;
    for (item_id, mut item_entries) in by_item {
        item_entries.sort_by_key(|e| e.start_at);
        for window in item_entries.windows(2) {
            if window[1].start_at < window[0].end_at {
                overlap_count += 1;
                if overlap_samples.len() < SAMPLE_CAP {
                    overlap_samples.push(serde_json::json!({
                        "item_id": item_id, "a": window[0].entry_id, "b": window[1].entry_id,
                    }));
                }
            }
        }
    }
    if overlap_count > 0 {
        findings.push(Finding {
            code: "overlapping_time_entries",
            message: format!("{overlap_count} overlapping time entry pair(s)"),
            count: Some(overlap_count),
            sample: overlap_samples,
        });
    }

    if timers.len() > 1 {
        findings.push(Finding {
            code: "multiple_running_timers",
            message: format!("{} running timers found, expected at most 1", timers.len()),
            count: Some(timers.len()),
            sample: timers.iter().take(SAMPLE_CAP).map(|t| serde_json::json!({"item_id": t.item_id})).collect(),
        });
    }

    let inconsistent: Vec<Value> = items
        .iter()
        .filter(|i| (i.status == Status::Done) != i.completed_at.is_some())
        .take(SAMPLE_CAP)
        .map(|i| serde_json::json!({"id": i.id, "status": i.status.as_str(), "completed_at": i.completed_at}))
        .collect();
    let inconsistent_count = items.iter().filter(|i| (i.status == Status::Done) != i.completed_at.is_some()).count();
    if inconsistent_count > 0 {
        findings.push(Finding {
            code: "completion_inconsistency",
            message: format!("{inconsistent_count} item(s) have status/completed_at mismatch"),
            count: Some(inconsistent_count),
            sample: inconsistent,
        });
    }

    Ok(findings)
}

fn push_dangling<T>(
    findings: &mut Vec<Finding>,
    rows: &[T],
    code: &'static str,
    message: &str,
    item_id: impl Fn(&T) -> &String,
    item_ids: &HashSet<&str>,
    sample: impl Fn(&T) -> Value,
) {
    let missing: Vec<&T> = rows.iter().filter(|r| !item_ids.contains(item_id(r).as_str())).collect();
    if !missing.is_empty() {
        findings.push(Finding {
            code,
            message: format!("{} {message}", missing.len()),
            count: Some(missing.len()),
            sample: missing.iter().take(SAMPLE_CAP).map(|r| sample(r)).collect(),
        });
    }
}
