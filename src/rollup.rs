//! Rollup engine (spec §4.D). Post-order aggregation of estimate/actual/span/
//! blocked-count/overdue-count over the item tree, memoized and cycle-safe:
//! re-entering a node already on the active DFS path returns zeros instead of
//! recursing forever, tolerating a corrupted `parent_id` chain.

use std::collections::HashMap;

use crate::hierarchy::HierarchyIndex;
use crate::model::{EstimateMode, Item};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RollupResult {
    pub total_estimate_minutes: i64,
    pub total_actual_minutes: i64,
    pub rollup_start: Option<i64>,
    pub rollup_end: Option<i64>,
    pub blocked_count: i64,
    pub overdue_count: i64,
}

impl RollupResult {
    pub fn remaining_minutes(&self) -> i64 {
        (self.total_estimate_minutes - self.total_actual_minutes).max(0)
    }
}

/// Per-item facts the rollup engine consumes; everything else (blocked-state,
/// schedule summary, due metrics) is computed by the other components first.
pub struct RollupFacts<'a> {
    pub actual_minutes: &'a HashMap<String, i64>,
    pub schedule_start: &'a HashMap<String, i64>,
    pub schedule_end: &'a HashMap<String, i64>,
    pub is_blocked: &'a HashMap<String, bool>,
    pub is_overdue: &'a HashMap<String, bool>,
}

pub fn compute_rollups(items: &[Item], facts: &RollupFacts) -> HashMap<String, RollupResult> {
    let index = HierarchyIndex::build(items);
    let mut memo: HashMap<String, RollupResult> = HashMap::new();
    let mut visiting: Vec<String> = Vec::new();
    for item in items {
        compute_one(&item.id, items, &index, facts, &mut memo, &mut visiting);
    }
    memo
}

fn compute_one(
    id: &str,
    items: &[Item],
    index: &HierarchyIndex,
    facts: &RollupFacts,
    memo: &mut HashMap<String, RollupResult>,
    visiting: &mut Vec<String>,
) -> RollupResult {
    if let Some(cached) = memo.get(id) {
        return *cached;
    }
    if visiting.iter().any(|v| v == id) {
        return RollupResult::default();
    }
    let Some(item) = items.iter().find(|i| i.id == id) else {
        return RollupResult::default();
    };

    visiting.push(id.to_string());

    let own_estimate = item.estimate_minutes;
    let own_actual = facts.actual_minutes.get(id).copied().unwrap_or(0);
    let own_start = facts.schedule_start.get(id).copied();
    let own_end = facts.schedule_end.get(id).copied();
    let own_blocked = facts.is_blocked.get(id).copied().unwrap_or(false);
    let own_overdue = facts.is_overdue.get(id).copied().unwrap_or(false);

    let mut total_actual = own_actual;
    let mut total_estimate = own_estimate;
    let mut rollup_start = own_start;
    let mut rollup_end = own_end;
    let mut blocked_count = if own_blocked { 1 } else { 0 };
    let mut overdue_count = if own_overdue { 1 } else { 0 };

    for &child_id in index.children_of(id) {
        let child = compute_one(child_id, items, index, facts, memo, visiting);
        total_actual += child.total_actual_minutes;
        if item.estimate_mode == EstimateMode::Rollup {
            total_estimate += child.total_estimate_minutes;
        }
        rollup_start = min_opt(rollup_start, child.rollup_start);
        rollup_end = max_opt(rollup_end, child.rollup_end);
        blocked_count += child.blocked_count;
        overdue_count += child.overdue_count;
    }

    visiting.pop();

    let result = RollupResult {
        total_estimate_minutes: total_estimate,
        total_actual_minutes: total_actual,
        rollup_start,
        rollup_end,
        blocked_count,
        overdue_count,
    };
    memo.insert(id.to_string(), result);
    result
}

fn min_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Health, HealthMode, ItemType, Status};

    fn item(id: &str, parent: Option<&str>, estimate: i64, mode: EstimateMode) -> Item {
        Item {
            id: id.into(),
            item_type: ItemType::Task,
            title: id.into(),
            parent_id: parent.map(Into::into),
            status: Status::Backlog,
            priority: 0,
            due_at: None,
            estimate_mode: mode,
            estimate_minutes: estimate,
            health: Health::Unknown,
            health_mode: HealthMode::Auto,
            notes: None,
            sort_order: 0,
            completed_at: None,
            archived_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn rollup_sums_children_only_when_mode_is_rollup() {
        let items = vec![
            item("p", None, 0, EstimateMode::Rollup),
            item("t1", Some("p"), 60, EstimateMode::Manual),
            item("t2", Some("p"), 30, EstimateMode::Manual),
        ];
        let facts = RollupFacts {
            actual_minutes: &HashMap::new(),
            schedule_start: &HashMap::new(),
            schedule_end: &HashMap::new(),
            is_blocked: &HashMap::new(),
            is_overdue: &HashMap::new(),
        };
        let rollups = compute_rollups(&items, &facts);
        assert_eq!(rollups["p"].total_estimate_minutes, 90);
        assert_eq!(rollups["p"].total_actual_minutes, 0);
    }

    #[test]
    fn manual_estimate_mode_ignores_children() {
        let items = vec![item("p", None, 10, EstimateMode::Manual), item("t1", Some("p"), 60, EstimateMode::Manual)];
        let facts = RollupFacts {
            actual_minutes: &HashMap::new(),
            schedule_start: &HashMap::new(),
            schedule_end: &HashMap::new(),
            is_blocked: &HashMap::new(),
            is_overdue: &HashMap::new(),
        };
        let rollups = compute_rollups(&items, &facts);
        assert_eq!(rollups["p"].total_estimate_minutes, 10);
    }

    #[test]
    fn cyclic_parent_pointers_do_not_infinite_loop() {
        let items = vec![item("a", Some("b"), 10, EstimateMode::Rollup), item("b", Some("a"), 10, EstimateMode::Rollup)];
        let facts = RollupFacts {
            actual_minutes: &HashMap::new(),
            schedule_start: &HashMap::new(),
            schedule_end: &HashMap::new(),
            is_blocked: &HashMap::new(),
            is_overdue: &HashMap::new(),
        };
        let rollups = compute_rollups(&items, &facts);
        assert!(rollups.contains_key("a") && rollups.contains_key("b"));
    }

    #[test]
    fn remaining_minutes_never_negative() {
        let r = RollupResult { total_estimate_minutes: 10, total_actual_minutes: 50, ..Default::default() };
        assert_eq!(r.remaining_minutes(), 0);
    }
}
