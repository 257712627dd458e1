//! End-to-end scenarios and invariant checks (spec.md §8) driven entirely
//! through `dispatch_op`/`dispatch_query`, the same surface a host process uses.

use plan_kernel::model::new_id;
use plan_kernel::router::{OpEnvelope, QueryEnvelope, Response};
use plan_kernel::{dispatch_op, dispatch_query, Store};
use serde_json::{json, Value};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn op(store: &Store, name: &str, args: Value, ts: i64) -> Value {
    let envelope = OpEnvelope {
        name: name.into(),
        args,
        op_id: new_id(),
        op_name: None,
        actor_type: "user".into(),
        actor_id: Some("u1".into()),
        ts,
    };
    match dispatch_op(store, &envelope) {
        Response::Ok { result, .. } => result,
        Response::Err { error, .. } => panic!("op {name} failed: {error}"),
    }
}

fn op_err(store: &Store, name: &str, args: Value, ts: i64) -> Value {
    let envelope = OpEnvelope {
        name: name.into(),
        args,
        op_id: new_id(),
        op_name: None,
        actor_type: "user".into(),
        actor_id: None,
        ts,
    };
    match dispatch_op(store, &envelope) {
        Response::Ok { result, .. } => panic!("op {name} unexpectedly succeeded: {result}"),
        Response::Err { error, .. } => error,
    }
}

fn query(store: &Store, name: &str, args: Value, now: i64) -> Value {
    let envelope = QueryEnvelope { name: name.into(), args };
    match dispatch_query(store, &envelope, now) {
        Response::Ok { result, .. } => result,
        Response::Err { error, .. } => panic!("query {name} failed: {error}"),
    }
}

#[test]
fn scenario_create_and_rollup() {
    let store = store();
    let p = op(&store, "create_item", json!({"type": "project", "title": "P", "due_at": 1_000, "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "create_item", json!({"type": "task", "parent_id": p, "title": "T1", "due_at": 900, "estimate_minutes": 60}), 0);
    op(&store, "create_item", json!({"type": "task", "parent_id": p, "title": "T2", "due_at": 900, "estimate_minutes": 30}), 0);
    op(&store, "update_item_fields", json!({"id": p, "fields": {"estimate_mode": "rollup"}}), 0);

    let tree = query(&store, "getProjectTree", json!({"project_id": p}), 0);
    let rows = tree.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    let project_row = rows.iter().find(|r| r["id"] == p).unwrap();
    assert_eq!(project_row["rollup"]["total_estimate_minutes"], 90);
    assert_eq!(project_row["rollup"]["total_actual_minutes"], 0);
}

#[test]
fn scenario_dependency_cycle_rejection() {
    let store = store();
    let mk = |title: &str| op(&store, "create_item", json!({"type": "task", "title": title, "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    let a = mk("A");
    let b = mk("B");
    let c = mk("C");
    op(&store, "dependency.create", json!({"predecessor_id": a, "successor_id": b}), 0);
    op(&store, "dependency.create", json!({"predecessor_id": b, "successor_id": c}), 0);
    let err = op_err(&store, "dependency.create", json!({"predecessor_id": c, "successor_id": a}), 0);
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn scenario_blocked_until_predecessor_done() {
    let store = store();
    let p1 = op(&store, "create_item", json!({"type": "task", "title": "P1", "status": "ready", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    let p2 = op(&store, "create_item", json!({"type": "task", "title": "P2", "status": "ready", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "dependency.create", json!({"predecessor_id": p1, "successor_id": p2}), 0);

    let view = query(&store, "list_view_scope", json!({}), 0);
    let p2_row = view["items"].as_array().unwrap().iter().find(|r| r["item"]["id"] == p2).unwrap();
    assert_eq!(p2_row["blocked_by"][0]["status"], "unknown");

    op(&store, "set_status", json!({"id": p1, "status": "done"}), 0);
    let view_after = query(&store, "list_view_scope", json!({}), 0);
    let p2_after = view_after["items"].as_array().unwrap().iter().find(|r| r["item"]["id"] == p2).unwrap();
    assert_eq!(p2_after["item"]["is_blocked"], false);
}

#[test]
fn scenario_single_block_enforcement() {
    let store = store();
    let t = op(&store, "create_item", json!({"type": "task", "title": "T", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "scheduled_block.create", json!({"item_id": t, "start_at": 0, "duration_minutes": 60}), 0);
    op(&store, "scheduled_block.create", json!({"item_id": t, "start_at": 120 * 60_000, "duration_minutes": 30}), 0);

    let calendar = query(&store, "listCalendarBlocks", json!({"time_min": -1_000_000, "time_max": 1_000_000_000}), 0);
    let blocks = calendar["blocks"].as_array().unwrap();
    assert_eq!(blocks.iter().filter(|b| b["item_id"] == t).count(), 1);
    assert_eq!(blocks[0]["start_at"], 120 * 60_000);
}

#[test]
fn scenario_execution_window_triage() {
    let store = store();
    let now = 1000i64;
    let a = op(&store, "create_item", json!({"type": "task", "title": "A", "status": "ready", "due_at": 500, "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    let b = op(&store, "create_item", json!({"type": "task", "title": "B", "status": "ready", "due_at": 5000, "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    let c = op(&store, "create_item", json!({"type": "task", "title": "C", "status": "ready", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "scheduled_block.create", json!({"item_id": b, "start_at": 900, "duration_minutes": 60}), 0);
    op(&store, "add_blocker", json!({"item_id": c, "text": "waiting on design"}), 0);

    let window = query(&store, "execution_window", json!({"time_min": now, "time_max": now + 2 * 3_600_000}), now);
    let actionable: Vec<&str> = window["actionable_now"].as_array().unwrap().iter().map(|r| r["id"].as_str().unwrap()).collect();
    let unscheduled: Vec<&str> = window["unscheduled_ready"].as_array().unwrap().iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert!(actionable.contains(&a.as_str()) || unscheduled.contains(&a.as_str()));
    assert!(!actionable.contains(&c.as_str()) && !unscheduled.contains(&c.as_str()));

    let scheduled_items: Vec<&str> = window["scheduled"].as_array().unwrap().iter().map(|r| r["item_id"].as_str().unwrap()).collect();
    assert!(scheduled_items.contains(&b.as_str()));
    let active_bucket = window["scheduled"].as_array().unwrap().iter().find(|r| r["item_id"] == b).unwrap();
    assert_eq!(active_bucket["bucket"], "active");
}

#[test]
fn scenario_integrity_finding_on_dangling_dependency() {
    let store = store();
    let x = op(&store, "create_item", json!({"type": "task", "title": "X", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    let y = op(&store, "create_item", json!({"type": "task", "title": "Y", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "dependency.create", json!({"predecessor_id": y, "successor_id": x}), 0);

    {
        let conn = store.read();
        conn.execute("DELETE FROM items WHERE id = ?1", rusqlite::params![y]).unwrap();
    }

    let findings = query(&store, "debug.verify_integrity", json!({}), 0);
    let codes: Vec<&str> = findings.as_array().unwrap().iter().map(|f| f["code"].as_str().unwrap()).collect();
    assert!(codes.contains(&"dependencies_missing_items"));
}

#[test]
fn boundary_due_soon_days_zero_is_empty() {
    let store = store();
    op(&store, "create_item", json!({"type": "task", "title": "T", "due_at": 100, "estimate_minutes": 0}), 0);
    let result = query(&store, "due_overdue", json!({"now_at": 0, "due_soon_days": 0}), 0);
    assert!(result["due_soon"].as_array().unwrap().is_empty());
}

#[test]
fn boundary_execution_window_rejects_inverted_range() {
    let store = store();
    let envelope = QueryEnvelope { name: "execution_window".into(), args: json!({"time_min": 100, "time_max": 100}) };
    match dispatch_query(&store, &envelope, 0) {
        Response::Err { .. } => {}
        Response::Ok { .. } => panic!("expected an error for time_max <= time_min"),
    }
}

#[test]
fn boundary_search_items_empty_query_returns_empty() {
    let store = store();
    op(&store, "create_item", json!({"type": "task", "title": "Anything", "estimate_minutes": 0}), 0);
    let result = query(&store, "searchItems", json!({"q": ""}), 0);
    assert!(result.as_array().unwrap().is_empty());
}

#[test]
fn roundtrip_export_then_import_preserves_items() {
    let store = store();
    op(&store, "create_item", json!({"type": "project", "title": "Roundtrip", "estimate_minutes": 0}), 0);
    let exported = op(&store, "export_data", json!({}), 0);

    let fresh = store();
    op(&fresh, "import_data", exported.clone(), 0);
    let reexported = op(&fresh, "export_data", json!({}), 0);
    assert_eq!(exported["items"], reexported["items"]);
}

#[test]
fn roundtrip_archive_then_restore_clears_descendants() {
    let store = store();
    let p = op(&store, "create_item", json!({"type": "project", "title": "P", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "create_item", json!({"type": "task", "parent_id": p, "title": "child", "estimate_minutes": 0}), 0);
    op(&store, "item.archive", json!({"id": p}), 100);
    op(&store, "item.restore", json!({"id": p}), 200);

    let tree = query(&store, "getProjectTree", json!({"project_id": p}), 0);
    for row in tree.as_array().unwrap() {
        assert!(row["id"].as_str().is_some());
    }
    let details = query(&store, "getItemDetails", json!({"item_id": p}), 0);
    assert!(details["item"]["id"] == p);
}

#[test]
fn roundtrip_timer_duration_rounds_up_to_the_minute() {
    let store = store();
    let t = op(&store, "create_item", json!({"type": "task", "title": "T", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "start_timer", json!({"item_id": t}), 0);
    let result = op(&store, "stop_timer", json!({}), 90_000);
    assert_eq!(result["duration_minutes"], 2);
}

#[test]
fn roundtrip_repeat_dependency_create_is_a_noop() {
    let store = store();
    let a = op(&store, "create_item", json!({"type": "task", "title": "A", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    let b = op(&store, "create_item", json!({"type": "task", "title": "B", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "add_dependency", json!({"predecessor_id": a, "successor_id": b}), 0);
    op(&store, "add_dependency", json!({"predecessor_id": a, "successor_id": b}), 0);

    let conn = store.read();
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0)).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn invariant_set_status_in_progress_blocked_by_active_blocker() {
    let store = store();
    let t = op(&store, "create_item", json!({"type": "task", "title": "T", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    op(&store, "add_blocker", json!({"item_id": t, "text": "needs spec"}), 0);
    let err = op_err(&store, "set_status", json!({"id": t, "status": "in_progress"}), 0);
    assert!(err["code"] == "BLOCKED");
    op(&store, "set_status", json!({"id": t, "status": "in_progress", "override": true}), 0);
}

#[test]
fn invariant_self_dependency_is_rejected() {
    let store = store();
    let t = op(&store, "create_item", json!({"type": "task", "title": "T", "estimate_minutes": 0}), 0)["id"].as_str().unwrap().to_string();
    let err = op_err(&store, "dependency.create", json!({"predecessor_id": t, "successor_id": t}), 0);
    assert!(err.to_string().contains("itself"));
}

#[test]
fn unknown_operation_name_returns_an_error() {
    let store = store();
    let envelope = OpEnvelope {
        name: "nonexistent_op".into(),
        args: json!({}),
        op_id: new_id(),
        op_name: None,
        actor_type: "user".into(),
        actor_id: None,
        ts: 0,
    };
    match dispatch_op(&store, &envelope) {
        Response::Err { .. } => {}
        Response::Ok { .. } => panic!("unknown operation should fail"),
    }
}
