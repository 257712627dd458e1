//! A day in the life of one project: create work, wire up a dependency,
//! schedule a block, track time against it, then read back the execution
//! window and project tree the way a host UI would.

use plan_kernel::model::new_id;
use plan_kernel::router::{OpEnvelope, QueryEnvelope};
use plan_kernel::{dispatch_op, dispatch_query, Response, Store};
use serde_json::{json, Value};

fn op(store: &Store, name: &str, args: Value, ts: i64) -> Value {
    let envelope = OpEnvelope {
        name: name.into(),
        args,
        op_id: new_id(),
        op_name: None,
        actor_type: "user".into(),
        actor_id: Some("demo-user".into()),
        ts,
    };
    match dispatch_op(store, &envelope) {
        Response::Ok { result, .. } => result,
        Response::Err { error, .. } => panic!("{name} failed: {error}"),
    }
}

fn query(store: &Store, name: &str, args: Value, now: i64) -> Value {
    let envelope = QueryEnvelope { name: name.into(), args };
    match dispatch_query(store, &envelope, now) {
        Response::Ok { result, .. } => result,
        Response::Err { error, .. } => panic!("{name} failed: {error}"),
    }
}

fn main() {
    let store = Store::open_in_memory().expect("open store");
    let now = 1_700_000_000_000i64;

    let project = op(&store, "create_item", json!({"type": "project", "title": "Ship v2", "estimate_minutes": 0}), now)["id"]
        .as_str()
        .unwrap()
        .to_string();

    let design = op(
        &store,
        "create_item",
        json!({"type": "task", "parent_id": project, "title": "Design API", "status": "ready", "estimate_minutes": 120}),
        now,
    )["id"]
        .as_str()
        .unwrap()
        .to_string();

    let build = op(
        &store,
        "create_item",
        json!({"type": "task", "parent_id": project, "title": "Build it", "status": "ready", "estimate_minutes": 240}),
        now,
    )["id"]
        .as_str()
        .unwrap()
        .to_string();

    op(&store, "dependency.create", json!({"predecessor_id": design, "successor_id": build}), now);
    op(&store, "scheduled_block.create", json!({"item_id": design, "start_at": now, "duration_minutes": 120}), now);

    println!("-- project tree (estimate rolls up from children) --");
    let tree = query(&store, "getProjectTree", json!({"project_id": project}), now);
    println!("{}", serde_json::to_string_pretty(&tree).unwrap());

    op(&store, "start_timer", json!({"item_id": design}), now);
    let stopped = op(&store, "stop_timer", json!({}), now + 45 * 60_000);
    println!("\n-- timer stopped after 45 minutes --\n{}", serde_json::to_string_pretty(&stopped).unwrap());

    println!("\n-- build is blocked until design is done --");
    let scope = query(&store, "list_view_scope", json!({}), now);
    println!("{}", serde_json::to_string_pretty(&scope).unwrap());

    op(&store, "set_status", json!({"id": design, "status": "done"}), now + 2 * 3_600_000);

    println!("\n-- execution window for the next 8 hours --");
    let window = query(
        &store,
        "execution_window",
        json!({"time_min": now, "time_max": now + 8 * 3_600_000}),
        now,
    );
    println!("{}", serde_json::to_string_pretty(&window).unwrap());
}
