//! Rollup, dependency and scope-resolution engine throughput over a
//! synthetic project tree, driven through the same `dispatch_op`/
//! `dispatch_query` surface a host process uses.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use plan_kernel::model::new_id;
use plan_kernel::router::{OpEnvelope, QueryEnvelope};
use plan_kernel::{dispatch_op, dispatch_query, Response, Store};
use serde_json::json;

fn create(store: &Store, args: serde_json::Value) -> String {
    let envelope = OpEnvelope {
        name: "create_item".into(),
        args,
        op_id: new_id(),
        op_name: None,
        actor_type: "bench".into(),
        actor_id: None,
        ts: 0,
    };
    match dispatch_op(store, &envelope) {
        Response::Ok { result, .. } => result["id"].as_str().unwrap().to_string(),
        Response::Err { error, .. } => panic!("setup op failed: {error}"),
    }
}

/// One project with `fanout` direct tasks per level, `depth` levels deep.
/// Every task at the leaf level depends on its left sibling, so the
/// dependency graph has a realistic chain of FS edges to evaluate.
fn build_tree(store: &Store, depth: usize, fanout: usize) -> String {
    let project = create(&store, json!({"type": "project", "title": "bench project", "estimate_minutes": 0}));
    let mut frontier = vec![project.clone()];
    for level in 0..depth {
        let mut next = Vec::new();
        for parent in &frontier {
            let mut siblings = Vec::new();
            for i in 0..fanout {
                let item_type = if level == depth - 1 { "task" } else { "project" };
                let id = create(
                    &store,
                    json!({
                        "type": item_type,
                        "parent_id": parent,
                        "title": format!("item {level}-{i}"),
                        "estimate_minutes": 30,
                        "status": "ready",
                    }),
                );
                siblings.push(id);
            }
            if level == depth - 1 {
                for pair in siblings.windows(2) {
                    let envelope = OpEnvelope {
                        name: "dependency.create".into(),
                        args: json!({"predecessor_id": pair[0], "successor_id": pair[1]}),
                        op_id: new_id(),
                        op_name: None,
                        actor_type: "bench".into(),
                        actor_id: None,
                        ts: 0,
                    };
                    dispatch_op(&store, &envelope);
                }
            }
            next.extend(siblings);
        }
        frontier = next;
    }
    project
}

fn bench_project_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_project_tree");
    for fanout in [5usize, 10, 20] {
        let store = Store::open_in_memory().unwrap();
        let project = build_tree(&store, 3, fanout);
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &fanout, |b, _| {
            b.iter(|| {
                let envelope = QueryEnvelope { name: "getProjectTree".into(), args: json!({"project_id": project}) };
                dispatch_query(&store, &envelope, 0)
            });
        });
    }
    group.finish();
}

fn bench_execution_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution_window");
    for fanout in [5usize, 10, 20] {
        let store = Store::open_in_memory().unwrap();
        build_tree(&store, 3, fanout);
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &fanout, |b, _| {
            b.iter(|| {
                let envelope = QueryEnvelope {
                    name: "execution_window".into(),
                    args: json!({"time_min": 0, "time_max": 7 * 24 * 3_600_000_i64}),
                };
                dispatch_query(&store, &envelope, 0)
            });
        });
    }
    group.finish();
}

fn bench_list_view_scope(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_view_scope");
    for fanout in [5usize, 10, 20] {
        let store = Store::open_in_memory().unwrap();
        build_tree(&store, 3, fanout);
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &fanout, |b, _| {
            b.iter(|| {
                let envelope = QueryEnvelope { name: "list_view_scope".into(), args: json!({}) };
                dispatch_query(&store, &envelope, 0)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_project_tree, bench_execution_window, bench_list_view_scope);
criterion_main!(benches);
