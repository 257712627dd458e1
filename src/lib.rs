//! A transactional planning kernel: hierarchical work items, dependencies,
//! schedules, time tracking and rollups over a single embedded SQLite store.
//!
//! The kernel exposes exactly two entry points — [`router::dispatch_op`] for
//! state-changing operations and [`router::dispatch_query`] for read views —
//! so a host process (CLI, desktop shell, server) never touches SQL directly.

pub mod blocked;
pub mod config;
pub mod dependency;
pub mod error;
pub mod health;
pub mod hierarchy;
pub mod integrity;
pub mod model;
pub mod ops;
pub mod rollup;
pub mod router;
pub mod schedule;
pub mod schema;
pub mod sequence;
pub mod store;
pub mod validation;
pub mod views;

pub use error::{Error, Result};
pub use router::{dispatch_op, dispatch_query, OpEnvelope, QueryEnvelope, Response};
pub use store::Store;

/// Crate version, as reported by `Cargo.toml`. Surfaced so hosts can log
/// which kernel build produced a given store file.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_is_non_empty() {
        assert!(!version().is_empty());
    }

    #[test]
    fn end_to_end_create_and_read_item() {
        let store = Store::open_in_memory().unwrap();
        let op = OpEnvelope {
            name: "create_item".into(),
            args: json!({"type": "task", "title": "Write kernel", "estimate_minutes": 60}),
            op_id: model::new_id(),
            op_name: None,
            actor_type: "user".into(),
            actor_id: Some("u1".into()),
            ts: 1_700_000_000_000,
        };
        let response = dispatch_op(&store, &op);
        let id = match response {
            Response::Ok { result, .. } => result["id"].as_str().unwrap().to_string(),
            Response::Err { error, .. } => panic!("unexpected error: {error}"),
        };

        let query = QueryEnvelope { name: "getItemDetails".into(), args: json!({"item_id": id}) };
        let details = dispatch_query(&store, &query, 1_700_000_000_000);
        match details {
            Response::Ok { result, .. } => assert_eq!(result["item"]["title"], "Write kernel"),
            Response::Err { error, .. } => panic!("unexpected error: {error}"),
        }
    }
}
