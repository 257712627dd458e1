//! Blocked-state deriver (spec §4.F).

use std::collections::HashMap;

use crate::model::{Blocker, DependencyEdge, Status};

/// `has_active_blocker` for every item that owns at least one uncleared blocker.
pub fn active_blocker_flags(blockers: &[Blocker]) -> HashMap<String, bool> {
    let mut flags = HashMap::new();
    for blocker in blockers {
        if blocker.is_active() {
            flags.insert(blocker.item_id.clone(), true);
        }
    }
    flags
}

/// `has_unmet_dep(id)` — a dependency `(id -> p)` where `p` is missing or not done.
pub fn unmet_dependency_flags(
    edges: &[DependencyEdge],
    status_by_id: &HashMap<String, Status>,
) -> HashMap<String, bool> {
    let mut flags: HashMap<String, bool> = HashMap::new();
    for edge in edges {
        let pred_done = status_by_id.get(&edge.predecessor_id) == Some(&Status::Done);
        if !pred_done {
            flags.insert(edge.successor_id.clone(), true);
        } else {
            flags.entry(edge.successor_id.clone()).or_insert(false);
        }
    }
    flags
}

/// `is_blocked ≡ status = blocked OR has_active_blocker OR has_unmet_dep`.
pub fn is_blocked(status: Status, has_active_blocker: bool, has_unmet_dep: bool) -> bool {
    status == Status::Blocked || has_active_blocker || has_unmet_dep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_blocker_flags_ignore_cleared_blockers() {
        let blockers = vec![
            Blocker { blocker_id: "b1".into(), item_id: "i1".into(), kind: "general".into(), text: "x".into(), created_at: 0, cleared_at: None },
            Blocker { blocker_id: "b2".into(), item_id: "i2".into(), kind: "general".into(), text: "x".into(), created_at: 0, cleared_at: Some(1) },
        ];
        let flags = active_blocker_flags(&blockers);
        assert_eq!(flags.get("i1"), Some(&true));
        assert_eq!(flags.get("i2"), None);
    }

    #[test]
    fn unmet_dependency_flags_missing_predecessor_counts_as_unmet() {
        let edges = vec![DependencyEdge {
            successor_id: "s".into(),
            predecessor_id: "missing".into(),
            dep_type: crate::model::DependencyType::Fs,
            lag_minutes: 0,
        }];
        let status_by_id = HashMap::new();
        let flags = unmet_dependency_flags(&edges, &status_by_id);
        assert_eq!(flags.get("s"), Some(&true));
    }

    #[test]
    fn is_blocked_combines_status_and_flags() {
        assert!(is_blocked(Status::Blocked, false, false));
        assert!(is_blocked(Status::Ready, true, false));
        assert!(is_blocked(Status::Ready, false, true));
        assert!(!is_blocked(Status::Ready, false, false));
    }
}
