//! Dependency engine (spec §4.E): cycle detection and the four-link-type +
//! lag satisfaction evaluator.

use std::collections::{HashMap, HashSet};

use crate::model::DependencyEdge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    Unknown,
    Satisfied,
    Violated,
}

/// The four schedule anchors an edge may need; any may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleAnchors {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Evaluate one edge against its predecessor's and successor's schedule
/// envelopes, per the FS/SS/FF/SF table in spec §4.E.
pub fn evaluate_edge(
    edge: &DependencyEdge,
    pred: ScheduleAnchors,
    succ: ScheduleAnchors,
) -> DependencyStatus {
    use crate::model::DependencyType::*;
    let lag = edge.lag_minutes * 60_000;
    let (required, satisfied) = match edge.dep_type {
        Fs => (pred.end.zip(succ.start), pred.end.zip(succ.start).map(|(pe, ss)| ss >= pe + lag)),
        Ss => (pred.start.zip(succ.start), pred.start.zip(succ.start).map(|(ps, ss)| ss >= ps + lag)),
        Ff => (pred.end.zip(succ.end), pred.end.zip(succ.end).map(|(pe, se)| se >= pe + lag)),
        Sf => (pred.start.zip(succ.end), pred.start.zip(succ.end).map(|(ps, se)| se >= ps + lag)),
    };
    match (required, satisfied) {
        (None, _) => DependencyStatus::Unknown,
        (Some(_), Some(true)) => DependencyStatus::Satisfied,
        (Some(_), Some(false)) => DependencyStatus::Violated,
        (Some(_), None) => DependencyStatus::Unknown,
    }
}

/// Adjacency built from `(successor -> predecessor)` edges: `successor_id`
/// depends on `predecessor_id`, i.e. the edge points from successor to its
/// prerequisite.
pub struct DependencyIndex {
    /// predecessor -> successors that depend on it ("depends_on" direction reversed)
    pub dependents: HashMap<String, Vec<String>>,
    /// successor -> predecessors it depends on
    pub depends_on: HashMap<String, Vec<String>>,
}

impl DependencyIndex {
    pub fn build(edges: &[DependencyEdge]) -> Self {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut depends_on: HashMap<String, Vec<String>> = HashMap::new();
        for edge in edges {
            dependents.entry(edge.predecessor_id.clone()).or_default().push(edge.successor_id.clone());
            depends_on.entry(edge.successor_id.clone()).or_default().push(edge.predecessor_id.clone());
        }
        DependencyIndex { dependents, depends_on }
    }

    pub fn dependents_count(&self, id: &str) -> usize {
        self.dependents.get(id).map(|v| v.len()).unwrap_or(0)
    }
}

/// Would inserting edge `(successor -> predecessor)` create a cycle? DFS from
/// the would-be predecessor following outgoing `depends_on` edges: if the
/// would-be successor is reachable, the new edge closes a cycle.
pub fn would_create_cycle(edges: &[DependencyEdge], successor_id: &str, predecessor_id: &str) -> bool {
    if successor_id == predecessor_id {
        return true;
    }
    let index = DependencyIndex::build(edges);
    let mut stack = vec![predecessor_id.to_string()];
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == successor_id {
            return true;
        }
        if !seen.insert(node.clone()) {
            continue;
        }
        if let Some(preds) = index.depends_on.get(&node) {
            stack.extend(preds.iter().cloned());
        }
    }
    false
}

/// Iterative DFS with an on-stack set; collects up to `limit` example cycles
/// for integrity reporting (spec §4.J).
pub fn find_cycles(edges: &[DependencyEdge], limit: usize) -> Vec<Vec<String>> {
    let index = DependencyIndex::build(edges);
    let mut all_nodes: HashSet<String> = HashSet::new();
    for edge in edges {
        all_nodes.insert(edge.successor_id.clone());
        all_nodes.insert(edge.predecessor_id.clone());
    }

    let mut found = Vec::new();
    let mut globally_done: HashSet<String> = HashSet::new();

    for start in all_nodes {
        if found.len() >= limit || globally_done.contains(&start) {
            continue;
        }
        let mut path: Vec<String> = Vec::new();
        let mut on_path: HashSet<String> = HashSet::new();
        let mut stack: Vec<(String, usize)> = vec![(start.clone(), 0)];
        path.push(start.clone());
        on_path.insert(start);

        while let Some((node, next_idx)) = stack.pop() {
            let preds = index.depends_on.get(&node).cloned().unwrap_or_default();
            if next_idx < preds.len() {
                stack.push((node.clone(), next_idx + 1));
                let candidate = preds[next_idx].clone();
                if on_path.contains(&candidate) {
                    if found.len() < limit {
                        let cycle_start = path.iter().position(|n| n == &candidate).unwrap_or(0);
                        let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                        cycle.push(candidate);
                        found.push(cycle);
                    }
                } else if !globally_done.contains(&candidate) {
                    path.push(candidate.clone());
                    on_path.insert(candidate.clone());
                    stack.push((candidate, 0));
                }
            } else {
                on_path.remove(&node);
                path.pop();
                globally_done.insert(node);
            }
            if found.len() >= limit {
                break;
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyType;

    fn edge(succ: &str, pred: &str) -> DependencyEdge {
        DependencyEdge { successor_id: succ.into(), predecessor_id: pred.into(), dep_type: DependencyType::Fs, lag_minutes: 0 }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        assert!(would_create_cycle(&[], "a", "a"));
    }

    #[test]
    fn transitive_cycle_is_detected() {
        let edges = vec![edge("b", "a"), edge("c", "b")];
        assert!(would_create_cycle(&edges, "a", "c"));
    }

    #[test]
    fn unrelated_edge_is_not_a_cycle() {
        let edges = vec![edge("b", "a")];
        assert!(!would_create_cycle(&edges, "d", "c"));
    }

    #[test]
    fn fs_satisfied_when_successor_starts_after_predecessor_ends_plus_lag() {
        let e = DependencyEdge { successor_id: "s".into(), predecessor_id: "p".into(), dep_type: DependencyType::Fs, lag_minutes: 10 };
        let pred = ScheduleAnchors { start: Some(0), end: Some(1000) };
        let succ = ScheduleAnchors { start: Some(1000 + 10 * 60_000), end: None };
        assert_eq!(evaluate_edge(&e, pred, succ), DependencyStatus::Satisfied);
    }

    #[test]
    fn missing_anchor_is_unknown() {
        let e = DependencyEdge { successor_id: "s".into(), predecessor_id: "p".into(), dep_type: DependencyType::Fs, lag_minutes: 0 };
        let pred = ScheduleAnchors::default();
        let succ = ScheduleAnchors::default();
        assert_eq!(evaluate_edge(&e, pred, succ), DependencyStatus::Unknown);
    }

    #[test]
    fn find_cycles_reports_up_to_limit() {
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "a")];
        let cycles = find_cycles(&edges, 5);
        assert!(!cycles.is_empty());
    }
}
