//! Sequence-rank scalar (spec §4.I) — sorting ascending yields "what to work
//! on next".

pub fn sequence_rank(is_overdue: bool, is_blocked: bool, due_at: Option<i64>, priority: i32, dependents_count: i64) -> f64 {
    let overdue_penalty = if is_overdue { 0.0 } else { 1.0 };
    let blocked_penalty = if is_blocked { 1.0 } else { 0.0 };
    let due_key = due_at.map(|d| (d / 60_000) as f64).unwrap_or(f64::MAX);
    overdue_penalty * 1e15
        + blocked_penalty * 1e14
        + due_key * 1e4
        + (5 - priority) as f64 * 1e2
        - dependents_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overdue_items_rank_ahead_of_non_overdue() {
        let overdue = sequence_rank(true, false, Some(0), 0, 0);
        let on_time = sequence_rank(false, false, Some(0), 0, 0);
        assert!(overdue < on_time);
    }

    #[test]
    fn blocked_items_rank_behind_unblocked_at_same_overdue_state() {
        let blocked = sequence_rank(false, true, None, 3, 0);
        let unblocked = sequence_rank(false, false, None, 3, 0);
        assert!(unblocked < blocked);
    }

    #[test]
    fn higher_priority_ranks_ahead() {
        let high = sequence_rank(false, false, None, 5, 0);
        let low = sequence_rank(false, false, None, 0, 0);
        assert!(high < low);
    }

    #[test]
    fn more_dependents_ranks_ahead_all_else_equal() {
        let many_dependents = sequence_rank(false, false, None, 0, 10);
        let few_dependents = sequence_rank(false, false, None, 0, 0);
        assert!(many_dependents < few_dependents);
    }
}
