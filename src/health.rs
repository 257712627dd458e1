//! Due-metrics and the auto-health formula (spec §4.I).

use crate::model::{Health, Status};

pub const DAY_MS: i64 = 86_400_000;

/// Integer ceiling division for non-negative `numerator`/positive `denominator`,
/// per the spec's `ceil((end-start)/60000)` convention (§9 Numeric semantics).
pub fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator - 1) / denominator
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DueMetrics {
    pub is_overdue: bool,
    pub days_until_due: i64,
    pub days_overdue: i64,
}

/// Due-metrics for an item with due `d`, now `n`, status `s` (spec §4.I).
pub fn due_metrics(due_at: Option<i64>, now: i64, status: Status) -> DueMetrics {
    let Some(d) = due_at else {
        return DueMetrics::default();
    };
    let closed = matches!(status, Status::Done | Status::Canceled);
    let is_overdue = d < now && !closed;
    if is_overdue {
        DueMetrics { is_overdue: true, days_until_due: 0, days_overdue: ceil_div(now - d, DAY_MS) }
    } else {
        DueMetrics { is_overdue: false, days_until_due: ceil_div((d - now).max(0), DAY_MS), days_overdue: 0 }
    }
}

/// Auto-health formula used where `health_mode = auto` (spec §4.I).
pub fn auto_health(is_overdue: bool, capacity_per_day: Option<f64>, remaining_minutes: i64, days_until_due: i64) -> Health {
    if is_overdue {
        return Health::Behind;
    }
    let Some(capacity) = capacity_per_day else {
        return Health::OnTrack;
    };
    if remaining_minutes <= 0 {
        return Health::OnTrack;
    }
    let required = remaining_minutes as f64 / days_until_due.max(1) as f64;
    if required > capacity {
        Health::Behind
    } else if required >= 0.8 * capacity {
        Health::AtRisk
    } else {
        Health::OnTrack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_metrics_null_due_at_is_all_zero() {
        let m = due_metrics(None, 1_000_000, Status::Ready);
        assert_eq!(m, DueMetrics::default());
    }

    #[test]
    fn due_metrics_marks_done_items_as_never_overdue() {
        let m = due_metrics(Some(0), DAY_MS, Status::Done);
        assert!(!m.is_overdue);
    }

    #[test]
    fn due_metrics_computes_days_overdue() {
        let m = due_metrics(Some(0), DAY_MS * 2, Status::Ready);
        assert!(m.is_overdue);
        assert_eq!(m.days_overdue, 2);
    }

    #[test]
    fn auto_health_is_behind_when_overdue() {
        assert_eq!(auto_health(true, Some(480.0), 100, 1), Health::Behind);
    }

    #[test]
    fn auto_health_is_on_track_with_no_capacity_configured() {
        assert_eq!(auto_health(false, None, 1000, 1), Health::OnTrack);
    }

    #[test]
    fn auto_health_is_at_risk_near_capacity() {
        let h = auto_health(false, Some(100.0), 85, 1);
        assert_eq!(h, Health::AtRisk);
    }

    #[test]
    fn auto_health_is_behind_over_capacity() {
        let h = auto_health(false, Some(100.0), 150, 1);
        assert_eq!(h, Health::Behind);
    }
}
