//! Schedule summary (spec §4.G): per-item aggregate over scheduled blocks.

use std::collections::HashMap;

use crate::model::ScheduledBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleSummary {
    pub count: i64,
    pub total_minutes: i64,
    pub earliest_start: Option<i64>,
    pub latest_end: Option<i64>,
}

pub fn summarize(blocks: &[ScheduledBlock]) -> HashMap<String, ScheduleSummary> {
    let mut summaries: HashMap<String, ScheduleSummary> = HashMap::new();
    for block in blocks {
        let entry = summaries.entry(block.item_id.clone()).or_default();
        entry.count += 1;
        entry.total_minutes += block.duration_minutes;
        entry.earliest_start = Some(match entry.earliest_start {
            Some(existing) => existing.min(block.start_at),
            None => block.start_at,
        });
        let end = block.end_at();
        entry.latest_end = Some(match entry.latest_end {
            Some(existing) => existing.max(end),
            None => end,
        });
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(item_id: &str, start: i64, minutes: i64) -> ScheduledBlock {
        ScheduledBlock {
            block_id: format!("{item_id}-{start}"),
            item_id: item_id.into(),
            start_at: start,
            duration_minutes: minutes,
            locked: false,
            source: "user".into(),
        }
    }

    #[test]
    fn summarize_aggregates_count_minutes_and_span() {
        let blocks = vec![block("t", 0, 60), block("t", 120 * 60_000, 30)];
        let summaries = summarize(&blocks);
        let s = summaries["t"];
        assert_eq!(s.count, 2);
        assert_eq!(s.total_minutes, 90);
        assert_eq!(s.earliest_start, Some(0));
        assert_eq!(s.latest_end, Some(120 * 60_000 + 30 * 60_000));
    }
}
