//! Core entities (spec.md §3). All timestamps are milliseconds since epoch;
//! all ids are opaque strings (UUID v4 text).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a fresh opaque id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Project,
    Milestone,
    Task,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Project => "project",
            ItemType::Milestone => "milestone",
            ItemType::Task => "task",
        }
    }

    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "project" => Ok(ItemType::Project),
            "milestone" => Ok(ItemType::Milestone),
            "task" => Ok(ItemType::Task),
            other => Err(crate::error::Error::validation(
                "type",
                format!("must be one of project|milestone|task, got {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Backlog,
    Ready,
    InProgress,
    Blocked,
    Review,
    Done,
    Canceled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Backlog => "backlog",
            Status::Ready => "ready",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Review => "review",
            Status::Done => "done",
            Status::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> crate::error::Result<Self> {
        Ok(match s {
            "backlog" => Status::Backlog,
            "ready" => Status::Ready,
            "in_progress" => Status::InProgress,
            "blocked" => Status::Blocked,
            "review" => Status::Review,
            "done" => Status::Done,
            "canceled" => Status::Canceled,
            other => {
                return Err(crate::error::Error::validation(
                    "status",
                    format!("unrecognized status {other}"),
                ))
            }
        })
    }

    /// Column order used by kanban views; `canceled` only appears when requested.
    pub fn kanban_order(include_canceled: bool) -> Vec<Status> {
        let mut cols = vec![
            Status::Backlog,
            Status::Ready,
            Status::InProgress,
            Status::Blocked,
            Status::Review,
            Status::Done,
        ];
        if include_canceled {
            cols.push(Status::Canceled);
        }
        cols
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMode {
    Manual,
    Rollup,
}

impl EstimateMode {
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "manual" => Ok(EstimateMode::Manual),
            "rollup" => Ok(EstimateMode::Rollup),
            other => Err(crate::error::Error::validation(
                "estimate_mode",
                format!("must be manual|rollup, got {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Unknown,
    OnTrack,
    AtRisk,
    Behind,
    Ahead,
}

impl Health {
    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Unknown => "unknown",
            Health::OnTrack => "on_track",
            Health::AtRisk => "at_risk",
            Health::Behind => "behind",
            Health::Ahead => "ahead",
        }
    }

    pub fn parse(s: &str) -> crate::error::Result<Self> {
        Ok(match s {
            "unknown" => Health::Unknown,
            "on_track" => Health::OnTrack,
            "at_risk" => Health::AtRisk,
            "behind" => Health::Behind,
            "ahead" => Health::Ahead,
            other => {
                return Err(crate::error::Error::validation("health", format!("unrecognized health {other}")))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthMode {
    Auto,
    Manual,
}

impl HealthMode {
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "auto" => Ok(HealthMode::Auto),
            "manual" => Ok(HealthMode::Manual),
            other => Err(crate::error::Error::validation(
                "health_mode",
                format!("must be auto|manual, got {other}"),
            )),
        }
    }
}

/// `(successor, predecessor, type, lag)` — FS/SS/FF/SF per spec §4.E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DependencyType {
    Fs,
    Ss,
    Ff,
    Sf,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Fs => "FS",
            DependencyType::Ss => "SS",
            DependencyType::Ff => "FF",
            DependencyType::Sf => "SF",
        }
    }

    /// Case-insensitive; unrecognized input normalizes to `FS` per spec §4.B.
    pub fn normalize(s: Option<&str>) -> Self {
        match s.map(|s| s.to_ascii_uppercase()).as_deref() {
            Some("SS") => DependencyType::Ss,
            Some("FF") => DependencyType::Ff,
            Some("SF") => DependencyType::Sf,
            _ => DependencyType::Fs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFilter {
    Active,
    Archived,
    All,
}

impl ArchiveFilter {
    pub fn normalize(s: Option<&str>) -> Self {
        match s {
            Some("archived") => ArchiveFilter::Archived,
            Some("all") => ArchiveFilter::All,
            _ => ArchiveFilter::Active,
        }
    }

    pub fn matches(&self, archived_at: Option<i64>) -> bool {
        match self {
            ArchiveFilter::Active => archived_at.is_none(),
            ArchiveFilter::Archived => archived_at.is_some(),
            ArchiveFilter::All => true,
        }
    }
}

/// A scope descriptor accepted by every view (spec §4.C).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Project { id: String },
    User { id: String },
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub item_type: ItemType,
    pub title: String,
    pub parent_id: Option<String>,
    pub status: Status,
    pub priority: i32,
    pub due_at: Option<i64>,
    pub estimate_mode: EstimateMode,
    pub estimate_minutes: i64,
    pub health: Health,
    pub health_mode: HealthMode,
    pub notes: Option<String>,
    pub sort_order: i64,
    pub completed_at: Option<i64>,
    pub archived_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub successor_id: String,
    pub predecessor_id: String,
    pub dep_type: DependencyType,
    pub lag_minutes: i64,
}

impl DependencyEdge {
    /// `"<successor>-><predecessor>"` per spec §4.E.
    pub fn edge_id(&self) -> String {
        format!("{}->{}", self.successor_id, self.predecessor_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    pub blocker_id: String,
    pub item_id: String,
    pub kind: String,
    pub text: String,
    pub created_at: i64,
    pub cleared_at: Option<i64>,
}

impl Blocker {
    pub fn is_active(&self) -> bool {
        self.cleared_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledBlock {
    pub block_id: String,
    pub item_id: String,
    pub start_at: i64,
    pub duration_minutes: i64,
    pub locked: bool,
    pub source: String,
}

impl ScheduledBlock {
    pub fn end_at(&self) -> i64 {
        self.start_at + self.duration_minutes * 60_000
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub entry_id: String,
    pub item_id: String,
    pub start_at: i64,
    pub end_at: i64,
    pub duration_minutes: i64,
    pub note: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTimer {
    pub item_id: String,
    pub start_at: i64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAssignee {
    pub item_id: String,
    pub assignee_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTag {
    pub item_id: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value_json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub log_id: String,
    pub op_id: String,
    pub op_name: String,
    pub actor: String,
    pub ts: i64,
    pub args_json: String,
    pub result_json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_as_str_and_parse() {
        for s in [
            Status::Backlog, Status::Ready, Status::InProgress, Status::Blocked,
            Status::Review, Status::Done, Status::Canceled,
        ] {
            assert_eq!(Status::parse(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn dependency_type_normalizes_case_insensitively_and_defaults_to_fs() {
        assert_eq!(DependencyType::normalize(Some("ss")), DependencyType::Ss);
        assert_eq!(DependencyType::normalize(Some("Ff")), DependencyType::Ff);
        assert_eq!(DependencyType::normalize(Some("bogus")), DependencyType::Fs);
        assert_eq!(DependencyType::normalize(None), DependencyType::Fs);
    }

    #[test]
    fn edge_id_format_matches_spec() {
        let edge = DependencyEdge {
            successor_id: "s1".into(),
            predecessor_id: "p1".into(),
            dep_type: DependencyType::Fs,
            lag_minutes: 0,
        };
        assert_eq!(edge.edge_id(), "s1->p1");
    }

    #[test]
    fn archive_filter_matches_expected_rows() {
        assert!(ArchiveFilter::Active.matches(None));
        assert!(!ArchiveFilter::Active.matches(Some(1)));
        assert!(ArchiveFilter::Archived.matches(Some(1)));
        assert!(ArchiveFilter::All.matches(None) && ArchiveFilter::All.matches(Some(1)));
    }
}
