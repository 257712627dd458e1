//! DDL statements and forward-only migrations for the SQLite-backed store.
//!
//! Timestamps are stored as INTEGER milliseconds since epoch (not TEXT —
//! unlike some issue trackers, the spec fixes the epoch-ms representation).
//! Booleans are stored as INTEGER (0/1). JSON blobs are TEXT.

/// Current schema version. Bump whenever `SCHEMA_STATEMENTS` or `MIGRATIONS` change.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Core DDL executed once, on first open of a fresh store.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id               TEXT PRIMARY KEY,
        item_type        TEXT NOT NULL,
        title            TEXT NOT NULL,
        parent_id        TEXT,
        status           TEXT NOT NULL DEFAULT 'backlog',
        priority         INTEGER NOT NULL DEFAULT 0,
        due_at           INTEGER,
        estimate_mode    TEXT NOT NULL DEFAULT 'manual',
        estimate_minutes INTEGER NOT NULL DEFAULT 0,
        health           TEXT NOT NULL DEFAULT 'unknown',
        health_mode      TEXT NOT NULL DEFAULT 'auto',
        notes            TEXT,
        sort_order       INTEGER NOT NULL DEFAULT 0,
        completed_at     INTEGER,
        archived_at      INTEGER,
        created_at       INTEGER NOT NULL,
        updated_at       INTEGER NOT NULL,
        FOREIGN KEY (parent_id) REFERENCES items(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_items_status ON items(status)",
    "CREATE INDEX IF NOT EXISTS idx_items_due_at ON items(due_at)",
    "CREATE INDEX IF NOT EXISTS idx_items_archived ON items(archived_at)",
    r#"
    CREATE TABLE IF NOT EXISTS dependencies (
        successor_id   TEXT NOT NULL,
        predecessor_id TEXT NOT NULL,
        dep_type       TEXT NOT NULL DEFAULT 'FS',
        lag_minutes    INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (successor_id, predecessor_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_deps_predecessor ON dependencies(predecessor_id)",
    r#"
    CREATE TABLE IF NOT EXISTS blockers (
        blocker_id TEXT PRIMARY KEY,
        item_id    TEXT NOT NULL,
        kind       TEXT NOT NULL,
        text       TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        cleared_at INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_blockers_item ON blockers(item_id)",
    r#"
    CREATE TABLE IF NOT EXISTS scheduled_blocks (
        block_id         TEXT PRIMARY KEY,
        item_id          TEXT NOT NULL,
        start_at         INTEGER NOT NULL,
        duration_minutes INTEGER NOT NULL,
        locked           INTEGER NOT NULL DEFAULT 0,
        source           TEXT NOT NULL DEFAULT 'user'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_blocks_item ON scheduled_blocks(item_id)",
    "CREATE INDEX IF NOT EXISTS idx_blocks_start ON scheduled_blocks(start_at)",
    r#"
    CREATE TABLE IF NOT EXISTS time_entries (
        entry_id         TEXT PRIMARY KEY,
        item_id          TEXT NOT NULL,
        start_at         INTEGER NOT NULL,
        end_at           INTEGER NOT NULL,
        duration_minutes INTEGER NOT NULL,
        note             TEXT,
        source           TEXT NOT NULL DEFAULT 'manual'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_entries_item ON time_entries(item_id)",
    r#"
    CREATE TABLE IF NOT EXISTS running_timers (
        item_id  TEXT PRIMARY KEY,
        start_at INTEGER NOT NULL,
        note     TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_assignees (
        item_id     TEXT PRIMARY KEY,
        assignee_id TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_assignees_assignee ON item_assignees(assignee_id)",
    r#"
    CREATE TABLE IF NOT EXISTS item_tags (
        item_id TEXT NOT NULL,
        tag     TEXT NOT NULL,
        PRIMARY KEY (item_id, tag)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tags_tag ON item_tags(tag)",
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key        TEXT PRIMARY KEY,
        value_json TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        log_id      TEXT PRIMARY KEY,
        op_id       TEXT NOT NULL,
        op_name     TEXT NOT NULL,
        actor       TEXT NOT NULL,
        ts          INTEGER NOT NULL,
        args_json   TEXT NOT NULL,
        result_json TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audit_ts ON audit_log(ts)",
    r#"
    CREATE TABLE IF NOT EXISTS schema_meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// Default setting values inserted on first init (spec §3 recognized keys).
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("capacity_minutes_per_day", "480"),
    ("ui.auto_archive_on_complete", "false"),
    ("users_registry", "[]"),
    ("current_user_id", "\"\""),
];

/// A forward-only migration applied after the initial DDL. Tracked in
/// `schema_meta` under key `schema_version` so each runs at most once.
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Migrations beyond the version-1 baseline. Empty today; the next schema
/// change bumps `CURRENT_SCHEMA_VERSION` and appends here.
pub const MIGRATIONS: &[Migration] = &[];
