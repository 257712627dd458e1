//! Request router (spec §4.K). Single entry point; dispatches `{kind, name}`
//! envelopes to the operation executor or the view builders and wraps
//! errors into a uniform response shape.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{DomainCode, Error, Result};
use crate::model::{new_id, ArchiveFilter, Scope};
use crate::ops;
use crate::store::Store;
use crate::views;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationName {
    CreateItem,
    UpdateItemFields,
    SetStatus,
    ScheduledBlockCreate,
    ScheduledBlockUpdate,
    ScheduledBlockDelete,
    ItemArchive,
    ItemsArchiveMany,
    ItemRestore,
    ItemsRestoreMany,
    DeleteItem,
    ItemsDeleteMany,
    ReorderItem,
    MoveItem,
    AddTimeEntry,
    StartTimer,
    StopTimer,
    SetSetting,
    ExportData,
    ImportData,
    DependencyCreate,
    DependencyUpdate,
    DependencyDelete,
    AddBlocker,
    ClearBlocker,
    SetItemTags,
    UserCreate,
    UserUpdate,
    ItemSetAssignee,
    SetItemAssignees,
}

impl FromStr for OperationName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        use OperationName::*;
        Ok(match name {
            "create_item" => CreateItem,
            "update_item_fields" => UpdateItemFields,
            "set_status" => SetStatus,
            "scheduled_block.create" | "create_block" => ScheduledBlockCreate,
            "scheduled_block.update" | "move_block" | "resize_block" => ScheduledBlockUpdate,
            "scheduled_block.delete" | "delete_block" => ScheduledBlockDelete,
            "item.archive" => ItemArchive,
            "items.archive_many" => ItemsArchiveMany,
            "item.restore" => ItemRestore,
            "items.restore_many" => ItemsRestoreMany,
            "delete_item" => DeleteItem,
            "items.delete_many" => ItemsDeleteMany,
            "reorder_item" => ReorderItem,
            "move_item" => MoveItem,
            "add_time_entry" => AddTimeEntry,
            "start_timer" => StartTimer,
            "stop_timer" => StopTimer,
            "set_setting" => SetSetting,
            "export_data" => ExportData,
            "import_data" => ImportData,
            "dependency.create" | "add_dependency" => DependencyCreate,
            "dependency.update" => DependencyUpdate,
            "dependency.delete" | "remove_dependency" => DependencyDelete,
            "add_blocker" => AddBlocker,
            "clear_blocker" => ClearBlocker,
            "set_item_tags" => SetItemTags,
            "user.create" => UserCreate,
            "user.update" => UserUpdate,
            "item.set_assignee" => ItemSetAssignee,
            "set_item_assignees" => SetItemAssignees,
            other => return Err(Error::validation("name", format!("Unknown operation: {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryName {
    GetItemDetails,
    GetRunningTimer,
    GetProjectTree,
    ListKanban,
    ListItems,
    ListViewScope,
    GanttRange,
    CalendarRange,
    ExecutionWindow,
    BlockedView,
    DueOverdue,
    ContributionsRange,
    SearchItems,
    UsersList,
    GetSettings,
    VerifyIntegrity,
}

impl FromStr for QueryName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        use QueryName::*;
        Ok(match name {
            "getItemDetails" => GetItemDetails,
            "get_running_timer" => GetRunningTimer,
            "getProjectTree" => GetProjectTree,
            "listKanban" | "kanban_view" => ListKanban,
            "listItems" => ListItems,
            "list_view_complete" | "list_view_scope" | "listExecution" | "listBlocked" | "listByUser" => ListViewScope,
            "listGantt" | "gantt_range" => GanttRange,
            "listCalendarBlocks" | "calendar_range" | "calendar_range_user" | "calendar_range_users" => CalendarRange,
            "execution_window" => ExecutionWindow,
            "blocked_view" => BlockedView,
            "due_overdue" | "listOverdue" | "listDueSoon" => DueOverdue,
            "contributions_range" => ContributionsRange,
            "searchItems" => SearchItems,
            "users_list" => UsersList,
            "getSettings" => GetSettings,
            "debug.verify_integrity" => VerifyIntegrity,
            other => return Err(Error::validation("name", format!("Unknown query: {other}"))),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpEnvelope {
    pub name: String,
    pub args: Value,
    #[serde(default = "new_id")]
    pub op_id: String,
    #[serde(default)]
    pub op_name: Option<String>,
    pub actor_type: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    pub ts: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryEnvelope {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { ok: bool, result: Value, warnings: Vec<String>, invalidate: Vec<String> },
    Err { ok: bool, error: Value },
}

fn success(result: Value, warnings: Vec<String>, invalidate: Vec<String>) -> Response {
    Response::Ok { ok: true, result, warnings, invalidate }
}

fn failure(err: &Error) -> Response {
    let error = match err {
        Error::Domain { code, message } => json!({"code": domain_code_wire(*code), "message": message}),
        other => Value::String(other.to_string()),
    };
    Response::Err { ok: false, error }
}

fn domain_code_wire(code: DomainCode) -> String {
    code.to_string()
}

#[tracing::instrument(skip(store, envelope), fields(name = %envelope.name))]
pub fn dispatch_op(store: &Store, envelope: &OpEnvelope) -> Response {
    let outcome = (|| -> Result<ops::OpOutcome> {
        let op = OperationName::from_str(&envelope.name)?;
        store.with_transaction(|tx| {
            let now = envelope.ts;
            use OperationName::*;
            let outcome = match op {
                CreateItem => ops::create_item(tx, &envelope.args, now)?,
                UpdateItemFields => ops::update_item_fields(tx, &envelope.args, now)?,
                SetStatus => ops::set_status(tx, &envelope.args, now)?,
                ScheduledBlockCreate => ops::scheduled_block_create(tx, &envelope.args, now)?,
                ScheduledBlockUpdate => ops::scheduled_block_update(tx, &envelope.args, now)?,
                ScheduledBlockDelete => ops::scheduled_block_delete(tx, &envelope.args, now)?,
                ItemArchive => ops::item_archive(tx, &envelope.args, now)?,
                ItemsArchiveMany => ops::items_archive_many(tx, &envelope.args, now)?,
                ItemRestore => ops::item_restore(tx, &envelope.args, now)?,
                ItemsRestoreMany => ops::items_restore_many(tx, &envelope.args, now)?,
                DeleteItem => ops::delete_item(tx, &envelope.args, now)?,
                ItemsDeleteMany => ops::items_delete_many(tx, &envelope.args, now)?,
                ReorderItem => ops::reorder_item(tx, &envelope.args, now)?,
                MoveItem => ops::move_item(tx, &envelope.args, now)?,
                AddTimeEntry => ops::add_time_entry(tx, &envelope.args, now)?,
                StartTimer => ops::start_timer(tx, &envelope.args, now)?,
                StopTimer => ops::stop_timer(tx, &envelope.args, now)?,
                SetSetting => ops::set_setting(tx, &envelope.args, now)?,
                ExportData => {
                    let data = views::io::export_data(tx, now)?;
                    ops::OpOutcome { result: data, warnings: vec![], invalidate: vec![] }
                }
                ImportData => {
                    views::io::import_data(tx, &envelope.args)?;
                    ops::OpOutcome { result: json!({"imported": true}), warnings: vec![], invalidate: vec!["items".into()] }
                }
                DependencyCreate => ops::dependency_create(tx, &envelope.args, now)?,
                DependencyUpdate => ops::dependency_update(tx, &envelope.args, now)?,
                DependencyDelete => ops::dependency_delete(tx, &envelope.args, now)?,
                AddBlocker => ops::add_blocker(tx, &envelope.args, now)?,
                ClearBlocker => ops::clear_blocker(tx, &envelope.args, now)?,
                SetItemTags => ops::set_item_tags(tx, &envelope.args, now)?,
                UserCreate => ops::user_create(tx, &envelope.args, now)?,
                UserUpdate => ops::user_update(tx, &envelope.args, now)?,
                ItemSetAssignee => ops::item_set_assignee(tx, &envelope.args, now)?,
                SetItemAssignees => ops::item_set_item_assignees(tx, &envelope.args, now)?,
            };
            write_audit(tx, envelope, &outcome)?;
            Ok(outcome)
        })
    })();

    match outcome {
        Ok(o) => {
            tracing::debug!(op = %envelope.name, "operation committed");
            success(o.result, o.warnings, o.invalidate)
        }
        Err(err) => {
            if err.code().is_some() {
                tracing::warn!(op = %envelope.name, error = %err, "operation rejected by domain invariant");
            }
            failure(&err)
        }
    }
}

fn write_audit(tx: &rusqlite::Transaction, envelope: &OpEnvelope, outcome: &ops::OpOutcome) -> Result<()> {
    let actor_label = match &envelope.actor_id {
        Some(id) => format!("{}:{}", envelope.actor_type, id),
        None => envelope.actor_type.clone(),
    };
    tx.execute(
        "INSERT INTO audit_log (log_id, op_id, op_name, actor, ts, args_json, result_json) VALUES (?1,?2,?3,?4,?5,?6,?7)",
        rusqlite::params![
            new_id(), envelope.op_id, envelope.op_name.clone().unwrap_or_else(|| envelope.name.clone()),
            actor_label, envelope.ts, envelope.args.to_string(), outcome.result.to_string(),
        ],
    )?;
    Ok(())
}

#[tracing::instrument(skip(store, envelope), fields(name = %envelope.name))]
pub fn dispatch_query(store: &Store, envelope: &QueryEnvelope, now: i64) -> Response {
    let result = (|| -> Result<Value> {
        let query = QueryName::from_str(&envelope.name)?;
        let conn = store.read();
        let args = ops::args::Args::new(&envelope.args);
        use QueryName::*;
        Ok(match query {
            GetItemDetails => views::get_item_details(&conn, &args.str("item_id").or_else(|_| args.str("id"))?, now)?,
            GetRunningTimer => json!(Store::load_running_timers(&conn)?.into_iter().next()),
            GetProjectTree => json!(views::get_project_tree(&conn, &args.str("project_id").or_else(|_| args.str("id"))?, now)?),
            ListKanban => json!(views::kanban_view(
                &conn, &parse_scope(&args)?, parse_archive_filter(&args), args.bool_or("includeCanceled", false),
                args.opt_str("swimlane").unwrap_or_else(|| "none".into()).as_str(), now,
            )?),
            ListItems => json!(views::list_items(
                &conn, &parse_scope(&args)?, parse_archive_filter(&args), &parse_filters(&args),
                args.opt_str("sort").unwrap_or_else(|| "sort_order".into()).as_str(), args.bool_or("desc", false), now,
            )?),
            ListViewScope => views::list_view_scope(&conn, &parse_scope(&args)?, parse_archive_filter(&args), now)?,
            GanttRange => views::gantt_range(&conn, &parse_scope(&args)?, parse_archive_filter(&args), args.opt_i64("time_min"), args.opt_i64("time_max"), now)?,
            CalendarRange => views::calendar_range(&conn, &parse_scope(&args)?, parse_archive_filter(&args), args.i64("time_min")?, args.i64("time_max")?, now)?,
            ContributionsRange => views::contributions_range(
                &conn, &parse_scope(&args)?, parse_archive_filter(&args),
                args.i64("day_start_local")?, args.opt_i64("day_count").unwrap_or(30),
                args.bool_or("includeSubtasks", true), args.bool_or("includeMilestones", true), args.bool_or("includeProjects", false),
            )?,
            ExecutionWindow => {
                let defaults = crate::config::KernelConfig::default().execution_window;
                let time_min = args.i64("time_min")?;
                let time_max = args.i64("time_max")?;
                let limits = views::ExecutionWindowLimits {
                    scheduled_max: args.opt_i64("scheduled_max").unwrap_or(defaults.scheduled_max_default).min(defaults.scheduled_max_cap),
                    actionable_max: args.opt_i64("actionable_max").unwrap_or(defaults.actionable_max_default),
                    unscheduled_max: args.opt_i64("unscheduled_max").unwrap_or(defaults.unscheduled_max_default()),
                    next_up_hours: args.opt_i64("next_up_hours").unwrap_or(defaults.next_up_hours),
                };
                views::execution_window(&conn, time_min, time_max, now, &limits)?
            }
            BlockedView => views::blocked_view(&conn, now)?,
            DueOverdue => views::due_overdue(
                &conn,
                args.opt_i64("now_at").unwrap_or(now),
                args.opt_i64("due_soon_days").unwrap_or_else(|| crate::config::KernelConfig::default().due_soon_days_default),
            )?,
            SearchItems => json!(views::search_items(&conn, &args.opt_str("q").unwrap_or_default(), args.opt_str("scopeId").as_deref(), args.opt_i64("limit").unwrap_or(20) as usize)?),
            UsersList => views::users_list(&conn)?,
            GetSettings => {
                let settings = Store::load_settings(&conn)?;
                let map: serde_json::Map<String, Value> = settings
                    .into_iter()
                    .map(|s| (s.key, serde_json::from_str::<Value>(&s.value_json).unwrap_or(Value::Null)))
                    .collect();
                Value::Object(map)
            }
            VerifyIntegrity => json!(crate::integrity::verify_integrity(&conn)?),
        })
    })();

    match result {
        Ok(result) => success(result, vec![], vec![]),
        Err(err) => failure(&err),
    }
}

fn parse_scope(args: &ops::args::Args) -> Result<Scope> {
    if let Some(user_id) = args.opt_str("userId") {
        return Ok(Scope::User { id: user_id });
    }
    if let Some(project_id) = args.opt_str("projectId") {
        return Ok(Scope::Project { id: project_id });
    }
    Ok(Scope::All)
}

fn parse_archive_filter(args: &ops::args::Args) -> ArchiveFilter {
    ArchiveFilter::normalize(args.opt_str("archiveFilter").as_deref())
}

fn parse_filters(args: &ops::args::Args) -> views::ListFilters {
    let status = args
        .opt_str("status")
        .map(|s| vec![s])
        .unwrap_or_else(|| args.str_array("status"))
        .into_iter()
        .filter_map(|s| crate::model::Status::parse(&s).ok())
        .collect();
    views::ListFilters {
        status,
        assignee_id: args.opt_str("assigneeId"),
        tag: args.opt_str("tagId"),
        search_text: args.opt_str("searchText"),
        include_done: args.bool_or("includeDone", true),
        include_canceled: args.bool_or("includeCanceled", false),
        include_ungrouped: args.bool_or("includeUngrouped", false),
    }
}

/// Unknown `kind` at the transport boundary — not in the spec's enum but the
/// router must still respond uniformly.
pub fn unknown_kind_response(kind: &str) -> Response {
    failure(&Error::validation("kind", format!("Unknown envelope kind: {kind}")))
}
