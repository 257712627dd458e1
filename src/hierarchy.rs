//! Hierarchy & scope resolver (spec §4.C). Pure functions over an in-memory
//! snapshot of item rows — no store access, mirroring the teacher's
//! `DependencyGraph::build` pattern of loading rows once and computing over
//! adjacency maps.

use std::collections::{HashMap, HashSet};

use crate::model::{ArchiveFilter, Item, ItemType, Scope};

pub const UNGROUPED: &str = "__ungrouped__";

/// Adjacency view over a flat item set: `id -> record`, `parent -> children`.
pub struct HierarchyIndex<'a> {
    by_id: HashMap<&'a str, &'a Item>,
    children: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> HierarchyIndex<'a> {
    pub fn build(items: &'a [Item]) -> Self {
        let by_id: HashMap<&str, &Item> = items.iter().map(|i| (i.id.as_str(), i)).collect();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for item in items {
            if let Some(parent) = &item.parent_id {
                children.entry(parent.as_str()).or_default().push(item.id.as_str());
            }
        }
        HierarchyIndex { by_id, children }
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.by_id.get(id).copied()
    }

    pub fn children_of(&self, id: &str) -> &[&str] {
        self.children.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// 0 for a null-parented item; `depth(parent)+1` otherwise. Cycle-safe via
    /// a visited set — corrupted parent chains return the depth reached so far.
    pub fn depth(&self, id: &str) -> u32 {
        let mut seen = HashSet::new();
        let mut cur = id;
        let mut d = 0u32;
        loop {
            if !seen.insert(cur) {
                return d;
            }
            match self.by_id.get(cur).and_then(|i| i.parent_id.as_deref()) {
                Some(parent) if self.by_id.contains_key(parent) => {
                    cur = parent;
                    d += 1;
                }
                _ => return d,
            }
        }
    }

    /// Nearest ancestor whose type is `project`; the id itself if none exists.
    pub fn project_of(&self, id: &str) -> String {
        let mut seen = HashSet::new();
        let mut cur = id;
        loop {
            if !seen.insert(cur) {
                return id.to_string();
            }
            match self.by_id.get(cur) {
                Some(item) if item.item_type == ItemType::Project => return item.id.clone(),
                Some(item) => match item.parent_id.as_deref() {
                    Some(parent) if self.by_id.contains_key(parent) => cur = parent,
                    _ => return id.to_string(),
                },
                None => return id.to_string(),
            }
        }
    }

    /// Union of the transitive closure under `parent_id` (children direction)
    /// for each seed id, duplicates removed.
    pub fn subtree_of(&self, seeds: &[String]) -> HashSet<String> {
        let mut out = HashSet::new();
        let mut stack: Vec<&str> = seeds.iter().map(|s| s.as_str()).collect();
        while let Some(id) = stack.pop() {
            if out.insert(id.to_string()) {
                for child in self.children_of(id) {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Whether `id` has no project ancestor at all (for the "ungrouped" scope).
    pub fn is_ungrouped(&self, id: &str) -> bool {
        let mut seen = HashSet::new();
        let mut cur = id;
        loop {
            if !seen.insert(cur) {
                return true;
            }
            match self.by_id.get(cur) {
                Some(item) if item.item_type == ItemType::Project => return false,
                Some(item) => match item.parent_id.as_deref() {
                    Some(parent) if self.by_id.contains_key(parent) => cur = parent,
                    _ => return true,
                },
                None => return true,
            }
        }
    }
}

/// Resolve a scope descriptor to the concrete set of item ids in scope
/// (archive filter already applied), per spec §4.C.
pub fn resolve_scope(
    items: &[Item],
    assignees: &HashMap<String, String>,
    scope: &Scope,
    archive_filter: ArchiveFilter,
) -> HashSet<String> {
    let index = HierarchyIndex::build(items);
    let visible = |item: &Item| archive_filter.matches(item.archived_at);

    match scope {
        Scope::All => items.iter().filter(|i| visible(i)).map(|i| i.id.clone()).collect(),
        Scope::User { id } => items
            .iter()
            .filter(|i| visible(i) && assignees.get(&i.id) == Some(id))
            .map(|i| i.id.clone())
            .collect(),
        Scope::Project { id } if id == UNGROUPED => items
            .iter()
            .filter(|i| visible(i) && index.is_ungrouped(&i.id))
            .map(|i| i.id.clone())
            .collect(),
        Scope::Project { id } => {
            let seeds = vec![id.clone()];
            index
                .subtree_of(&seeds)
                .into_iter()
                .filter(|candidate| index.get(candidate).map(visible).unwrap_or(false))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EstimateMode, Health, HealthMode, Status};

    fn item(id: &str, parent: Option<&str>, item_type: ItemType) -> Item {
        Item {
            id: id.into(),
            item_type,
            title: id.into(),
            parent_id: parent.map(Into::into),
            status: Status::Backlog,
            priority: 0,
            due_at: None,
            estimate_mode: EstimateMode::Manual,
            estimate_minutes: 0,
            health: Health::Unknown,
            health_mode: HealthMode::Auto,
            notes: None,
            sort_order: 0,
            completed_at: None,
            archived_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn depth_and_project_of_follow_parent_chain() {
        let items = vec![
            item("p", None, ItemType::Project),
            item("m", Some("p"), ItemType::Milestone),
            item("t", Some("m"), ItemType::Task),
        ];
        let index = HierarchyIndex::build(&items);
        assert_eq!(index.depth("p"), 0);
        assert_eq!(index.depth("t"), 2);
        assert_eq!(index.project_of("t"), "p");
        assert_eq!(index.project_of("p"), "p");
    }

    #[test]
    fn ungrouped_task_has_no_project_ancestor() {
        let items = vec![item("t", None, ItemType::Task)];
        let index = HierarchyIndex::build(&items);
        assert!(index.is_ungrouped("t"));
    }

    #[test]
    fn subtree_of_collects_descendants_only() {
        let items = vec![
            item("p", None, ItemType::Project),
            item("m", Some("p"), ItemType::Milestone),
            item("t", Some("m"), ItemType::Task),
            item("other", None, ItemType::Task),
        ];
        let index = HierarchyIndex::build(&items);
        let subtree = index.subtree_of(&["p".to_string()]);
        assert!(subtree.contains("p") && subtree.contains("m") && subtree.contains("t"));
        assert!(!subtree.contains("other"));
    }

    #[test]
    fn depth_is_cycle_safe() {
        let mut a = item("a", Some("b"), ItemType::Task);
        let b = item("b", Some("a"), ItemType::Task);
        a.parent_id = Some("b".into());
        let items = vec![a, b];
        let index = HierarchyIndex::build(&items);
        // Must terminate rather than loop forever.
        let _ = index.depth("a");
    }
}
