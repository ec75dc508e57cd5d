use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Serialize, Serializer};

use crate::context::Context;
use crate::error::{Result, TasktreeError};
use crate::ids::{date_stem, generate_id, new_uid, used_ids};
use crate::paths::canonical;
use crate::record::{now_rfc3339, Checkpoint, Entry, TaskRecord};
use crate::resolve::{resolve_task, ResolvedTask};
use crate::scope;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub parent: Option<String>,
}

/// A task together with the store it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    pub scope: String,
    pub store: PathBuf,
    pub record: TaskRecord,
    pub description: String,
}

impl TaskView {
    fn new(ctx: &Context, store: &Store, record: TaskRecord) -> Self {
        Self {
            scope: scope::display_id(ctx, store.path()),
            store: store.path().to_path_buf(),
            description: record.body.clone(),
            record,
        }
    }
}

/// CLI shape of a task: camelCase like the index and scope config, while
/// the record front matter keeps its own field names.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskViewJson<'a> {
    scope: &'a str,
    store: &'a Path,
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<&'a str>,
    name: &'a str,
    status: &'a str,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_checkpoint: Option<&'a str>,
    has_pending: bool,
    entries: &'a [Entry],
    checkpoints: &'a [Checkpoint],
    description: &'a str,
}

impl Serialize for TaskView {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let record = &self.record;
        TaskViewJson {
            scope: &self.scope,
            store: &self.store,
            id: &record.id,
            uid: record.uid.as_deref(),
            name: &record.name,
            status: &record.status,
            tags: &record.tags,
            parent: record.parent.as_deref(),
            created: record.created.as_deref(),
            updated: record.updated.as_deref(),
            last_checkpoint: record.last_checkpoint.as_deref(),
            has_pending: record.has_pending,
            entries: &record.entries,
            checkpoints: &record.checkpoints,
            description: &self.description,
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskListing {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Creates a task in the active store, initializing the store if needed.
pub fn create_task(ctx: &mut Context, new: &NewTask) -> Result<TaskView> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(TasktreeError::InvalidArgs("task name is empty".to_string()));
    }
    let store = ctx.current_store()?;

    let parent = match new.parent.as_deref() {
        Some(reference) => {
            let parent = resolve_task(ctx, reference)?;
            ctx.set_active(store.path());
            Some(parent_reference(&store, &parent))
        }
        None => None,
    };

    store.init()?;
    let mut index = store.load_index()?;
    let id = generate_id(&date_stem(&Local::now()), &used_ids(index.tasks.keys()));
    let mut record = TaskRecord::new(&id, &new_uid(), name, &now_rfc3339());
    record.body = new.description.trim().to_string();
    for tag in &new.tags {
        record.add_tag(tag);
    }
    record.parent = parent;

    ctx.docs().write(&store.task_path(&id), &record)?;
    index.tasks.insert(id.clone(), record.summary());
    store.save_index(&index)?;
    tracing::info!(task = %id, store = %store.path().display(), "created task");
    Ok(TaskView::new(ctx, &store, record))
}

fn parent_reference(store: &Store, parent: &ResolvedTask) -> String {
    if canonical(parent.store.path()) == canonical(store.path()) {
        parent.id.clone()
    } else {
        format!("{}:{}", parent.scope_id, parent.id)
    }
}

pub fn show_task(ctx: &mut Context, reference: &str) -> Result<TaskView> {
    let task = resolve_task(ctx, reference)?;
    let record = ctx.docs().read(&task.store.task_path(&task.id))?;
    Ok(TaskView::new(ctx, &task.store, record))
}

/// Appends a log entry; the task gains pending entries.
pub fn log_entry(ctx: &mut Context, reference: &str, text: &str) -> Result<TaskView> {
    if text.trim().is_empty() {
        return Err(TasktreeError::InvalidArgs("entry text is empty".to_string()));
    }
    update_task(ctx, reference, |record| {
        record.append_entry(&now_rfc3339(), text);
    })
}

/// Records a checkpoint closing every pending entry.
pub fn add_checkpoint(
    ctx: &mut Context,
    reference: &str,
    summary: &str,
    next: &str,
) -> Result<TaskView> {
    if summary.trim().is_empty() {
        return Err(TasktreeError::InvalidArgs(
            "checkpoint summary is empty".to_string(),
        ));
    }
    update_task(ctx, reference, |record| {
        record.add_checkpoint(&now_rfc3339(), summary, next);
    })
}

fn update_task(
    ctx: &mut Context,
    reference: &str,
    apply: impl FnOnce(&mut TaskRecord),
) -> Result<TaskView> {
    let task = resolve_task(ctx, reference)?;
    let path = task.store.task_path(&task.id);
    let mut record = ctx.docs().read(&path)?;
    apply(&mut record);
    ctx.docs().write(&path, &record)?;

    let mut index = task.store.load_index()?;
    index.tasks.insert(task.id.clone(), record.summary());
    task.store.save_index(&index)?;
    Ok(TaskView::new(ctx, &task.store, record))
}

/// Tasks of the active store, by id.
pub fn list_tasks(ctx: &mut Context) -> Result<Vec<TaskListing>> {
    let store = ctx.current_store()?;
    Ok(store
        .load_index()?
        .tasks
        .into_iter()
        .map(|(id, summary)| TaskListing {
            id,
            name: summary.name,
            status: summary.status,
            tags: summary.tags,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_json_uses_camel_case() {
        let mut record = TaskRecord::new("260122a", "uid-1", "Write docs", "2026-01-22T09:00:00Z");
        record.append_entry("2026-01-22T10:00:00Z", "outlined");
        record.add_checkpoint("2026-01-22T11:00:00Z", "outline done", "");
        let view = TaskView {
            scope: ".".to_string(),
            store: PathBuf::from("/repo"),
            description: String::new(),
            record,
        };

        let value = serde_json::to_value(&view).expect("json");
        assert_eq!(value["id"], "260122a");
        assert_eq!(value["hasPending"], false);
        assert_eq!(value["lastCheckpoint"], "2026-01-22T11:00:00Z");
        assert!(value.get("has_pending").is_none());
        assert!(value.get("last_checkpoint").is_none());
        assert_eq!(value["entries"].as_array().map(Vec::len), Some(1));
    }
}
