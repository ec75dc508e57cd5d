use serde::Serialize;
use serde_json::{json, Map, Value};

use tasktree_core::error::TasktreeError;
use tasktree_core::import::ImportReport;
use tasktree_core::scope_ops::ScopeView;
use tasktree_core::task_ops::{TaskListing, TaskView};

/// Prints `{"ok": true, <key>: <value>}`; objects are merged in place of `key`.
pub fn print_ok<T: Serialize>(key: Option<&str>, value: &T) -> anyhow::Result<()> {
    let value = serde_json::to_value(value)?;
    let mut out = Map::new();
    out.insert("ok".to_string(), Value::Bool(true));
    match (key, value) {
        (Some(key), value) => {
            out.insert(key.to_string(), value);
        }
        (None, Value::Object(fields)) => out.extend(fields),
        (None, other) => {
            out.insert("result".to_string(), other);
        }
    }
    println!("{}", serde_json::to_string_pretty(&Value::Object(out))?);
    Ok(())
}

pub fn print_error(err: &anyhow::Error, json: bool) {
    let (code, message) = match err.downcast_ref::<TasktreeError>() {
        Some(err) => (err.code().as_str(), err.to_string()),
        None => ("io_error", format!("{:#}", err)),
    };
    if json {
        let mut body = json!({"ok": false, "code": code, "message": message});
        if let Some(TasktreeError::AmbiguousTask { matches, .. }) = err.downcast_ref() {
            body["matches"] = serde_json::to_value(matches).unwrap_or(Value::Null);
        }
        if let Some(TasktreeError::ScopeAmbiguous { candidates, .. }) = err.downcast_ref() {
            body["candidates"] = json!(candidates);
        }
        println!("{}", body);
    } else {
        eprintln!("error[{}]: {}", code, message);
    }
}

pub fn render_task(view: &TaskView) -> String {
    let record = &view.record;
    let mut out = format!("{}:{} {}\n", view.scope, record.id, record.name);
    out.push_str(&format!("status: {}\n", record.status));
    if !record.tags.is_empty() {
        out.push_str(&format!("tags: {}\n", record.tags.join(", ")));
    }
    if let Some(parent) = &record.parent {
        out.push_str(&format!("parent: {}\n", parent));
    }
    if let Some(at) = &record.last_checkpoint {
        out.push_str(&format!("last checkpoint: {}\n", at));
    }
    if !view.description.is_empty() {
        out.push_str(&format!("\n{}\n", view.description));
    }
    if !record.entries.is_empty() {
        out.push_str("\nentries:\n");
        for entry in &record.entries {
            out.push_str(&format!("  {} {}\n", entry.at, entry.text));
        }
    }
    if !record.checkpoints.is_empty() {
        out.push_str("\ncheckpoints:\n");
        for checkpoint in &record.checkpoints {
            out.push_str(&format!("  {} {}", checkpoint.at, checkpoint.summary));
            if !checkpoint.next.is_empty() {
                out.push_str(&format!(" (next: {})", checkpoint.next));
            }
            out.push('\n');
        }
    }
    if record.has_pending {
        out.push_str("\npending entries since last checkpoint\n");
    }
    out
}

pub fn render_listing(scope: &str, tasks: &[TaskListing]) -> String {
    if tasks.is_empty() {
        return format!("No tasks in {}\n", scope);
    }
    let mut out = String::new();
    for task in tasks {
        out.push_str(&format!("{} [{}] {}", task.id, task.status, task.name));
        if !task.tags.is_empty() {
            out.push_str(&format!(" #{}", task.tags.join(" #")));
        }
        out.push('\n');
    }
    out
}

pub fn render_scopes(scopes: &[ScopeView]) -> String {
    let mut out = String::new();
    for scope in scopes {
        let marker = if scope.active { "*" } else { " " };
        out.push_str(&format!(
            "{} {} ({}) tasks={}",
            marker, scope.id, scope.relative, scope.tasks
        ));
        if let Some(vcs_ref) = &scope.vcs_ref {
            out.push_str(&format!(" ref={}", vcs_ref));
        }
        if !scope.exists {
            out.push_str(" missing");
        }
        out.push('\n');
    }
    out
}

pub fn render_import(report: &ImportReport) -> String {
    let mut out = String::new();
    for task in &report.tasks {
        if task.source_id == task.id {
            out.push_str(&format!("{} {}\n", task.outcome.as_str(), task.id));
        } else {
            out.push_str(&format!(
                "{} {} -> {}\n",
                task.outcome.as_str(),
                task.source_id,
                task.id
            ));
        }
        for warning in &task.warnings {
            out.push_str(&format!("  warning: {}\n", warning));
        }
        if let Some(error) = &task.error {
            out.push_str(&format!("  error: {}\n", error));
        }
    }
    let counts = &report.counts;
    out.push_str(&format!(
        "imported {}, merged {}, skipped {}, failed {}, removed {}\n",
        counts.imported, counts.merged, counts.skipped, counts.failed, counts.removed
    ));
    if report.source_deleted {
        out.push_str(&format!("deleted source store {}\n", report.source.display()));
    }
    out
}
