use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Result, TasktreeError};
use crate::ids::{new_uid, next_free_id, used_ids};
use crate::paths::canonical;
use crate::record::{
    compare_timestamps, newest_timestamp, same_instant, DocumentService, TaskRecord,
};
use crate::store::{Index, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Imported,
    Merged,
    Skipped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Imported => "imported",
            Outcome::Merged => "merged",
            Outcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub source_id: String,
    /// Id in the destination store.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the source copy may be deleted afterwards.
    #[serde(skip)]
    pub removable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    pub imported: usize,
    pub merged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub tasks: Vec<TaskOutcome>,
    pub counts: ImportCounts,
    pub source_deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Delete source tasks that were fully reconciled.
    pub remove_source: bool,
    /// With `remove_source`, also delete the source store once its index is empty.
    pub delete_empty_source: bool,
    /// Added to every imported or merged task.
    pub tag: Option<String>,
}

/// What a merge applied to the destination record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub entries: usize,
    pub checkpoints: usize,
    pub warnings: Vec<String>,
}

impl MergeSummary {
    pub fn applied(&self) -> bool {
        self.entries > 0 || self.checkpoints > 0
    }
}

/// Unions `source` into `dest` by timestamp. Entries older than the
/// destination's last checkpoint are refused with a warning.
pub fn merge_records(dest: &mut TaskRecord, source: &TaskRecord) -> MergeSummary {
    let mut summary = MergeSummary::default();
    let cutoff = dest.last_checkpoint.clone();

    for entry in &source.entries {
        if dest.entries.iter().any(|e| same_instant(&e.at, &entry.at)) {
            continue;
        }
        if let Some(cutoff) = cutoff.as_deref() {
            if compare_timestamps(&entry.at, cutoff).is_lt() {
                summary.warnings.push(format!(
                    "entry {} is older than checkpoint {}; not merged",
                    entry.at, cutoff
                ));
                continue;
            }
        }
        dest.entries.push(entry.clone());
        summary.entries += 1;
    }

    for checkpoint in &source.checkpoints {
        if dest
            .checkpoints
            .iter()
            .any(|cp| same_instant(&cp.at, &checkpoint.at))
        {
            continue;
        }
        dest.checkpoints.push(checkpoint.clone());
        summary.checkpoints += 1;
    }

    if summary.entries > 0 {
        dest.entries.sort_by(|a, b| compare_timestamps(&a.at, &b.at));
        dest.has_pending = true;
    }
    if summary.checkpoints > 0 {
        dest.checkpoints.sort_by(|a, b| compare_timestamps(&a.at, &b.at));
        let candidates = dest
            .checkpoints
            .iter()
            .map(|cp| cp.at.as_str())
            .chain(dest.last_checkpoint.as_deref());
        dest.last_checkpoint = newest_timestamp(candidates);
        if summary.entries == 0 {
            let has_pending = dest.pending_entries().next().is_some();
            dest.has_pending = has_pending;
        }
    }
    if summary.applied() {
        dest.updated = newest_timestamp(
            [dest.updated.as_deref(), source.updated.as_deref()]
                .into_iter()
                .flatten(),
        );
    }
    summary
}

/// Assigns UIDs to every task of `store` lacking one, updating records and `index`.
///
/// Returns how many tasks were backfilled. Unreadable records are left alone.
pub fn backfill_uids(docs: &dyn DocumentService, store: &Store, index: &mut Index) -> usize {
    let mut count = 0;
    for (id, summary) in index.tasks.iter_mut() {
        if summary.uid.is_some() {
            continue;
        }
        let path = store.task_path(id);
        let mut record = match docs.read(&path) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(task = %id, error = %err, "cannot backfill uid");
                continue;
            }
        };
        if record.uid.is_none() {
            record.uid = Some(new_uid());
            if let Err(err) = docs.write(&path, &record) {
                tracing::warn!(task = %id, error = %err, "cannot backfill uid");
                continue;
            }
            count += 1;
        }
        summary.uid = record.uid.clone();
    }
    count
}

/// Reconciles every task of `source` into `destination`.
pub fn import_store(
    docs: &dyn DocumentService,
    source: &Store,
    destination: &Store,
    options: &ImportOptions,
) -> Result<ImportReport> {
    import_tasks(docs, source, destination, None, options)
}

/// Reconciles the selected tasks (all when `selection` is `None`).
pub fn import_tasks(
    docs: &dyn DocumentService,
    source: &Store,
    destination: &Store,
    selection: Option<&[String]>,
    options: &ImportOptions,
) -> Result<ImportReport> {
    if !source.exists() {
        return Err(TasktreeError::ImportSourceNotFound(
            source.path().display().to_string(),
        ));
    }
    if canonical(source.path()) == canonical(destination.path()) {
        return Err(TasktreeError::InvalidArgs(
            "source and destination are the same store".to_string(),
        ));
    }
    destination.init()?;

    let mut source_index = source.load_index()?;
    let mut dest_index = destination.load_index()?;
    if backfill_uids(docs, destination, &mut dest_index) > 0 {
        destination.save_index(&dest_index)?;
    }

    let ids: Vec<String> = match selection {
        Some(ids) => ids.to_vec(),
        None => source_index.tasks.keys().cloned().collect(),
    };

    let mut report = ImportReport {
        source: source.path().to_path_buf(),
        destination: destination.path().to_path_buf(),
        tasks: Vec::with_capacity(ids.len()),
        counts: ImportCounts::default(),
        source_deleted: false,
    };
    let mut source_dirty = false;

    for id in &ids {
        let mut reconciler = Reconciler {
            docs,
            source,
            destination,
            source_index: &mut source_index,
            dest_index: &mut dest_index,
            tag: options.tag.as_deref(),
            source_dirty: &mut source_dirty,
        };
        let outcome = match reconciler.reconcile(id) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(task = %id, error = %err, "task not reconciled");
                report.counts.failed += 1;
                TaskOutcome {
                    source_id: id.clone(),
                    id: id.clone(),
                    uid: None,
                    outcome: Outcome::Skipped,
                    warnings: Vec::new(),
                    error: Some(err.to_string()),
                    removable: false,
                }
            }
        };
        match outcome.outcome {
            Outcome::Imported => report.counts.imported += 1,
            Outcome::Merged => report.counts.merged += 1,
            Outcome::Skipped => report.counts.skipped += 1,
        }
        report.tasks.push(outcome);
        destination.save_index(&dest_index)?;
    }

    if options.remove_source {
        for outcome in report.tasks.iter().filter(|outcome| outcome.removable) {
            source.remove_task(&mut source_index, &outcome.source_id)?;
            report.counts.removed += 1;
            source_dirty = true;
        }
    }
    if source_dirty {
        source.save_index(&source_index)?;
    }
    if options.remove_source && options.delete_empty_source && source_index.tasks.is_empty() {
        source.destroy()?;
        report.source_deleted = true;
    }

    tracing::info!(
        source = %source.path().display(),
        destination = %destination.path().display(),
        imported = report.counts.imported,
        merged = report.counts.merged,
        skipped = report.counts.skipped,
        failed = report.counts.failed,
        "import finished"
    );
    Ok(report)
}

struct Reconciler<'a> {
    docs: &'a dyn DocumentService,
    source: &'a Store,
    destination: &'a Store,
    source_index: &'a mut Index,
    dest_index: &'a mut Index,
    tag: Option<&'a str>,
    source_dirty: &'a mut bool,
}

impl Reconciler<'_> {
    fn reconcile(&mut self, id: &str) -> Result<TaskOutcome> {
        let source_key = self
            .source_index
            .find_key(id)
            .map(str::to_string)
            .ok_or_else(|| TasktreeError::TaskNotFound(id.to_string()))?;
        let source_path = self.source.task_path(&source_key);
        let mut record = self.docs.read(&source_path)?;

        if record.uid.is_none() {
            record.uid = Some(new_uid());
            self.docs.write(&source_path, &record)?;
            tracing::debug!(task = %source_key, "backfilled source uid");
        }
        if let Some(summary) = self.source_index.tasks.get_mut(&source_key) {
            if summary.uid != record.uid {
                summary.uid = record.uid.clone();
                *self.source_dirty = true;
            }
        }
        let uid = record.uid.clone();

        let existing = self
            .dest_index
            .tasks
            .iter()
            .find(|(_, summary)| summary.uid.is_some() && summary.uid == uid)
            .map(|(dest_id, _)| dest_id.clone());
        match existing {
            Some(dest_id) => self.merge(&source_key, &dest_id, &record),
            None => self.copy(&source_key, record),
        }
    }

    fn merge(&mut self, source_id: &str, dest_id: &str, record: &TaskRecord) -> Result<TaskOutcome> {
        let dest_path = self.destination.task_path(dest_id);
        let mut dest = self.docs.read(&dest_path)?;
        let summary = merge_records(&mut dest, record);
        let tagged = self.tag.is_some_and(|tag| dest.add_tag(tag));
        if summary.applied() || tagged {
            self.docs.write(&dest_path, &dest)?;
            self.dest_index
                .tasks
                .insert(dest_id.to_string(), dest.summary());
        }
        let outcome = if summary.applied() {
            Outcome::Merged
        } else {
            Outcome::Skipped
        };
        Ok(TaskOutcome {
            source_id: source_id.to_string(),
            id: dest_id.to_string(),
            uid: dest.uid,
            outcome,
            removable: summary.warnings.is_empty(),
            warnings: summary.warnings,
            error: None,
        })
    }

    fn copy(&mut self, source_id: &str, mut record: TaskRecord) -> Result<TaskOutcome> {
        let mut warnings = Vec::new();
        let collides = self.dest_index.find_key(source_id).is_some()
            || self.destination.task_path(source_id).exists();
        let dest_id = if collides {
            let mut used = used_ids(self.dest_index.tasks.keys());
            used.extend(used_ids(&self.destination.record_stems()?));
            used.insert(source_id.to_lowercase());
            let renamed = next_free_id(source_id, &used);
            warnings.push(format!("renamed {} -> {}", source_id, renamed));
            renamed
        } else {
            source_id.to_string()
        };
        record.id = dest_id.clone();
        if let Some(tag) = self.tag {
            record.add_tag(tag);
        }
        self.docs
            .write(&self.destination.task_path(&dest_id), &record)?;
        self.dest_index
            .tasks
            .insert(dest_id.clone(), record.summary());
        Ok(TaskOutcome {
            source_id: source_id.to_string(),
            id: dest_id,
            uid: record.uid,
            outcome: Outcome::Imported,
            warnings,
            error: None,
            removable: true,
        })
    }
}
