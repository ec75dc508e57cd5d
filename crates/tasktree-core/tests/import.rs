use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use tasktree_core::import::{import_store, import_tasks, ImportOptions, Outcome};
use tasktree_core::record::{DocumentService, MarkdownDocuments, TaskRecord};
use tasktree_core::store::Store;

fn write_task(store: &Store, record: &TaskRecord) {
    store.init().expect("init");
    MarkdownDocuments
        .write(&store.task_path(&record.id), record)
        .expect("write record");
    let mut index = store.load_index().expect("index");
    index.tasks.insert(record.id.clone(), record.summary());
    store.save_index(&index).expect("save index");
}

fn task(id: &str, uid: Option<&str>) -> TaskRecord {
    let mut record = TaskRecord::new(id, "placeholder", &format!("Task {}", id), "2025-01-01T00:00:00Z");
    record.uid = uid.map(str::to_string);
    record
}

fn stores(temp: &TempDir) -> (Store, Store) {
    let source = Store::at(temp.path().join("source"));
    let dest = Store::at(temp.path().join("dest"));
    source.init().expect("init source");
    dest.init().expect("init dest");
    (source, dest)
}

fn read(store: &Store, id: &str) -> TaskRecord {
    MarkdownDocuments.read(&store.task_path(id)).expect("read")
}

#[test]
fn stale_entry_is_skipped_with_warning() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);

    let mut theirs = task("260110a", Some("uid-shared"));
    theirs.add_checkpoint("2025-01-10T12:00", "consolidated", "");
    write_task(&dest, &theirs);

    let mut ours = task("260110a", Some("uid-shared"));
    ours.append_entry("2020-01-01T10:00", "forgotten note");
    write_task(&source, &ours);

    let report = import_store(
        &MarkdownDocuments,
        &source,
        &dest,
        &ImportOptions {
            remove_source: true,
            ..ImportOptions::default()
        },
    )
    .expect("import");
    let outcome = &report.tasks[0];
    assert_eq!(outcome.outcome, Outcome::Skipped);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("older than checkpoint"));
    assert!(outcome.warnings[0].contains("2020-01-01T10:00"));
    assert!(read(&dest, "260110a").entries.is_empty());

    // the refused entry stays inspectable at the source
    assert_eq!(report.counts.removed, 0);
    assert!(source.task_path("260110a").exists());
}

#[test]
fn colliding_id_with_different_uid_is_renamed() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);
    write_task(&dest, &task("260122a", Some("uid-dest")));
    write_task(&source, &task("260122a", Some("uid-source")));

    let report =
        import_store(&MarkdownDocuments, &source, &dest, &ImportOptions::default()).expect("import");
    let outcome = &report.tasks[0];
    assert_eq!(outcome.outcome, Outcome::Imported);
    assert_eq!(outcome.id, "260122b");
    assert_eq!(outcome.warnings, vec!["renamed 260122a -> 260122b".to_string()]);

    let copied = read(&dest, "260122b");
    assert_eq!(copied.id, "260122b");
    assert_eq!(copied.uid.as_deref(), Some("uid-source"));
    assert_eq!(read(&dest, "260122a").uid.as_deref(), Some("uid-dest"));
    let index = dest.load_index().expect("index");
    assert_eq!(index.tasks.len(), 2);
}

#[test]
fn legacy_task_imported_twice_keeps_one_identity() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);
    write_task(&source, &task("251201a", None));

    let first =
        import_store(&MarkdownDocuments, &source, &dest, &ImportOptions::default()).expect("first");
    assert_eq!(first.tasks[0].outcome, Outcome::Imported);
    let uid = first.tasks[0].uid.clone().expect("uid assigned");
    assert_eq!(read(&source, "251201a").uid.as_deref(), Some(uid.as_str()));
    assert_eq!(
        source.load_index().expect("index").tasks["251201a"].uid.as_deref(),
        Some(uid.as_str())
    );

    let second =
        import_store(&MarkdownDocuments, &source, &dest, &ImportOptions::default()).expect("second");
    assert_eq!(second.tasks[0].outcome, Outcome::Skipped);
    assert_eq!(second.tasks[0].uid.as_deref(), Some(uid.as_str()));
    assert_eq!(dest.load_index().expect("index").tasks.len(), 1);
}

#[test]
fn new_entries_merge_and_set_pending() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);
    let mut base = task("260105a", Some("uid-m"));
    base.add_checkpoint("2025-01-05T10:00:00Z", "first pass", "");
    write_task(&dest, &base);

    let mut ours = base.clone();
    ours.append_entry("2025-01-06T10:00:00Z", "follow-up");
    write_task(&source, &ours);

    let report =
        import_store(&MarkdownDocuments, &source, &dest, &ImportOptions::default()).expect("import");
    assert_eq!(report.tasks[0].outcome, Outcome::Merged);
    assert_eq!(report.counts.merged, 1);
    let merged = read(&dest, "260105a");
    assert_eq!(merged.entries.len(), 1);
    assert!(merged.has_pending);
}

#[test]
fn corrupt_record_does_not_abort_the_batch() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);
    write_task(&source, &task("260101a", Some("uid-ok")));
    write_task(&source, &task("260101b", Some("uid-bad")));
    fs::write(source.task_path("260101b"), "not a record").expect("corrupt");

    let report = import_store(
        &MarkdownDocuments,
        &source,
        &dest,
        &ImportOptions {
            remove_source: true,
            delete_empty_source: true,
            tag: None,
        },
    )
    .expect("import");
    assert_eq!(report.counts.imported, 1);
    assert_eq!(report.counts.failed, 1);
    assert_eq!(report.counts.removed, 1);
    let failed = report
        .tasks
        .iter()
        .find(|t| t.source_id == "260101b")
        .expect("failed task");
    assert_eq!(failed.outcome, Outcome::Skipped);
    assert!(failed.error.is_some());

    // the failed task keeps the source store alive
    assert!(!report.source_deleted);
    assert!(source.task_path("260101b").exists());
    assert!(!source.task_path("260101a").exists());
}

#[test]
fn fully_reconciled_source_is_deleted() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);
    write_task(&source, &task("260101a", Some("uid-1")));
    write_task(&source, &task("260101b", Some("uid-2")));

    let report = import_store(
        &MarkdownDocuments,
        &source,
        &dest,
        &ImportOptions {
            remove_source: true,
            delete_empty_source: true,
            tag: Some("from-feature".to_string()),
        },
    )
    .expect("import");
    assert_eq!(report.counts.removed, 2);
    assert!(report.source_deleted);
    assert!(!source.exists());
    assert_eq!(read(&dest, "260101a").tags, vec!["from-feature".to_string()]);
}

#[test]
fn selection_limits_the_reconciled_tasks() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);
    write_task(&source, &task("260101a", Some("uid-1")));
    write_task(&source, &task("260101b", Some("uid-2")));

    let only = vec!["260101b".to_string()];
    let report = import_tasks(
        &MarkdownDocuments,
        &source,
        &dest,
        Some(only.as_slice()),
        &ImportOptions {
            remove_source: true,
            ..ImportOptions::default()
        },
    )
    .expect("import");
    assert_eq!(report.tasks.len(), 1);
    assert!(source.exists());
    assert!(source.task_path("260101a").exists());
    assert!(dest.task_path("260101b").exists());
}

#[test]
fn missing_source_store_is_reported() {
    let temp = TempDir::new().expect("tempdir");
    let dest = Store::at(temp.path().join("dest"));
    let err = import_store(
        &MarkdownDocuments,
        &Store::at(Path::new(temp.path()).join("nowhere")),
        &dest,
        &ImportOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.code().as_str(), "import_source_not_found");
}

#[test]
fn rename_skips_ids_taken_by_unindexed_files() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);
    write_task(&dest, &task("260122a", Some("uid-dest")));
    let orphan = task("260122b", Some("uid-orphan"));
    MarkdownDocuments
        .write(&dest.task_path("260122b"), &orphan)
        .expect("orphan record");
    write_task(&source, &task("260122a", Some("uid-source")));

    let report =
        import_store(&MarkdownDocuments, &source, &dest, &ImportOptions::default()).expect("import");
    assert_eq!(report.tasks[0].id, "260122c");
    assert_eq!(read(&dest, "260122b").uid.as_deref(), Some("uid-orphan"));
    assert_eq!(read(&dest, "260122c").uid.as_deref(), Some("uid-source"));
}

#[test]
fn fresh_entry_merges_but_stale_one_keeps_the_source() {
    let temp = TempDir::new().expect("tempdir");
    let (source, dest) = stores(&temp);

    let mut theirs = task("260110a", Some("uid-mixed"));
    theirs.add_checkpoint("2025-01-10T12:00:00Z", "consolidated", "");
    write_task(&dest, &theirs);

    let mut ours = task("260110a", Some("uid-mixed"));
    ours.append_entry("2025-01-09T08:00:00Z", "written before the checkpoint");
    ours.append_entry("2025-01-11T08:00:00Z", "written after the checkpoint");
    write_task(&source, &ours);

    let report = import_store(
        &MarkdownDocuments,
        &source,
        &dest,
        &ImportOptions {
            remove_source: true,
            delete_empty_source: true,
            tag: None,
        },
    )
    .expect("import");
    let outcome = &report.tasks[0];
    assert_eq!(outcome.outcome, Outcome::Merged);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("2025-01-09T08:00:00Z"));
    assert_eq!(report.counts.merged, 1);
    assert_eq!(report.counts.removed, 0);
    assert!(!report.source_deleted);
    assert!(source.task_path("260110a").exists());

    let merged = read(&dest, "260110a");
    assert_eq!(merged.entries.len(), 1);
    assert_eq!(merged.entries[0].text, "written after the checkpoint");
    assert!(merged.has_pending);
}
