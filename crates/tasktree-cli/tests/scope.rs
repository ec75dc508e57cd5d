use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tasktree"))
}

fn run_git(repo: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn tasktree(repo: &Path, args: &[&str]) -> Output {
    bin()
        .arg("--root")
        .arg(repo)
        .args(args)
        .arg("--json")
        .env_remove("TASKTREE_SCAN_DEPTH")
        .output()
        .expect("run tasktree")
}

fn ok(repo: &Path, args: &[&str]) -> Value {
    let output = tasktree(repo, args);
    assert!(
        output.status.success(),
        "tasktree {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stdout)
    );
    serde_json::from_slice(&output.stdout).expect("json")
}

fn git_repo() -> TempDir {
    let repo = TempDir::new().expect("repo");
    run_git(repo.path(), &["init"]);
    repo
}

#[test]
fn scope_add_list_and_scoped_task() {
    let repo = git_repo();
    let root = repo.path();

    let added = ok(root, &["scope", "add", "apps/web", "--id", "web"]);
    assert_eq!(added["scope"]["id"], "web");
    assert_eq!(added["scope"]["path"], "apps/web");

    let created = ok(root, &["--scope", "web", "add", "Polish header"]);
    assert_eq!(created["task"]["scope"], "web");
    let id = created["task"]["id"].as_str().expect("id").to_string();
    assert!(root
        .join("apps/web/.tasktree/tasks")
        .join(format!("{}.md", id))
        .exists());

    let listed = ok(root, &["scope", "list"]);
    let scopes = listed["scopes"].as_array().expect("scopes");
    let ids: Vec<&str> = scopes.iter().filter_map(|s| s["id"].as_str()).collect();
    assert_eq!(ids, vec![".", "web"]);
    assert_eq!(scopes[1]["tasks"], 1);

    // the root store has no tasks, so the lookup widens to the child
    let shown = ok(root, &["show", &id]);
    assert_eq!(shown["task"]["scope"], "web");

    let shown = ok(root, &["show", &format!("web:{}", id)]);
    assert_eq!(shown["task"]["name"], "Polish header");
}

#[test]
fn current_scope_reports_its_source() {
    let repo = git_repo();
    let root = repo.path();
    ok(root, &["scope", "add", "svc"]);

    let current = ok(&root.join("svc"), &["scope", "current"]);
    assert_eq!(current["id"], "svc");
    assert_eq!(current["source"], "nearest");
    assert_eq!(current["scanDepth"], 5);
    assert_eq!(current["scanDepthSource"], "default");

    let explicit = ok(&root.join("svc"), &["--scope", "@root", "scope", "current"]);
    assert_eq!(explicit["id"], ".");
    assert_eq!(explicit["source"], "explicit");
}

#[test]
fn delete_refuses_non_empty_scope_without_force() {
    let repo = git_repo();
    let root = repo.path();
    ok(root, &["scope", "add", "svc"]);
    ok(root, &["--scope", "svc", "add", "Pending work"]);

    let output = tasktree(root, &["scope", "delete", "svc"]);
    assert!(!output.status.success());
    let body: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(body["code"], "scope_has_tasks");

    let deleted = ok(root, &["scope", "delete", "svc", "--force"]);
    assert_eq!(deleted["tasksDeleted"], 1);
}

#[test]
fn import_path_with_rm_moves_everything() {
    let repo = git_repo();
    let root = repo.path();
    ok(root, &["scope", "add", "legacy"]);
    ok(root, &["--scope", "legacy", "add", "Old task one"]);
    ok(root, &["--scope", "legacy", "add", "Old task two"]);

    let report = ok(root, &["import", "--path", "legacy", "--rm", "--as-tag"]);
    assert_eq!(report["counts"]["imported"], 2);
    assert_eq!(report["counts"]["removed"], 2);
    assert_eq!(report["sourceDeleted"], true);
    assert!(!root.join("legacy/.tasktree").exists());

    let listed = ok(root, &["list"]);
    let tasks = listed["tasks"].as_array().expect("tasks");
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t["tags"][0] == "legacy"));

    let scopes = ok(root, &["scope", "list"]);
    assert_eq!(scopes["scopes"].as_array().map(Vec::len), Some(1));
}

#[test]
fn import_from_missing_store_fails() {
    let repo = git_repo();
    let output = tasktree(repo.path(), &["import", "--path", "nowhere"]);
    assert!(!output.status.success());
    let body: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(body["code"], "import_source_not_found");
}
