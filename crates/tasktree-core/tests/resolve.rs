use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use tasktree_core::config::Settings;
use tasktree_core::error::TasktreeError;
use tasktree_core::paths::canonical;
use tasktree_core::record::{DocumentService, MarkdownDocuments, TaskRecord};
use tasktree_core::resolve::resolve_task;
use tasktree_core::scope::{resolve_active_scope, resolve_scope_id};
use tasktree_core::scope_config::{save_store_config, ChildEntry, StoreConfig};
use tasktree_core::store::Store;
use tasktree_core::vcs::StaticVcs;
use tasktree_core::Context;

fn seed(dir: &Path, id: &str) {
    let store = Store::at(dir);
    store.init().expect("init");
    let record = TaskRecord::new(id, &format!("uid-{}", id), id, "2026-01-22T09:00:00Z");
    MarkdownDocuments
        .write(&store.task_path(id), &record)
        .expect("write record");
    let mut index = store.load_index().expect("index");
    index.tasks.insert(id.to_string(), record.summary());
    store.save_index(&index).expect("save index");
}

fn repo() -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("tempdir");
    let root = canonical(temp.path());
    Store::at(&root).init().expect("init root");
    (temp, root)
}

fn context_at(root: &Path, cwd: &Path) -> Context {
    context_with(root, cwd, Settings::default())
}

fn context_with(root: &Path, cwd: &Path, settings: Settings) -> Context {
    let mut ctx = Context::with_settings(cwd, Box::new(StaticVcs::rooted(root)), settings);
    resolve_active_scope(&mut ctx, None).expect("active scope");
    ctx
}

#[test]
fn duplicate_scope_ids_are_ambiguous_but_paths_resolve() {
    let (_temp, root) = repo();
    Store::at(root.join("apps/svc")).init().expect("init");
    Store::at(root.join("libs/svc")).init().expect("init");
    let mut config = StoreConfig::default();
    config.upsert_child(ChildEntry::new("apps/svc", "svc"));
    config.upsert_child(ChildEntry::new("libs/svc", "svc"));
    save_store_config(&root, &config).expect("config");

    let mut ctx = context_at(&root, &root);
    match resolve_scope_id(&mut ctx, "svc") {
        Err(TasktreeError::ScopeAmbiguous { candidates, .. }) => {
            assert_eq!(candidates, vec!["apps/svc".to_string(), "libs/svc".to_string()]);
        }
        other => panic!("expected ambiguity, got {:?}", other),
    }
    assert_eq!(
        resolve_scope_id(&mut ctx, "libs/svc").expect("path"),
        root.join("libs/svc")
    );
}

#[test]
fn shared_prefix_lists_every_match_with_unique_short_ids() {
    let (_temp, root) = repo();
    seed(&root, "abc123x");
    seed(&root, "abc123y");

    let mut ctx = context_at(&root, &root);
    let err = resolve_task(&mut ctx, "abc123").unwrap_err();
    assert_eq!(err.code().as_str(), "invalid_args");
    let TasktreeError::AmbiguousTask { matches, message, .. } = err else {
        panic!("expected ambiguous task");
    };
    assert_eq!(matches.len(), 2);
    for m in &matches {
        assert!(m.short.len() >= 7, "short prefix {} too short", m.short);
    }
    assert!(message.contains("abc123x"));
    assert!(message.contains("abc123y"));
}

#[test]
fn missing_prefix_widens_and_switches_context() {
    let (_temp, root) = repo();
    let web = root.join("web");
    let api = root.join("api");
    seed(&web, "260122a");
    seed(&api, "260301q");

    let mut ctx = context_at(&root, &web);
    assert_eq!(ctx.active(), Some(web.as_path()));
    let found = resolve_task(&mut ctx, "260301").expect("widened");
    assert_eq!(found.id, "260301q");
    assert_eq!(found.scope_id, "api");
    assert_eq!(ctx.active(), Some(api.as_path()));
}

#[test]
fn ambiguity_in_active_store_never_widens() {
    let (_temp, root) = repo();
    let web = root.join("web");
    seed(&web, "260122a");
    seed(&web, "260122b");
    seed(&root.join("api"), "260122c");

    let mut ctx = context_at(&root, &web);
    let err = resolve_task(&mut ctx, "260122").unwrap_err();
    let TasktreeError::AmbiguousTask { matches, .. } = err else {
        panic!("expected ambiguous task");
    };
    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["260122a", "260122b"]);
    assert_eq!(ctx.active(), Some(web.as_path()));
}

#[test]
fn scope_hint_confines_the_search() {
    let (_temp, root) = repo();
    seed(&root.join("web"), "260122a");
    seed(&root.join("api"), "260122a");

    let mut ctx = context_at(&root, &root);
    let found = resolve_task(&mut ctx, "api:260122a").expect("hinted");
    assert_eq!(found.store.path(), root.join("api").as_path());

    let err = resolve_task(&mut ctx, "web:999").unwrap_err();
    assert_eq!(err.code().as_str(), "task_not_found");
}

#[test]
fn parent_hint_resolves_in_parent_store() {
    let (_temp, root) = repo();
    seed(&root, "260101a");
    let web = root.join("web");
    seed(&web, "260101a");

    let mut ctx = context_at(&root, &web);
    let found = resolve_task(&mut ctx, "..:260101a").expect("parent");
    assert_eq!(found.store.path(), root.as_path());
    assert_eq!(found.scope_id, ".");
}

#[test]
fn same_id_in_two_widened_stores_is_ambiguous() {
    let (_temp, root) = repo();
    seed(&root.join("web"), "260122a");
    seed(&root.join("api"), "260122a");

    let mut ctx = context_at(&root, &root);
    let err = resolve_task(&mut ctx, "260122a").unwrap_err();
    let TasktreeError::AmbiguousTask { matches, .. } = err else {
        panic!("expected ambiguous task");
    };
    let scopes: Vec<&str> = matches.iter().map(|m| m.scope.as_str()).collect();
    assert_eq!(scopes, vec!["api", "web"]);
    assert!(matches.iter().all(|m| m.short == "260122a"));
}

#[test]
fn long_ambiguous_listings_are_truncated() {
    let (_temp, root) = repo();
    for n in 0..12 {
        seed(&root, &format!("2601{:02}a", n));
    }
    let mut ctx = context_at(&root, &root);
    let err = resolve_task(&mut ctx, "2601").unwrap_err();
    assert!(err.to_string().ends_with("and 2 more"), "{}", err);
}

#[test]
fn exact_id_that_prefixes_another_is_still_ambiguous() {
    let (_temp, root) = repo();
    seed(&root, "260122a");
    seed(&root, "260122ab");

    let mut ctx = context_at(&root, &root);
    let err = resolve_task(&mut ctx, "260122a").unwrap_err();
    let TasktreeError::AmbiguousTask { matches, .. } = err else {
        panic!("expected ambiguous task");
    };
    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["260122a", "260122ab"]);
}

#[test]
fn widening_reaches_configured_children_beyond_scan_depth() {
    let (_temp, root) = repo();
    let deep = root.join("apps/deep");
    let web = root.join("web");
    seed(&deep, "260501d");
    seed(&web, "260401c");
    let mut config = StoreConfig::default();
    config.upsert_child(ChildEntry::new("apps/deep", "deep"));
    config.upsert_child(ChildEntry::new("web", "web"));
    save_store_config(&root, &config).expect("config");

    let shallow = Settings {
        scan_depth: 1,
        ..Settings::default()
    };
    let mut ctx = context_with(&root, &root, shallow.clone());
    let found = resolve_task(&mut ctx, "260501").expect("configured child");
    assert_eq!(found.store.path(), deep.as_path());
    assert_eq!(found.scope_id, "deep");

    // web is both discovered and configured; it must be searched once
    let mut ctx = context_with(&root, &root, shallow);
    let found = resolve_task(&mut ctx, "260401").expect("deduplicated");
    assert_eq!(found.store.path(), web.as_path());
}

#[test]
fn widening_follows_the_parent_pointer() {
    let (_temp, root) = repo();
    let mid = root.join("apps/mid");
    let leaf = mid.join("leaf");
    seed(&mid, "260601e");
    Store::at(&leaf).init().expect("init leaf");
    save_store_config(
        &leaf,
        &StoreConfig::Child {
            parent: "..".to_string(),
        },
    )
    .expect("leaf config");

    let shallow = Settings {
        scan_depth: 1,
        ..Settings::default()
    };
    let mut ctx = context_with(&root, &leaf, shallow);
    assert_eq!(ctx.active(), Some(leaf.as_path()));
    let found = resolve_task(&mut ctx, "260601").expect("parent store");
    assert_eq!(found.store.path(), mid.as_path());
    assert_eq!(ctx.active(), Some(mid.as_path()));
}
