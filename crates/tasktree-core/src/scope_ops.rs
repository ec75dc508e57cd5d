use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::context::Context;
use crate::error::{Result, TasktreeError};
use crate::import::{import_store, import_tasks, ImportOptions, ImportReport};
use crate::paths::{canonical, join_relative, relative_path};
use crate::resolve::resolve_task;
use crate::scope::{self, is_reserved, ActiveScope, ScopeSource};
use crate::scope_config::{
    load_store_config, save_store_config, ChildEntry, ChildKind, StoreConfig,
};
use crate::store::{is_store_dir, Store};
use crate::topology::{refresh_hierarchy, RefreshReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeView {
    pub id: String,
    pub path: PathBuf,
    pub relative: String,
    pub kind: ChildKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs_ref: Option<String>,
    pub tasks: usize,
    pub is_root: bool,
    pub active: bool,
    pub exists: bool,
}

/// The active store with the rule that picked it and the settings in effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentScope {
    pub id: String,
    pub path: PathBuf,
    pub source: ScopeSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub scan_depth: usize,
    pub scan_depth_source: &'static str,
}

pub fn current_scope(ctx: &Context, active: &ActiveScope) -> CurrentScope {
    let settings = ctx.settings();
    CurrentScope {
        id: scope::display_id(ctx, &active.path),
        path: active.path.clone(),
        source: active.source,
        branch: ctx.vcs().current_branch(&active.path),
        scan_depth: settings.scan_depth,
        scan_depth_source: settings.scan_depth_source,
    }
}

/// Every discovered store plus configured worktree entries.
pub fn list_scopes(ctx: &mut Context) -> Result<Vec<ScopeView>> {
    let root = ctx.require_root()?;
    let active = ctx.current_store()?.path().to_path_buf();
    let mut views: Vec<ScopeView> = ctx
        .stores()
        .into_iter()
        .map(|store| ScopeView {
            tasks: Store::at(&store.path).task_count(),
            active: canonical(&store.path) == active,
            exists: true,
            id: store.id,
            relative: store.relative,
            kind: store.kind,
            vcs_ref: store.vcs_ref,
            is_root: store.is_root,
            path: store.path,
        })
        .collect();

    for entry in ctx.root_config()?.children() {
        let path = canonical(&join_relative(&root, &entry.path));
        if views.iter().any(|view| view.path == path) {
            continue;
        }
        views.push(ScopeView {
            id: entry.id.clone(),
            relative: entry.path.clone(),
            kind: entry.kind(),
            vcs_ref: entry.vcs_ref.clone(),
            tasks: 0,
            is_root: false,
            active: path == active,
            exists: is_store_dir(&path),
            path,
        });
    }
    Ok(views)
}

fn validate_scope_id(id: &str) -> Result<()> {
    let id = id.trim();
    if id.is_empty() || id.contains(':') || is_reserved(id) {
        return Err(TasktreeError::InvalidArgs(format!(
            "'{}' is not a usable scope id",
            id
        )));
    }
    Ok(())
}

fn ensure_unique_id(config: &StoreConfig, id: &str, relative: &str) -> Result<()> {
    if let Some(other) = config
        .children()
        .iter()
        .find(|entry| entry.id == id && entry.path != relative)
    {
        return Err(TasktreeError::InvalidArgs(format!(
            "scope id '{}' is already used by {}",
            id, other.path
        )));
    }
    Ok(())
}

fn root_store_config(root: &Path) -> Result<StoreConfig> {
    match load_store_config(root)?.unwrap_or_default() {
        config @ StoreConfig::Root { .. } => Ok(config),
        StoreConfig::Child { .. } => Err(TasktreeError::InvalidState(format!(
            "root store {} is configured as a child",
            root.display()
        ))),
    }
}

/// Creates a child store at `path` (relative to the working directory) and registers it.
pub fn add_scope(
    ctx: &mut Context,
    path: &Path,
    id: Option<&str>,
    tags: &[String],
) -> Result<ChildEntry> {
    let root = ctx.require_root()?;
    let target = if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.cwd().join(path)
    };
    fs::create_dir_all(&target).map_err(crate::store::StoreError::from)?;
    let target = canonical(&target);
    if target == root {
        return Err(TasktreeError::InvalidState(
            "the topology root is already the root store".to_string(),
        ));
    }

    let relative = relative_path(&root, &target);
    let id = id.map(str::trim).unwrap_or(&relative).to_string();
    validate_scope_id(&id)?;
    let mut config = root_store_config(&root)?;
    ensure_unique_id(&config, &id, &relative)?;

    Store::at(&root).init()?;
    Store::at(&target).init()?;
    save_store_config(
        &target,
        &StoreConfig::Child {
            parent: relative_path(&target, &root),
        },
    )?;

    let mut entry = ChildEntry::new(&relative, &id);
    entry.tags = tags.to_vec();
    config.upsert_child(entry.clone());
    save_store_config(&root, &config)?;
    tracing::info!(scope = %id, path = %target.display(), "added scope");
    Ok(entry)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentLink {
    pub store: PathBuf,
    pub parent: PathBuf,
    pub entry: ChildEntry,
}

/// Links the active store as a child of an existing store.
pub fn add_parent(ctx: &mut Context, parent_id: &str) -> Result<ParentLink> {
    let active = ctx.current_store()?;
    let active_dir = canonical(active.path());
    match load_store_config(&active_dir)? {
        Some(StoreConfig::Child { .. }) => {
            return Err(TasktreeError::AlreadyHasParent(scope::display_id(
                ctx,
                &active_dir,
            )))
        }
        Some(StoreConfig::Root { children }) if !children.is_empty() => {
            return Err(TasktreeError::InvalidState(format!(
                "store {} lists child stores",
                active_dir.display()
            )))
        }
        _ => {}
    }

    let parent = canonical(&scope::resolve_scope_id(ctx, parent_id)?);
    if !is_store_dir(&parent) {
        return Err(TasktreeError::ScopeNotFound(parent_id.to_string()));
    }
    if parent == active_dir {
        return Err(TasktreeError::InvalidArgs(
            "a store cannot be its own parent".to_string(),
        ));
    }
    let mut parent_config = match load_store_config(&parent)?.unwrap_or_default() {
        config @ StoreConfig::Root { .. } => config,
        StoreConfig::Child { .. } => {
            return Err(TasktreeError::InvalidState(format!(
                "parent {} is itself a child store",
                parent_id
            )))
        }
    };

    let relative = relative_path(&parent, &active_dir);
    let id = scope::display_id(ctx, &active_dir);
    let id = if id == "." { relative.clone() } else { id };
    ensure_unique_id(&parent_config, &id, &relative)?;

    active.init()?;
    save_store_config(
        &active_dir,
        &StoreConfig::Child {
            parent: relative_path(&active_dir, &parent),
        },
    )?;
    let entry = ChildEntry::new(&relative, &id);
    parent_config.upsert_child(entry.clone());
    save_store_config(&parent, &parent_config)?;
    tracing::info!(store = %active_dir.display(), parent = %parent.display(), "linked parent");
    Ok(ParentLink {
        store: active_dir,
        parent,
        entry,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedScope {
    pub path: String,
    pub old_id: String,
    pub new_id: String,
}

/// Changes a child store's display id in the root's child list.
pub fn rename_scope(ctx: &mut Context, scope_id: &str, new_id: &str) -> Result<RenamedScope> {
    let root = ctx.require_root()?;
    let target = canonical(&scope::resolve_scope_id(ctx, scope_id)?);
    if target == root {
        return Err(TasktreeError::InvalidState(
            "the root store cannot be renamed".to_string(),
        ));
    }
    let new_id = new_id.trim().to_string();
    validate_scope_id(&new_id)?;

    let relative = relative_path(&root, &target);
    let mut config = root_store_config(&root)?;
    ensure_unique_id(&config, &new_id, &relative)?;
    let mut entry = config
        .child_by_path(&relative)
        .cloned()
        .unwrap_or_else(|| ChildEntry::new(&relative, &relative));
    let old_id = std::mem::replace(&mut entry.id, new_id.clone());
    config.upsert_child(entry);
    save_store_config(&root, &config)?;
    tracing::info!(path = %relative, old = %old_id, new = %new_id, "renamed scope");
    Ok(RenamedScope {
        path: relative,
        old_id,
        new_id,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedScope {
    pub id: String,
    pub path: PathBuf,
    pub tasks_deleted: usize,
}

/// Deletes a child store; refuses while it still holds tasks unless `force`.
pub fn delete_scope(ctx: &mut Context, scope_id: &str, force: bool) -> Result<DeletedScope> {
    let root = ctx.require_root()?;
    let target = canonical(&scope::resolve_scope_id(ctx, scope_id)?);
    if target == root {
        return Err(TasktreeError::InvalidState(
            "the root store cannot be deleted".to_string(),
        ));
    }
    let id = scope::display_id(ctx, &target);
    let store = Store::at(&target);
    let count = store.task_count();
    if count > 0 && !force {
        return Err(TasktreeError::ScopeHasTasks { scope: id, count });
    }
    store.destroy()?;

    let mut config = root_store_config(&root)?;
    if config.remove_child(&relative_path(&root, &target)) {
        save_store_config(&root, &config)?;
    }
    if ctx.active() == Some(target.as_path()) {
        ctx.set_active(&root);
    }
    Ok(DeletedScope {
        id,
        path: target,
        tasks_deleted: count,
    })
}

/// Relocates one task into `scope_id`.
pub fn assign_task(ctx: &mut Context, task_ref: &str, scope_id: &str) -> Result<ImportReport> {
    let destination = canonical(&scope::resolve_scope_id(ctx, scope_id)?);
    let task = resolve_task(ctx, task_ref)?;
    if canonical(task.store.path()) == destination {
        return Err(TasktreeError::InvalidArgs(format!(
            "task {} is already in scope {}",
            task.id, scope_id
        )));
    }
    let options = ImportOptions {
        remove_source: true,
        delete_empty_source: false,
        tag: None,
    };
    let ids = vec![task.id.clone()];
    import_tasks(
        ctx.docs(),
        &task.store,
        &Store::at(destination),
        Some(ids.as_slice()),
        &options,
    )
}

/// Relocates every task of the active store carrying `tag` into `scope_id`.
pub fn export_tagged(ctx: &mut Context, tag: &str, scope_id: &str) -> Result<ImportReport> {
    let destination = canonical(&scope::resolve_scope_id(ctx, scope_id)?);
    let source = ctx.current_store()?;
    if canonical(source.path()) == destination {
        return Err(TasktreeError::InvalidArgs(format!(
            "scope {} is already the active store",
            scope_id
        )));
    }
    let tag = tag.trim();
    let ids: Vec<String> = source
        .load_index()?
        .tasks
        .into_iter()
        .filter(|(_, summary)| summary.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
        .map(|(id, _)| id)
        .collect();
    let options = ImportOptions {
        remove_source: true,
        delete_empty_source: false,
        tag: None,
    };
    import_tasks(
        ctx.docs(),
        &source,
        &Store::at(destination),
        Some(ids.as_slice()),
        &options,
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorktreeSync {
    pub registered: Vec<ChildEntry>,
    pub dropped: Vec<ChildEntry>,
}

/// Registers every non-main worktree holding a store; drops entries whose directory is gone.
pub fn sync_worktrees(ctx: &mut Context) -> Result<WorktreeSync> {
    let root = ctx.require_root()?;
    let worktrees = ctx
        .vcs()
        .worktrees(&root)
        .map_err(|err| TasktreeError::Vcs(format!("{:#}", err)))?;
    let mut config = root_store_config(&root)?;
    let mut sync = WorktreeSync::default();

    for worktree in worktrees.iter().filter(|worktree| !worktree.is_main) {
        let path = canonical(&worktree.path);
        if !is_store_dir(&path) {
            continue;
        }
        let relative = relative_path(&root, &path);
        let mut entry = match config.child_by_path(&relative) {
            Some(existing) => existing.clone(),
            None => {
                let fallback = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| relative.clone());
                let id = worktree.branch.clone().unwrap_or(fallback);
                ChildEntry::new(&relative, &id)
            }
        };
        entry.kind = Some(ChildKind::Worktree);
        entry.vcs_ref = worktree.branch.clone();
        config.upsert_child(entry.clone());
        save_store_config(
            &path,
            &StoreConfig::Child {
                parent: relative_path(&path, &root),
            },
        )?;
        sync.registered.push(entry);
    }

    let stale: Vec<ChildEntry> = config
        .children()
        .iter()
        .filter(|entry| {
            entry.kind() == ChildKind::Worktree && !join_relative(&root, &entry.path).is_dir()
        })
        .cloned()
        .collect();
    for entry in &stale {
        config.remove_child(&entry.path);
    }
    sync.dropped = stale;

    Store::at(&root).init()?;
    save_store_config(&root, &config)?;
    tracing::info!(
        registered = sync.registered.len(),
        dropped = sync.dropped.len(),
        "synced worktrees"
    );
    Ok(sync)
}

pub fn refresh(ctx: &Context) -> Result<RefreshReport> {
    let root = ctx.require_root()?;
    refresh_hierarchy(&root, ctx.settings().scan_depth)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    Path(PathBuf),
    Branch(String),
}

/// Imports another store into the active store.
pub fn import_from(
    ctx: &mut Context,
    source: &ImportSource,
    remove_source: bool,
    as_tag: bool,
) -> Result<ImportReport> {
    let source_dir = match source {
        ImportSource::Path(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                ctx.cwd().join(path)
            };
            canonical(&path)
        }
        ImportSource::Branch(branch) => {
            let base = ctx
                .topology_root()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| ctx.cwd().to_path_buf());
            let worktrees = ctx
                .vcs()
                .worktrees(&base)
                .map_err(|err| TasktreeError::Vcs(format!("{:#}", err)))?;
            worktrees
                .into_iter()
                .find(|worktree| worktree.branch.as_deref() == Some(branch.as_str()))
                .map(|worktree| canonical(&worktree.path))
                .ok_or_else(|| TasktreeError::WorktreeNotFound(branch.clone()))?
        }
    };
    if !is_store_dir(&source_dir) {
        return Err(TasktreeError::ImportSourceNotFound(
            source_dir.display().to_string(),
        ));
    }

    let tag = as_tag.then(|| scope_tag(ctx, &source_dir));
    let destination = ctx.current_store()?;
    let options = ImportOptions {
        remove_source,
        delete_empty_source: remove_source,
        tag,
    };
    let report = import_store(ctx.docs(), &Store::at(&source_dir), &destination, &options)?;

    if report.source_deleted {
        if let Some(root) = ctx.topology_root().map(Path::to_path_buf) {
            let mut config = root_store_config(&root)?;
            if config.remove_child(&relative_path(&root, &source_dir)) {
                save_store_config(&root, &config)?;
                tracing::info!(source = %source_dir.display(), "unregistered imported store");
            }
        }
    }
    Ok(report)
}

fn scope_tag(ctx: &Context, dir: &Path) -> String {
    let id = scope::display_id(ctx, dir);
    if id != "." && !id.starts_with("..") {
        return id;
    }
    dir.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or(id)
}
