use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::paths::{canonical, join_relative, relative_path};
use crate::scope_config::{
    load_store_config, save_store_config, ChildEntry, ChildKind, StoreConfig,
};
use crate::store::{is_store_dir, Store};

/// Directory names never descended into while scanning.
pub const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "vendor",
    "__pycache__",
    ".git",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredStore {
    pub path: PathBuf,
    /// Relative to the topology root; `.` for the root store.
    pub relative: String,
    pub id: String,
    pub is_root: bool,
    pub kind: ChildKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs_ref: Option<String>,
}

/// Best-effort scan for stores under `root`. Depth 1 means direct children.
pub fn discover_stores(root: &Path, max_depth: usize) -> Vec<DiscoveredStore> {
    let root = canonical(root);
    let config = read_root_config(&root);

    let mut found = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(root.clone());
    walk(&root, 1, max_depth, &mut visited, &mut found);

    let mut stores = Vec::with_capacity(found.len() + 1);
    if is_store_dir(&root) {
        stores.push(DiscoveredStore {
            path: root.clone(),
            relative: ".".to_string(),
            id: ".".to_string(),
            is_root: true,
            kind: ChildKind::Path,
            vcs_ref: None,
        });
    }
    for path in found {
        let relative = relative_path(&root, &path);
        let entry = config.child_by_path(&relative);
        stores.push(DiscoveredStore {
            id: entry
                .map(|entry| entry.id.clone())
                .unwrap_or_else(|| relative.clone()),
            kind: entry.map(ChildEntry::kind).unwrap_or_default(),
            vcs_ref: entry.and_then(|entry| entry.vcs_ref.clone()),
            path,
            relative,
            is_root: false,
        });
    }
    let children_start = usize::from(stores.first().is_some_and(|store| store.is_root));
    stores[children_start..].sort_by(|a, b| a.relative.cmp(&b.relative));
    stores
}

fn walk(
    dir: &Path,
    depth: usize,
    max_depth: usize,
    visited: &mut HashSet<PathBuf>,
    found: &mut Vec<PathBuf>,
) {
    if depth > max_depth {
        return;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(dir = %dir.display(), error = %err, "skipping unreadable directory");
            return;
        }
    };
    let mut children: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            children.push(path);
        }
    }
    children.sort();
    for child in children {
        if !visited.insert(canonical(&child)) {
            tracing::debug!(dir = %child.display(), "skipping already visited directory");
            continue;
        }
        if is_store_dir(&child) {
            found.push(child.clone());
        }
        walk(&child, depth + 1, max_depth, visited, found);
    }
}

fn read_root_config(root: &Path) -> StoreConfig {
    match load_store_config(root) {
        Ok(Some(config)) => config,
        Ok(None) => StoreConfig::default(),
        Err(err) => {
            tracing::warn!(root = %root.display(), error = %err, "ignoring unreadable root scope config");
            StoreConfig::default()
        }
    }
}

/// Worktree children listed by the root config that live outside the scanned tree.
pub fn configured_worktrees(root: &Path) -> Vec<(ChildEntry, PathBuf)> {
    let root = canonical(root);
    read_root_config(&root)
        .children()
        .iter()
        .filter(|entry| entry.kind() == ChildKind::Worktree)
        .map(|entry| (entry.clone(), canonical(&join_relative(&root, &entry.path))))
        .collect()
}

/// Discovery plus configured worktree stores, deduplicated by path.
pub fn known_stores(root: &Path, max_depth: usize) -> Vec<DiscoveredStore> {
    let mut stores = discover_stores(root, max_depth);
    let mut seen: HashSet<PathBuf> = stores.iter().map(|store| store.path.clone()).collect();
    for (entry, path) in configured_worktrees(root) {
        if !is_store_dir(&path) || !seen.insert(path.clone()) {
            continue;
        }
        stores.push(DiscoveredStore {
            relative: entry.path.clone(),
            id: entry.id.clone(),
            is_root: false,
            kind: ChildKind::Worktree,
            vcs_ref: entry.vcs_ref.clone(),
            path,
        });
    }
    stores
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub root: PathBuf,
    pub children: Vec<ChildEntry>,
    /// Store directories whose `scope.json` was rewritten.
    pub written: Vec<PathBuf>,
}

/// Rewrites every store's config to match a fresh scan.
pub fn refresh_hierarchy(root: &Path, max_depth: usize) -> Result<RefreshReport> {
    let root = canonical(root);
    Store::at(&root).init()?;
    let previous = read_root_config(&root);
    let discovered = discover_stores(&root, max_depth);

    let mut children = Vec::new();
    let mut paths = BTreeSet::new();
    for store in discovered.iter().filter(|store| !store.is_root) {
        let entry = match previous.child_by_path(&store.relative) {
            Some(existing) => existing.clone(),
            None => ChildEntry::new(&store.relative, &store.relative),
        };
        paths.insert(entry.path.clone());
        children.push((entry, store.path.clone()));
    }
    for entry in previous.children() {
        if entry.kind() != ChildKind::Worktree || paths.contains(&entry.path) {
            continue;
        }
        let path = canonical(&join_relative(&root, &entry.path));
        if is_store_dir(&path) {
            paths.insert(entry.path.clone());
            children.push((entry.clone(), path));
        } else {
            tracing::info!(path = %entry.path, "dropping worktree entry without a store");
        }
    }

    let mut config = StoreConfig::default();
    for (entry, _) in &children {
        config.upsert_child(entry.clone());
    }
    save_store_config(&root, &config)?;
    let mut written = vec![root.clone()];
    for (_, path) in &children {
        let parent = StoreConfig::Child {
            parent: relative_path(path, &root),
        };
        save_store_config(path, &parent)?;
        written.push(path.clone());
    }
    tracing::info!(root = %root.display(), children = children.len(), "refreshed hierarchy");

    Ok(RefreshReport {
        root,
        children: config.children().to_vec(),
        written,
    })
}
