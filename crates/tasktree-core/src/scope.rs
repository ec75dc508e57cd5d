use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::context::Context;
use crate::error::{Result, TasktreeError};
use crate::paths::{canonical, join_relative, normalize_relative, relative_path};
use crate::scope_config::{load_store_config, StoreConfig};
use crate::store::is_store_dir;

pub const ROOT_TOKEN: &str = "@root";
pub const CURRENT_TOKEN: &str = "@current";
pub const PARENT_TOKEN: &str = "@parent";

/// Which rule picked the active store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSource {
    Explicit,
    Nearest,
    Root,
    Local,
}

impl ScopeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeSource::Explicit => "explicit",
            ScopeSource::Nearest => "nearest",
            ScopeSource::Root => "root",
            ScopeSource::Local => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveScope {
    pub path: PathBuf,
    pub source: ScopeSource,
}

pub fn is_reserved(id: &str) -> bool {
    matches!(id, ROOT_TOKEN | CURRENT_TOKEN | PARENT_TOKEN)
}

/// Maps a free-form scope identifier to one store directory.
pub fn resolve_scope_id(ctx: &mut Context, id: &str) -> Result<PathBuf> {
    let id = id.trim();
    match id {
        CURRENT_TOKEN => return Ok(ctx.current_store()?.path().to_path_buf()),
        PARENT_TOKEN => {
            let current = ctx.current_store()?.path().to_path_buf();
            return parent_of(ctx, &current)?.ok_or_else(|| {
                TasktreeError::ScopeNotFound(format!(
                    "{} (store {} has no parent)",
                    PARENT_TOKEN,
                    display_id(ctx, &current)
                ))
            });
        }
        _ => {}
    }

    let root = ctx.require_root()?;
    if id == ROOT_TOKEN {
        return Ok(root);
    }

    let wanted = normalize_relative(id);
    if let Some(store) = ctx
        .stores()
        .into_iter()
        .find(|store| normalize_relative(&store.relative) == wanted)
    {
        return Ok(store.path);
    }

    let config = ctx.root_config()?;
    let matches: Vec<_> = config
        .children()
        .iter()
        .filter(|entry| entry.id == id)
        .collect();
    match matches.as_slice() {
        [] => Err(TasktreeError::ScopeNotFound(id.to_string())),
        [entry] => Ok(canonical(&join_relative(&root, &entry.path))),
        many => Err(TasktreeError::ScopeAmbiguous {
            id: id.to_string(),
            candidates: many.iter().map(|entry| entry.path.clone()).collect(),
        }),
    }
}

/// Picks the active store and records it on the context.
pub fn resolve_active_scope(ctx: &mut Context, explicit: Option<&str>) -> Result<ActiveScope> {
    let active = pick_active_scope(ctx, explicit)?;
    tracing::debug!(store = %active.path.display(), source = active.source.as_str(), "active scope");
    ctx.set_active(&active.path);
    Ok(active)
}

fn pick_active_scope(ctx: &mut Context, explicit: Option<&str>) -> Result<ActiveScope> {
    if let Some(explicit) = explicit.map(str::trim).filter(|value| !value.is_empty()) {
        if explicit != CURRENT_TOKEN {
            return Ok(ActiveScope {
                path: resolve_scope_id(ctx, explicit)?,
                source: ScopeSource::Explicit,
            });
        }
    }

    let root = ctx.topology_root().map(Path::to_path_buf);
    for dir in ctx.cwd().ancestors() {
        if is_store_dir(dir) {
            return Ok(ActiveScope {
                path: dir.to_path_buf(),
                source: ScopeSource::Nearest,
            });
        }
        if root.as_deref() == Some(dir) {
            break;
        }
    }

    if let Some(root) = root.filter(|root| is_store_dir(root)) {
        return Ok(ActiveScope {
            path: root,
            source: ScopeSource::Root,
        });
    }

    Ok(ActiveScope {
        path: ctx.cwd().to_path_buf(),
        source: ScopeSource::Local,
    })
}

/// Parent store of `store_dir`: its child config when present, else the topology root if it encloses it.
pub fn parent_of(ctx: &Context, store_dir: &Path) -> Result<Option<PathBuf>> {
    let store_dir = canonical(store_dir);
    if let Some(StoreConfig::Child { parent }) = load_store_config(&store_dir)? {
        return Ok(Some(canonical(&join_relative(&store_dir, &parent))));
    }
    Ok(ctx
        .topology_root()
        .filter(|root| store_dir != *root && store_dir.starts_with(root))
        .map(Path::to_path_buf))
}

/// Human-facing id of the store at `path`.
pub fn display_id(ctx: &Context, path: &Path) -> String {
    let path = canonical(path);
    let Some(root) = ctx.topology_root() else {
        return relative_path(ctx.cwd(), &path);
    };
    if path == root {
        return ".".to_string();
    }
    let relative = relative_path(root, &path);
    ctx.root_config()
        .ok()
        .and_then(|config| config.child_by_path(&relative).map(|entry| entry.id.clone()))
        .unwrap_or(relative)
}
