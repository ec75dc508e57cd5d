use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::{AmbiguousMatch, Result, TasktreeError};
use crate::paths::{canonical, join_relative};
use crate::scope::{self, PARENT_TOKEN};
use crate::scope_config::load_store_config;
use crate::store::{IndexEntry, Store};

/// Most candidates listed in an ambiguous-id error before summarising the rest.
pub const MAX_LISTED: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeHint {
    Parent,
    Named(String),
}

/// `<prefix>` or `<scope>:<prefix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub hint: Option<ScopeHint>,
    pub prefix: String,
}

impl TaskRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (hint, prefix) = match raw.rsplit_once(':') {
            Some((hint, prefix)) => {
                let hint = hint.trim();
                let hint = if hint == PARENT_TOKEN || hint == ".." {
                    ScopeHint::Parent
                } else if hint.is_empty() {
                    return Err(TasktreeError::InvalidArgs(format!(
                        "empty scope in task reference '{}'",
                        raw
                    )));
                } else {
                    ScopeHint::Named(hint.to_string())
                };
                (Some(hint), prefix.trim())
            }
            None => (None, raw),
        };
        if prefix.is_empty() {
            return Err(TasktreeError::InvalidArgs(format!(
                "task reference '{}' has no id",
                raw
            )));
        }
        Ok(Self {
            hint,
            prefix: prefix.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTask {
    pub id: String,
    pub store: Store,
    pub scope_id: String,
    pub summary: IndexEntry,
}

struct Candidate {
    store: PathBuf,
    id: String,
    summary: IndexEntry,
}

/// Resolves a task reference to exactly one task and switches the active store to its owner.
pub fn resolve_task(ctx: &mut Context, raw: &str) -> Result<ResolvedTask> {
    let reference = TaskRef::parse(raw)?;
    let resolved = match &reference.hint {
        Some(hint) => {
            let store = hinted_store(ctx, hint)?;
            resolve_in(ctx, &[store], &reference.prefix, true)?
        }
        None => {
            let active = ctx.current_store()?.path().to_path_buf();
            match resolve_in(ctx, std::slice::from_ref(&active), &reference.prefix, true) {
                Err(err) if err.is_not_found() => {
                    tracing::debug!(prefix = %reference.prefix, "widening task search");
                    let stores = widened_stores(ctx, &active)?;
                    resolve_in(ctx, &stores, &reference.prefix, false)?
                }
                other => other?,
            }
        }
    };
    ctx.set_active(resolved.store.path());
    Ok(resolved)
}

fn hinted_store(ctx: &mut Context, hint: &ScopeHint) -> Result<PathBuf> {
    match hint {
        ScopeHint::Named(name) => scope::resolve_scope_id(ctx, name),
        ScopeHint::Parent => scope::resolve_scope_id(ctx, PARENT_TOKEN),
    }
}

/// Discovered stores, the active store's configured children, then its parent.
fn widened_stores(ctx: &Context, active: &Path) -> Result<Vec<PathBuf>> {
    let mut stores: Vec<PathBuf> = ctx.stores().into_iter().map(|store| store.path).collect();
    if let Some(config) = load_store_config(active)? {
        stores.extend(
            config
                .children()
                .iter()
                .map(|entry| canonical(&join_relative(active, &entry.path))),
        );
    }
    if let Some(parent) = scope::parent_of(ctx, active)? {
        stores.push(parent);
    }
    let mut seen = HashSet::new();
    stores.retain(|store| seen.insert(canonical(store)));
    Ok(stores)
}

fn resolve_in(
    ctx: &Context,
    stores: &[PathBuf],
    prefix: &str,
    strict: bool,
) -> Result<ResolvedTask> {
    let needle = prefix.to_lowercase();
    let mut candidates = Vec::new();
    for dir in stores {
        let store = Store::at(dir);
        let index = match store.load_index() {
            Ok(index) => index,
            Err(err) if !strict => {
                tracing::warn!(store = %dir.display(), error = %err, "skipping unreadable index");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        candidates.extend(
            index
                .tasks
                .into_iter()
                .filter(|(id, _)| id.to_lowercase().starts_with(&needle))
                .map(|(id, summary)| Candidate {
                    store: dir.clone(),
                    id,
                    summary,
                }),
        );
    }

    match candidates.len() {
        0 => Err(TasktreeError::TaskNotFound(prefix.to_string())),
        1 => {
            let Some(found) = candidates.pop() else {
                return Err(TasktreeError::TaskNotFound(prefix.to_string()));
            };
            Ok(ResolvedTask {
                scope_id: scope::display_id(ctx, &found.store),
                store: Store::at(found.store),
                id: found.id,
                summary: found.summary,
            })
        }
        _ => Err(ambiguous(ctx, prefix, &candidates)),
    }
}

fn ambiguous(ctx: &Context, prefix: &str, candidates: &[Candidate]) -> TasktreeError {
    let ids: Vec<String> = candidates.iter().map(|c| c.id.to_lowercase()).collect();
    let min_len = ctx.settings().id_min_prefix;
    let mut matches: Vec<AmbiguousMatch> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| AmbiguousMatch {
            scope: scope::display_id(ctx, &candidate.store),
            id: candidate.id.clone(),
            short: shortest_unique_prefix(&candidate.id, idx, &ids, min_len),
        })
        .collect();
    matches.sort_by(|a, b| a.scope.cmp(&b.scope).then_with(|| a.id.cmp(&b.id)));

    let mut listed: Vec<String> = matches
        .iter()
        .take(MAX_LISTED)
        .map(|m| format!("{}:{}", m.scope, m.short))
        .collect();
    if matches.len() > MAX_LISTED {
        listed.push(format!("and {} more", matches.len() - MAX_LISTED));
    }
    let message = format!(
        "Ambiguous task id '{}' matches {} tasks: {}",
        prefix,
        matches.len(),
        listed.join(", ")
    );
    TasktreeError::AmbiguousTask {
        prefix: prefix.to_string(),
        matches,
        message,
    }
}

/// Shortest prefix of `id` shared with no other entry of `all`, plus one character of margin.
///
/// `own` is the position of `id` inside `all`; identical ids in different stores
/// never become unique and are shown in full.
pub fn shortest_unique_prefix(id: &str, own: usize, all: &[String], min_len: usize) -> String {
    let chars: Vec<char> = id.chars().collect();
    let lowered = id.to_lowercase();
    let start = min_len.min(chars.len()).max(1);
    for len in start..=chars.len() {
        let candidate: String = lowered.chars().take(len).collect();
        let shared = all
            .iter()
            .enumerate()
            .any(|(idx, other)| idx != own && other.starts_with(&candidate));
        if !shared {
            return chars.iter().take((len + 1).min(chars.len())).collect();
        }
    }
    id.to_string()
}
