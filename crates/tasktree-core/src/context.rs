use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{Result, TasktreeError};
use crate::paths::canonical;
use crate::record::{DocumentService, MarkdownDocuments};
use crate::scope;
use crate::scope_config::{load_store_config, StoreConfig};
use crate::store::Store;
use crate::topology::{known_stores, DiscoveredStore};
use crate::vcs::VcsService;

/// Per-invocation state threaded through every operation.
pub struct Context {
    settings: Settings,
    vcs: Box<dyn VcsService>,
    docs: Box<dyn DocumentService>,
    cwd: PathBuf,
    topology_root: Option<PathBuf>,
    active: Option<PathBuf>,
}

impl Context {
    /// Settings are read from the environment and the topology root's `.tasktree.toml`.
    pub fn new(cwd: &Path, vcs: Box<dyn VcsService>) -> Self {
        let cwd = canonical(cwd);
        let topology_root = topology_root_for(vcs.as_ref(), &cwd);
        let settings = Settings::resolve(topology_root.as_deref());
        Self::assemble(cwd, vcs, topology_root, settings)
    }

    pub fn with_settings(cwd: &Path, vcs: Box<dyn VcsService>, settings: Settings) -> Self {
        let cwd = canonical(cwd);
        let topology_root = topology_root_for(vcs.as_ref(), &cwd);
        Self::assemble(cwd, vcs, topology_root, settings)
    }

    fn assemble(
        cwd: PathBuf,
        vcs: Box<dyn VcsService>,
        topology_root: Option<PathBuf>,
        settings: Settings,
    ) -> Self {
        tracing::debug!(
            cwd = %cwd.display(),
            root = ?topology_root,
            scan_depth = settings.scan_depth,
            "context ready"
        );
        Self {
            settings,
            vcs,
            docs: Box::new(MarkdownDocuments),
            cwd,
            topology_root,
            active: None,
        }
    }

    pub fn with_documents(mut self, docs: Box<dyn DocumentService>) -> Self {
        self.docs = docs;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn vcs(&self) -> &dyn VcsService {
        self.vcs.as_ref()
    }

    pub fn docs(&self) -> &dyn DocumentService {
        self.docs.as_ref()
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn topology_root(&self) -> Option<&Path> {
        self.topology_root.as_deref()
    }

    pub fn require_root(&self) -> Result<PathBuf> {
        self.topology_root
            .clone()
            .ok_or_else(|| TasktreeError::NotInGitRepo(self.cwd.clone()))
    }

    pub fn active(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    pub fn set_active(&mut self, path: &Path) {
        let path = canonical(path);
        if self.active.as_deref() != Some(path.as_path()) {
            tracing::debug!(store = %path.display(), "active store changed");
        }
        self.active = Some(path);
    }

    /// The active store, resolving it implicitly on first use.
    pub fn current_store(&mut self) -> Result<Store> {
        if let Some(active) = &self.active {
            return Ok(Store::at(active));
        }
        let active = scope::resolve_active_scope(self, None)?;
        Ok(Store::at(active.path))
    }

    /// Every store reachable from the topology root, in discovery order.
    pub fn stores(&self) -> Vec<DiscoveredStore> {
        match &self.topology_root {
            Some(root) => known_stores(root, self.settings.scan_depth),
            None => Vec::new(),
        }
    }

    /// The root store's config; an absent file reads as an empty root form.
    pub fn root_config(&self) -> Result<StoreConfig> {
        let root = self.require_root()?;
        Ok(load_store_config(&root)?.unwrap_or_default())
    }
}

/// The main worktree anchors the topology, so linked worktrees share one tree.
fn topology_root_for(vcs: &dyn VcsService, cwd: &Path) -> Option<PathBuf> {
    let toplevel = vcs.root(cwd)?;
    let main = vcs
        .worktrees(&toplevel)
        .ok()
        .and_then(|worktrees| worktrees.into_iter().find(|worktree| worktree.is_main))
        .map(|worktree| worktree.path);
    Some(canonical(&main.unwrap_or(toplevel)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::StaticVcs;
    use tempfile::TempDir;

    #[test]
    fn linked_worktree_uses_main_worktree_as_root() {
        let temp = TempDir::new().expect("tempdir");
        let main = canonical(temp.path()).join("repo");
        let linked = canonical(temp.path()).join("repo-wt");
        std::fs::create_dir_all(&main).expect("main");
        std::fs::create_dir_all(&linked).expect("linked");
        let mut vcs = StaticVcs::rooted(&main).with_worktree(&linked, "feature");
        vcs.root = Some(linked.clone());

        let ctx = Context::with_settings(&linked, Box::new(vcs), Settings::default());
        assert_eq!(ctx.topology_root(), Some(main.as_path()));
    }

    #[test]
    fn require_root_fails_outside_a_repository() {
        let temp = TempDir::new().expect("tempdir");
        let ctx = Context::with_settings(temp.path(), Box::new(StaticVcs::default()), Settings::default());
        let err = ctx.require_root().unwrap_err();
        assert_eq!(err.code().as_str(), "not_in_git_repo");
        assert!(ctx.stores().is_empty());
    }
}
