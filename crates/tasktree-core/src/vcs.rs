use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};

use crate::paths::canonical;

/// One checked-out working copy of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub is_main: bool,
}

/// Everything the engine needs from version control, as typed values.
pub trait VcsService {
    fn root(&self, cwd: &Path) -> Option<PathBuf>;
    fn worktrees(&self, cwd: &Path) -> Result<Vec<Worktree>>;
    fn current_branch(&self, cwd: &Path) -> Option<String>;
}

/// Shells out to the `git` binary on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    fn capture(cwd: &Path, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(cwd)
            .args(args)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if raw.is_empty() {
            None
        } else {
            Some(raw)
        }
    }
}

impl VcsService for GitCli {
    fn root(&self, cwd: &Path) -> Option<PathBuf> {
        Self::capture(cwd, &["rev-parse", "--show-toplevel"]).map(|raw| canonical(Path::new(&raw)))
    }

    fn worktrees(&self, cwd: &Path) -> Result<Vec<Worktree>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(cwd)
            .arg("worktree")
            .arg("list")
            .arg("--porcelain")
            .output()
            .with_context(|| format!("run git worktree list under {}", cwd.display()))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git worktree list failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(parse_worktree_porcelain(
            &String::from_utf8_lossy(&output.stdout),
            cwd,
        ))
    }

    fn current_branch(&self, cwd: &Path) -> Option<String> {
        Self::capture(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|raw| raw != "HEAD")
    }
}

/// Parses `git worktree list --porcelain`. Git always lists the main worktree first.
pub fn parse_worktree_porcelain(raw: &str, base: &Path) -> Vec<Worktree> {
    let mut entries: Vec<Worktree> = Vec::new();
    let mut current: Option<Worktree> = None;
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            continue;
        }
        if let Some(value) = trimmed.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(Worktree {
                path: canonical(&base.join(value.trim())),
                branch: None,
                is_main: false,
            });
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some(value) = trimmed.strip_prefix("branch ") {
            entry.branch = Some(strip_branch_ref(value));
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    if let Some(first) = entries.first_mut() {
        first.is_main = true;
    }
    entries
}

fn strip_branch_ref(value: &str) -> String {
    let trimmed = value.trim();
    trimmed
        .strip_prefix("refs/heads/")
        .unwrap_or(trimmed)
        .to_string()
}

/// Fixed answers, for callers outside any repository and for tests.
#[derive(Debug, Default, Clone)]
pub struct StaticVcs {
    pub root: Option<PathBuf>,
    pub worktrees: Vec<Worktree>,
    pub branch: Option<String>,
}

impl StaticVcs {
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            worktrees: vec![Worktree {
                path: root.clone(),
                branch: Some("main".to_string()),
                is_main: true,
            }],
            root: Some(root),
            branch: Some("main".to_string()),
        }
    }

    pub fn with_worktree(mut self, path: impl Into<PathBuf>, branch: &str) -> Self {
        self.worktrees.push(Worktree {
            path: path.into(),
            branch: Some(branch.to_string()),
            is_main: false,
        });
        self
    }
}

impl VcsService for StaticVcs {
    fn root(&self, _cwd: &Path) -> Option<PathBuf> {
        self.root.clone()
    }

    fn worktrees(&self, _cwd: &Path) -> Result<Vec<Worktree>> {
        Ok(self.worktrees.clone())
    }

    fn current_branch(&self, _cwd: &Path) -> Option<String> {
        self.branch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn porcelain_marks_first_entry_main_and_strips_refs() {
        let raw = "\
worktree /repo/main
HEAD abcdef
branch refs/heads/main

worktree /repo/feature
HEAD 123456
branch refs/heads/feature/x
locked

worktree /repo/detached
HEAD 999999
detached
";
        let parsed = parse_worktree_porcelain(raw, Path::new("/"));
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_main);
        assert_eq!(parsed[0].branch.as_deref(), Some("main"));
        assert!(!parsed[1].is_main);
        assert_eq!(parsed[1].branch.as_deref(), Some("feature/x"));
        assert_eq!(parsed[1].path, PathBuf::from("/repo/feature"));
        assert_eq!(parsed[2].branch, None);
    }

    #[test]
    fn porcelain_tolerates_empty_output() {
        assert!(parse_worktree_porcelain("", Path::new("/")).is_empty());
    }

    #[test]
    fn static_vcs_reports_configured_worktrees() {
        let vcs = StaticVcs::rooted("/repo").with_worktree("/repo-wt", "feature");
        let worktrees = vcs.worktrees(Path::new("/repo")).expect("worktrees");
        assert_eq!(worktrees.len(), 2);
        assert_eq!(vcs.root(Path::new("/anywhere")), Some(PathBuf::from("/repo")));
        assert_eq!(worktrees[1].branch.as_deref(), Some("feature"));
    }
}
