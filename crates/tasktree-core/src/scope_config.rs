use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::normalize_relative;
use crate::store::MARKER_DIR;

pub const SCOPE_FILE: &str = "scope.json";

#[derive(Debug, Error)]
pub enum ScopeConfigError {
    #[error("Failed to access scope config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse scope config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize scope config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildKind {
    #[default]
    Path,
    Worktree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildEntry {
    /// Relative to the root store's directory, `/`-separated.
    pub path: String,
    pub id: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChildKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ChildEntry {
    pub fn new(path: &str, id: &str) -> Self {
        Self {
            path: normalize_relative(path),
            id: id.to_string(),
            kind: None,
            vcs_ref: None,
            tags: Vec::new(),
        }
    }

    pub fn kind(&self) -> ChildKind {
        self.kind.unwrap_or_default()
    }
}

/// Per-store configuration. The on-disk shape is inferred from which key is
/// present; that inference happens once, here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStoreConfig", into = "RawStoreConfig")]
pub enum StoreConfig {
    Root { children: Vec<ChildEntry> },
    Child { parent: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawStoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<ChildEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
}

impl TryFrom<RawStoreConfig> for StoreConfig {
    type Error = String;

    fn try_from(raw: RawStoreConfig) -> Result<Self, Self::Error> {
        match (raw.children, raw.parent) {
            (Some(_), Some(_)) => {
                Err("scope config carries both `children` and `parent`".to_string())
            }
            (_, Some(parent)) => Ok(StoreConfig::Child { parent }),
            (children, None) => Ok(StoreConfig::Root {
                children: children.unwrap_or_default(),
            }),
        }
    }
}

impl From<StoreConfig> for RawStoreConfig {
    fn from(config: StoreConfig) -> Self {
        match config {
            StoreConfig::Root { children } => RawStoreConfig {
                children: Some(children),
                parent: None,
            },
            StoreConfig::Child { parent } => RawStoreConfig {
                children: None,
                parent: Some(parent),
            },
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Root {
            children: Vec::new(),
        }
    }
}

impl StoreConfig {
    pub fn children(&self) -> &[ChildEntry] {
        match self {
            StoreConfig::Root { children } => children,
            StoreConfig::Child { .. } => &[],
        }
    }

    pub fn parent(&self) -> Option<&str> {
        match self {
            StoreConfig::Child { parent } => Some(parent),
            StoreConfig::Root { .. } => None,
        }
    }

    pub fn child_by_path(&self, relative: &str) -> Option<&ChildEntry> {
        let relative = normalize_relative(relative);
        self.children()
            .iter()
            .find(|child| normalize_relative(&child.path) == relative)
    }

    /// Replaces an entry with the same path or appends; `false` for a child config.
    pub fn upsert_child(&mut self, entry: ChildEntry) -> bool {
        let StoreConfig::Root { children } = self else {
            return false;
        };
        let key = normalize_relative(&entry.path);
        match children
            .iter_mut()
            .find(|child| normalize_relative(&child.path) == key)
        {
            Some(existing) => *existing = entry,
            None => children.push(entry),
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        true
    }

    pub fn remove_child(&mut self, relative: &str) -> bool {
        let StoreConfig::Root { children } = self else {
            return false;
        };
        let key = normalize_relative(relative);
        let before = children.len();
        children.retain(|child| normalize_relative(&child.path) != key);
        children.len() != before
    }
}

pub fn scope_config_path(scope_dir: &Path) -> PathBuf {
    scope_dir.join(MARKER_DIR).join(SCOPE_FILE)
}

pub fn load_store_config(scope_dir: &Path) -> Result<Option<StoreConfig>, ScopeConfigError> {
    let path = scope_config_path(scope_dir);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)?;
    let config = serde_json::from_str(&raw)
        .map_err(|source| ScopeConfigError::Parse { path, source })?;
    Ok(Some(config))
}

pub fn save_store_config(scope_dir: &Path, config: &StoreConfig) -> Result<PathBuf, ScopeConfigError> {
    let path = scope_config_path(scope_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(config)?)?;
    tracing::debug!(path = %path.display(), "wrote scope config");
    Ok(path)
}
