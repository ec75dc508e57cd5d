use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MARKER_DIR: &str = ".tasktree";
pub const INDEX_FILE: &str = "index.json";
pub const TASKS_DIR: &str = "tasks";
pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse index {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Listing cache for one task; mirrors the fields of the full record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default)]
    pub tasks: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// Case-insensitive lookup of a local id.
    pub fn find_key(&self, id: &str) -> Option<&str> {
        self.tasks
            .keys()
            .find(|key| key.eq_ignore_ascii_case(id))
            .map(String::as_str)
    }
}

/// One task collection, addressed by the directory that holds its marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.dir.join(MARKER_DIR)
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.marker_dir().join(TASKS_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.marker_dir().join(INDEX_FILE)
    }

    pub fn task_path(&self, id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{}.md", id))
    }

    pub fn exists(&self) -> bool {
        is_store_dir(&self.dir)
    }

    pub fn init(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.tasks_dir())?;
        if !self.index_path().exists() {
            self.save_index(&Index::default())?;
            tracing::info!(store = %self.dir.display(), "initialized store");
        }
        Ok(())
    }

    /// A missing index reads as empty.
    pub fn load_index(&self) -> Result<Index, StoreError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Index::default());
        }
        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(Index::default());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
            path: path.to_string_lossy().to_string(),
            source,
        })
    }

    pub fn save_index(&self, index: &Index) -> Result<(), StoreError> {
        let path = self.index_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut index = index.clone();
        index.version = Some(INDEX_VERSION);
        fs::write(&path, serde_json::to_string_pretty(&index)?)?;
        Ok(())
    }

    pub fn task_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load_index()?.tasks.into_keys().collect())
    }

    /// Stems of every `.md` file under `tasks/`, indexed or not.
    pub fn record_stems(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.tasks_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut stems = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }

    pub fn task_count(&self) -> usize {
        self.load_index().map(|index| index.tasks.len()).unwrap_or(0)
    }

    /// Deletes the record file and drops the entry from `index`; the caller saves.
    pub fn remove_task(&self, index: &mut Index, id: &str) -> Result<(), StoreError> {
        let path = self.task_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        index.tasks.remove(id);
        Ok(())
    }

    /// Removes the marker directory and every task inside it.
    pub fn destroy(&self) -> Result<(), StoreError> {
        let marker = self.marker_dir();
        if marker.exists() {
            fs::remove_dir_all(&marker)?;
            tracing::info!(store = %self.dir.display(), "deleted store");
        }
        Ok(())
    }
}

pub fn is_store_dir(dir: &Path) -> bool {
    dir.join(MARKER_DIR).is_dir()
}
