use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::IndexEntry;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to access task record {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Missing front matter delimiter in {}", .0.display())]
    MissingFrontMatter(PathBuf),
    #[error("Missing closing --- for front matter in {}", .0.display())]
    MissingFrontMatterEnd(PathBuf),
    #[error("Invalid task record {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub at: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub at: String,
    pub summary: String,
    #[serde(default)]
    pub next: String,
}

/// Full task detail. Entries and checkpoints only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<String>,
    #[serde(default)]
    pub has_pending: bool,
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    /// Free-text description below the front matter.
    #[serde(skip)]
    pub body: String,
}

impl TaskRecord {
    pub fn new(id: &str, uid: &str, name: &str, now: &str) -> Self {
        Self {
            id: id.to_string(),
            uid: Some(uid.to_string()),
            name: name.trim().to_string(),
            status: "open".to_string(),
            created: Some(now.to_string()),
            updated: Some(now.to_string()),
            ..Self::default()
        }
    }

    pub fn summary(&self) -> IndexEntry {
        IndexEntry {
            name: self.name.clone(),
            description: self.body.trim().to_string(),
            status: self.status.clone(),
            created: self.created.clone(),
            updated: self.updated.clone(),
            tags: self.tags.clone(),
            parent: self.parent.clone(),
            uid: self.uid.clone(),
        }
    }

    pub fn append_entry(&mut self, at: &str, text: &str) {
        self.entries.push(Entry {
            at: at.to_string(),
            text: text.trim().to_string(),
        });
        self.has_pending = true;
        self.updated = Some(at.to_string());
    }

    /// Closes every entry recorded at or before `at`.
    pub fn add_checkpoint(&mut self, at: &str, summary: &str, next: &str) {
        self.checkpoints.push(Checkpoint {
            at: at.to_string(),
            summary: summary.trim().to_string(),
            next: next.trim().to_string(),
        });
        self.last_checkpoint = newest_timestamp(self.checkpoints.iter().map(|cp| cp.at.as_str()));
        let pending = self.pending_entries().next().is_some();
        self.has_pending = pending;
        self.updated = Some(at.to_string());
    }

    pub fn pending_entries(&self) -> impl Iterator<Item = &Entry> {
        let cutoff = self.last_checkpoint.clone();
        self.entries.iter().filter(move |entry| match cutoff.as_deref() {
            Some(cutoff) => compare_timestamps(&entry.at, cutoff) == Ordering::Greater,
            None => true,
        })
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }
}

/// Reads and writes task records; the on-disk format lives behind this seam.
pub trait DocumentService {
    fn read(&self, path: &Path) -> Result<TaskRecord, RecordError>;
    fn write(&self, path: &Path, record: &TaskRecord) -> Result<(), RecordError>;
}

/// Markdown files with YAML front matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownDocuments;

impl DocumentService for MarkdownDocuments {
    fn read(&self, path: &Path) -> Result<TaskRecord, RecordError> {
        let text = fs::read_to_string(path).map_err(|source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_record(path, &text)
    }

    fn write(&self, path: &Path, record: &TaskRecord) -> Result<(), RecordError> {
        let io_err = |source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = render_record(path, record)?;
        fs::write(path, text).map_err(io_err)
    }
}

pub fn parse_record(path: &Path, text: &str) -> Result<TaskRecord, RecordError> {
    let (front, body) = split_front_matter(path, text)?;
    let mut record: TaskRecord =
        serde_yaml::from_str(&front).map_err(|source| RecordError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    record.body = body.trim_matches('\n').to_string();
    Ok(record)
}

pub fn render_record(path: &Path, record: &TaskRecord) -> Result<String, RecordError> {
    let front = serde_yaml::to_string(record).map_err(|source| RecordError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    let mut text = format!("---\n{}---\n", front);
    let body = record.body.trim_matches('\n');
    if !body.is_empty() {
        text.push('\n');
        text.push_str(body);
        text.push('\n');
    }
    Ok(text)
}

fn split_front_matter(path: &Path, text: &str) -> Result<(String, String), RecordError> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.first().map(|line| line.trim()) != Some("---") {
        return Err(RecordError::MissingFrontMatter(path.to_path_buf()));
    }
    let end_idx = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| line.trim() == "---")
        .map(|(idx, _)| idx)
        .ok_or_else(|| RecordError::MissingFrontMatterEnd(path.to_path_buf()))?;
    let front = lines[1..end_idx].join("\n");
    let body = lines[end_idx + 1..].join("\n");
    Ok((front, body))
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accepts RFC 3339 plus the minute/second precision forms users type by hand (read as UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }
    let formats = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
    formats.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

/// Orders by instant when both sides parse, lexically otherwise.
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.trim().cmp(b.trim()),
    }
}

pub fn same_instant(a: &str, b: &str) -> bool {
    compare_timestamps(a, b) == Ordering::Equal
}

pub fn newest_timestamp<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    values
        .max_by(|a, b| compare_timestamps(a, b))
        .map(ToString::to_string)
}
