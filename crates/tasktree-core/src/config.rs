use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = ".tasktree.toml";
pub const SCAN_DEPTH_ENV: &str = "TASKTREE_SCAN_DEPTH";
pub const DEFAULT_SCAN_DEPTH: usize = 5;
pub const DEFAULT_ID_MIN_PREFIX: usize = 4;

/// Project-level settings stored at the topology root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasktreeConfig {
    /// Maximum directory depth walked when discovering stores.
    pub scan_depth: Option<usize>,
    /// Minimum prefix length shown when listing ambiguous task ids.
    pub id_min_prefix: Option<usize>,
}

/// Effective settings for one invocation, with the source each value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub scan_depth: usize,
    pub scan_depth_source: &'static str,
    pub id_min_prefix: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_depth: DEFAULT_SCAN_DEPTH,
            scan_depth_source: "default",
            id_min_prefix: DEFAULT_ID_MIN_PREFIX,
        }
    }
}

impl Settings {
    pub fn resolve(topology_root: Option<&Path>) -> Self {
        let env_value = std::env::var(SCAN_DEPTH_ENV).ok();
        Self::resolve_from(env_value.as_deref(), topology_root)
    }

    pub fn resolve_from(env_value: Option<&str>, topology_root: Option<&Path>) -> Self {
        let config = topology_root.and_then(load_config);
        let (scan_depth, scan_depth_source) =
            resolve_scan_depth_with_source(env_value, config.as_ref());
        let id_min_prefix = config
            .as_ref()
            .and_then(|config| config.id_min_prefix)
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_ID_MIN_PREFIX);
        Self {
            scan_depth,
            scan_depth_source,
            id_min_prefix,
        }
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn load_config(root: &Path) -> Option<TasktreeConfig> {
    let path = config_path(root);
    if !path.is_file() {
        return None;
    }
    let text = fs::read_to_string(&path).ok()?;
    match toml::from_str::<TasktreeConfig>(&text) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable config");
            None
        }
    }
}

/// Environment beats the project file, which beats the built-in default.
pub fn resolve_scan_depth_with_source(
    env_value: Option<&str>,
    config: Option<&TasktreeConfig>,
) -> (usize, &'static str) {
    if let Some(value) = env_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<usize>().ok())
    {
        return (value, "env");
    }
    if let Some(value) = config.and_then(|config| config.scan_depth) {
        return (value, "project");
    }
    (DEFAULT_SCAN_DEPTH, "default")
}
