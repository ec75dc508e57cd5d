use std::path::{Component, Path, PathBuf};

/// Resolves `.` and `..` without touching the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Joins a `/`-separated relative path onto `base`.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    let relative = normalize_relative(relative);
    if relative == "." {
        return lexical_normalize(base);
    }
    lexical_normalize(&base.join(relative))
}

/// Canonical absolute form used for identity comparisons.
pub fn canonical(path: &Path) -> PathBuf {
    path.canonicalize()
        .unwrap_or_else(|_| lexical_normalize(path))
}

/// Relative path from `from` to `to`, both absolute, rendered with `/`.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from = lexical_normalize(from);
    let to = lexical_normalize(to);
    let from_parts: Vec<Component> = from.components().collect();
    let to_parts: Vec<Component> = to.components().collect();
    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from_parts.len() {
        parts.push("..".to_string());
    }
    for component in &to_parts[common..] {
        parts.push(component.as_os_str().to_string_lossy().to_string());
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Strips `./` prefixes and trailing slashes; the empty path becomes `.`.
pub fn normalize_relative(value: &str) -> String {
    let mut trimmed = value.trim().replace('\\', "/");
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest.to_string();
    }
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}
