//! Utility functions for text escaping and path handling

use std::path::{Component, Path, PathBuf};

/// Escape `& < > " '` for use in HTML/XML text and attributes
///
/// `'` becomes `&#x27;`, matching what podcast clients already accept.
pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Resolve a request path below `root`, refusing to leave it
///
/// Drive prefixes and root components are dropped, `.` is ignored and `..`
/// pops a component but never climbs above `root`. Returns `None` when nothing
/// is left to serve.
pub fn resolve_under_root(root: &Path, request_path: &str) -> Option<PathBuf> {
    let normalized = request_path.replace('\\', "/");
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if parts.is_empty() {
        return None;
    }
    let mut resolved = root.to_path_buf();
    resolved.extend(parts);
    Some(resolved)
}

/// Write `content` to `path` through a temporary sibling and a rename
///
/// Readers never observe a half-written file.
pub async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp_path, content).await?;
    tokio::fs::rename(&tmp_path, path).await
}
