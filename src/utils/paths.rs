use crate::types::errors::Error;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Joins a relative path onto `base` and lexically resolves `.` and `..`
/// components, without touching the filesystem
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// True when `outer` is `inner` itself or one of its ancestors
pub fn contains_path(outer: &Path, inner: &Path) -> bool {
    inner.starts_with(outer)
}

/// Converts a `file://` URL reported by the instrumentation into a path.
/// Returns `Ok(None)` for other schemes (`node:`, `evalmachine.<anonymous>`, ...)
pub fn file_url_to_path(url: &str) -> Result<Option<PathBuf>, Error> {
    if !url.starts_with("file://") {
        return Ok(None);
    }
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    parsed
        .to_file_path()
        .map(Some)
        .map_err(|_| Error::InvalidUrl(url.to_string()))
}

/// File name of a top-level artifact in the coverage directory
pub fn artifact_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}
