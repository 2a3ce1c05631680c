use crate::types::models::RawFileCoverage;
use crate::utils::paths::file_url_to_path;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;
use wildmatch::WildMatch;

/// Decides which files belong to the measured project
#[derive(Debug, Clone)]
pub struct FileFilter {
    root_dir: PathBuf,
    extension: String,
    patterns: Vec<WildMatch>,
}

impl FileFilter {
    pub fn new(root_dir: &Path, exclude: &[String], extension: &str) -> Self {
        FileFilter {
            root_dir: root_dir.to_path_buf(),
            extension: extension.to_string(),
            patterns: exclude.iter().map(|p| WildMatch::new(p)).collect(),
        }
    }

    /// True iff `path` lies under the root, has the measured extension and
    /// matches no exclusion pattern
    pub fn should_cover(&self, path: &Path) -> bool {
        path.starts_with(&self.root_dir)
            && path.to_string_lossy().ends_with(&self.extension)
            && !self.is_excluded(path)
    }

    /// Match `path` against the exclusion patterns.
    ///
    /// Hidden files are matched with the leading dot stripped from their
    /// basename: a pattern such as `**/*.js` must exclude `dir/.eslintrc.js`
    /// the same way it excludes `dir/eslintrc.js`.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let candidate = match path.file_name().map(|n| n.to_string_lossy()) {
            Some(name) if name.starts_with('.') => path.with_file_name(&name[1..]),
            _ => path.to_path_buf(),
        };
        let candidate = candidate.to_string_lossy();
        self.patterns.iter().any(|p| p.matches(&candidate))
    }

    /// Every non-hidden project file passing `should_cover`, sorted
    pub fn project_files(&self) -> Vec<PathBuf> {
        let entries: Vec<PathBuf> = WalkDir::new(&self.root_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        let mut files: Vec<PathBuf> = entries
            .into_par_iter()
            .filter(|path| !is_hidden(path) && self.should_cover(path))
            .collect();
        files.sort();
        files
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

impl FileFilter {
    /// Keeps the `file://` entries that should be covered, rewriting each
    /// URL into an absolute path
    pub fn select(&self, raw: Vec<RawFileCoverage>) -> Vec<RawFileCoverage> {
        raw.into_iter()
            .filter_map(|file| match file_url_to_path(&file.url) {
                Ok(Some(path)) if self.should_cover(&path) => Some(RawFileCoverage {
                    url: path.to_string_lossy().into_owned(),
                    functions: file.functions,
                }),
                Ok(_) => None,
                Err(e) => {
                    warn!("Skipping coverage entry: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Serializable description of a [`FileFilter`], sent to baseline workers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub root_dir: PathBuf,
    pub exclude: Vec<String>,
    pub extension: String,
}

impl FilterConfig {
    pub fn build(&self) -> FileFilter {
        FileFilter::new(&self.root_dir, &self.exclude, &self.extension)
    }
}
