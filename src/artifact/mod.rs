//! Artifacts: named text outputs accumulated across a run.
//!
//! | Item | Role |
//! |------|------|
//! | [`ArtifactSet`] | in-memory path → content map, merged last-writer-wins |
//! | [`ArtifactStore`] | durable per-run namespace (filesystem or memory) |
//! | [`StoreHandle`] | async access to a store via the blocking pool |
//! | [`Packager`] | bundles a run's stored artifacts into one archive |

mod packager;
mod store;

pub use packager::{Packager, TarballPackager, read_archive};
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, StoreHandle};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Mapping from relative path to textual content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet {
    files: BTreeMap<String, String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, returning the previous content at that path.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> Option<String> {
        self.files.insert(path.into(), content.into())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Apply `delta` on top of this set. Paths already present are
    /// overwritten; the overwritten paths are returned.
    pub fn merge(&mut self, delta: ArtifactSet) -> Vec<String> {
        let mut overwritten = Vec::new();
        for (path, content) in delta.files {
            if self.files.get(&path).is_some_and(|old| *old != content) {
                overwritten.push(path.clone());
            }
            self.files.insert(path, content);
        }
        overwritten
    }

    /// A stored path that cannot coexist with `path` in one file tree: a file
    /// at one of `path`'s parent directories, or a file below `path` itself.
    /// Equal paths do not clash.
    pub fn clash_with(&self, path: &str) -> Option<&str> {
        let mut ancestor = path;
        while let Some((parent, _)) = ancestor.rsplit_once('/') {
            if let Some((existing, _)) = self.files.get_key_value(parent) {
                return Some(existing);
            }
            ancestor = parent;
        }
        let dir = format!("{}/", path);
        self.files
            .range::<str, _>((
                std::ops::Bound::Included(dir.as_str()),
                std::ops::Bound::Unbounded,
            ))
            .next()
            .map(|(existing, _)| existing.as_str())
            .filter(|existing| existing.starts_with(&dir))
    }

    /// First path of `delta` that clashes with this set or with another path
    /// of `delta`, as `(new, existing)`.
    pub fn find_clash(&self, delta: &ArtifactSet) -> Option<(String, String)> {
        delta.paths().find_map(|path| {
            self.clash_with(path)
                .or_else(|| delta.clash_with(path))
                .map(|existing| (path.to_string(), existing.to_string()))
        })
    }

    /// Remove every path that clashes with `base`; the removed paths are
    /// returned.
    pub fn drop_clashes(&mut self, base: &ArtifactSet) -> Vec<String> {
        let dropped: Vec<String> = self
            .paths()
            .filter(|path| base.clash_with(path).is_some())
            .map(String::from)
            .collect();
        for path in &dropped {
            self.files.remove(path);
        }
        dropped
    }
}

impl FromIterator<(String, String)> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ArtifactSet {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Check that `path` is a non-empty relative path that stays inside its run
/// namespace.
pub fn validate_path(path: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.trim().is_empty() {
        return Err(invalid("empty path"));
    }
    if path.contains('\\') {
        return Err(invalid("backslash separators are not allowed"));
    }
    if Path::new(path).is_absolute() || path.starts_with('/') {
        return Err(invalid("absolute paths are not allowed"));
    }
    for segment in path.split('/') {
        match segment {
            "" | "." => return Err(invalid("empty or '.' segments are not allowed")),
            ".." => return Err(invalid("path escapes the run directory")),
            _ => {}
        }
    }
    Ok(())
}

/// Tidy a path as written by a generator: trim whitespace and any leading
/// `./` or `/`, and use forward slashes.
pub fn normalize_path(path: &str) -> String {
    let mut p = path.trim().replace('\\', "/");
    while let Some(rest) = p.strip_prefix("./") {
        p = rest.to_string();
    }
    p.trim_start_matches('/').to_string()
}
