//! Page manifest - the ordered, de-duplicated set of page paths to verify
//!
//! Entries are normalized so that URL construction is deterministic for both
//! deployments: `.html` suffixes are stripped and `index.html` maps to its
//! directory (`/index.html` becomes `/`).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::error::ManifestError;
use crate::types::Environment;

/// Artifact stem used for the site root, which has no path segments.
/// No escaped path ever produces `~r`, so this cannot collide.
const ROOT_STEM: &str = "~root";

/// A root-relative page identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageManifestEntry {
    pub path: String,
}

impl PageManifestEntry {
    /// Normalize a raw manifest line into an entry
    pub fn parse(raw: &str) -> Result<Self, String> {
        normalize_path(raw).map(|path| Self { path })
    }

    /// Absolute URL of this page on the deployment rooted at `base_url`
    pub fn url_for(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path)
    }

    /// Collision-free file stem derived from the path.
    ///
    /// The leading separator is stripped and the remaining separators become
    /// `_`. Literal `_` and `~` are escaped with `~`, and any byte outside
    /// `[A-Za-z0-9.-]` is written as `~XX`, so distinct paths never share a stem.
    pub fn artifact_stem(&self) -> String {
        let trimmed = self.path.trim_start_matches('/');
        if trimmed.is_empty() {
            return ROOT_STEM.to_string();
        }

        let mut stem = String::with_capacity(trimmed.len());
        for byte in trimmed.bytes() {
            match byte {
                b'/' => stem.push('_'),
                b'_' => stem.push_str("~_"),
                b'~' => stem.push_str("~~"),
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' => stem.push(byte as char),
                other => stem.push_str(&format!("~{:02X}", other)),
            }
        }
        stem
    }

    /// Screenshot file name for one environment
    pub fn screenshot_file_name(&self, environment: Environment) -> String {
        format!("{}.{}.png", self.artifact_stem(), environment.tag())
    }

    /// Diff image file name
    pub fn diff_file_name(&self) -> String {
        format!("{}.diff.png", self.artifact_stem())
    }
}

impl std::fmt::Display for PageManifestEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

/// Normalize one manifest path.
///
/// Returns the rejection reason for entries that cannot name a page.
pub fn normalize_path(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty path".to_string());
    }
    if raw.contains("://") {
        return Err("absolute URLs are not allowed; use a root-relative path".to_string());
    }
    if raw.chars().any(|c| c.is_whitespace() || c == '\\' || c == '?' || c == '#') {
        return Err("path contains whitespace, a backslash, a query or a fragment".to_string());
    }

    let trailing_slash = raw.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err("relative segments ('.' or '..') are not allowed".to_string());
        }
        segments.push(segment);
    }

    let mut directory = trailing_slash;
    if let Some(last) = segments.last().copied() {
        if last == "index.html" {
            segments.pop();
            directory = true;
        } else if let Some(stripped) = last.strip_suffix(".html") {
            if stripped.is_empty() {
                return Err("'.html' is not a page name".to_string());
            }
            let index = segments.len() - 1;
            segments[index] = stripped;
            directory = false;
        }
    }

    let mut path = String::from("/");
    path.push_str(&segments.join("/"));
    if directory && !segments.is_empty() {
        path.push('/');
    }
    Ok(path)
}

/// Ordered, unique page paths for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathManifest {
    entries: Vec<PageManifestEntry>,
}

impl PathManifest {
    /// Parse newline-separated paths. Blank lines and `#` comments are ignored;
    /// duplicates after normalization keep their first occurrence.
    pub fn from_lines(content: &str) -> Result<Self, ManifestError> {
        let lines = content
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));
        Self::build(lines)
    }

    /// Build from an already split list of paths
    pub fn from_paths<I, S>(paths: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let owned: Vec<(usize, String)> = paths
            .into_iter()
            .enumerate()
            .map(|(index, p)| (index + 1, p.as_ref().trim().to_string()))
            .filter(|(_, p)| !p.is_empty())
            .collect();
        Self::build(owned.iter().map(|(line, p)| (*line, p.as_str())))
    }

    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_lines(&content)
    }

    fn build<'a>(lines: impl Iterator<Item = (usize, &'a str)>) -> Result<Self, ManifestError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for (line, raw) in lines {
            let entry = PageManifestEntry::parse(raw).map_err(|reason| {
                ManifestError::InvalidEntry {
                    line,
                    entry: raw.to_string(),
                    reason,
                }
            })?;
            if seen.insert(entry.path.clone()) {
                entries.push(entry);
            } else {
                debug!("Dropping duplicate manifest entry {} (line {})", entry.path, line);
            }
        }

        if entries.is_empty() {
            return Err(ManifestError::Empty);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PageManifestEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageManifestEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize_path(path)
            .map(|p| self.entries.iter().any(|e| e.path == p))
            .unwrap_or(false)
    }
}
