//! Manifest Command
//!
//! Validates a manifest and shows the normalized paths with their artifact names.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use sitegate_common::{Environment, PathManifest};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// Manifest file, one page path per line
    #[arg(long, default_value = "pages.txt", env = "SITEGATE_MANIFEST")]
    pub manifest: PathBuf,
}

/// One normalized manifest entry for display
#[derive(Serialize, Clone)]
pub struct EntryInfo {
    pub path: String,
    pub baseline: String,
    pub candidate: String,
    pub diff: String,
}

impl TableDisplay for EntryInfo {
    fn headers() -> Vec<&'static str> {
        vec!["Path", "Baseline", "Candidate", "Diff"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.path.clone(),
            self.baseline.clone(),
            self.candidate.clone(),
            self.diff.clone(),
        ]
    }
}

pub fn entries(manifest: &PathManifest) -> Vec<EntryInfo> {
    manifest
        .iter()
        .map(|entry| EntryInfo {
            path: entry.path.clone(),
            baseline: entry.screenshot_file_name(Environment::Baseline),
            candidate: entry.screenshot_file_name(Environment::Candidate),
            diff: entry.diff_file_name(),
        })
        .collect()
}

pub async fn execute(args: ManifestArgs, format: OutputFormat) -> Result<()> {
    let manifest = PathManifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;

    print_list(&entries(&manifest), format);
    Ok(())
}
