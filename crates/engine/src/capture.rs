//! Screenshot capture and artifact layout

use std::path::{Path, PathBuf};
use tracing::debug;

use sitegate_common::{Environment, Error, PageManifestEntry, Result};

use crate::renderer::RenderSession;

/// Three parallel directories keyed by the same path-derived file stem
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub baseline_dir: PathBuf,
    pub candidate_dir: PathBuf,
    pub diff_dir: PathBuf,
}

impl ArtifactLayout {
    /// Layout rooted at `root`
    pub fn under(root: &Path) -> Self {
        Self {
            baseline_dir: root.join("baseline"),
            candidate_dir: root.join("candidate"),
            diff_dir: root.join("diff"),
        }
    }

    /// Create all three directories
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.baseline_dir)?;
        std::fs::create_dir_all(&self.candidate_dir)?;
        std::fs::create_dir_all(&self.diff_dir)?;
        Ok(())
    }

    pub fn screenshot_path(&self, entry: &PageManifestEntry, environment: Environment) -> PathBuf {
        let dir = match environment {
            Environment::Baseline => &self.baseline_dir,
            Environment::Candidate => &self.candidate_dir,
        };
        dir.join(entry.screenshot_file_name(environment))
    }

    pub fn diff_path(&self, entry: &PageManifestEntry) -> PathBuf {
        self.diff_dir.join(entry.diff_file_name())
    }
}

/// Writes one full-document PNG per (path, environment)
#[derive(Debug, Clone)]
pub struct ScreenshotCapture {
    layout: ArtifactLayout,
}

impl ScreenshotCapture {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Capture the normalized page. There is no retry; a failure is the caller's to record.
    pub async fn capture(
        &self,
        session: &mut dyn RenderSession,
        entry: &PageManifestEntry,
        environment: Environment,
    ) -> Result<PathBuf> {
        let path = self.layout.screenshot_path(entry, environment);
        match session.screenshot(&path).await {
            Ok(()) => {
                debug!("Captured {} {} -> {}", environment, entry, path.display());
                Ok(path)
            }
            Err(e) if e.is_session_crash() => Err(e),
            Err(Error::Capture(msg)) => Err(Error::Capture(msg)),
            Err(e) => Err(Error::Capture(format!("{} ({}): {}", entry, environment, e))),
        }
    }
}
