//! Verification configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sitegate_common::manifest::normalize_path;
use sitegate_common::{CheckMode, Error, Result, Viewport};

use crate::capture::ArtifactLayout;
use crate::classify::ThresholdPolicy;
use crate::playwright::Browser;

/// Human-readable report flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Html,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Html => "html",
        }
    }
}

/// Full run configuration, loadable from `sitegate.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Reference deployment
    pub baseline_url: String,

    /// Deployment under verification
    pub candidate_url: String,

    pub mode: CheckMode,

    /// Accept 1.0% <= diff < 5.0% as IMPROVEMENT instead of FAIL
    pub improvement_tolerant: bool,

    pub viewport: Viewport,

    pub browser: Browser,

    pub headless: bool,

    /// Per-navigation timeout handed to the browser
    pub navigation_timeout_ms: u64,

    /// Upper bound on one manifest entry, both environments included
    pub item_timeout_ms: u64,

    /// Timeout for plain HTTP fetches in content mode
    pub request_timeout_ms: u64,

    /// Pause after navigation before normalizing
    pub settle_delay_ms: u64,

    pub scroll_increment_px: u32,

    pub scroll_pause_ms: u64,

    /// Concurrency window for content-only checks
    pub content_window: usize,

    /// Concurrency window for visual checks (one browser session per slot)
    pub visual_window: usize,

    /// Diff percentage below which a page passes
    pub pass_threshold: f64,

    /// Upper bound of the improvement band
    pub improvement_threshold: f64,

    /// Per-pixel color distance threshold on a 0-1 scale
    pub pixel_threshold: f64,

    /// Relative body length drift tolerated in content mode
    pub length_tolerance: f64,

    /// Pages that embed a third-party challenge widget
    pub challenge_pages: Vec<String>,

    pub challenge_selectors: Vec<String>,

    /// Non-deterministic overlays hidden before capture
    pub overlay_selectors: Vec<String>,

    /// Elements whose entrance effects are forced to their end state
    pub entrance_selectors: Vec<String>,

    /// Solid fill used to paint challenge widgets
    pub mask_color: String,

    pub artifacts_dir: PathBuf,

    pub reports_dir: PathBuf,

    pub report_format: ReportFormat,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            baseline_url: "https://www.avir.com".to_string(),
            candidate_url: "https://avirwebtest.pages.dev".to_string(),
            mode: CheckMode::Content,
            improvement_tolerant: false,
            viewport: Viewport::default(),
            browser: Browser::Chromium,
            headless: true,
            navigation_timeout_ms: 30_000,
            item_timeout_ms: 120_000,
            request_timeout_ms: 10_000,
            settle_delay_ms: 2_000,
            scroll_increment_px: 500,
            scroll_pause_ms: 100,
            content_window: 10,
            visual_window: 3,
            pass_threshold: 1.0,
            improvement_threshold: 5.0,
            pixel_threshold: 0.1,
            length_tolerance: 0.3,
            challenge_pages: [
                "/",
                "/commercial-form",
                "/residential-form",
                "/service-request",
                "/careers/assistant-technician",
                "/careers/integration-technician",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            challenge_selectors: [
                ".g-recaptcha",
                ".cf-turnstile",
                "[data-sitekey]",
                "iframe[src*=\"recaptcha\"]",
                "iframe[src*=\"turnstile\"]",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            overlay_selectors: [".w-form-done", ".w-form-fail", ".w-dropdown-list"]
                .into_iter()
                .map(String::from)
                .collect(),
            entrance_selectors: vec![".page-content".to_string()],
            mask_color: "#000000".to_string(),
            artifacts_dir: PathBuf::from("screenshots"),
            reports_dir: PathBuf::from("reports"),
            report_format: ReportFormat::Markdown,
        }
    }
}

impl VerifyConfig {
    /// Load configuration from file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                Error::InvalidConfig(format!("{}: {}", path.display(), e))
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("baseline_url", &self.baseline_url), ("candidate_url", &self.candidate_url)] {
            if url.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{} is empty", name)));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be an http(s) URL, got {:?}",
                    name, url
                )));
            }
        }
        if self.content_window == 0 || self.visual_window == 0 {
            return Err(Error::InvalidConfig("window sizes must be at least 1".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::InvalidConfig("viewport dimensions must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.pass_threshold)
            || !(0.0..=100.0).contains(&self.improvement_threshold)
        {
            return Err(Error::InvalidConfig("diff thresholds must lie in [0, 100]".into()));
        }
        if self.pass_threshold > self.improvement_threshold {
            return Err(Error::InvalidConfig(format!(
                "pass_threshold ({}) exceeds improvement_threshold ({})",
                self.pass_threshold, self.improvement_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.pixel_threshold) {
            return Err(Error::InvalidConfig("pixel_threshold must lie in [0, 1]".into()));
        }
        if self.length_tolerance < 0.0 {
            return Err(Error::InvalidConfig("length_tolerance must not be negative".into()));
        }
        for page in &self.challenge_pages {
            normalize_path(page).map_err(|reason| {
                Error::InvalidConfig(format!("challenge_pages entry {:?}: {}", page, reason))
            })?;
        }
        if self.scroll_increment_px == 0 {
            return Err(Error::InvalidConfig("scroll_increment_px must be positive".into()));
        }
        Ok(())
    }

    /// Window size for the configured mode
    pub fn window_size(&self) -> usize {
        match self.mode {
            CheckMode::Content => self.content_window,
            CheckMode::Visual => self.visual_window,
        }
    }

    pub fn policy(&self) -> ThresholdPolicy {
        ThresholdPolicy {
            pass_threshold: self.pass_threshold,
            improvement_threshold: self.improvement_threshold,
            improvement_tolerant: self.improvement_tolerant,
            length_tolerance: self.length_tolerance,
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Baseline, candidate and diff directories under `artifacts_dir`
    pub fn artifact_layout(&self) -> ArtifactLayout {
        ArtifactLayout::under(&self.artifacts_dir)
    }
}
