//! Core types for sitegate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

/// Which deployment a render belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Baseline,
    Candidate,
}

impl Environment {
    /// Tag used in artifact file names and log lines
    pub fn tag(&self) -> &'static str {
        match self {
            Environment::Baseline => "baseline",
            Environment::Candidate => "candidate",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    /// Plain HTTP fetches: status, title and response length
    Content,
    /// Full browser render, screenshot and pixel diff
    Visual,
}

impl Default for CheckMode {
    fn default() -> Self {
        Self::Content
    }
}

impl std::fmt::Display for CheckMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckMode::Content => write!(f, "content"),
            CheckMode::Visual => write!(f, "visual"),
        }
    }
}

/// Browser viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Pixel dimensions of a raster image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A sub-request that failed while a page was loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// What one environment returned for one page path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOutcome {
    pub path: String,
    pub url: String,
    pub environment: Environment,
    pub http_status: u16,
    pub title: String,
    pub response_length: u64,
    #[serde(default)]
    pub console_errors: Vec<String>,
    #[serde(default)]
    pub failed_requests: Vec<FailedRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }
}

/// Original sizes of two screenshots that did not line up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionMismatch {
    pub baseline: ImageSize,
    pub candidate: ImageSize,
    /// The shared top-left region that was actually compared
    pub compared: ImageSize,
}

impl DimensionMismatch {
    pub fn note(&self) -> String {
        format!(
            "Dimensions: {} vs {}, compared {}",
            self.baseline, self.candidate, self.compared
        )
    }
}

/// Pixel-level comparison of two screenshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub diff_pixel_count: u64,
    pub total_pixels: u64,
    #[serde(serialize_with = "serialize_rounded")]
    pub diff_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_mismatch: Option<DimensionMismatch>,
}

impl DiffResult {
    /// Build a result over `total_pixels` compared pixels. `total_pixels` must be positive.
    pub fn new(
        diff_pixel_count: u64,
        total_pixels: u64,
        dimension_mismatch: Option<DimensionMismatch>,
    ) -> Self {
        let diff_percentage = if total_pixels == 0 {
            0.0
        } else {
            diff_pixel_count as f64 / total_pixels as f64 * 100.0
        };
        Self {
            diff_pixel_count,
            total_pixels,
            diff_percentage,
            dimension_mismatch,
        }
    }

    pub fn identical(total_pixels: u64) -> Self {
        Self::new(0, total_pixels, None)
    }

    /// Percentage rounded to three decimals, as reported
    pub fn reported_percentage(&self) -> f64 {
        round3(self.diff_percentage)
    }
}

/// Round to three decimal places
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn serialize_rounded<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round3(*value))
}

/// Verdict for one manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pass,
    Fail,
    Warn,
    Improvement,
    Error,
}

impl Status {
    /// FAIL and ERROR block a deployment; everything else lets it through
    pub fn is_blocking(&self) -> bool {
        matches!(self, Status::Fail | Status::Error)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pass => write!(f, "PASS"),
            Status::Fail => write!(f, "FAIL"),
            Status::Warn => write!(f, "WARN"),
            Status::Improvement => write!(f, "IMPROVEMENT"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

/// Files written while verifying one path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<PathBuf>,
}

/// The single outcome recorded for a manifest entry in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub path: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub artifacts: ArtifactPaths,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<RenderOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<RenderOutcome>,
}

impl ComparisonResult {
    pub fn new(path: impl Into<String>, status: Status) -> Self {
        Self {
            path: path.into(),
            status,
            diff: None,
            http_note: None,
            error_message: None,
            artifacts: ArtifactPaths::default(),
            baseline: None,
            candidate: None,
        }
    }

    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::new(path, Status::Error);
        result.error_message = Some(message.into());
        result
    }

    /// One-line explanation used by human-readable output
    pub fn reason(&self) -> String {
        if let Some(message) = &self.error_message {
            return message.clone();
        }
        let mut parts = Vec::new();
        if let Some(note) = &self.http_note {
            parts.push(note.clone());
        }
        if let Some(diff) = &self.diff {
            parts.push(format!("Visual difference: {:.3}%", diff.reported_percentage()));
            if let Some(mismatch) = &diff.dimension_mismatch {
                parts.push(mismatch.note());
            }
        }
        parts.join("; ")
    }
}

/// Aggregate counts over one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub improvements: usize,
    pub errors: usize,
    /// Mean over entries that produced a numeric diff; `None` when none did
    pub average_diff_percentage: Option<f64>,
}

/// The durable output of one verification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub mode: CheckMode,
    pub baseline_url: String,
    pub candidate_url: String,
    pub improvement_tolerant: bool,
    pub summary: ReportSummary,
    pub results: Vec<ComparisonResult>,
}

impl Report {
    pub fn has_blocking(&self) -> bool {
        self.results.iter().any(|r| r.status.is_blocking())
    }

    /// Process exit code for automation: 1 when any FAIL or ERROR is present
    pub fn exit_code(&self) -> i32 {
        if self.has_blocking() {
            1
        } else {
            0
        }
    }

    /// Every entry whose status is not PASS, in report order
    pub fn non_passing(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.results.iter().filter(|r| r.status != Status::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_percentage_matches_counts() {
        let diff = DiffResult::new(18, 1000, None);
        assert!((diff.diff_percentage - 1.8).abs() < 1e-9);
        assert_eq!(diff.reported_percentage(), 1.8);
    }

    #[test]
    fn test_diff_percentage_serialized_rounded() {
        let diff = DiffResult::new(1, 3, None);
        let value = serde_json::to_value(&diff).unwrap();
        assert_eq!(value["diff_percentage"].as_f64().unwrap(), 33.333);
        assert!(value.get("dimension_mismatch").is_none());
    }

    #[test]
    fn test_blocking_statuses() {
        assert!(Status::Fail.is_blocking());
        assert!(Status::Error.is_blocking());
        assert!(!Status::Warn.is_blocking());
        assert!(!Status::Improvement.is_blocking());
        assert!(!Status::Pass.is_blocking());
    }

    #[test]
    fn test_reason_prefers_error_message() {
        let result = ComparisonResult::error("/about", "Navigation failed (TIMEOUT): 30000ms");
        assert_eq!(result.reason(), "Navigation failed (TIMEOUT): 30000ms");
    }

    #[test]
    fn test_reason_includes_dimension_note() {
        let mut result = ComparisonResult::new("/", Status::Fail);
        result.diff = Some(DiffResult::new(
            50,
            1000,
            Some(DimensionMismatch {
                baseline: ImageSize::new(10, 100),
                candidate: ImageSize::new(10, 120),
                compared: ImageSize::new(10, 100),
            }),
        ));
        let reason = result.reason();
        assert!(reason.contains("5.000%"));
        assert!(reason.contains("10x100 vs 10x120"));
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&Status::Improvement).unwrap();
        assert_eq!(json, "\"IMPROVEMENT\"");
    }
}
