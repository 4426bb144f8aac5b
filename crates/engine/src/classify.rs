//! Page classification
//!
//! Decision order per path:
//! 1. either environment errored -> ERROR (decided by the caller, which holds the error)
//! 2. HTTP status differs -> FAIL
//! 3. both returned the same non-2xx status -> WARN
//! 4. page title differs -> FAIL
//! 5. content mode: body length drift beyond tolerance -> WARN, else PASS;
//!    visual mode: pixel diff against the thresholds

use serde::{Deserialize, Serialize};

use sitegate_common::{Error, RenderOutcome, Status};

/// Thresholds that turn measurements into a status
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub pass_threshold: f64,
    pub improvement_threshold: f64,
    /// Accept diffs in `[pass_threshold, improvement_threshold)` as IMPROVEMENT
    pub improvement_tolerant: bool,
    pub length_tolerance: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            pass_threshold: 1.0,
            improvement_threshold: 5.0,
            improvement_tolerant: false,
            length_tolerance: 0.3,
        }
    }
}

/// A status plus the detail that explains it
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: Status,
    pub note: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            status: Status::Pass,
            note: None,
        }
    }

    fn with_note(status: Status, note: impl Into<String>) -> Self {
        Self {
            status,
            note: Some(note.into()),
        }
    }
}

impl ThresholdPolicy {
    /// Checks shared by both modes. `None` means the page goes on to the
    /// mode-specific comparison.
    pub fn check_responses(&self, baseline: &RenderOutcome, candidate: &RenderOutcome) -> Option<Verdict> {
        if baseline.http_status != candidate.http_status {
            let mismatch = Error::StatusMismatch {
                baseline: baseline.http_status,
                candidate: candidate.http_status,
            };
            return Some(Verdict::with_note(Status::Fail, mismatch.to_string()));
        }

        if !baseline.is_success() {
            return Some(Verdict::with_note(
                Status::Warn,
                format!("Both environments returned HTTP {}", baseline.http_status),
            ));
        }

        if baseline.title.trim() != candidate.title.trim() {
            return Some(Verdict::with_note(
                Status::Fail,
                format!(
                    "Title mismatch. Baseline: {:?}, Candidate: {:?}",
                    baseline.title.trim(),
                    candidate.title.trim()
                ),
            ));
        }

        None
    }

    /// Content-only classification
    pub fn classify_content(&self, baseline: &RenderOutcome, candidate: &RenderOutcome) -> Verdict {
        if let Some(verdict) = self.check_responses(baseline, candidate) {
            return verdict;
        }

        let drift = length_drift(baseline.response_length, candidate.response_length);
        if drift > self.length_tolerance {
            return Verdict::with_note(
                Status::Warn,
                format!(
                    "Length drift {:.1}% (baseline {} bytes, candidate {} bytes)",
                    drift * 100.0,
                    baseline.response_length,
                    candidate.response_length
                ),
            );
        }

        Verdict::pass()
    }

    /// Status for a pixel diff percentage. Uses the unrounded value.
    pub fn classify_diff(&self, diff_percentage: f64) -> Status {
        if diff_percentage < self.pass_threshold {
            Status::Pass
        } else if self.improvement_tolerant && diff_percentage < self.improvement_threshold {
            Status::Improvement
        } else {
            Status::Fail
        }
    }
}

/// Relative body length change against the baseline
fn length_drift(baseline: u64, candidate: u64) -> f64 {
    if baseline == 0 {
        return if candidate == 0 { 0.0 } else { f64::INFINITY };
    }
    baseline.abs_diff(candidate) as f64 / baseline as f64
}
