//! Result aggregation and report rendering
//!
//! The JSON and the human-readable report are both projections of one
//! [`Report`] value.

use chrono::Utc;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use sitegate_common::{CheckMode, ComparisonResult, Report, ReportSummary, Result, Status};

use crate::config::ReportFormat;

/// Run-level facts copied into the report header
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub mode: CheckMode,
    pub baseline_url: String,
    pub candidate_url: String,
    pub improvement_tolerant: bool,
}

/// Append-only collection of per-path results
#[derive(Debug, Default)]
pub struct ReportAggregator {
    results: Vec<ComparisonResult>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: ComparisonResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[ComparisonResult] {
        &self.results
    }

    /// Build the final report
    pub fn finish(self, run: RunInfo) -> Report {
        let summary = summarize(&self.results);
        Report {
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            mode: run.mode,
            baseline_url: run.baseline_url,
            candidate_url: run.candidate_url,
            improvement_tolerant: run.improvement_tolerant,
            summary,
            results: self.results,
        }
    }
}

/// Summary counts. The mean diff only covers entries that produced a diff.
pub fn summarize(results: &[ComparisonResult]) -> ReportSummary {
    let count = |status: Status| results.iter().filter(|r| r.status == status).count();
    let diffs: Vec<f64> = results
        .iter()
        .filter_map(|r| r.diff.as_ref().map(|d| d.diff_percentage))
        .collect();
    let average_diff_percentage = if diffs.is_empty() {
        None
    } else {
        Some(sitegate_common::round3(diffs.iter().sum::<f64>() / diffs.len() as f64))
    };

    ReportSummary {
        total: results.len(),
        passed: count(Status::Pass),
        failed: count(Status::Fail),
        warnings: count(Status::Warn),
        improvements: count(Status::Improvement),
        errors: count(Status::Error),
        average_diff_percentage,
    }
}

/// Files written for one run
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub json: PathBuf,
    pub human: PathBuf,
}

/// Write the JSON report and the human-readable report into `dir`.
///
/// Existing reports are never overwritten.
pub fn write_reports(report: &Report, dir: &Path, format: ReportFormat) -> Result<ReportFiles> {
    std::fs::create_dir_all(dir)?;
    let stem = report_stem(report);

    let json = dir.join(format!("{}.json", stem));
    write_new(&json, &render_json(report)?)?;

    let human = dir.join(format!("{}.{}", stem, format.extension()));
    let body = match format {
        ReportFormat::Markdown => render_markdown(report),
        ReportFormat::Html => render_html(report),
    };
    write_new(&human, &body)?;

    info!("Reports written to {} and {}", json.display(), human.display());
    Ok(ReportFiles { json, human })
}

/// `sitegate-report-<UTC millis>-<run id prefix>`
fn report_stem(report: &Report) -> String {
    let run: String = report
        .run_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    format!(
        "sitegate-report-{}-{}",
        report.timestamp.format("%Y%m%dT%H%M%S%3fZ"),
        run
    )
}

fn write_new(path: &Path, contents: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

pub fn render_json(report: &Report) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn average_label(summary: &ReportSummary) -> String {
    match summary.average_diff_percentage {
        Some(avg) => format!("{:.3}%", avg),
        None => "n/a".to_string(),
    }
}

pub fn render_markdown(report: &Report) -> String {
    let s = &report.summary;
    let mut out = String::new();

    let _ = writeln!(out, "# Sitegate verification report\n");
    let _ = writeln!(out, "- Run: `{}`", report.run_id);
    let _ = writeln!(out, "- Date: {}", report.timestamp.to_rfc3339());
    let _ = writeln!(out, "- Mode: {}", report.mode);
    let _ = writeln!(out, "- Baseline: {}", report.baseline_url);
    let _ = writeln!(out, "- Candidate: {}", report.candidate_url);
    let _ = writeln!(
        out,
        "- Improvement tolerant: {}\n",
        if report.improvement_tolerant { "yes" } else { "no" }
    );

    let _ = writeln!(out, "## Summary\n");
    let _ = writeln!(out, "| Total | Passed | Failed | Warnings | Improvements | Errors | Avg diff |");
    let _ = writeln!(out, "|---|---|---|---|---|---|---|");
    let _ = writeln!(
        out,
        "| {} | {} | {} | {} | {} | {} | {} |\n",
        s.total,
        s.passed,
        s.failed,
        s.warnings,
        s.improvements,
        s.errors,
        average_label(s)
    );

    let _ = writeln!(out, "## Pages needing attention\n");
    let mut any = false;
    for result in report.non_passing() {
        any = true;
        let _ = writeln!(out, "- **{}** `{}`: {}", result.status, result.path, result.reason());
        if let Some(diff) = &result.artifacts.diff {
            let _ = writeln!(out, "  - diff: `{}`", diff.display());
        }
    }
    if !any {
        let _ = writeln!(out, "All pages passed.");
    }

    let observed: Vec<_> = report
        .results
        .iter()
        .filter(|r| {
            [&r.baseline, &r.candidate].iter().any(|o| {
                o.as_ref()
                    .map(|o| !o.console_errors.is_empty() || !o.failed_requests.is_empty())
                    .unwrap_or(false)
            })
        })
        .collect();
    if !observed.is_empty() {
        let _ = writeln!(out, "\n## Page observations\n");
        for result in observed {
            for outcome in [&result.baseline, &result.candidate].into_iter().flatten() {
                if outcome.console_errors.is_empty() && outcome.failed_requests.is_empty() {
                    continue;
                }
                let _ = writeln!(
                    out,
                    "- `{}` ({}): {} console error(s), {} failed request(s)",
                    result.path,
                    outcome.environment,
                    outcome.console_errors.len(),
                    outcome.failed_requests.len()
                );
            }
        }
    }

    out
}

pub fn render_html(report: &Report) -> String {
    let s = &report.summary;
    let mut rows = String::new();
    for result in &report.results {
        let diff = result
            .diff
            .as_ref()
            .map(|d| format!("{:.3}%", d.reported_percentage()))
            .unwrap_or_default();
        let _ = writeln!(
            rows,
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            result.status.to_string().to_lowercase(),
            escape_html(&result.path),
            result.status,
            diff,
            escape_html(&result.reason())
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Sitegate report {run_id}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; width: 100%; }}
td, th {{ border: 1px solid #ccc; padding: 4px 8px; text-align: left; }}
tr.pass td:nth-child(3) {{ color: #2e7d32; }}
tr.fail td:nth-child(3), tr.error td:nth-child(3) {{ color: #c62828; font-weight: bold; }}
tr.warn td:nth-child(3) {{ color: #ef6c00; }}
tr.improvement td:nth-child(3) {{ color: #1565c0; }}
</style>
</head>
<body>
<h1>Sitegate verification report</h1>
<p>{date} &middot; mode {mode} &middot; baseline {baseline} &middot; candidate {candidate} &middot; improvement tolerant: {tolerant}</p>
<h2>Summary</h2>
<p>Total {total}, passed {passed}, failed {failed}, warnings {warnings}, improvements {improvements}, errors {errors}, average diff {avg}</p>
<h2>Results</h2>
<table>
<tr><th>Path</th><th>Status</th><th>Diff</th><th>Reason</th></tr>
{rows}</table>
</body>
</html>
"#,
        run_id = report.run_id,
        date = report.timestamp.to_rfc3339(),
        mode = report.mode,
        baseline = escape_html(&report.baseline_url),
        candidate = escape_html(&report.candidate_url),
        tolerant = if report.improvement_tolerant { "yes" } else { "no" },
        total = s.total,
        passed = s.passed,
        failed = s.failed,
        warnings = s.warnings,
        improvements = s.improvements,
        errors = s.errors,
        avg = average_label(s),
        rows = rows,
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
