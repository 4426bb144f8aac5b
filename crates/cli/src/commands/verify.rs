//! Verify Command
//!
//! Compares every manifest page on the candidate deployment against the
//! baseline and writes the run's reports.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use sitegate_common::{CheckMode, PathManifest, Report};
use sitegate_engine::{write_reports, ReportFormat, Verifier, VerifyConfig};

use crate::output::{self, OutputFormat};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// HTTP status, title and response length only
    Content,
    /// Full render, screenshot and pixel diff
    Visual,
}

impl From<ModeArg> for CheckMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Content => CheckMode::Content,
            ModeArg::Visual => CheckMode::Visual,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormatArg {
    Markdown,
    Html,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(format: ReportFormatArg) -> Self {
        match format {
            ReportFormatArg::Markdown => ReportFormat::Markdown,
            ReportFormatArg::Html => ReportFormat::Html,
        }
    }
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Check mode (defaults to the configured mode)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Verify a single page instead of the manifest
    #[arg(long)]
    pub page: Option<String>,

    /// Manifest file, one page path per line
    #[arg(long, default_value = "pages.txt", env = "SITEGATE_MANIFEST")]
    pub manifest: PathBuf,

    /// Configuration file
    #[arg(long, default_value = "sitegate.toml", env = "SITEGATE_CONFIG")]
    pub config: PathBuf,

    /// Reference deployment
    #[arg(long, env = "SITEGATE_BASELINE_URL")]
    pub baseline_url: Option<String>,

    /// Deployment under verification
    #[arg(long, env = "SITEGATE_CANDIDATE_URL")]
    pub candidate_url: Option<String>,

    /// Accept diffs below the improvement threshold as IMPROVEMENT
    #[arg(long)]
    pub improvement_tolerant: bool,

    /// Concurrency window for the selected mode
    #[arg(long)]
    pub window: Option<usize>,

    /// Report directory
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Human-readable report format
    #[arg(long, value_enum)]
    pub report_format: Option<ReportFormatArg>,
}

impl VerifyArgs {
    /// Layer command-line overrides over the file configuration
    pub fn apply(&self, config: &mut VerifyConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(url) = &self.baseline_url {
            config.baseline_url = url.clone();
        }
        if let Some(url) = &self.candidate_url {
            config.candidate_url = url.clone();
        }
        if self.improvement_tolerant {
            config.improvement_tolerant = true;
        }
        if let Some(window) = self.window {
            match config.mode {
                CheckMode::Content => config.content_window = window,
                CheckMode::Visual => config.visual_window = window,
            }
        }
        if let Some(dir) = &self.output {
            config.reports_dir = dir.clone();
        }
        if let Some(format) = self.report_format {
            config.report_format = format.into();
        }
    }

    fn load_manifest(&self) -> Result<PathManifest> {
        match &self.page {
            Some(page) => PathManifest::from_paths([page.as_str()])
                .with_context(|| format!("Invalid page {:?}", page)),
            None => PathManifest::load(&self.manifest)
                .with_context(|| format!("Failed to load manifest {}", self.manifest.display())),
        }
    }
}

/// Run a verification and return the process exit code
pub async fn execute(args: VerifyArgs, format: OutputFormat) -> Result<i32> {
    let mut config = VerifyConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    args.apply(&mut config);

    let manifest = args.load_manifest()?;
    let verifier = Verifier::new(config).context("Invalid configuration")?;
    let outcome = verifier.run(&manifest).await.context("Verification failed")?;

    let config = verifier.config();
    let files = write_reports(&outcome.report, &config.reports_dir, config.report_format)
        .context("Failed to write reports")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        }
        OutputFormat::Table => {
            output::print_results(&outcome.report.results);
            print_summary(&outcome.report);
            output::print_info(&format!("JSON report: {}", files.json.display()));
            output::print_info(&format!("Report: {}", files.human.display()));
        }
    }

    Ok(outcome.report.exit_code())
}

fn print_summary(report: &Report) {
    let s = &report.summary;
    println!();
    println!("{}", "Summary".bold());
    println!("   Total:        {}", s.total);
    println!("   Passed:       {}", s.passed.to_string().green());
    println!("   Failed:       {}", s.failed.to_string().red());
    println!("   Warnings:     {}", s.warnings.to_string().yellow());
    println!("   Improvements: {}", s.improvements.to_string().blue());
    println!("   Errors:       {}", s.errors.to_string().red());
    if let Some(avg) = s.average_diff_percentage {
        println!("   Average diff: {:.3}%", avg);
    }
    println!();

    for result in report.non_passing() {
        println!("   {} {}: {}", output::status_badge(result.status), result.path, result.reason());
    }

    if report.has_blocking() {
        output::print_error("Candidate deployment has regressions");
    } else if s.warnings > 0 || s.improvements > 0 {
        output::print_warning("Candidate deployment passed with warnings");
    } else {
        output::print_success("All pages passed");
    }
}
