//! Verification runner: configuration and manifest in, report out

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use sitegate_common::{CheckMode, PathManifest, Report, Result};

use crate::capture::ScreenshotCapture;
use crate::checks::{ContentChecker, Targets, VisualChecker};
use crate::config::VerifyConfig;
use crate::content::{HttpFetcher, PageFetcher};
use crate::normalize::ContentNormalizer;
use crate::playwright::{PlaywrightConfig, PlaywrightRenderer};
use crate::renderer::{NavigateOptions, Renderer};
use crate::report::{ReportAggregator, RunInfo};
use crate::scheduler::BatchScheduler;
use crate::visual::ImageDiffEngine;

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub windows: usize,
    pub duration: Duration,
}

/// Runs one verification over a manifest
pub struct Verifier {
    config: VerifyConfig,
    renderer: Option<Arc<dyn Renderer>>,
    fetcher: Option<Arc<dyn PageFetcher>>,
}

impl Verifier {
    /// Create a verifier; the configuration is validated up front
    pub fn new(config: VerifyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            renderer: None,
            fetcher: None,
        })
    }

    /// Use `renderer` for visual checks instead of spawning Playwright
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Use `fetcher` for content checks instead of the HTTP client
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Check every manifest entry and build the report
    pub async fn run(&self, manifest: &PathManifest) -> Result<RunOutcome> {
        let start = Instant::now();
        let config = &self.config;
        let scheduler = BatchScheduler::new(config.window_size(), config.item_timeout());
        let targets = Targets {
            baseline_url: config.baseline_url.clone(),
            candidate_url: config.candidate_url.clone(),
        };

        info!(
            "Verifying {} page(s) in {} mode: {} vs {} (window {})",
            manifest.len(),
            config.mode,
            config.baseline_url,
            config.candidate_url,
            scheduler.window()
        );

        let mut aggregator = ReportAggregator::new();
        let windows = match config.mode {
            CheckMode::Content => {
                let fetcher: Arc<dyn PageFetcher> = match &self.fetcher {
                    Some(fetcher) => fetcher.clone(),
                    None => Arc::new(HttpFetcher::new(config.request_timeout())?),
                };
                let checker = ContentChecker::new(fetcher, targets, config.policy());
                scheduler.run(&checker, manifest, &mut aggregator).await
            }
            CheckMode::Visual => {
                let renderer: Arc<dyn Renderer> = match &self.renderer {
                    Some(renderer) => renderer.clone(),
                    None => {
                        PlaywrightRenderer::check_installed().await?;
                        Arc::new(PlaywrightRenderer::new(PlaywrightConfig {
                            browser: config.browser,
                            headless: config.headless,
                            viewport: config.viewport,
                            ..PlaywrightConfig::default()
                        }))
                    }
                };

                let layout = config.artifact_layout();
                layout.ensure()?;

                let checker = VisualChecker::new(
                    renderer,
                    targets,
                    config.policy(),
                    NavigateOptions {
                        viewport: config.viewport,
                        timeout: config.navigation_timeout(),
                    },
                    ContentNormalizer::from_config(config),
                    ScreenshotCapture::new(layout),
                    ImageDiffEngine::new(config.pixel_threshold, config.pass_threshold),
                );
                scheduler.run(&checker, manifest, &mut aggregator).await
            }
        };

        let report = aggregator.finish(RunInfo {
            mode: config.mode,
            baseline_url: config.baseline_url.clone(),
            candidate_url: config.candidate_url.clone(),
            improvement_tolerant: config.improvement_tolerant,
        });

        let duration = start.elapsed();
        let s = &report.summary;
        info!(
            "Verification finished in {:.1}s: {} passed, {} failed, {} warnings, {} improvements, {} errors",
            duration.as_secs_f64(),
            s.passed,
            s.failed,
            s.warnings,
            s.improvements,
            s.errors
        );

        Ok(RunOutcome {
            report,
            windows,
            duration,
        })
    }
}
