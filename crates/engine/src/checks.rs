//! Per-path checks run by the scheduler

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

use sitegate_common::{
    ArtifactPaths, ComparisonResult, Environment, Error, PageManifestEntry, RenderOutcome, Result,
};

use crate::capture::ScreenshotCapture;
use crate::classify::ThresholdPolicy;
use crate::content::PageFetcher;
use crate::normalize::ContentNormalizer;
use crate::renderer::{NavigateOptions, Navigation, RenderSession, Renderer};
use crate::scheduler::PageChecker;
use crate::visual::ImageDiffEngine;

/// The two deployments being compared
#[derive(Debug, Clone)]
pub struct Targets {
    pub baseline_url: String,
    pub candidate_url: String,
}

impl Targets {
    pub fn url(&self, entry: &PageManifestEntry, environment: Environment) -> String {
        match environment {
            Environment::Baseline => entry.url_for(&self.baseline_url),
            Environment::Candidate => entry.url_for(&self.candidate_url),
        }
    }
}

fn observed(entry: &PageManifestEntry, url: String, environment: Environment, nav: Navigation) -> RenderOutcome {
    RenderOutcome {
        path: entry.path.clone(),
        url,
        environment,
        http_status: nav.http_status,
        title: nav.title,
        response_length: nav.response_length,
        console_errors: Vec::new(),
        failed_requests: Vec::new(),
        screenshot: None,
    }
}

/// Status, title and body length over plain HTTP
pub struct ContentChecker {
    fetcher: Arc<dyn PageFetcher>,
    targets: Targets,
    policy: ThresholdPolicy,
}

impl ContentChecker {
    pub fn new(fetcher: Arc<dyn PageFetcher>, targets: Targets, policy: ThresholdPolicy) -> Self {
        Self {
            fetcher,
            targets,
            policy,
        }
    }

    async fn fetch(&self, entry: &PageManifestEntry, environment: Environment) -> Result<RenderOutcome> {
        let url = self.targets.url(entry, environment);
        let nav = self.fetcher.fetch(&url).await?;
        Ok(observed(entry, url, environment, nav))
    }
}

#[async_trait]
impl PageChecker for ContentChecker {
    type Slot = ();

    async fn check(&self, _slot: &mut (), entry: &PageManifestEntry) -> ComparisonResult {
        let (baseline, candidate) = tokio::join!(
            self.fetch(entry, Environment::Baseline),
            self.fetch(entry, Environment::Candidate)
        );

        let (baseline, candidate) = match (baseline, candidate) {
            (Ok(b), Ok(c)) => (b, c),
            (b, c) => {
                let message = render_errors(b.err(), c.err());
                error!("{}: {}", entry, message);
                return ComparisonResult::error(entry.path.clone(), message);
            }
        };

        let verdict = self.policy.classify_content(&baseline, &candidate);
        ComparisonResult {
            path: entry.path.clone(),
            status: verdict.status,
            diff: None,
            http_note: verdict.note,
            error_message: None,
            artifacts: ArtifactPaths::default(),
            baseline: Some(baseline),
            candidate: Some(candidate),
        }
    }
}

fn render_errors(baseline: Option<Error>, candidate: Option<Error>) -> String {
    match (baseline, candidate) {
        (Some(b), Some(c)) => format!("baseline: {}; candidate: {}", b, c),
        (Some(b), None) => format!("baseline: {}", b),
        (None, Some(c)) => format!("candidate: {}", c),
        (None, None) => "unknown failure".to_string(),
    }
}

/// Worker slot for visual checks; holds one lazily opened browser session
#[derive(Default)]
pub struct VisualSlot {
    session: Option<Box<dyn RenderSession>>,
}

/// Full render, normalize, capture and pixel diff
pub struct VisualChecker {
    renderer: Arc<dyn Renderer>,
    targets: Targets,
    policy: ThresholdPolicy,
    navigate: NavigateOptions,
    normalizer: ContentNormalizer,
    capture: ScreenshotCapture,
    diff: ImageDiffEngine,
}

impl VisualChecker {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        targets: Targets,
        policy: ThresholdPolicy,
        navigate: NavigateOptions,
        normalizer: ContentNormalizer,
        capture: ScreenshotCapture,
        diff: ImageDiffEngine,
    ) -> Self {
        Self {
            renderer,
            targets,
            policy,
            navigate,
            normalizer,
            capture,
            diff,
        }
    }

    async fn session<'s>(&self, slot: &'s mut VisualSlot) -> Result<&'s mut Box<dyn RenderSession>> {
        if slot.session.is_none() {
            debug!("Opening browser session");
            slot.session = Some(self.renderer.open().await?);
        }
        slot.session
            .as_mut()
            .ok_or_else(|| Error::SessionCrash("no session available".into()))
    }

    async fn render(
        &self,
        session: &mut dyn RenderSession,
        entry: &PageManifestEntry,
        environment: Environment,
    ) -> Result<RenderOutcome> {
        let url = self.targets.url(entry, environment);

        // Whatever is still buffered belongs to an earlier navigation
        session.take_events().await?;

        let nav = session.navigate(&url, &self.navigate).await?;
        self.normalizer.apply(session, entry).await?;
        let screenshot = self.capture.capture(session, entry, environment).await?;
        let events = session.take_events().await?;

        let mut outcome = observed(entry, url, environment, nav);
        outcome.console_errors = events.console_errors;
        outcome.failed_requests = events.failed_requests;
        outcome.screenshot = Some(screenshot);
        Ok(outcome)
    }

    async fn compare(&self, slot: &mut VisualSlot, entry: &PageManifestEntry) -> Result<ComparisonResult> {
        let session = self.session(slot).await?;

        // Baseline completes before candidate starts on the shared session
        let baseline = self.render(session.as_mut(), entry, Environment::Baseline).await?;
        let candidate = self.render(session.as_mut(), entry, Environment::Candidate).await?;

        let mut artifacts = ArtifactPaths {
            baseline: baseline.screenshot.clone(),
            candidate: candidate.screenshot.clone(),
            diff: None,
        };

        let (status, http_note, diff) = match self.policy.check_responses(&baseline, &candidate) {
            Some(verdict) => {
                crate::visual::remove_stale(&self.capture.layout().diff_path(entry))?;
                (verdict.status, verdict.note, None)
            }
            None => {
                let engine = self.diff;
                let baseline_png = self.capture.layout().screenshot_path(entry, Environment::Baseline);
                let candidate_png = self.capture.layout().screenshot_path(entry, Environment::Candidate);
                let diff_png = self.capture.layout().diff_path(entry);

                let outcome = tokio::task::spawn_blocking(move || {
                    engine.compare_files(&baseline_png, &candidate_png, &diff_png)
                })
                .await
                .map_err(|e| Error::DiffCompute(format!("diff task failed: {}", e)))??;

                artifacts.diff = outcome.diff_image;
                let status = self.policy.classify_diff(outcome.result.diff_percentage);
                (status, None, Some(outcome.result))
            }
        };

        Ok(ComparisonResult {
            path: entry.path.clone(),
            status,
            diff,
            http_note,
            error_message: None,
            artifacts,
            baseline: Some(baseline),
            candidate: Some(candidate),
        })
    }
}

#[async_trait]
impl PageChecker for VisualChecker {
    type Slot = VisualSlot;

    async fn check(&self, slot: &mut VisualSlot, entry: &PageManifestEntry) -> ComparisonResult {
        match self.compare(slot, entry).await {
            Ok(result) => result,
            Err(e) => {
                if e.is_session_crash() {
                    // The failed path stays ERROR; the next path gets a fresh session
                    warn!("Session lost while checking {}: {}", entry, e);
                    slot.session = None;
                } else {
                    error!("{}: {}", entry, e);
                }
                ComparisonResult::error(entry.path.clone(), e.to_string())
            }
        }
    }

    async fn release(&self, slot: VisualSlot) {
        if let Some(session) = slot.session {
            if let Err(e) = session.close().await {
                warn!("Failed to close browser session: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_build_urls_per_environment() {
        let targets = Targets {
            baseline_url: "https://www.example.com/".into(),
            candidate_url: "https://staging.example.com".into(),
        };
        let entry = PageManifestEntry::parse("/about").unwrap();
        assert_eq!(targets.url(&entry, Environment::Baseline), "https://www.example.com/about");
        assert_eq!(targets.url(&entry, Environment::Candidate), "https://staging.example.com/about");
    }

    #[test]
    fn test_render_errors_names_each_side() {
        let msg = render_errors(
            Some(Error::navigation(sitegate_common::NavigationFailure::Timeout, "10s")),
            None,
        );
        assert_eq!(msg, "baseline: Navigation failed (TIMEOUT): 10s");
    }
}
