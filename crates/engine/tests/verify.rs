//! End-to-end runs of the verifier against in-memory deployments

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sitegate_common::{CheckMode, Error, NavigationFailure, PageManifestEntry, PathManifest, Result, Status};
use sitegate_engine::{
    ArtifactLayout, NavigateOptions, Navigation, PageEvents, PageFetcher, RenderSession, Renderer, Verifier, VerifyConfig,
};

const BASELINE: &str = "https://baseline.test";
const CANDIDATE: &str = "https://candidate.test";

#[derive(Clone)]
struct Page {
    status: u16,
    title: String,
    height: u32,
    dark_pixels: u32,
    console_errors: Vec<String>,
}

impl Page {
    fn ok() -> Self {
        Self {
            status: 200,
            title: "Home".to_string(),
            height: 10,
            dark_pixels: 0,
            console_errors: Vec::new(),
        }
    }

    fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn dark(mut self, dark_pixels: u32) -> Self {
        self.dark_pixels = dark_pixels;
        self
    }

    fn height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    fn console(mut self, message: &str) -> Self {
        self.console_errors.push(message.to_string());
        self
    }

    /// 100 pixels wide, white, with the first `dark_pixels` painted black
    fn image(&self) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(100, self.height, Rgba([255, 255, 255, 255]));
        for n in 0..self.dark_pixels {
            img.put_pixel(n % 100, n / 100, Rgba([0, 0, 0, 255]));
        }
        img
    }
}

#[derive(Clone)]
enum Behavior {
    Serve(Page),
    Crash,
    Fail(NavigationFailure),
    Hang,
}

/// Both deployments, keyed by absolute URL
#[derive(Default)]
struct Site {
    urls: HashMap<String, Behavior>,
    navigations: Mutex<HashMap<String, usize>>,
}

impl Site {
    fn serve(mut self, path: &str, baseline: Behavior, candidate: Behavior) -> Self {
        self.urls.insert(format!("{}{}", BASELINE, path), baseline);
        self.urls.insert(format!("{}{}", CANDIDATE, path), candidate);
        self
    }

    fn same(self, path: &str, page: Page) -> Self {
        self.serve(path, Behavior::Serve(page.clone()), Behavior::Serve(page))
    }

    fn navigations_to(&self, url: &str) -> usize {
        self.navigations.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn lookup(&self, url: &str) -> Behavior {
        *self.navigations.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.urls
            .get(url)
            .cloned()
            .unwrap_or(Behavior::Fail(NavigationFailure::Network))
    }
}

struct FakeRenderer {
    site: Arc<Site>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl FakeRenderer {
    fn new(site: Arc<Site>) -> Self {
        Self {
            site,
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn open(&self) -> Result<Box<dyn RenderSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            site: self.site.clone(),
            current: None,
            events: PageEvents::default(),
            closed: self.closed.clone(),
        }))
    }
}

struct FakeSession {
    site: Arc<Site>,
    current: Option<Page>,
    events: PageEvents,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&mut self, url: &str, _options: &NavigateOptions) -> Result<Navigation> {
        self.current = None;
        match self.site.lookup(url) {
            Behavior::Serve(page) => {
                self.events.console_errors.extend(page.console_errors.iter().cloned());
                let nav = Navigation {
                    http_status: page.status,
                    title: page.title.clone(),
                    response_length: 1000,
                };
                self.current = Some(page);
                Ok(nav)
            }
            Behavior::Crash => Err(Error::SessionCrash(
                "Target page, context or browser has been closed".into(),
            )),
            Behavior::Fail(kind) => Err(Error::navigation(kind, format!("{} unreachable", url))),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::navigation(NavigationFailure::Timeout, "hung"))
            }
        }
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!(0))
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        let page = self
            .current
            .as_ref()
            .ok_or_else(|| Error::Capture("nothing loaded".into()))?;
        page.image()
            .save(path)
            .map_err(|e| Error::Capture(e.to_string()))
    }

    async fn take_events(&mut self) -> Result<PageEvents> {
        Ok(std::mem::take(&mut self.events))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeFetcher {
    site: Arc<Site>,
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Navigation> {
        match self.site.lookup(url) {
            Behavior::Serve(page) => Ok(Navigation {
                http_status: page.status,
                title: page.title,
                response_length: 1000 + page.dark_pixels as u64,
            }),
            Behavior::Fail(kind) => Err(Error::navigation(kind, url.to_string())),
            Behavior::Crash | Behavior::Hang => Err(Error::navigation(NavigationFailure::Other, url.to_string())),
        }
    }
}

fn visual_config(artifacts: &Path, window: usize) -> VerifyConfig {
    VerifyConfig {
        baseline_url: BASELINE.to_string(),
        candidate_url: CANDIDATE.to_string(),
        mode: CheckMode::Visual,
        visual_window: window,
        settle_delay_ms: 0,
        scroll_pause_ms: 0,
        item_timeout_ms: 5_000,
        artifacts_dir: artifacts.to_path_buf(),
        reports_dir: artifacts.join("reports"),
        ..VerifyConfig::default()
    }
}

fn manifest(paths: &[&str]) -> PathManifest {
    PathManifest::from_paths(paths.iter().copied()).unwrap()
}

#[tokio::test]
async fn test_identical_pages_pass() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(Site::default().same("/", Page::ok()).same("/about", Page::ok().dark(40)));
    let renderer = Arc::new(FakeRenderer::new(site));

    let outcome = Verifier::new(visual_config(dir.path(), 3))
        .unwrap()
        .with_renderer(renderer.clone())
        .run(&manifest(&["/", "/about"]))
        .await
        .unwrap();

    let summary = &outcome.report.summary;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.average_diff_percentage, Some(0.0));
    assert_eq!(outcome.report.exit_code(), 0);
    assert_eq!(outcome.windows, 1);

    for result in &outcome.report.results {
        let diff = result.diff.as_ref().unwrap();
        assert_eq!(diff.diff_pixel_count, 0);
        assert!(result.artifacts.baseline.as_ref().unwrap().exists());
        assert!(result.artifacts.candidate.as_ref().unwrap().exists());
        assert!(result.artifacts.diff.is_none());
    }

    // Two slots were used and both sessions were released
    assert_eq!(renderer.opened.load(Ordering::SeqCst), 2);
    assert_eq!(renderer.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_status_mismatch_fails() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(Site::default().serve(
        "/pricing",
        Behavior::Serve(Page::ok().status(500)),
        Behavior::Serve(Page::ok()),
    ));

    // A diff image from an earlier run must not outlive this one
    let stale = ArtifactLayout::under(dir.path()).diff_path(&PageManifestEntry::parse("/pricing").unwrap());
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, b"old").unwrap();

    let outcome = Verifier::new(visual_config(dir.path(), 3))
        .unwrap()
        .with_renderer(Arc::new(FakeRenderer::new(site)))
        .run(&manifest(&["/pricing"]))
        .await
        .unwrap();

    let result = &outcome.report.results[0];
    assert_eq!(result.status, Status::Fail);
    assert_eq!(
        result.http_note.as_deref(),
        Some("Status mismatch. Baseline: 500, Candidate: 200")
    );
    assert!(result.diff.is_none());
    assert!(result.artifacts.diff.is_none());
    assert!(!stale.exists());
    assert_eq!(outcome.report.exit_code(), 1);
}

#[tokio::test]
async fn test_matching_error_status_warns() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(Site::default().same("/gone", Page::ok().status(404)));

    let outcome = Verifier::new(visual_config(dir.path(), 3))
        .unwrap()
        .with_renderer(Arc::new(FakeRenderer::new(site)))
        .run(&manifest(&["/gone"]))
        .await
        .unwrap();

    assert_eq!(outcome.report.results[0].status, Status::Warn);
    assert_eq!(outcome.report.summary.warnings, 1);
    assert_eq!(outcome.report.exit_code(), 0);
}

#[tokio::test]
async fn test_improvement_band_depends_on_mode() {
    // 18 of 1000 pixels differ: 1.8%
    let site = Arc::new(Site::default().serve(
        "/services",
        Behavior::Serve(Page::ok()),
        Behavior::Serve(Page::ok().dark(18)),
    ));

    for (tolerant, expected, exit_code) in [(true, Status::Improvement, 0), (false, Status::Fail, 1)] {
        let dir = tempfile::tempdir().unwrap();
        let config = VerifyConfig {
            improvement_tolerant: tolerant,
            ..visual_config(dir.path(), 3)
        };
        let outcome = Verifier::new(config)
            .unwrap()
            .with_renderer(Arc::new(FakeRenderer::new(site.clone())))
            .run(&manifest(&["/services"]))
            .await
            .unwrap();

        let result = &outcome.report.results[0];
        assert_eq!(result.status, expected);
        assert_eq!(result.diff.as_ref().unwrap().reported_percentage(), 1.8);
        assert!(result.artifacts.diff.as_ref().unwrap().exists());
        assert_eq!(outcome.report.exit_code(), exit_code);
        assert_eq!(outcome.report.improvement_tolerant, tolerant);
    }
}

#[tokio::test]
async fn test_dimension_mismatch_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(Site::default().serve(
        "/blog",
        Behavior::Serve(Page::ok().height(10)),
        Behavior::Serve(Page::ok().height(12)),
    ));

    let outcome = Verifier::new(visual_config(dir.path(), 3))
        .unwrap()
        .with_renderer(Arc::new(FakeRenderer::new(site)))
        .run(&manifest(&["/blog"]))
        .await
        .unwrap();

    let result = &outcome.report.results[0];
    let diff = result.diff.as_ref().unwrap();
    assert_eq!(diff.total_pixels, 1000);
    assert_eq!(result.status, Status::Pass);

    let mismatch = diff.dimension_mismatch.unwrap();
    assert_eq!((mismatch.baseline.width, mismatch.baseline.height), (100, 10));
    assert_eq!((mismatch.candidate.width, mismatch.candidate.height), (100, 12));
    assert!(result.reason().contains("100x10 vs 100x12"));
}

#[tokio::test]
async fn test_session_crash_reopens_and_never_retries() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(
        Site::default()
            .same("/a", Page::ok())
            .serve("/crash", Behavior::Crash, Behavior::Serve(Page::ok()))
            .same("/b", Page::ok())
            .same("/c", Page::ok()),
    );
    let renderer = Arc::new(FakeRenderer::new(site.clone()));

    let outcome = Verifier::new(visual_config(dir.path(), 1))
        .unwrap()
        .with_renderer(renderer.clone())
        .run(&manifest(&["/a", "/crash", "/b", "/c"]))
        .await
        .unwrap();

    let statuses: Vec<_> = outcome.report.results.iter().map(|r| (r.path.as_str(), r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("/a", Status::Pass),
            ("/crash", Status::Error),
            ("/b", Status::Pass),
            ("/c", Status::Pass),
        ]
    );
    let crashed = &outcome.report.results[1];
    assert!(crashed.error_message.as_deref().unwrap().contains("has been closed"));

    assert_eq!(renderer.opened.load(Ordering::SeqCst), 2);
    assert_eq!(site.navigations_to(&format!("{}/crash", BASELINE)), 1);
    assert_eq!(site.navigations_to(&format!("{}/crash", CANDIDATE)), 0);
    assert_eq!(outcome.windows, 4);
}

#[tokio::test]
async fn test_navigation_errors_do_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(
        Site::default()
            .serve(
                "/down",
                Behavior::Serve(Page::ok()),
                Behavior::Fail(NavigationFailure::Timeout),
            )
            .same("/up", Page::ok()),
    );

    let outcome = Verifier::new(visual_config(dir.path(), 2))
        .unwrap()
        .with_renderer(Arc::new(FakeRenderer::new(site)))
        .run(&manifest(&["/down", "/up"]))
        .await
        .unwrap();

    let down = &outcome.report.results[0];
    assert_eq!(down.status, Status::Error);
    assert!(down.error_message.as_deref().unwrap().contains("TIMEOUT"));
    assert!(down.diff.is_none());
    assert_eq!(outcome.report.results[1].status, Status::Pass);

    // The errored entry is excluded from the average rather than counted as zero
    assert_eq!(outcome.report.summary.average_diff_percentage, Some(0.0));
    assert_eq!(outcome.report.exit_code(), 1);
}

#[tokio::test]
async fn test_hung_item_times_out_alone() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(
        Site::default()
            .serve("/hang", Behavior::Hang, Behavior::Serve(Page::ok()))
            .same("/fine", Page::ok()),
    );
    let renderer = Arc::new(FakeRenderer::new(site));
    let config = VerifyConfig {
        item_timeout_ms: 300,
        ..visual_config(dir.path(), 2)
    };

    let outcome = Verifier::new(config)
        .unwrap()
        .with_renderer(renderer.clone())
        .run(&manifest(&["/hang", "/fine"]))
        .await
        .unwrap();

    assert_eq!(outcome.report.results[0].status, Status::Error);
    assert!(outcome.report.results[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("timed out"));
    assert_eq!(outcome.report.results[1].status, Status::Pass);

    // The abandoned session was dropped, only the healthy one was closed
    assert_eq!(renderer.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_result_and_window_counts() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<String> = (0..7).map(|i| format!("/p{}", i)).collect();
    let site = paths
        .iter()
        .fold(Site::default(), |site, path| site.same(path, Page::ok()));
    let manifest = PathManifest::from_paths(paths.iter().map(String::as_str)).unwrap();

    let outcome = Verifier::new(visual_config(dir.path(), 3))
        .unwrap()
        .with_renderer(Arc::new(FakeRenderer::new(Arc::new(site))))
        .run(&manifest)
        .await
        .unwrap();

    assert_eq!(outcome.report.results.len(), 7);
    assert_eq!(outcome.windows, 3);
}

#[tokio::test]
async fn test_console_errors_stay_with_their_page() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(
        Site::default()
            .serve(
                "/noisy",
                Behavior::Serve(Page::ok()),
                Behavior::Serve(Page::ok().console("Uncaught ReferenceError: gtag is not defined")),
            )
            .same("/quiet", Page::ok()),
    );

    let outcome = Verifier::new(visual_config(dir.path(), 1))
        .unwrap()
        .with_renderer(Arc::new(FakeRenderer::new(site)))
        .run(&manifest(&["/noisy", "/quiet"]))
        .await
        .unwrap();

    let noisy = &outcome.report.results[0];
    assert!(noisy.baseline.as_ref().unwrap().console_errors.is_empty());
    assert_eq!(noisy.candidate.as_ref().unwrap().console_errors.len(), 1);

    let quiet = &outcome.report.results[1];
    assert!(quiet.baseline.as_ref().unwrap().console_errors.is_empty());
    assert!(quiet.candidate.as_ref().unwrap().console_errors.is_empty());
}

#[tokio::test]
async fn test_content_mode() {
    let site = Arc::new(
        Site::default()
            .same("/", Page::ok())
            .serve(
                "/about",
                Behavior::Serve(Page::ok()),
                Behavior::Serve(Page {
                    title: "About".to_string(),
                    ..Page::ok()
                }),
            )
            .serve("/grown", Behavior::Serve(Page::ok()), Behavior::Serve(Page::ok().dark(400)))
            .serve(
                "/offline",
                Behavior::Fail(NavigationFailure::Network),
                Behavior::Serve(Page::ok()),
            ),
    );
    let config = VerifyConfig {
        baseline_url: BASELINE.to_string(),
        candidate_url: CANDIDATE.to_string(),
        mode: CheckMode::Content,
        content_window: 10,
        ..VerifyConfig::default()
    };

    let outcome = Verifier::new(config)
        .unwrap()
        .with_fetcher(Arc::new(FakeFetcher { site }))
        .run(&manifest(&["/", "/about", "/grown", "/offline"]))
        .await
        .unwrap();

    let status = |path: &str| {
        outcome
            .report
            .results
            .iter()
            .find(|r| r.path == path)
            .map(|r| r.status)
            .unwrap()
    };
    assert_eq!(status("/"), Status::Pass);
    assert_eq!(status("/about"), Status::Fail);
    assert_eq!(status("/grown"), Status::Warn);
    assert_eq!(status("/offline"), Status::Error);

    let summary = &outcome.report.summary;
    assert_eq!(summary.total, 4);
    assert_eq!(summary.average_diff_percentage, None);
    assert_eq!(outcome.windows, 1);
    assert_eq!(outcome.report.exit_code(), 1);
}
