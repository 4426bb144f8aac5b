//! Sitegate verification engine
//!
//! Renders each manifest path on a baseline and a candidate deployment,
//! compares the results and classifies every page.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Verifier (config + manifest -> Report)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BatchScheduler: sequential windows, concurrent slots       │
//! │    ├── ContentChecker: HTTP status / title / length         │
//! │    └── VisualChecker (one browser session per slot)         │
//! │          ├── Renderer::open / RenderSession::navigate       │
//! │          ├── ContentNormalizer::apply                       │
//! │          ├── ScreenshotCapture::capture                     │
//! │          ├── ImageDiffEngine::compare_files                 │
//! │          └── ThresholdPolicy (classification)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ReportAggregator -> JSON + Markdown/HTML                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod checks;
pub mod classify;
pub mod config;
pub mod content;
pub mod normalize;
pub mod playwright;
pub mod renderer;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod visual;

pub use capture::{ArtifactLayout, ScreenshotCapture};
pub use checks::{ContentChecker, Targets, VisualChecker, VisualSlot};
pub use classify::{ThresholdPolicy, Verdict};
pub use config::{ReportFormat, VerifyConfig};
pub use content::{HttpFetcher, PageFetcher};
pub use normalize::ContentNormalizer;
pub use playwright::{Browser, PlaywrightConfig, PlaywrightRenderer};
pub use renderer::{NavigateOptions, Navigation, PageEvents, RenderSession, Renderer};
pub use report::{write_reports, ReportAggregator, ReportFiles, RunInfo};
pub use runner::{RunOutcome, Verifier};
pub use scheduler::{BatchScheduler, PageChecker};
pub use visual::{diff_images, DiffOutcome, ImageDiffEngine};
