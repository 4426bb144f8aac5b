//! Renderer capability - a headless browser session behind a trait
//!
//! A `Renderer` hands out sessions; a session is reused sequentially across
//! many navigations. Console errors and failed sub-requests are buffered by
//! the session and drained with [`RenderSession::take_events`], so whatever
//! arrives after a drain is attributed to the next page, never the previous one.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use sitegate_common::{FailedRequest, Result, Viewport};

/// Options for one navigation
#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub viewport: Viewport,
    pub timeout: Duration,
}

/// What the browser reported once network activity settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub http_status: u16,
    pub title: String,
    pub response_length: u64,
}

/// Asynchronous page events collected since the previous drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageEvents {
    pub console_errors: Vec<String>,
    pub failed_requests: Vec<FailedRequest>,
}

/// One live browser session.
///
/// Any method may fail with `Error::SessionCrash`, after which the session is
/// unusable and must be replaced through [`Renderer::open`].
#[async_trait]
pub trait RenderSession: Send {
    /// Load `url` and wait until network activity settles
    async fn navigate(&mut self, url: &str, options: &NavigateOptions) -> Result<Navigation>;

    /// Evaluate a JavaScript expression in the page; promises are awaited
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    /// Write a full-document PNG screenshot to `path`
    async fn screenshot(&mut self, path: &Path) -> Result<()>;

    /// Drain buffered console and network events
    async fn take_events(&mut self) -> Result<PageEvents>;

    /// Release the session
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Factory for browser sessions
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderSession>>;
}
