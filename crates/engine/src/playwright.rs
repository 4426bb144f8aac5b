//! Playwright browser automation
//!
//! Each session is a long-lived `node` process running an embedded driver
//! script. The host and the driver exchange one JSON object per line:
//! requests carry an `id` and a `cmd`, replies echo the `id` with either a
//! `result` or an `error { kind, message }`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use sitegate_common::{Error, FailedRequest, NavigationFailure, Result, Viewport};

use crate::renderer::{NavigateOptions, Navigation, PageEvents, RenderSession, Renderer};

/// Browser engine driven by Playwright
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright sessions
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    /// Node executable
    pub node_binary: PathBuf,
    /// Directory containing the `playwright` package; defaults to `./node_modules`
    pub node_modules: Option<PathBuf>,
    /// How long a browser may take to launch
    pub launch_timeout: Duration,
    /// Extra time granted to the driver beyond a command's own timeout
    pub reply_grace: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            node_binary: PathBuf::from("node"),
            node_modules: None,
            launch_timeout: Duration::from_secs(60),
            reply_grace: Duration::from_secs(30),
        }
    }
}

/// Session factory that spawns one driver process per session
pub struct PlaywrightRenderer {
    config: PlaywrightConfig,
}

impl PlaywrightRenderer {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    /// Check if Playwright is installed
    pub async fn check_installed() -> Result<()> {
        playwright_version("npx").await
    }

    fn node_path(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.config.node_modules {
            return Some(dir.clone());
        }
        if std::env::var_os("NODE_PATH").is_some() {
            return None;
        }
        std::env::current_dir().ok().map(|cwd| cwd.join("node_modules"))
    }
}

async fn playwright_version(npx: &str) -> Result<()> {
    let status = Command::new(npx)
        .args(["playwright", "--version"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            debug!("{} playwright --version exited with {}", npx, status);
            Err(Error::PlaywrightNotFound)
        }
        Err(e) => {
            debug!("Failed to run {}: {}", npx, e);
            Err(Error::PlaywrightNotFound)
        }
    }
}

#[async_trait]
impl Renderer for PlaywrightRenderer {
    async fn open(&self) -> Result<Box<dyn RenderSession>> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        let launch = json!({
            "browser": self.config.browser.as_str(),
            "headless": self.config.headless,
            "viewport": {
                "width": self.config.viewport.width,
                "height": self.config.viewport.height,
            },
        });

        let mut cmd = Command::new(&self.config.node_binary);
        cmd.arg(&script_path)
            .arg(launch.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = self.node_path() {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::SessionCrash(format!(
                "failed to spawn {}: {}",
                self.config.node_binary.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::SessionCrash("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::SessionCrash("driver stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[driver] {}", line);
                }
            });
        }

        let mut session = PlaywrightSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            reply_grace: self.config.reply_grace,
            _script_dir: script_dir,
        };

        // The driver announces readiness with id 0 once the browser is up
        let ready = timeout(self.config.launch_timeout, session.read_reply(0))
            .await
            .map_err(|_| {
                Error::SessionCrash(format!(
                    "browser did not launch within {}s",
                    self.config.launch_timeout.as_secs()
                ))
            })??;
        if let Some(err) = ready.error {
            return Err(Error::SessionCrash(format!("browser launch failed: {}", err.message)));
        }

        info!("Opened {} session (pid: {:?})", self.config.browser.as_str(), session.child.id());
        Ok(Box::new(session))
    }
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<DriverError>,
}

#[derive(Debug, Clone, Deserialize)]
struct DriverError {
    kind: String,
    message: String,
}

impl DriverError {
    fn is_closed(&self) -> bool {
        self.kind == "closed"
    }

    fn navigation_kind(&self) -> NavigationFailure {
        match self.kind.as_str() {
            "timeout" => NavigationFailure::Timeout,
            "network" => NavigationFailure::Network,
            _ => NavigationFailure::Other,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriverNavigation {
    status: u16,
    #[serde(default)]
    title: String,
    #[serde(default)]
    length: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriverEvents {
    #[serde(default)]
    console_errors: Vec<String>,
    #[serde(default)]
    failed_requests: Vec<FailedRequest>,
}

/// One running driver process
pub struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    reply_grace: Duration,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightSession {
    /// Send one command and wait for its reply. Transport failures and a
    /// silent driver are both reported as a session crash.
    async fn request(&mut self, mut command: Value, budget: Duration) -> Result<std::result::Result<Value, DriverError>> {
        let id = self.next_id;
        self.next_id += 1;
        command["id"] = json!(id);

        let mut line = serde_json::to_string(&command)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::SessionCrash(format!("driver stdin closed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::SessionCrash(format!("driver stdin closed: {}", e)))?;

        let budget = budget + self.reply_grace;
        let reply = timeout(budget, self.read_reply(id)).await.map_err(|_| {
            Error::SessionCrash(format!("driver did not answer within {}s", budget.as_secs()))
        })??;

        match reply.error {
            Some(err) if err.is_closed() => Err(Error::SessionCrash(err.message)),
            Some(err) => Ok(Err(err)),
            None => Ok(Ok(reply.result.unwrap_or(Value::Null))),
        }
    }

    async fn read_reply(&mut self, id: u64) -> Result<DriverReply> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| Error::SessionCrash(format!("driver stdout failed: {}", e)))?
                .ok_or_else(|| Error::SessionCrash("driver process exited".into()))?;

            match serde_json::from_str::<DriverReply>(&line) {
                Ok(reply) if reply.id == Some(id) => return Ok(reply),
                Ok(reply) => debug!("Ignoring stale driver reply {:?}", reply.id),
                Err(_) => debug!("[driver stdout] {}", line),
            }
        }
    }

    /// Ask the process to stop, escalating to a kill
    async fn terminate(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && timeout(Duration::from_millis(500), self.child.wait()).await.is_ok()
                {
                    return;
                }
            }
        }

        let _ = self.child.kill().await;
    }
}

#[async_trait]
impl RenderSession for PlaywrightSession {
    async fn navigate(&mut self, url: &str, options: &NavigateOptions) -> Result<Navigation> {
        debug!("Navigating to {}", url);
        let reply = self
            .request(
                json!({
                    "cmd": "navigate",
                    "url": url,
                    "timeoutMs": options.timeout.as_millis() as u64,
                    "viewport": { "width": options.viewport.width, "height": options.viewport.height },
                }),
                options.timeout,
            )
            .await?;

        match reply {
            Ok(value) => {
                let nav: DriverNavigation = serde_json::from_value(value)?;
                Ok(Navigation {
                    http_status: nav.status,
                    title: nav.title,
                    response_length: nav.length,
                })
            }
            Err(err) => Err(Error::navigation(err.navigation_kind(), err.message)),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        let reply = self
            .request(json!({ "cmd": "evaluate", "script": script }), Duration::from_secs(60))
            .await?;
        reply.map_err(|err| Error::navigation(NavigationFailure::Other, format!("script failed: {}", err.message)))
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        let reply = self
            .request(
                json!({ "cmd": "screenshot", "path": path.to_string_lossy() }),
                Duration::from_secs(60),
            )
            .await?;
        reply
            .map(|_| ())
            .map_err(|err| Error::Capture(format!("{}: {}", path.display(), err.message)))
    }

    async fn take_events(&mut self) -> Result<PageEvents> {
        let reply = self
            .request(json!({ "cmd": "events" }), Duration::from_secs(5))
            .await?;
        let value = reply.map_err(|err| Error::SessionCrash(format!("event drain failed: {}", err.message)))?;
        let events: DriverEvents = serde_json::from_value(value)?;
        Ok(PageEvents {
            console_errors: events.console_errors,
            failed_requests: events.failed_requests,
        })
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        match self.request(json!({ "cmd": "close" }), Duration::from_secs(5)).await {
            Ok(_) => {
                if timeout(Duration::from_secs(5), self.child.wait()).await.is_err() {
                    warn!("Driver did not exit after close; terminating");
                    self.terminate().await;
                }
            }
            Err(e) => {
                debug!("Close request failed ({}); terminating driver", e);
                self.terminate().await;
            }
        }
        Ok(())
    }
}

/// Node driver executed once per session
const DRIVER_SCRIPT: &str = r#"
const playwright = require('playwright');
const readline = require('readline');

const launch = JSON.parse(process.argv[2]);
const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

function classify(error) {
  const message = String((error && error.message) || error);
  if (/has been closed|crashed|Target closed|browser has disconnected/i.test(message)) return 'closed';
  if (error && error.name === 'TimeoutError') return 'timeout';
  if (/net::ERR_|NS_ERROR_|ECONNREFUSED|ECONNRESET|ENOTFOUND|EAI_AGAIN/.test(message)) return 'network';
  return 'other';
}

(async () => {
  const browser = await playwright[launch.browser].launch({ headless: launch.headless });
  browser.on('disconnected', () => process.exit(3));
  const context = await browser.newContext({ viewport: launch.viewport });
  const page = await context.newPage();

  let events = { consoleErrors: [], failedRequests: [] };
  page.on('console', (msg) => {
    if (msg.type() === 'error') events.consoleErrors.push(msg.text());
  });
  page.on('response', (response) => {
    if (response.status() >= 400) events.failedRequests.push({ url: response.url(), status: response.status() });
  });
  page.on('requestfailed', (request) => {
    const failure = request.failure();
    events.failedRequests.push({ url: request.url(), failure: failure ? failure.errorText : 'failed' });
  });

  reply({ id: 0, ok: true, result: { ready: true } });

  const lines = readline.createInterface({ input: process.stdin });
  for await (const line of lines) {
    if (!line.trim()) continue;
    let req;
    try {
      req = JSON.parse(line);
    } catch (error) {
      reply({ id: null, ok: false, error: { kind: 'other', message: 'malformed request' } });
      continue;
    }
    try {
      let result = null;
      switch (req.cmd) {
        case 'navigate': {
          if (req.viewport) await page.setViewportSize(req.viewport);
          const response = await page.goto(req.url, { waitUntil: 'networkidle', timeout: req.timeoutMs });
          let length = 0;
          try {
            length = response ? (await response.body()).length : 0;
          } catch (error) {}
          result = { status: response ? response.status() : 0, title: await page.title(), length };
          break;
        }
        case 'evaluate':
          result = await page.evaluate(req.script);
          break;
        case 'screenshot':
          await page.screenshot({ path: req.path, fullPage: true });
          result = { path: req.path };
          break;
        case 'events':
          result = events;
          events = { consoleErrors: [], failedRequests: [] };
          break;
        case 'close':
          reply({ id: req.id, ok: true, result: null });
          await browser.close();
          process.exit(0);
        default:
          throw new Error('unknown command: ' + req.cmd);
      }
      reply({ id: req.id, ok: true, result: result === undefined ? null : result });
    } catch (error) {
      reply({ id: req.id, ok: false, error: { kind: classify(error), message: String((error && error.message) || error) } });
    }
  }
  await browser.close();
})().catch((error) => {
  process.stderr.write(String((error && error.stack) || error) + '\n');
  process.exit(2);
});
"#;
