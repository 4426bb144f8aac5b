//! Pre-capture page normalization
//!
//! Every step only touches the live DOM and can be applied any number of
//! times with the same result.

use serde_json::json;
use std::time::Duration;
use tracing::debug;

use sitegate_common::manifest::normalize_path;
use sitegate_common::{PageManifestEntry, Result};

use crate::config::VerifyConfig;
use crate::renderer::RenderSession;

const STYLE_ID: &str = "sitegate-normalize";
const MASK_CLASS: &str = "sitegate-mask";

/// Removes time-dependent and non-deterministic visual noise from a rendered page
#[derive(Debug, Clone)]
pub struct ContentNormalizer {
    overlay_selectors: Vec<String>,
    entrance_selectors: Vec<String>,
    challenge_pages: Vec<String>,
    challenge_selectors: Vec<String>,
    mask_color: String,
    scroll_increment_px: u32,
    scroll_pause: Duration,
    settle_delay: Duration,
}

impl ContentNormalizer {
    pub fn from_config(config: &VerifyConfig) -> Self {
        Self {
            overlay_selectors: config.overlay_selectors.clone(),
            entrance_selectors: config.entrance_selectors.clone(),
            challenge_pages: config
                .challenge_pages
                .iter()
                .filter_map(|page| normalize_path(page).ok())
                .collect(),
            challenge_selectors: config.challenge_selectors.clone(),
            mask_color: config.mask_color.clone(),
            scroll_increment_px: config.scroll_increment_px,
            scroll_pause: Duration::from_millis(config.scroll_pause_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }

    /// Override the pause after scrolling
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Whether `entry` embeds a third-party challenge widget
    pub fn is_challenge_page(&self, entry: &PageManifestEntry) -> bool {
        self.challenge_pages.iter().any(|p| p == &entry.path)
    }

    /// Normalize the page currently loaded in `session`
    pub async fn apply(&self, session: &mut dyn RenderSession, entry: &PageManifestEntry) -> Result<()> {
        session.evaluate(&self.style_script()).await?;
        session.evaluate(&self.scroll_script()).await?;

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        if self.is_challenge_page(entry) {
            let masked = session.evaluate(&self.mask_script()).await?;
            debug!("Masked {} challenge widget(s) on {}", masked.as_u64().unwrap_or(0), entry);
        }

        Ok(())
    }

    /// Stylesheet that freezes motion, settles entrance effects and hides overlays
    pub fn stylesheet(&self) -> String {
        let mut css = String::from(
            "*, *::before, *::after { animation: none !important; transition: none !important; caret-color: transparent !important; }\n",
        );
        if !self.entrance_selectors.is_empty() {
            css.push_str(&format!(
                "{} {{ opacity: 1 !important; transform: none !important; }}\n",
                self.entrance_selectors.join(", ")
            ));
        }
        if !self.overlay_selectors.is_empty() {
            css.push_str(&format!(
                "{} {{ display: none !important; }}\n",
                self.overlay_selectors.join(", ")
            ));
        }
        css
    }

    fn style_script(&self) -> String {
        format!(
            r#"(() => {{
  let style = document.getElementById({id});
  if (!style) {{
    style = document.createElement('style');
    style.id = {id};
    (document.head || document.documentElement).appendChild(style);
  }}
  style.textContent = {css};
  return true;
}})()"#,
            id = json!(STYLE_ID),
            css = json!(self.stylesheet()),
        )
    }

    fn scroll_script(&self) -> String {
        format!(
            r#"(async () => {{
  const step = {step};
  const pause = {pause};
  let y = 0;
  while (y < document.documentElement.scrollHeight) {{
    window.scrollTo(0, y);
    await new Promise((resolve) => setTimeout(resolve, pause));
    y += step;
  }}
  window.scrollTo(0, 0);
  return document.documentElement.scrollHeight;
}})()"#,
            step = self.scroll_increment_px,
            pause = self.scroll_pause.as_millis(),
        )
    }

    fn mask_script(&self) -> String {
        format!(
            r#"(() => {{
  document.querySelectorAll('.' + {class}).forEach((el) => el.remove());
  const seen = new Set();
  let count = 0;
  for (const selector of {selectors}) {{
    for (const el of document.querySelectorAll(selector)) {{
      if (seen.has(el)) continue;
      seen.add(el);
      const rect = el.getBoundingClientRect();
      if (rect.width === 0 || rect.height === 0) continue;
      const mask = document.createElement('div');
      mask.className = {class};
      Object.assign(mask.style, {{
        position: 'absolute',
        left: (rect.left + window.scrollX) + 'px',
        top: (rect.top + window.scrollY) + 'px',
        width: rect.width + 'px',
        height: rect.height + 'px',
        background: {color},
        zIndex: '2147483647',
        pointerEvents: 'none',
      }});
      document.body.appendChild(mask);
      count += 1;
    }}
  }}
  return count;
}})()"#,
            class = json!(MASK_CLASS),
            selectors = json!(self.challenge_selectors),
            color = json!(self.mask_color),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{NavigateOptions, Navigation, PageEvents};
    use async_trait::async_trait;
    use std::path::Path;

    #[derive(Default)]
    struct ScriptLog {
        scripts: Vec<String>,
    }

    #[async_trait]
    impl RenderSession for ScriptLog {
        async fn navigate(&mut self, _url: &str, _options: &NavigateOptions) -> Result<Navigation> {
            unreachable!()
        }

        async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
            self.scripts.push(script.to_string());
            Ok(json!(1))
        }

        async fn screenshot(&mut self, _path: &Path) -> Result<()> {
            unreachable!()
        }

        async fn take_events(&mut self) -> Result<PageEvents> {
            Ok(PageEvents::default())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn normalizer() -> ContentNormalizer {
        ContentNormalizer::from_config(&VerifyConfig::default()).with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn test_stylesheet_covers_every_concern() {
        let css = normalizer().stylesheet();
        assert!(css.contains("animation: none !important"));
        assert!(css.contains("transition: none !important"));
        assert!(css.contains(".page-content { opacity: 1 !important; transform: none !important; }"));
        assert!(css.contains(".w-form-done, .w-form-fail, .w-dropdown-list { display: none !important; }"));
    }

    #[test]
    fn test_style_injection_reuses_one_element() {
        let script = normalizer().style_script();
        assert!(script.contains("getElementById(\"sitegate-normalize\")"));
        assert!(script.contains("if (!style)"));
    }

    #[test]
    fn test_mask_script_clears_previous_masks() {
        let script = normalizer().mask_script();
        assert!(script.contains("el.remove()"));
        assert!(script.contains("\"#000000\""));
        assert!(script.contains("\".g-recaptcha\""));
    }

    #[tokio::test]
    async fn test_challenge_pages_are_masked() {
        let normalizer = normalizer();
        let mut session = ScriptLog::default();

        let form = PageManifestEntry::parse("/commercial-form").unwrap();
        normalizer.apply(&mut session, &form).await.unwrap();
        assert_eq!(session.scripts.len(), 3);

        let mut session = ScriptLog::default();
        let about = PageManifestEntry::parse("/about").unwrap();
        normalizer.apply(&mut session, &about).await.unwrap();
        assert_eq!(session.scripts.len(), 2);
        assert!(session.scripts[1].contains("window.scrollTo(0, 0)"));
    }

    #[tokio::test]
    async fn test_challenge_pages_accept_html_names() {
        let mut config = VerifyConfig::default();
        config.challenge_pages = vec!["/commercial-form.html".into(), "/index.html".into()];
        let normalizer = ContentNormalizer::from_config(&config).with_settle_delay(Duration::ZERO);

        let form = PageManifestEntry::parse("/commercial-form").unwrap();
        assert!(normalizer.is_challenge_page(&form));
        let root = PageManifestEntry::parse("/index.html").unwrap();
        assert!(normalizer.is_challenge_page(&root));
        let about = PageManifestEntry::parse("/about").unwrap();
        assert!(!normalizer.is_challenge_page(&about));

        let mut session = ScriptLog::default();
        normalizer.apply(&mut session, &form).await.unwrap();
        assert_eq!(session.scripts.len(), 3);
    }
}
