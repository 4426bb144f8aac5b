//! Content-only page probe over plain HTTP

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

use sitegate_common::{Error, NavigationFailure, Result};

use crate::renderer::Navigation;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fetches a page without rendering it
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Navigation>;
}

/// `PageFetcher` backed by reqwest
pub struct HttpFetcher {
    client: reqwest::Client,
    title: Regex,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            reqwest::header::HeaderValue::from_static("identity"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("HTTP client: {}", e)))?;

        let title = Regex::new(r"(?is)<title[^>]*>(.*?)</title>")
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        Ok(Self { client, title })
    }

    fn extract_title(&self, body: &str) -> String {
        self.title
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Navigation> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let http_status = response.status().as_u16();
        let body = response.bytes().await.map_err(request_error)?;
        let title = self.extract_title(&String::from_utf8_lossy(&body));

        Ok(Navigation {
            http_status,
            title,
            response_length: body.len() as u64,
        })
    }
}

fn request_error(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        NavigationFailure::Timeout
    } else if err.is_connect() || err.is_request() {
        NavigationFailure::Network
    } else {
        NavigationFailure::Other
    };
    Error::navigation(kind, err.to_string())
}
