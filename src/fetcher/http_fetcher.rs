use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

use crate::app::{FreshetError, Result};
use crate::fetcher::{Fetcher, RawFeed};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fetches `http`/`https` feeds with reqwest and `file` feeds from disk.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("freshet/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    async fn fetch_file(url: &Url) -> Result<RawFeed> {
        let path = url
            .to_file_path()
            .map_err(|_| FreshetError::Fetch(format!("not a local path: {}", url)))?;
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| FreshetError::Fetch(format!("{}: {}", path.display(), e)))?;
        Ok(RawFeed::new(body))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<RawFeed> {
        match url.scheme() {
            "http" | "https" => {}
            "file" => return Self::fetch_file(url).await,
            other => {
                return Err(FreshetError::Fetch(format!(
                    "unsupported URL scheme \"{}\" in {}",
                    other, url
                )))
            }
        }

        let response = self.client.get(url.clone()).send().await?;
        response.error_for_status_ref()?;

        let encoding = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_of);

        let body = response.bytes().await?.to_vec();
        tracing::debug!("Downloaded {} bytes from {}", body.len(), url);

        Ok(RawFeed { body, encoding })
    }
}

/// Extract the `charset` parameter of a Content-Type header value.
fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}
