pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;

pub use http_fetcher::HttpFetcher;

/// Raw bytes of a downloaded feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeed {
    pub body: Vec<u8>,
    /// Character set announced by the server, if any.
    pub encoding: Option<String>,
}

impl RawFeed {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            encoding: None,
        }
    }
}

#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, url: &url::Url) -> Result<RawFeed>;
}
