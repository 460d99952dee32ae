// src/fetch/mod.rs

use async_trait::async_trait;
use reqwest::Client;
use std::{path::Path, sync::Arc, time::Duration};
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{HaircutError, Result};

pub mod download;
pub mod urls;

pub use urls::{ListingEntry, DEFAULT_LISTING_URL};

/// The remote side: listing/detail pages and attachment downloads.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// GET a page and return its body as text.
    async fn get_text(&self, url: &Url) -> Result<String>;

    /// Stream the file at `url` into `dest`, returning the number of bytes written.
    /// On error `dest` may hold partial content; the caller discards it.
    async fn download(&self, url: &Url, dest: &Path) -> Result<u64>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn get_text(&self, url: &Url) -> Result<String> {
        (**self).get_text(url).await
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<u64> {
        (**self).download(url, dest).await
    }
}

/// reqwest-backed publisher. No retries: the per-request timeout is the only guard.
#[derive(Clone)]
pub struct HttpPublisher {
    client: Client,
    page_timeout: Duration,
    download_timeout: Duration,
}

impl HttpPublisher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .cookie_store(true)
            .build()
            .map_err(|e| HaircutError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            page_timeout: config.page_timeout(),
            download_timeout: config.download_timeout(),
        })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn get_text(&self, url: &Url) -> Result<String> {
        debug!("Fetching text from {}", url);
        self.client
            .get(url.clone())
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| HaircutError::network(url, e))?
            .error_for_status()
            .map_err(|e| HaircutError::network(url, e))?
            .text()
            .await
            .map_err(|e| HaircutError::network(url, e))
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<u64> {
        download::download_to(&self.client, url, dest, self.download_timeout).await
    }
}
