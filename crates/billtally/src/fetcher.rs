use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("PDF download timed out: {0}")]
    Timeout(String),
    #[error("PDF download failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Downloads the raw bytes of a bill text PDF.
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    async fn fetch_pdf(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpPdfFetcher {
    client: Client,
}

impl HttpPdfFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PdfFetcher for HttpPdfFetcher {
    async fn fetch_pdf(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Http(e)
            }
        };

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))
            .map_err(classify)?
            .bytes()
            .await
            .inspect_err(|e| log::error!("Download error: {e:?}"))
            .map_err(classify)?;

        log::debug!("Downloaded {} byte(s) from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
