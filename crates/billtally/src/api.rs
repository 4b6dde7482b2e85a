//! Bill text lookups; the last `textVersions` entry is taken as the latest version.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::config::ConfigError;
use crate::types::{BillRecord, PdfResolution};

const PDF_FORMAT: &str = "PDF";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid bill text URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Malformed text versions response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextVersionsResponse {
    #[serde(default)]
    pub text_versions: Vec<TextVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextVersion {
    #[serde(default)]
    pub formats: Vec<TextFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub url: String,
}

impl TextVersionsResponse {
    /// PDF link of the last text version, if it has one.
    pub fn latest_pdf(&self) -> PdfResolution {
        let Some(latest) = self.text_versions.last() else {
            return PdfResolution::NoPdf;
        };

        latest
            .formats
            .iter()
            .find(|f| f.format_type == PDF_FORMAT)
            .map(|f| PdfResolution::Available(f.url.clone()))
            .unwrap_or(PdfResolution::NoPdf)
    }
}

/// Finds the downloadable full-text PDF for a bill.
#[async_trait]
pub trait TextResolver: Send + Sync {
    async fn resolve_pdf(&self, bill: &BillRecord) -> Result<PdfResolution, ResolveError>;
}

#[derive(Debug, Clone)]
pub struct CongressApiClient {
    client: Client,
    api_key: String,
}

impl CongressApiClient {
    /// Fails before any request is made when no key is configured.
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { client, api_key })
    }

    pub async fn fetch_text_versions(
        &self,
        bill_text_api_url: &str,
    ) -> Result<TextVersionsResponse, ResolveError> {
        let url = Url::parse_with_params(
            bill_text_api_url,
            &[("api_key", self.api_key.as_str()), ("format", "json")],
        )
        .map_err(|e| ResolveError::InvalidUrl {
            url: bill_text_api_url.to_string(),
            reason: e.to_string(),
        })?;

        // Errors carry the request URL, which includes the key.
        let body = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(reqwest::Error::without_url)
            .inspect_err(|e| log::error!("HTTP error for {bill_text_api_url}: {e:?}"))?
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .inspect_err(|e| log::error!("Decode error for {bill_text_api_url}: {e:?}"))?;

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl TextResolver for CongressApiClient {
    async fn resolve_pdf(&self, bill: &BillRecord) -> Result<PdfResolution, ResolveError> {
        log::debug!("Resolving text versions for {}", bill.designator);
        let versions = self.fetch_text_versions(&bill.bill_text_api_url).await?;
        let resolution = versions.latest_pdf();
        if resolution == PdfResolution::NoPdf {
            log::debug!(
                "{} has no PDF in its latest of {} text version(s)",
                bill.designator,
                versions.text_versions.len()
            );
        }
        Ok(resolution)
    }
}
