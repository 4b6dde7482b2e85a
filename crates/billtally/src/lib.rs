pub mod api;
pub mod config;
pub mod counter;
pub mod fetcher;
pub mod parser;
pub mod pipeline;
pub mod search;
pub mod types;

#[cfg(test)]
mod test_support;

pub use api::{CongressApiClient, TextResolver};
pub use config::{ConfigError, PipelineConfig, SearchOptions};
pub use counter::KeywordCounter;
pub use fetcher::{HttpPdfFetcher, PdfFetcher};
pub use parser::ResultParser;
pub use pipeline::{Pipeline, PipelineError, PipelineRun};
pub use search::{BrowserSearch, SearchProvider, SnapshotSearch};

pub(crate) const SITE_BASE_URL: &str = "https://www.congress.gov";
pub(crate) const API_BASE_URL: &str = "https://api.congress.gov/v3/bill";
