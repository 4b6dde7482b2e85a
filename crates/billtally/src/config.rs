use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_KEYWORD: &str = "arctic";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

/// Bills that match the keyword search but are unrelated to the topic.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "H.R.324",
    "H.Con.Res.87",
    "H.Res.488",
    "S.152",
    "S.789",
    "S.1460",
    "S.Con.Res.46",
    "S.Res.327",
    "S.Res.397",
    "S.Res.459",
    "S.Res.577",
    "S.Res.585",
    "S.Res.618",
    "S.Res.745",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("congress API key not found (set CONGRESS_API_KEY or pass --api-key)")]
    MissingApiKey,
    #[error("Search keyword must not be empty")]
    EmptyKeyword,
    #[error("Concurrency must be greater than 0")]
    ZeroConcurrency,
    #[error("Invalid keyword pattern: {0}")]
    InvalidKeyword(#[from] regex::Error),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Form selections applied on the search page before the results are captured.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Path of the search page, relative to the site base URL.
    pub search_path: String,
    pub scope: String,
    pub sort: String,
    pub facet_toggle: String,
    pub facet_item: String,
    pub user_agent: String,
    pub headless: bool,
    /// Upper bound for every element wait and for the results to settle.
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_path: "/search".to_string(),
            scope: "all-congresses".to_string(),
            sort: "dateOfIntroduction:asc".to_string(),
            facet_toggle: "#button_subject".to_string(),
            facet_item: "#facetItemsubjectArmed_Forces_and_National_Security".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headless: true,
            ready_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub keyword: String,
    pub exclusions: HashSet<String>,
    pub site_base_url: String,
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub concurrency: usize,
    pub bill_timeout: Option<Duration>,
    pub search: SearchOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD.to_string(),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            site_base_url: crate::SITE_BASE_URL.to_string(),
            api_base_url: crate::API_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(20),
            concurrency: 1,
            bill_timeout: None,
            search: SearchOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.keyword.trim().is_empty() {
            return Err(ConfigError::EmptyKeyword);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(self)
    }

    pub fn search_url(&self) -> String {
        format!(
            "{}/{}",
            self.site_base_url.trim_end_matches('/'),
            self.search.search_path.trim_start_matches('/')
        )
    }
}
