//! Drives the congress.gov search form in headless Chrome and captures the rendered results.

use std::fmt::Display;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::config::{PipelineConfig, SearchOptions};

const RESULTS_LIST_SELECTOR: &str = "ol.basic-search-results-lists";
pub(crate) const RESULTS_SELECTOR: &str = "ol.basic-search-results-lists li.expanded";

const STABLE_POLLS: u32 = 3;

/// Tracks entry counts across polls. A negative count means the page is not
/// complete or the results list is missing.
#[derive(Debug, Default)]
struct SettleTracker {
    last: Option<i64>,
    stable: u32,
}

impl SettleTracker {
    fn observe(&mut self, count: i64) -> Option<u64> {
        if count < 0 {
            self.last = None;
            self.stable = 0;
            return None;
        }

        if self.last == Some(count) {
            self.stable += 1;
        } else {
            self.last = Some(count);
            self.stable = 1;
        }

        (self.stable >= STABLE_POLLS).then_some(count as u64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Search step '{step}' failed: {reason}")]
    Step { step: &'static str, reason: String },
    #[error("Results did not settle within {0:?}")]
    NotReady(Duration),
    #[error("Search task failed: {0}")]
    Task(String),
    #[error("Failed to read results snapshot: {0}")]
    Snapshot(#[from] std::io::Error),
}

/// Produces the fully rendered results page for a keyword.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn rendered_results(&self, keyword: &str) -> Result<String, SearchError>;
}

fn step<T, E: Display>(step: &'static str, result: Result<T, E>) -> Result<T, SearchError> {
    result.map_err(|e| SearchError::Step {
        step,
        reason: e.to_string(),
    })
}

/// Drives congress.gov in headless Chrome.
#[derive(Debug, Clone)]
pub struct BrowserSearch {
    search_url: String,
    options: SearchOptions,
}

impl BrowserSearch {
    pub fn new(search_url: impl Into<String>, options: SearchOptions) -> Self {
        Self {
            search_url: search_url.into(),
            options,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.search_url(), config.search.clone())
    }

    fn scrape(&self, keyword: &str) -> Result<String, SearchError> {
        let launch_options = LaunchOptions::default_builder()
            .headless(self.options.headless)
            .idle_browser_timeout(self.options.ready_timeout * 4)
            .build()
            .map_err(|e| SearchError::Launch(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| SearchError::Launch(e.to_string()))?;
        let tab = step("open tab", browser.new_tab())?;
        tab.set_default_timeout(self.options.ready_timeout);
        step(
            "set user agent",
            tab.set_user_agent(&self.options.user_agent, None, None),
        )?;

        log::info!("Opening {}...", self.search_url);
        step("navigate", tab.navigate_to(&self.search_url))?;
        step("load search page", tab.wait_until_navigated())?;

        self.select_option(&tab, "#search-format", &self.options.scope)?;

        let input = step("find search input", tab.wait_for_element("#search"))?;
        step("focus search input", input.click())?;
        step("type keyword", tab.type_str(keyword))?;
        step("submit search", step("find submit", tab.wait_for_element("#search-submit"))?.click())?;
        step("load results", tab.wait_until_navigated())?;

        log::info!("Sorting results by {}...", self.options.sort);
        self.select_option(&tab, "#pageSort", &self.options.sort)?;
        step("load sorted results", tab.wait_until_navigated())?;

        log::info!("Applying subject facet {}...", self.options.facet_item);
        step(
            "open facet panel",
            step("find facet toggle", tab.wait_for_element(&self.options.facet_toggle))?.click(),
        )?;
        step(
            "select facet",
            step("find facet item", tab.wait_for_element(&self.options.facet_item))?.click(),
        )?;
        step("load filtered results", tab.wait_until_navigated())?;

        let entries = self.wait_until_settled(&tab)?;
        log::info!("Results settled with {} entr(ies)", entries);

        let html = step("capture content", tab.get_content())?;
        log::debug!("Captured {} characters of rendered HTML", html.len());
        Ok(html)
    }

    /// Sets a `<select>` value the way a user would, firing `input` and `change`.
    fn select_option(&self, tab: &Tab, selector: &str, value: &str) -> Result<(), SearchError> {
        step("find select", tab.wait_for_element(selector))?;

        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.value = {value};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return el.value === {value};
            }})()"#,
            selector = serde_json::Value::from(selector),
            value = serde_json::Value::from(value),
        );

        let applied = step("select option", tab.evaluate(&script, false))?
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !applied {
            return Err(SearchError::Step {
                step: "select option",
                reason: format!("'{}' has no option '{}'", selector, value),
            });
        }
        Ok(())
    }

    /// Polls until the results list is present and its entry count has stopped changing.
    fn wait_until_settled(&self, tab: &Tab) -> Result<u64, SearchError> {
        let script = format!(
            "document.readyState === 'complete' && document.querySelector({}) !== null \
             ? document.querySelectorAll({}).length : -1",
            serde_json::Value::from(RESULTS_LIST_SELECTOR),
            serde_json::Value::from(RESULTS_SELECTOR)
        );
        let deadline = Instant::now() + self.options.ready_timeout;
        let mut tracker = SettleTracker::default();

        while Instant::now() < deadline {
            let count = step("count results", tab.evaluate(&script, false))?
                .value
                .and_then(|v| v.as_i64())
                .unwrap_or(-1);

            if let Some(entries) = tracker.observe(count) {
                return Ok(entries);
            }
            thread::sleep(self.options.poll_interval);
        }

        Err(SearchError::NotReady(self.options.ready_timeout))
    }
}

#[async_trait]
impl SearchProvider for BrowserSearch {
    async fn rendered_results(&self, keyword: &str) -> Result<String, SearchError> {
        let search = self.clone();
        let keyword = keyword.to_string();

        // The browser is owned by the blocking task and closed when it returns.
        tokio::task::spawn_blocking(move || {
            let html = search.scrape(&keyword);
            log::debug!("Browser session closed");
            html
        })
        .await
        .map_err(|e| SearchError::Task(format!("Search task panicked: {}", e)))?
    }
}

/// Serves a previously captured results page.
#[derive(Debug, Clone)]
pub struct SnapshotSearch {
    html: String,
}

impl SnapshotSearch {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn from_file(path: &Path) -> Result<Self, SearchError> {
        log::info!("Reading results snapshot from {}", path.display());
        Ok(Self::new(std::fs::read_to_string(path)?))
    }
}

#[async_trait]
impl SearchProvider for SnapshotSearch {
    async fn rendered_results(&self, _keyword: &str) -> Result<String, SearchError> {
        Ok(self.html.clone())
    }
}
