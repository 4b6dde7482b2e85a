//! Search -> parse -> {resolve -> download -> count} per bill; per-bill failures never abort a run.

use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::api::{ResolveError, TextResolver};
use crate::config::{ConfigError, PipelineConfig};
use crate::counter::{ExtractionError, KeywordCounter};
use crate::fetcher::{FetchError, PdfFetcher};
use crate::parser::ResultParser;
use crate::search::{SearchError, SearchProvider};
use crate::types::{
    BatchReport, BillFailure, BillOutcome, BillRecord, PdfResolution, SessionCountRecord, Stage,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Search failed: {0}")]
    Search(#[from] SearchError),
}

#[derive(Debug, thiserror::Error)]
enum BillError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("no PDF available for the latest text version")]
    NoPdf,
    #[error(transparent)]
    Download(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractionError),
    #[error("bill processing exceeded {0:?}")]
    Timeout(Duration),
}

impl BillError {
    fn stage(&self) -> Stage {
        match self {
            BillError::Resolve(_) | BillError::NoPdf => Stage::Resolve,
            BillError::Download(_) => Stage::Download,
            BillError::Extract(_) => Stage::Extract,
            BillError::Timeout(_) => Stage::Timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub bills: Vec<BillRecord>,
    pub report: BatchReport,
}

pub struct Pipeline<S, R, F> {
    config: PipelineConfig,
    parser: ResultParser,
    counter: KeywordCounter,
    search: S,
    resolver: R,
    fetcher: F,
}

impl<S, R, F> Pipeline<S, R, F>
where
    S: SearchProvider,
    R: TextResolver,
    F: PdfFetcher,
{
    pub fn new(
        config: PipelineConfig,
        search: S,
        resolver: R,
        fetcher: F,
    ) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        let parser = ResultParser::from_config(&config);
        let counter = KeywordCounter::new(&config.keyword)?;

        Ok(Self {
            config,
            parser,
            counter,
            search,
            resolver,
            fetcher,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches the rendered results once and parses them into bill records.
    pub async fn search(&self) -> Result<Vec<BillRecord>, PipelineError> {
        log::info!("Searching for '{}'...", self.config.keyword);
        let html = self.search.rendered_results(&self.config.keyword).await?;

        log::info!("Parsing search results...");
        let bills = self.parser.parse(&html);
        log::info!("Found {} relevant bill(s)", bills.len());
        Ok(bills)
    }

    pub async fn run(&self) -> Result<PipelineRun, PipelineError> {
        let bills = self.search().await?;
        let report = self.count_bills(&bills).await;
        Ok(PipelineRun { bills, report })
    }

    /// Counts the keyword in every bill's latest text. Never fails as a whole.
    pub async fn count_bills(&self, bills: &[BillRecord]) -> BatchReport {
        let total = bills.len();
        log::info!(
            "Searching {} PDF(s) for keyword '{}'",
            total,
            self.counter.keyword()
        );

        let outcomes: Vec<BillOutcome> = stream::iter(bills.iter().enumerate())
            .map(|(index, bill)| async move {
                let outcome = self.process_bill(bill).await;
                match &outcome {
                    BillOutcome::Counted(record) => log::info!(
                        "[{}/{}] {}: {} match(es)",
                        index + 1,
                        total,
                        bill.designator,
                        record.keyword_count
                    ),
                    BillOutcome::Failed(failure) => {
                        log::warn!("[{}/{}] {}", index + 1, total, failure)
                    }
                }
                outcome
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let report = BatchReport::from_outcomes(self.counter.keyword(), outcomes);
        log::info!(
            "Keyword search complete: {} succeeded, {} failed",
            report.counts.len(),
            report.failures.len()
        );
        report
    }

    pub async fn process_bill(&self, bill: &BillRecord) -> BillOutcome {
        let result = match self.config.bill_timeout {
            Some(limit) => tokio::time::timeout(limit, self.count_bill(bill))
                .await
                .unwrap_or(Err(BillError::Timeout(limit))),
            None => self.count_bill(bill).await,
        };

        match result {
            Ok(keyword_count) => BillOutcome::Counted(SessionCountRecord {
                session: bill.session(),
                keyword: self.counter.keyword().to_string(),
                keyword_count,
            }),
            Err(e) => BillOutcome::Failed(BillFailure {
                designator: bill.designator.clone(),
                congress: bill.session(),
                stage: e.stage(),
                error: e.to_string(),
            }),
        }
    }

    async fn count_bill(&self, bill: &BillRecord) -> Result<u64, BillError> {
        let pdf_url = match self.resolver.resolve_pdf(bill).await? {
            PdfResolution::Available(url) => url,
            PdfResolution::NoPdf => return Err(BillError::NoPdf),
        };

        let bytes = self.fetcher.fetch_pdf(&pdf_url).await?;
        Ok(self.counter.count_in_pdf_blocking(bytes).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pdf_with_pages;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FailingSearch;

    #[async_trait]
    impl SearchProvider for FailingSearch {
        async fn rendered_results(&self, _keyword: &str) -> Result<String, SearchError> {
            Err(SearchError::NotReady(Duration::from_secs(30)))
        }
    }

    struct SnapshotPage(String);

    #[async_trait]
    impl SearchProvider for SnapshotPage {
        async fn rendered_results(&self, _keyword: &str) -> Result<String, SearchError> {
            Ok(self.0.clone())
        }
    }

    /// Resolves `<designator>` to `https://pdf.test/<designator>.pdf` unless listed otherwise.
    #[derive(Default)]
    struct FakeResolver {
        no_pdf: Vec<&'static str>,
        broken: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextResolver for FakeResolver {
        async fn resolve_pdf(&self, bill: &BillRecord) -> Result<PdfResolution, ResolveError> {
            self.calls.lock().unwrap().push(bill.designator.clone());
            let designator = bill.designator.as_str();
            if self.broken.contains(&designator) {
                return Err(ResolveError::InvalidUrl {
                    url: bill.bill_text_api_url.clone(),
                    reason: "relative URL without a base".to_string(),
                });
            }
            if self.no_pdf.contains(&designator) {
                return Ok(PdfResolution::NoPdf);
            }
            Ok(PdfResolution::Available(format!(
                "https://pdf.test/{}.pdf",
                designator
            )))
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        pdfs: HashMap<String, Vec<u8>>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with_pdf(mut self, designator: &str, pdf: Vec<u8>) -> Self {
            self.pdfs
                .insert(format!("https://pdf.test/{}.pdf", designator), pdf);
            self
        }

        fn with_delay(mut self, designator: &str, delay: Duration) -> Self {
            self.delays
                .insert(format!("https://pdf.test/{}.pdf", designator), delay);
            self
        }
    }

    #[async_trait]
    impl PdfFetcher for FakeFetcher {
        async fn fetch_pdf(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if let Some(delay) = self.delays.get(url) {
                tokio::time::sleep(*delay).await;
            }
            self.pdfs
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Timeout(url.to_string()))
        }
    }

    fn results_page(headings: &[&str]) -> String {
        let entries: Vec<String> = headings
            .iter()
            .map(|heading| {
                let (designator, rest) = heading.split_once(' ').unwrap();
                format!(
                    r#"<li class="expanded">
                        <span class="visualIndicator">BILL</span>
                        <span class="result-heading"><a href="/bill/{designator}">{designator}</a> {rest}</span>
                        <span class="result-title">Title of {designator}</span>
                    </li>"#
                )
            })
            .collect();
        format!(
            r#"<ol class="basic-search-results-lists">{}</ol>"#,
            entries.join("")
        )
    }

    fn config(exclusions: &[&str]) -> PipelineConfig {
        PipelineConfig {
            exclusions: exclusions.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_excluded_bill_never_resolved() {
        let page = results_page(&[
            "H.R.100 introduced 118th Congress 2023",
            "S.789 introduced 117th Congress 2021",
        ]);
        let fetcher = FakeFetcher::default().with_pdf(
            "H.R.100",
            pdf_with_pages(&[&["The arctic region "], &["Arctic security "]]),
        );
        let pipeline = Pipeline::new(
            config(&["S.789"]),
            SnapshotPage(page),
            FakeResolver::default(),
            fetcher,
        )
        .expect("Failed to build pipeline");

        let run = pipeline.run().await.expect("Run should complete");

        assert_eq!(run.bills.len(), 1);
        assert_eq!(
            serde_json::to_value(&run.report.counts).unwrap(),
            serde_json::json!([{"congress": "118 2023", "arctic_count": 2}])
        );
        assert!(run.report.failures.is_empty());
        assert_eq!(*pipeline.resolver.calls.lock().unwrap(), vec!["H.R.100"]);
        assert_eq!(
            *pipeline.fetcher.calls.lock().unwrap(),
            vec!["https://pdf.test/H.R.100.pdf"]
        );
    }

    #[tokio::test]
    async fn test_search_failure_aborts_run() {
        let pipeline = Pipeline::new(
            config(&[]),
            FailingSearch,
            FakeResolver::default(),
            FakeFetcher::default(),
        )
        .expect("Failed to build pipeline");

        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Search(_))));
        assert!(pipeline.resolver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_per_bill_failures_do_not_abort_batch() {
        let page = results_page(&[
            "H.R.1 introduced 118th Congress 2023",
            "H.R.2 introduced 118th Congress 2023",
            "H.R.3 introduced 117th Congress 2021",
            "H.R.4 introduced 117th Congress 2021",
            "H.R.5 introduced 116th Congress 2019",
        ]);
        let resolver = FakeResolver {
            no_pdf: vec!["H.R.2"],
            broken: vec!["H.R.3"],
            ..Default::default()
        };
        let fetcher = FakeFetcher::default()
            .with_pdf("H.R.1", pdf_with_pages(&[&["arctic "]]))
            .with_pdf("H.R.5", b"not a pdf".to_vec());
        let pipeline = Pipeline::new(config(&[]), SnapshotPage(page), resolver, fetcher)
            .expect("Failed to build pipeline");

        let run = pipeline.run().await.expect("Run should complete");
        let report = run.report;

        assert_eq!(report.total(), 5);
        assert_eq!(report.counts.len(), 1);
        assert_eq!(report.counts[0].session, "118 2023");
        assert_eq!(report.counts[0].keyword_count, 1);

        let failures: Vec<(&str, Stage)> = report
            .failures
            .iter()
            .map(|f| (f.designator.as_str(), f.stage))
            .collect();
        assert_eq!(
            failures,
            vec![
                ("H.R.2", Stage::Resolve),
                ("H.R.3", Stage::Resolve),
                ("H.R.4", Stage::Download),
                ("H.R.5", Stage::Extract),
            ]
        );
        assert!(report.failures[0].error.contains("no PDF available"));
        assert_eq!(report.failures[3].congress, "116 2019");
    }

    #[tokio::test]
    async fn test_concurrent_processing_keeps_search_order() {
        let page = results_page(&[
            "H.R.1 introduced 118th Congress 2023",
            "H.R.2 introduced 117th Congress 2021",
            "H.R.3 introduced 116th Congress 2019",
        ]);
        let fetcher = FakeFetcher::default()
            .with_pdf("H.R.1", pdf_with_pages(&[&["arctic "]]))
            .with_pdf("H.R.2", pdf_with_pages(&[&["arctic arctic "]]))
            .with_pdf("H.R.3", pdf_with_pages(&[&["arctic arctic arctic "]]))
            .with_delay("H.R.1", Duration::from_millis(60))
            .with_delay("H.R.2", Duration::from_millis(30));
        let config = PipelineConfig {
            concurrency: 3,
            ..config(&[])
        };
        let pipeline = Pipeline::new(config, SnapshotPage(page), FakeResolver::default(), fetcher)
            .expect("Failed to build pipeline");

        let report = pipeline.run().await.expect("Run should complete").report;

        let counts: Vec<(&str, u64)> = report
            .counts
            .iter()
            .map(|c| (c.session.as_str(), c.keyword_count))
            .collect();
        assert_eq!(
            counts,
            vec![("118 2023", 1), ("117 2021", 2), ("116 2019", 3)]
        );
    }

    #[tokio::test]
    async fn test_same_session_records_are_not_merged() {
        let page = results_page(&[
            "H.R.1 introduced 118th Congress 2023",
            "H.R.2 introduced 118th Congress 2023",
        ]);
        let fetcher = FakeFetcher::default()
            .with_pdf("H.R.1", pdf_with_pages(&[&["arctic "]]))
            .with_pdf("H.R.2", pdf_with_pages(&[&["arctic "]]));
        let pipeline =
            Pipeline::new(config(&[]), SnapshotPage(page), FakeResolver::default(), fetcher)
                .expect("Failed to build pipeline");

        let report = pipeline.run().await.expect("Run should complete").report;

        assert_eq!(report.counts.len(), 2);
        assert!(report.counts.iter().all(|c| c.session == "118 2023"));
    }

    #[tokio::test]
    async fn test_bill_timeout_fails_only_that_bill() {
        let page = results_page(&[
            "H.R.1 introduced 118th Congress 2023",
            "H.R.2 introduced 118th Congress 2023",
        ]);
        let fetcher = FakeFetcher::default()
            .with_pdf("H.R.1", pdf_with_pages(&[&["arctic "]]))
            .with_pdf("H.R.2", pdf_with_pages(&[&["arctic "]]))
            .with_delay("H.R.1", Duration::from_secs(5));
        let config = PipelineConfig {
            bill_timeout: Some(Duration::from_millis(50)),
            ..config(&[])
        };
        let pipeline = Pipeline::new(config, SnapshotPage(page), FakeResolver::default(), fetcher)
            .expect("Failed to build pipeline");

        let report = pipeline.run().await.expect("Run should complete").report;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].designator, "H.R.1");
        assert_eq!(report.failures[0].stage, Stage::Timeout);
        assert_eq!(report.counts.len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            keyword: String::new(),
            ..Default::default()
        };

        let result = Pipeline::new(
            config,
            FailingSearch,
            FakeResolver::default(),
            FakeFetcher::default(),
        );

        assert!(matches!(result, Err(ConfigError::EmptyKeyword)));
    }
}
