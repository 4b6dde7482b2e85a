use lopdf::Document;
use regex::{Regex, RegexBuilder};

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to load PDF: {0}")]
    Load(String),
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Counts whole-word, case-insensitive occurrences of a keyword.
#[derive(Debug, Clone)]
pub struct KeywordCounter {
    keyword: String,
    pattern: Regex,
}

impl KeywordCounter {
    pub fn new(keyword: &str) -> Result<Self, ConfigError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ConfigError::EmptyKeyword);
        }

        let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(keyword)))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            keyword: keyword.to_string(),
            pattern,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn count_in_text(&self, text: &str) -> u64 {
        self.pattern.find_iter(text).count() as u64
    }

    /// Sums matches over every page. Pages without extractable text count as zero.
    pub fn count_in_pdf(&self, bytes: &[u8]) -> Result<u64, ExtractionError> {
        let document = Document::load_mem(bytes).map_err(|e| ExtractionError::Load(e.to_string()))?;

        let total = extract_page_texts(&document)
            .iter()
            .map(|text| self.count_in_text(text))
            .sum();

        Ok(total)
    }

    /// Runs [`count_in_pdf`](Self::count_in_pdf) on the blocking thread pool.
    pub async fn count_in_pdf_blocking(&self, bytes: Vec<u8>) -> Result<u64, ExtractionError> {
        let counter = self.clone();
        tokio::task::spawn_blocking(move || counter.count_in_pdf(&bytes))
            .await
            .map_err(|e| ExtractionError::Task(format!("Extraction task panicked: {}", e)))?
    }
}

fn extract_page_texts(document: &Document) -> Vec<String> {
    document
        .get_pages()
        .into_keys()
        .map(|page_number| match document.extract_text(&[page_number]) {
            Ok(text) => {
                if text.trim().is_empty() {
                    log::debug!("Page {} has no extractable text", page_number);
                }
                text
            }
            Err(e) => {
                log::debug!("Page {} text extraction failed: {}", page_number, e);
                String::new()
            }
        })
        .collect()
}
