use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One bill matched by the search, as listed on the rendered results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRecord {
    pub legislation_type: String,
    pub designator: String,
    pub bill_title: String,
    pub bill_type: String,
    pub bill_number: String,
    pub bill_url: String,
    pub bill_text_api_url: String,
    pub congress_number: String,
    pub congress_year: String,
}

impl BillRecord {
    /// Session label used to tag counts, e.g. `"118 2023"`.
    pub fn session(&self) -> String {
        format!("{} {}", self.congress_number, self.congress_year)
    }
}

impl Display for BillRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {}] {} ({}) — {}",
            self.congress_number,
            self.congress_year,
            self.designator,
            self.legislation_type,
            self.bill_title
        )
    }
}

/// Keyword count for a single bill, tagged with the bill's session.
///
/// Serializes as `{"congress": "<num> <year>", "<keyword>_count": <n>}`.
/// Records are never merged across bills of the same session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCountRecord {
    pub session: String,
    pub keyword: String,
    pub keyword_count: u64,
}

impl Serialize for SessionCountRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("congress", &self.session)?;
        map.serialize_entry(&format!("{}_count", self.keyword), &self.keyword_count)?;
        map.end()
    }
}

impl Display for SessionCountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} × '{}'",
            self.session, self.keyword_count, self.keyword
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfResolution {
    Available(String),
    NoPdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Download,
    Extract,
    Timeout,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Resolve => write!(f, "resolve"),
            Stage::Download => write!(f, "download"),
            Stage::Extract => write!(f, "extract"),
            Stage::Timeout => write!(f, "timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillFailure {
    pub designator: String,
    pub congress: String,
    pub stage: Stage,
    pub error: String,
}

impl Display for BillFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) failed at {}: {}",
            self.designator, self.congress, self.stage, self.error
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillOutcome {
    Counted(SessionCountRecord),
    Failed(BillFailure),
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub keyword: String,
    pub generated_at: DateTime<Utc>,
    pub counts: Vec<SessionCountRecord>,
    pub failures: Vec<BillFailure>,
}

impl BatchReport {
    pub fn from_outcomes(keyword: &str, outcomes: Vec<BillOutcome>) -> Self {
        let mut counts = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                BillOutcome::Counted(record) => counts.push(record),
                BillOutcome::Failed(failure) => failures.push(failure),
            }
        }
        BatchReport {
            keyword: keyword.to_string(),
            generated_at: Utc::now(),
            counts,
            failures,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.len() + self.failures.len()
    }

    pub fn total_matches(&self) -> u64 {
        self.counts.iter().map(|c| c.keyword_count).sum()
    }
}

impl Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nKeyword '{}':", self.keyword)?;
        for (i, record) in self.counts.iter().enumerate() {
            writeln!(f, "{:>3}. {}", i + 1, record)?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "\nFailures:")?;
            for failure in &self.failures {
                writeln!(f, "  - {}", failure)?;
            }
        }
        writeln!(f, "\nSummary:")?;
        writeln!(f, "  Bills processed: {}", self.total())?;
        writeln!(f, "  Succeeded:       {}", self.counts.len())?;
        writeln!(f, "  Failed:          {}", self.failures.len())?;
        writeln!(f, "  Total matches:   {}", self.total_matches())
    }
}
