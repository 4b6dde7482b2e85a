use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::config::PipelineConfig;
use crate::search::RESULTS_SELECTOR;
use crate::types::BillRecord;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Expected 5 heading tokens, found {found}: '{heading}'")]
    HeadingShape { heading: String, found: usize },
    #[error("Invalid bill designator: {0}")]
    Designator(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

static SEL_RESULTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(RESULTS_SELECTOR).expect("invalid selector: results"));
static SEL_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".result-heading").expect("invalid selector: heading"));
static SEL_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("invalid selector: anchor"));
static SEL_INDICATOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".visualIndicator").expect("invalid selector: indicator"));
static SEL_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".result-title").expect("invalid selector: title"));

const ORDINAL_SUFFIXES: [&str; 4] = ["st", "nd", "rd", "th"];

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes at most one trailing ordinal suffix: `"118th"` -> `"118"`.
pub fn strip_ordinal_suffix(token: &str) -> &str {
    ORDINAL_SUFFIXES
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .unwrap_or(token)
}

pub fn bill_text_api_url(
    api_base_url: &str,
    congress_number: &str,
    bill_type: &str,
    bill_number: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/text",
        api_base_url.trim_end_matches('/'),
        congress_number,
        bill_type,
        bill_number
    )
}

/// Splits `"H.Con.Res.87"` into `("hconres", "87")`.
fn split_designator(designator: &str) -> Result<(String, String), ParseError> {
    let (body, number) = designator
        .rsplit_once('.')
        .ok_or_else(|| ParseError::Designator(designator.to_string()))?;

    let bill_type = body.replace('.', "").to_lowercase();
    if bill_type.is_empty() || number.is_empty() {
        return Err(ParseError::Designator(designator.to_string()));
    }

    Ok((bill_type, number.to_string()))
}

/// Turns a rendered congress.gov results page into bill records.
#[derive(Debug, Clone)]
pub struct ResultParser {
    exclusions: HashSet<String>,
    site_base_url: String,
    api_base_url: String,
}

impl ResultParser {
    pub fn new(exclusions: HashSet<String>, site_base_url: &str, api_base_url: &str) -> Self {
        Self {
            exclusions,
            site_base_url: site_base_url.trim_end_matches('/').to_string(),
            api_base_url: api_base_url.to_string(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.exclusions.clone(),
            &config.site_base_url,
            &config.api_base_url,
        )
    }

    /// Returns the records in document order. Excluded designators are
    /// dropped and malformed entries are skipped with a warning.
    pub fn parse(&self, html: &str) -> Vec<BillRecord> {
        let document = Html::parse_document(html);
        let mut records = Vec::new();
        let mut excluded = 0;

        for (index, entry) in document.select(&SEL_RESULTS).enumerate() {
            match self.parse_entry(entry) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => excluded += 1,
                Err(e) => log::warn!("Skipping result entry {}: {}", index + 1, e),
            }
        }

        log::debug!(
            "Parsed {} bill(s), excluded {}",
            records.len(),
            excluded
        );
        records
    }

    fn parse_entry(&self, entry: ElementRef) -> Result<Option<BillRecord>, ParseError> {
        let heading = entry
            .select(&SEL_HEADING)
            .next()
            .ok_or_else(|| ParseError::MissingField("result heading".to_string()))?;

        let heading_text = elem_text(heading);
        let tokens: Vec<&str> = heading_text.split_whitespace().collect();
        let &[designator, _, congress_token, _, congress_year] = tokens.as_slice() else {
            return Err(ParseError::HeadingShape {
                heading: normalize_whitespace(&heading_text),
                found: tokens.len(),
            });
        };

        if self.exclusions.contains(designator) {
            log::debug!("Excluding {}", designator);
            return Ok(None);
        }

        let legislation_type = entry
            .select(&SEL_INDICATOR)
            .next()
            .map(|e| normalize_whitespace(&elem_text(e)))
            .ok_or_else(|| ParseError::MissingField("legislation type".to_string()))?;

        let (bill_type, bill_number) = split_designator(designator)?;

        let href = heading
            .select(&SEL_ANCHOR)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| ParseError::MissingField("bill link".to_string()))?;
        let bill_url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", self.site_base_url, href)
        };

        let bill_title = entry
            .select(&SEL_TITLE)
            .next()
            .map(|e| normalize_whitespace(&elem_text(e)))
            .ok_or_else(|| ParseError::MissingField("bill title".to_string()))?;

        let congress_number = strip_ordinal_suffix(congress_token).to_string();
        let bill_text_api_url =
            bill_text_api_url(&self.api_base_url, &congress_number, &bill_type, &bill_number);

        Ok(Some(BillRecord {
            legislation_type,
            designator: designator.to_string(),
            bill_title,
            bill_type,
            bill_number,
            bill_url,
            bill_text_api_url,
            congress_number,
            congress_year: congress_year.to_string(),
        }))
    }
}
