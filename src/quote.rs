use std::path::Path;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use crate::error::{QuoteclipError, QuoteclipResult};

/// One quote resolved from the backing store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteText {
    body: String,
    author: Option<String>,
}

impl QuoteText {
    /// Create a quote, trimming whitespace. An empty body is rejected here so
    /// the pipeline fails before any rendering work begins.
    pub fn new(body: impl Into<String>, author: Option<String>) -> QuoteclipResult<Self> {
        let body = body.into().trim().to_string();
        if body.is_empty() {
            return Err(QuoteclipError::no_quote_available(
                "quote body is empty after trimming",
            ));
        }
        let author = author
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty() && a != "nan");
        Ok(Self { body, author })
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

/// Which record to use when the source yields several.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// The most recently added record (last row).
    #[default]
    Latest,
    /// A uniformly random record.
    Random,
}

/// Parse quote records out of CSV text.
///
/// A `Formatted` column wins when present; otherwise `Quote` is required and
/// `Author` is optional. Rows that are blank after trimming are dropped.
pub fn parse_quotes_csv(data: &str) -> QuoteclipResult<Vec<QuoteText>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| QuoteclipError::no_quote_available(format!("invalid CSV header: {e}")))?
        .clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let formatted_col = col("Formatted");
    let quote_col = col("Quote");
    let author_col = col("Author");

    if formatted_col.is_none() && quote_col.is_none() {
        return Err(QuoteclipError::no_quote_available(
            "CSV has neither a 'Formatted' nor a 'Quote' column",
        ));
    }

    let mut quotes = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| QuoteclipError::no_quote_available(format!("bad CSV row: {e}")))?;

        if let Some(idx) = formatted_col
            && let Some(text) = record.get(idx)
            && !text.trim().is_empty()
        {
            quotes.push(QuoteText::new(text, None)?);
            continue;
        }

        if let Some(idx) = quote_col
            && let Some(text) = record.get(idx)
            && !text.trim().is_empty()
        {
            let author = author_col
                .and_then(|a| record.get(a))
                .map(|a| a.to_string());
            quotes.push(QuoteText::new(text, author)?);
        }
    }

    if quotes.is_empty() {
        return Err(QuoteclipError::no_quote_available(
            "CSV contained zero usable quote rows",
        ));
    }
    Ok(quotes)
}

/// Fetch the quote CSV over HTTP with an explicit timeout.
pub fn fetch_quotes(url: &str, timeout: Duration) -> QuoteclipResult<Vec<QuoteText>> {
    info!(url, "fetching quotes");
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| QuoteclipError::no_quote_available(format!("http client setup: {e}")))?;

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| QuoteclipError::no_quote_available(format!("fetch failed: {e}")))?;
    let body = response
        .text()
        .map_err(|e| QuoteclipError::no_quote_available(format!("fetch body read failed: {e}")))?;

    let quotes = parse_quotes_csv(&body)?;
    debug!(count = quotes.len(), "parsed quote records");
    Ok(quotes)
}

/// Read the quote CSV from a local file.
pub fn load_quotes_file(path: &Path) -> QuoteclipResult<Vec<QuoteText>> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        QuoteclipError::no_quote_available(format!(
            "failed to read quote CSV '{}': {e}",
            path.display()
        ))
    })?;
    parse_quotes_csv(&data)
}

/// Pick one record according to `policy`.
pub fn select_quote<'a, R: Rng>(
    quotes: &'a [QuoteText],
    policy: SelectionPolicy,
    rng: &mut R,
) -> QuoteclipResult<&'a QuoteText> {
    match policy {
        SelectionPolicy::Latest => quotes
            .last()
            .ok_or_else(|| QuoteclipError::no_quote_available("quote list is empty")),
        SelectionPolicy::Random => {
            if quotes.is_empty() {
                return Err(QuoteclipError::no_quote_available("quote list is empty"));
            }
            Ok(&quotes[rng.gen_range(0..quotes.len())])
        }
    }
}
