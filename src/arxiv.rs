use crate::article::Article;
use crate::retry::{with_retry_if, RetryConfig};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://export.arxiv.org/api/query";

/// Entries requested per page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// arXiv asks API clients to wait 3 seconds between consecutive calls.
const PAGE_DELAY: Duration = Duration::from_secs(3);

/// Date format of the `submittedDate` filter.
const ARXIV_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Search conditions for newly submitted articles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    /// Start of the submission window (midnight UTC)
    pub start_date: NaiveDate,
    /// End of the submission window (midnight UTC)
    pub end_date: NaiveDate,
}

impl SearchQuery {
    /// Render the `search_query` parameter.
    pub fn to_query_string(&self) -> String {
        let mut query = format!(
            "submittedDate:[{} TO {}]",
            format_date(self.start_date),
            format_date(self.end_date)
        );

        if !self.categories.is_empty() {
            let sub: Vec<String> = self
                .categories
                .iter()
                .map(|cat| format!("cat:{}", cat))
                .collect();
            query.push_str(&format!(" AND ({})", sub.join(" OR ")));
        }

        if !self.keywords.is_empty() {
            let sub: Vec<String> = self
                .keywords
                .iter()
                .map(|kwd| format!("abs:\"{}\"", kwd))
                .collect();
            query.push_str(&format!(" AND ({})", sub.join(" OR ")));
        }

        query
    }
}

fn format_date(date: NaiveDate) -> String {
    date.and_time(chrono::NaiveTime::MIN)
        .format(ARXIV_DATE_FORMAT)
        .to_string()
}

// Atom feed returned by the arXiv API. Only the fields we use are declared.

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "totalResults", alias = "opensearch:totalResults", default)]
    total_results: Option<usize>,
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

impl Entry {
    /// The API reports a malformed query as a single entry under `/api/errors`.
    fn is_error(&self) -> bool {
        self.id.contains("/api/errors")
    }

    fn into_article(self) -> Article {
        let authors = self
            .authors
            .into_iter()
            .map(|a| a.name.trim().to_string())
            .collect();
        Article::new(&self.title, authors, &self.summary, self.id.trim())
    }
}

/// Non-success HTTP reply from the API.
#[derive(Debug, thiserror::Error)]
#[error("arXiv API error ({status}): {body}")]
struct StatusError {
    status: StatusCode,
    body: String,
}

/// 429, 5xx and anything that is not an HTTP status error are retried.
fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StatusError>().map_or(true, |e| {
        e.status == StatusCode::TOO_MANY_REQUESTS || e.status.is_server_error()
    })
}

fn parse_feed(xml: &str) -> Result<Feed> {
    quick_xml::de::from_str(xml).context("Failed to parse arXiv Atom feed")
}

/// arXiv export API client.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: reqwest::Client,
    api_url: String,
    page_size: usize,
    page_delay: Duration,
    retry: RetryConfig,
}

impl ArxivClient {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: PAGE_DELAY,
            retry: RetryConfig::arxiv_query(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every article matching `query`, following pagination.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Article>> {
        let search_query = query.to_query_string();
        info!("Searching arXiv: {}", search_query);

        let mut articles = Vec::new();
        let mut start = 0;

        loop {
            if start > 0 && !self.page_delay.is_zero() {
                sleep(self.page_delay).await;
            }

            let feed = with_retry_if(
                &self.retry,
                "arXiv query",
                || self.fetch_page(&search_query, start),
                is_retryable,
            )
            .await?;

            let received = feed.entries.len();
            for entry in feed.entries {
                if entry.is_error() {
                    bail!("arXiv API rejected the query: {}", entry.summary.trim());
                }
                articles.push(entry.into_article());
            }

            start += received;
            debug!(
                "Fetched {} entries (total so far {}, reported {:?})",
                received, start, feed.total_results
            );

            let exhausted = feed.total_results.is_some_and(|total| start >= total);
            if received < self.page_size || exhausted {
                break;
            }
        }

        info!("Found {} articles on arXiv", articles.len());
        Ok(articles)
    }

    async fn fetch_page(&self, search_query: &str, start: usize) -> Result<Feed> {
        let start = start.to_string();
        let max_results = self.page_size.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("search_query", search_query),
                ("start", start.as_str()),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "ascending"),
            ])
            .send()
            .await
            .context("Failed to send request to arXiv API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StatusError { status, body }.into());
        }

        let body = response
            .text()
            .await
            .context("Failed to read arXiv response")?;
        parse_feed(&body)
    }
}
