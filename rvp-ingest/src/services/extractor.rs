//! Page extractor
//!
//! The pipeline only needs `fetch_page`; how a page is fetched and parsed
//! is up to the implementation.

use crate::models::{FetchOutcome, FetchParams, PageId, RawRecord};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Placeholder substituted with the page number in URL templates
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Status reported when a 200 response body cannot be parsed
pub const MALFORMED_BODY: i32 = -2;

const USER_AGENT: &str = concat!("rvp-ingest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("URL template must contain {{page}}: {0}")]
    InvalidTemplate(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Fetches one page of raw records
///
/// Never fails with an error: every problem is reported as a non-200
/// status in the returned [`FetchOutcome`]. A 200 with no records marks
/// the end of the collection.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn fetch_page(&self, page: PageId, params: FetchParams) -> FetchOutcome;
}

/// Extractor for a JSON API returning an array of records per page
pub struct HttpExtractor {
    http_client: reqwest::Client,
    url_template: String,
}

impl HttpExtractor {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, ExtractorError> {
        let url_template = url_template.into();
        if !url_template.contains(PAGE_PLACEHOLDER) {
            return Err(ExtractorError::InvalidTemplate(url_template));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractorError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            url_template,
        })
    }

    pub fn page_url(&self, page: PageId) -> String {
        self.url_template
            .replace(PAGE_PLACEHOLDER, &page.get().to_string())
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn fetch_page(&self, page: PageId, params: FetchParams) -> FetchOutcome {
        let url = self.page_url(page);
        debug!(page = %page, url = %url, "Fetching page");

        let response = match self.http_client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(page = %page, error = %e, "Page request failed");
                return FetchOutcome::failure(FetchOutcome::UNREACHABLE);
            }
        };

        let status = i32::from(response.status().as_u16());
        if status != FetchOutcome::SUCCESS {
            debug!(page = %page, status, "Page returned non-success status");
            return FetchOutcome::failure(status);
        }

        match response.json::<Vec<RawRecord>>().await {
            Ok(records) => FetchOutcome::success(keep_since(records, params)),
            Err(e) => {
                warn!(page = %page, error = %e, "Page body is not a record array");
                FetchOutcome::failure(MALFORMED_BODY)
            }
        }
    }
}

/// Drop records dated before the run's window; undated records are kept
pub fn keep_since(records: Vec<RawRecord>, params: FetchParams) -> Vec<RawRecord> {
    records
        .into_iter()
        .filter(|record| record.date.map_or(true, |date| date >= params.min_date))
        .collect()
}
