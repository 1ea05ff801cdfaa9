// src/search/gggenome_integration.rs

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;

use super::{CapabilityError, SearchCapability, SearchQuery};

pub const DEFAULT_GGGENOME_URL: &str = "https://gggenome.dbcls.jp";

/// HTTP client for a GGGenome-compatible full-text genome search service.
///
/// Requests look like `{base_url}/{assembly}/{mismatches}/{strand}/nogap/{sequence}.txt`
/// and are answered with the tabular text format parsed in `response.rs`.
pub struct GgGenomeClient {
    client: Client,
    base_url: String,
}

impl GgGenomeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/plain"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("offtarget/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn query_url(&self, query: &SearchQuery<'_>) -> String {
        format!(
            "{}/{}/{}/{}/nogap/{}.txt",
            self.base_url, query.assembly, query.mismatches, query.strand, query.sequence
        )
    }
}

impl SearchCapability for GgGenomeClient {
    fn name(&self) -> &str {
        "GGGenome"
    }

    fn search(&self, query: &SearchQuery<'_>) -> Result<String, CapabilityError> {
        let url = self.query_url(query);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| CapabilityError::transient(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .text()
                .map_err(|e| CapabilityError::transient(format!("reading body of {url}: {e}")));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(CapabilityError::Transient {
                cause: format!("rate limited by {url}"),
                retry_after,
            });
        }

        let error_text = response.text().unwrap_or_default();
        let cause = format!(
            "{url} answered {status}: {}",
            error_text.lines().next().unwrap_or("").trim()
        );
        if status.is_server_error() {
            Err(CapabilityError::transient(cause))
        } else {
            Err(CapabilityError::Permanent(cause))
        }
    }
}
