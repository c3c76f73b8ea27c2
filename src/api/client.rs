use super::link::next_link;
use crate::config::types::ApiConfig;
use async_trait::async_trait;
use reqwest::header::LINK;
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

/// Longest response body excerpt kept in a status error
const BODY_EXCERPT_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned status {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("invalid API url '{0}'")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// One fetched page: the undecoded body plus the pagination link to follow.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub body: Vec<u8>,
    /// URL of the next page, `None` on the last page
    pub next: Option<String>,
}

/// Anything that can fetch a page of the feed by URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<RawPage>;

    /// URL of the first page-views page for a user.
    fn first_page_url(&self, user_id: &str) -> Result<String>;
}

/// Authenticated HTTP client for the Canvas REST API
#[derive(Debug, Clone)]
pub struct CanvasClient {
    base_url: Url,
    token: String,
    per_page: u32,
    client: reqwest::Client,
}

impl CanvasClient {
    pub fn new(config: &ApiConfig, token: impl Into<String>) -> Result<Self> {
        let base_url =
            Url::parse(&config.base_url).map_err(|_| FetchError::InvalidUrl(config.base_url.clone()))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url,
            token: token.into(),
            per_page: config.per_page,
            client,
        })
    }
}

#[async_trait]
impl PageSource for CanvasClient {
    async fn fetch_page(&self, url: &str) -> Result<RawPage> {
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > BODY_EXCERPT_LIMIT {
                let mut cut = BODY_EXCERPT_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        let next = response
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(next_link);

        let body = response.bytes().await?.to_vec();

        Ok(RawPage { body, next })
    }

    fn first_page_url(&self, user_id: &str) -> Result<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "v1", "users", user_id, "page_views"]);
        url.query_pairs_mut()
            .append_pair("per_page", &self.per_page.to_string());
        Ok(url.to_string())
    }
}
