//! Read-only client for the WordPress REST API (`/wp-json/wp/v2`).

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::content::{Category, Post};

/// Base URL of the kaiga.online content API.
pub const DEFAULT_API_URL: &str = "https://kaiga.online/wp-json/wp/v2";

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

pub const DEFAULT_PER_PAGE: u32 = 10;

/// Page size used for search results.
pub const SEARCH_PER_PAGE: u32 = 20;

const CATEGORIES_PER_PAGE: u32 = 100;

pub type Result<T> = std::result::Result<T, ContentError>;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct WordPressClient {
    client: Client,
    base_url: String,
}

impl WordPressClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kaiga/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("wordpress: GET {} {:?}", url, query);
        let response = self.client.get(&url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(ContentError::Status(response.status()));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn fetch_posts(&self, page: u32, per_page: u32) -> Result<Vec<Post>> {
        self.get_json(
            "posts",
            &[
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
                ("_embed", "true".to_string()),
            ],
        )
        .await
    }

    pub async fn fetch_posts_by_category(
        &self,
        category_id: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Post>> {
        self.get_json(
            "posts",
            &[
                ("categories", category_id.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
                ("_embed", "true".to_string()),
            ],
        )
        .await
    }

    /// First post carrying `slug`, if any.
    pub async fn fetch_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let posts: Vec<Post> = self
            .get_json(
                "posts",
                &[("slug", slug.to_string()), ("_embed", "true".to_string())],
            )
            .await?;
        Ok(posts.into_iter().next())
    }

    pub async fn search_posts(&self, term: &str, page: u32) -> Result<Vec<Post>> {
        self.get_json(
            "posts",
            &[
                ("search", term.to_string()),
                ("page", page.to_string()),
                ("per_page", SEARCH_PER_PAGE.to_string()),
                ("_embed", "true".to_string()),
            ],
        )
        .await
    }

    pub async fn fetch_categories(&self) -> Result<Vec<Category>> {
        self.get_json("categories", &[("per_page", CATEGORIES_PER_PAGE.to_string())])
            .await
    }
}
