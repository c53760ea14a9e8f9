//! Where the facts and the pictures come from.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use poise::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{event, Level};

use factbot_common::prelude::*;

/// Words that say nothing about what a fact is about.
const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "always", "because", "been", "before", "being", "could", "does", "each", "every",
    "from", "have", "into", "just", "know", "like", "made", "many", "more", "most", "much", "only", "other",
    "over", "same", "some", "such", "than", "that", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "were", "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

const MAX_QUERY_WORDS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("The fact API returned an empty fact")]
    EmptyFact,
    #[error("No image found for '{0}'")]
    NoResults(String),
    #[error("No image API key configured")]
    MissingApiKey,
}

/// Something that hands out random facts.
#[async_trait]
pub trait FactSource: Send + Sync {
    async fn fetch_fact(&self) -> Result<String, FetchError>;
}

/// Something that finds a picture for a free text query.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn find_image(&self, query: &str) -> Result<String, FetchError>;
}

/// A fact, and whether it is the configured fallback rather than a fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub text: String,
    pub is_fallback: bool,
}

/// Everything that goes into one fact message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub fact: Fact,
    pub image_url: Option<String>,
}

/// Client for an endpoint that answers with `{ "text": "..." }`.
pub struct FactClient {
    http: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct FactResponse {
    text: String,
}

impl FactClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

#[async_trait]
impl FactSource for FactClient {
    #[tracing::instrument(level = "trace", name = "factbot.content.fact", skip(self), fields(url = %self.url))]
    async fn fetch_fact(&self) -> Result<String, FetchError> {
        let response = self.http
            .get(&self.url)
            .send().await?
            .error_for_status()?
            .json::<FactResponse>().await?;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(FetchError::EmptyFact);
        }

        Ok(text.to_string())
    }
}

/// Unsplash photo search.
pub struct UnsplashClient {
    http: reqwest::Client,
    search_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    urls: ImageUrls,
}

#[derive(Debug, Deserialize)]
struct ImageUrls {
    regular: String,
}

impl UnsplashClient {
    pub fn new(http: reqwest::Client, search_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { http, search_url: search_url.into(), api_key }
    }
}

#[async_trait]
impl ImageSource for UnsplashClient {
    #[tracing::instrument(level = "trace", name = "factbot.content.image", skip(self))]
    async fn find_image(&self, query: &str) -> Result<String, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::MissingApiKey)?;

        let response = self.http
            .get(&self.search_url)
            .query(&[("query", query), ("per_page", "1"), ("orientation", "landscape")])
            .header(AUTHORIZATION, format!("Client-ID {api_key}"))
            .send().await?
            .error_for_status()?
            .json::<SearchResponse>().await?;

        response.results
            .into_iter()
            .next()
            .map(|r| r.urls.regular)
            .ok_or_else(|| FetchError::NoResults(query.to_string()))
    }
}

/// Picks a few telling words out of a fact to search a picture with.
pub fn image_query(fact: &str) -> String {
    let mut words: Vec<String> = Vec::with_capacity(MAX_QUERY_WORDS);

    for word in fact.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() <= 3
            || word.chars().all(|c| c.is_ascii_digit())
            || STOP_WORDS.contains(&word.as_str())
            || words.contains(&word)
        {
            continue;
        }

        words.push(word);
        if words.len() == MAX_QUERY_WORDS {
            break;
        }
    }

    if words.is_empty() {
        return "curiosity".to_string();
    }

    words.join(" ")
}

/// The fact source, the optional image source and what to fall back on when they fail.
pub struct ContentSources {
    facts: Arc<dyn FactSource>,
    fallback_fact: String,
    images: Option<Arc<dyn ImageSource>>,
    fallback_image: Option<String>,
}

impl ContentSources {
    /// Facts only, no pictures.
    pub fn new(facts: Arc<dyn FactSource>, fallback_fact: impl Into<String>) -> Self {
        Self { facts, fallback_fact: fallback_fact.into(), images: None, fallback_image: None }
    }

    /// Attach a picture to every payload. `fallback_image` is used when the search fails, without it the picture is left out.
    pub fn with_images(mut self, images: Arc<dyn ImageSource>, fallback_image: Option<String>) -> Self {
        self.images = Some(images);
        self.fallback_image = fallback_image;
        self
    }

    /// Build the http backed sources from the configuration.
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .with_context(|| "Error building http client")?;

        let facts = Arc::new(FactClient::new(http.clone(), config.fact_api_url.as_str()));
        let sources = Self::new(facts, config.fallback_fact.as_str());

        if !config.image.enabled {
            return Ok(sources);
        }

        if config.image.api_key.is_none() {
            event!(Level::WARN, "Images are enabled without an API key, only the fallback image will be used");
        }

        let images = Arc::new(UnsplashClient::new(
            http,
            config.image.search_url.as_str(),
            config.image.api_key.clone(),
        ));

        Ok(sources.with_images(images, config.image.fallback_url.clone()))
    }

    /// A fresh fact, or the fallback fact when the source fails.
    pub async fn fact(&self) -> Fact {
        match self.facts.fetch_fact().await {
            Ok(text) => Fact { text, is_fallback: false },
            Err(error) => {
                event!(Level::WARN, %error, "Error fetching fact, using the fallback");
                Fact { text: self.fallback_fact.clone(), is_fallback: true }
            }
        }
    }

    /// A picture for `fact`, if pictures are enabled.
    pub async fn image_for(&self, fact: &Fact) -> Option<String> {
        let images = self.images.as_ref()?;
        let query = image_query(&fact.text);

        match images.find_image(&query).await {
            Ok(url) => Some(url),
            Err(error) => {
                event!(Level::WARN, %error, %query, "Error fetching image, using the fallback");
                self.fallback_image.clone()
            }
        }
    }

    /// One fact with its picture. Never fails, the fallbacks fill in for the sources.
    pub async fn payload(&self) -> Payload {
        let fact = self.fact().await;
        let image_url = self.image_for(&fact).await;

        Payload { fact, image_url }
    }
}
