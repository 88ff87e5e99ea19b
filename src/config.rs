use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Connection and scraping settings, passed around as a plain value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mongodb: MongoConfig,
    pub redis: RedisConfig,
    pub relational: RelationalConfig,
    pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub server_selection_timeout_ms: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".into(),
            database: "nuskin_rag".into(),
            server_selection_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            timeout_ms: 5000,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    pub path: String,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            path: "data/rag.sqlite".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Site origin prepended to category paths and relative product links.
    pub base_url: String,
    pub categories: Vec<String>,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_ms: u64,
    /// Courtesy delay before each product fetch, drawn uniformly from this range.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.nuskin.com".into(),
            categories: [
                "/us/en/catalog/exfoliators",
                "/us/en/catalog/hair_care",
                "/us/en/catalog/anti-aging",
                "/us/en/catalog/dark_circles_and_puffiness",
                "/us/en/catalog/tru_face",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            max_retries: 3,
            retry_base_delay_ms: 1000,
            request_timeout_ms: 30_000,
            min_delay_ms: 1000,
            max_delay_ms: 2000,
        }
    }
}

impl ScraperConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn category_url(&self, category: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), category)
    }
}

impl Config {
    /// Read a JSON config file; missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }
}
