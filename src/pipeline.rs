use std::time::Duration;

use indicatif::ProgressBar;
use rand::Rng;
use tracing::{error, info, warn};

use crate::config::ScraperConfig;
use crate::content::ContentDocument;
use crate::extractor;
use crate::fetcher::{FetchOutcome, PageSource};
use crate::product::{self, ParseOutcome};
use crate::store::DocumentStore;

/// Counters returned after a run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScrapeStats {
    pub stored: usize,
    /// Product URLs dropped before the write: fetch exhausted or nothing parsed.
    pub skipped: usize,
    pub write_failures: usize,
    /// Categories whose listing page was requested.
    pub categories: usize,
}

enum Item {
    Stored,
    Skipped,
    WriteFailed,
}

/// Sequential category → listing → product walk, stopping once `limit`
/// documents have been written.
pub struct Pipeline<'a, S, D> {
    source: &'a S,
    store: &'a D,
    cfg: &'a ScraperConfig,
    progress: ProgressBar,
}

impl<'a, S: PageSource, D: DocumentStore> Pipeline<'a, S, D> {
    pub fn new(source: &'a S, store: &'a D, cfg: &'a ScraperConfig) -> Self {
        Self {
            source,
            store,
            cfg,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, limit: usize) -> ScrapeStats {
        let mut stats = ScrapeStats::default();

        'categories: for category in &self.cfg.categories {
            if stats.stored >= limit {
                break;
            }
            stats.categories += 1;

            let category_url = self.cfg.category_url(category);
            info!("Scraping category: {}", category_url);

            let html = match self.source.fetch(&category_url).await {
                FetchOutcome::Fetched(body) => body,
                FetchOutcome::Exhausted { attempts, reason } => {
                    warn!(
                        "Category page {} unavailable after {} attempts ({}), skipping category",
                        category_url, attempts, reason
                    );
                    continue;
                }
            };

            let listing = extractor::extract_urls(&html, &self.cfg.base_url);
            match listing.strategy {
                Some(i) if !listing.urls.is_empty() => info!(
                    "Found {} product URLs on {} (strategy {})",
                    listing.urls.len(),
                    category_url,
                    i + 1
                ),
                _ => {
                    warn!("Category page {} lists no products", category_url);
                    continue;
                }
            }

            for url in listing.urls {
                if stats.stored >= limit {
                    break 'categories;
                }

                self.pause().await;

                match self.process(category, &url).await {
                    Item::Stored => {
                        stats.stored += 1;
                        self.progress.inc(1);
                        info!("Progress: {}/{} products stored", stats.stored, limit);
                    }
                    Item::Skipped => stats.skipped += 1,
                    Item::WriteFailed => stats.write_failures += 1,
                }
            }
        }

        self.progress.finish_and_clear();
        info!(
            "Run finished: {} stored, {} skipped, {} write failures across {} categories",
            stats.stored, stats.skipped, stats.write_failures, stats.categories
        );
        stats
    }

    async fn process(&self, category: &str, url: &str) -> Item {
        let html = match self.source.fetch(url).await {
            FetchOutcome::Fetched(body) => body,
            FetchOutcome::Exhausted { reason, .. } => {
                warn!("Skipping {}: {}", url, reason);
                return Item::Skipped;
            }
        };

        let record = match product::parse(&html, category) {
            ParseOutcome::Product(record) => record.with_url(url),
            ParseOutcome::NothingFound => {
                warn!("Skipping {}: no product fields on page", url);
                return Item::Skipped;
            }
            ParseOutcome::Failed(reason) => {
                warn!("Skipping {}: {}", url, reason);
                return Item::Skipped;
            }
        };

        let doc = ContentDocument::from_record(&record);
        match self.store.insert_content(&doc).await {
            Ok(id) => {
                info!(
                    "Stored product: {} ({})",
                    record.name.as_deref().unwrap_or("Unknown"),
                    id
                );
                Item::Stored
            }
            Err(e) => {
                error!("Error storing product from {}: {}", url, e);
                Item::WriteFailed
            }
        }
    }

    async fn pause(&self) {
        let delay = courtesy_delay(self.cfg.min_delay_ms, self.cfg.max_delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Uniform random delay in `[min_ms, max_ms]`.
fn courtesy_delay(min_ms: u64, max_ms: u64) -> Duration {
    let ms = if max_ms <= min_ms {
        min_ms
    } else {
        rand::thread_rng().gen_range(min_ms..=max_ms)
    };
    Duration::from_millis(ms)
}
