mod backends;
mod chat;
mod config;
mod content;
mod db;
mod extractor;
mod fetcher;
mod pipeline;
mod product;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use backends::Backends;
use config::Config;
use pipeline::Pipeline;
use store::DocumentStore;

#[derive(Parser)]
#[command(name = "rag_ingest", about = "Product content ingestion and lookup for a RAG store")]
struct Cli {
    /// JSON config file (defaults to local mongodb/redis/sqlite)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape catalog categories and store product content
    Scrape {
        /// Max products to store
        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,
    },
    /// Case-insensitive text search over stored content
    Search {
        query: String,
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Recommendations from interests and previous purchases
    Recommend {
        /// Category the user is interested in (repeatable)
        #[arg(short, long = "interest")]
        interests: Vec<String>,
        /// Product id the user bought before (repeatable)
        #[arg(short, long = "purchase")]
        purchases: Vec<String>,
    },
    /// Look up a product in the catalog collection
    Product { product_id: String },
    /// Stored content per category and recent scrape runs
    Stats,
    /// Ping every backing store
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let result = match cli.command {
        Commands::Scrape { limit } => {
            let backends = Backends::connect(&cfg).await?;
            let fetcher = fetcher::HttpFetcher::new(&cfg.scraper)?;
            let run_id = db::start_run(&backends.relational, limit)?;

            let pb = ProgressBar::new(limit as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} stored")?
                    .progress_chars("=> "),
            );

            println!(
                "Scraping up to {} products from {} categories...",
                limit,
                cfg.scraper.categories.len()
            );
            let stats = Pipeline::new(&fetcher, &backends.documents, &cfg.scraper)
                .with_progress(pb)
                .run(limit)
                .await;
            db::finish_run(&backends.relational, run_id, &stats)?;

            println!(
                "Done: {} stored ({} skipped, {} write failures).",
                stats.stored, stats.skipped, stats.write_failures
            );
            Ok(())
        }
        Commands::Search { query, category } => {
            let backends = Backends::connect(&cfg).await?;
            let hits = chat::search_products(&backends.documents, &query, category.as_deref()).await;
            println!("{}", chat::format_product_response(&hits));
            Ok(())
        }
        Commands::Recommend {
            interests,
            purchases,
        } => {
            let backends = Backends::connect(&cfg).await?;
            let ctx = chat::UserContext {
                interests,
                previous_purchases: purchases,
            };
            let hits = chat::recommendations(&backends.documents, &ctx).await;
            println!("{}", chat::format_product_response(&hits));
            Ok(())
        }
        Commands::Product { product_id } => {
            let backends = Backends::connect(&cfg).await?;
            match backends.documents.product(&product_id).await? {
                Some(product) => println!("{}", serde_json::to_string_pretty(&product)?),
                None => println!("No product with id {}.", product_id),
            }
            Ok(())
        }
        Commands::Stats => {
            let backends = Backends::connect(&cfg).await?;
            let counts = backends.documents.category_counts().await?;
            println!("Total documents: {}", counts.total);
            for (category, n) in &counts.by_category {
                println!("  {:<48} {:>6}", truncate(category, 48), n);
            }

            let runs = db::recent_runs(&backends.relational, 10)?;
            if !runs.is_empty() {
                println!("\n--- Recent runs ---");
                println!(
                    "{:>4} | {:<25} | {:>5} | {:>6} | {:>7} | {:>6}",
                    "#", "Started", "Limit", "Stored", "Skipped", "Failed"
                );
                for r in &runs {
                    let started = match &r.finished_at {
                        Some(_) => truncate(&r.started_at, 25),
                        None => format!("{} *", truncate(&r.started_at, 23)),
                    };
                    println!(
                        "{:>4} | {:<25} | {:>5} | {:>6} | {:>7} | {:>6}",
                        r.id, started, r.limit, r.stored, r.skipped, r.write_failures
                    );
                }
            }
            Ok(())
        }
        Commands::Check => {
            let mut backends = Backends::connect(&cfg).await?;
            backends.ping_all().await?;
            println!(
                "MongoDB ({}), Redis ({}) and relational store ({}) reachable.",
                cfg.mongodb.database,
                cfg.redis.url(),
                cfg.relational.path
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
