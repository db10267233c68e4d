use anyhow::{Result, Context};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::config::CrawlerConfig;
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::model::GroupField;
use crate::crawler::pipeline::CrawlPipeline;
use crate::export;
use crate::server::{self, AppState};
use crate::storage::{StoreFactory, WebsiteStore};

async fn open_store(config: &CrawlerConfig) -> Result<Arc<dyn WebsiteStore>> {
    StoreFactory::create(&config.storage)
        .await
        .context(format!("Failed to open {} store", config.storage.storage_type))
}

async fn build_pipeline(config: &CrawlerConfig) -> Result<CrawlPipeline> {
    let fetcher = HttpFetcher::new(&config.fetcher)?;
    let store = open_store(config).await?;
    Ok(CrawlPipeline::new(Arc::new(fetcher), store))
}

/// Crawl a single certificate page
pub async fn crawl(config_path: Option<&Path>, url: String) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let pipeline = build_pipeline(&config).await?;

    let record = pipeline.crawl(&url)
        .await
        .context(format!("Failed to crawl {}", url))?;

    println!("{}", serde_json::to_string_pretty(&record)?);

    Ok(())
}

/// Run the HTTP server
pub async fn serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let pipeline = build_pipeline(&config).await?;

    let bind_address = bind.unwrap_or_else(|| config.server.bind_address.clone());
    server::serve(AppState::new(pipeline), &bind_address).await
}

/// List every stored website
pub async fn list(config_path: Option<&Path>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let store = open_store(&config).await?;

    let websites = store.find_all().await?;
    if websites.is_empty() {
        println!("No websites stored");
        return Ok(());
    }

    for website in &websites {
        println!(
            "{}  {} ({}) {} star, {}, v{}",
            website.url,
            website.business_name,
            website.city,
            website.star_rating,
            website.registration_status,
            website.version
        );
    }
    println!("{} websites", websites.len());

    Ok(())
}

/// Delete every stored website
pub async fn purge(config_path: Option<&Path>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let store = open_store(&config).await?;

    let removed = store.delete_all().await?;
    info!("Deleted {} websites", removed);

    Ok(())
}

/// Print record counts per group
pub async fn stats(config_path: Option<&Path>, by: GroupField) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let store = open_store(&config).await?;

    let groups = store.group_by(by).await?;

    println!("Websites by {}:", by.field_name());
    for group in &groups {
        println!("  {:<20} {}", group.label(), group.count);
    }

    Ok(())
}

/// Export the selected fields of every website as CSV
pub async fn export(config_path: Option<&Path>, fields: String, output: Option<PathBuf>) -> Result<()> {
    let fields = export::parse_fields(&fields)?;

    let config = CrawlerConfig::load(config_path)?;
    let store = open_store(&config).await?;
    let websites = store.find_all().await?;

    let rows = match &output {
        Some(path) => {
            let file = File::create(path)
                .context(format!("Failed to create export file: {}", path.display()))?;
            export::write_csv(&websites, &fields, file)?
        },
        None => export::write_csv(&websites, &fields, io::stdout().lock())?,
    };

    if let Some(path) = output {
        info!("Exported {} rows to: {}", rows, path.display());
    }

    Ok(())
}

/// Write a default configuration file
pub async fn init_config(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(CrawlerConfig::default_path);

    if path.exists() {
        warn!("Configuration already exists at {}, leaving it untouched", path.display());
        return Ok(());
    }

    CrawlerConfig::default().save_to_file(&path)?;
    println!("Created default configuration: {}", path.display());

    Ok(())
}

/// Show the current configuration
pub async fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    println!("Current configuration:");
    println!("{:#?}", config);

    Ok(())
}
