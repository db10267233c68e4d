pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::crawler::model::GroupField;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file, the default location when no path is given
    #[arg(long, global = true, num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,

    /// Configuration file to use instead of the default one
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one trust-seal page and store its record
    Crawl {
        /// Certificate page URL
        #[arg(required = true)]
        url: String,
    },

    /// Run the HTTP and GraphQL server
    Serve {
        /// Address to listen on, overrides the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List stored websites
    List,

    /// Delete every stored website
    Purge,

    /// Show websites grouped by city or star rating
    Stats {
        /// Grouping field (city, star)
        #[arg(required = true)]
        by: GroupField,
    },

    /// Export stored websites as CSV
    Export {
        /// Comma separated field list, e.g. url,businessName,city
        #[arg(short, long, required = true)]
        fields: String,

        /// Output file path, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show or initialize the configuration
    Config {
        /// Write a default configuration file
        #[arg(short, long)]
        init: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Crawl { url } => {
            info!("Crawling {}", url);
            commands::crawl(config_path, url).await
        },
        Commands::Serve { bind } => {
            info!("Starting server");
            commands::serve(config_path, bind).await
        },
        Commands::List => commands::list(config_path).await,
        Commands::Purge => {
            info!("Purging stored websites");
            commands::purge(config_path).await
        },
        Commands::Stats { by } => commands::stats(config_path, by).await,
        Commands::Export { fields, output } => {
            info!("Exporting fields {}", fields);
            commands::export(config_path, fields, output).await
        },
        Commands::Config { init } => {
            if init {
                info!("Writing default configuration");
                commands::init_config(config_path).await
            } else {
                commands::show_config(config_path).await
            }
        },
    }
}
