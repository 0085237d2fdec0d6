use anyhow::Result;
use bucketwise::config::{default_config_path, Config, LoggingConfig};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "bucketwise")]
#[command(about = "Bucketwise - terms aggregation post-processing and telemetry rollups")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(short, long, env = "BUCKETWISE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the request that counts documents outside the top-N buckets
    OtherQuery {
        /// Aggregation definitions (JSON)
        #[arg(short, long)]
        aggs: PathBuf,

        /// First search response (JSON)
        #[arg(short, long)]
        response: PathBuf,

        /// Id of the terms aggregation
        #[arg(short, long)]
        target: String,
    },

    /// Merge the residual counts back as Other buckets.
    ///
    /// Other buckets are written with key "__other__" and their label in
    /// key_as_string, so the output can be processed again.
    Merge {
        /// Aggregation definitions (JSON)
        #[arg(short, long)]
        aggs: PathBuf,

        /// First search response (JSON)
        #[arg(short, long)]
        response: PathBuf,

        /// Response to the Other bucket request (JSON)
        #[arg(short, long)]
        other_response: PathBuf,

        /// Id of the terms aggregation
        #[arg(short, long)]
        target: String,

        /// Write display labels into "key" instead of the reserved keys
        #[arg(long)]
        display_keys: bool,
    },

    /// Label missing-value buckets and attach their filters.
    ///
    /// Missing buckets keep key "__missing__" with their label in
    /// key_as_string unless --display-keys is given.
    Missing {
        /// Aggregation definitions (JSON)
        #[arg(short, long)]
        aggs: PathBuf,

        /// Search response (JSON)
        #[arg(short, long)]
        response: PathBuf,

        /// Id of the terms aggregation
        #[arg(short, long)]
        target: String,

        /// Write display labels into "key" instead of the reserved keys
        #[arg(long)]
        display_keys: bool,
    },

    /// Roll up a saved monitoring search response per cluster
    ClusterStats {
        /// Monitoring search response (JSON)
        #[arg(short, long)]
        response: PathBuf,

        /// Product whose stats documents are read
        #[arg(short, long)]
        product: String,

        /// Only keep these clusters (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        clusters: Vec<String>,
    },

    /// Search the monitoring indices and roll up the result per cluster
    FetchStats {
        /// Product whose stats documents are read
        #[arg(short, long)]
        product: String,

        /// Clusters to collect (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        clusters: Vec<String>,

        /// Range start (RFC 3339), defaults to 20 minutes before the end
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Range end (RFC 3339), defaults to now
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Search backend URL, overrides the config
        #[arg(long)]
        url: Option<String>,
    },
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = Config::load_or_create(&config_path)?;
    init_logging(&config.logging);
    tracing::debug!("Using config {:?}", config_path);

    match cli.command {
        Commands::OtherQuery {
            aggs,
            response,
            target,
        } => {
            commands::run_other_query(&config, &aggs, &response, &target)?;
        }
        Commands::Merge {
            aggs,
            response,
            other_response,
            target,
            display_keys,
        } => {
            commands::run_merge(
                &config,
                &aggs,
                &response,
                &other_response,
                &target,
                display_keys,
            )?;
        }
        Commands::Missing {
            aggs,
            response,
            target,
            display_keys,
        } => {
            commands::run_missing(&config, &aggs, &response, &target, display_keys)?;
        }
        Commands::ClusterStats {
            response,
            product,
            clusters,
        } => {
            commands::run_cluster_stats(&response, &product, &clusters)?;
        }
        Commands::FetchStats {
            product,
            clusters,
            start,
            end,
            url,
        } => {
            let end = end.unwrap_or_else(Utc::now);
            let start = start.unwrap_or(end - chrono::Duration::minutes(20));
            let mut config = config;
            if let Some(url) = url {
                config.search.base_url = url;
            }
            commands::run_fetch_stats(&config, &product, &clusters, start, end).await?;
        }
    }

    Ok(())
}
