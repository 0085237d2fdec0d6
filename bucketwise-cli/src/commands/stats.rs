use anyhow::{Context, Result};
use bucketwise::Config;
use bucketwise_telemetry::{
    get_high_level_stats, handle_high_level_stats_response, restrict_to, ClusterStats,
    HttpStatsSource,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;

use super::{print_json, read_json};

/// Roll up a saved response; an empty cluster list keeps every cluster
pub fn cluster_stats(response: &Path, product: &str, clusters: &[String]) -> Result<ClusterStats> {
    let response: Value = read_json(response)?;
    let stats = handle_high_level_stats_response(&response, product);
    if clusters.is_empty() {
        Ok(stats)
    } else {
        Ok(restrict_to(stats, clusters))
    }
}

pub fn run_cluster_stats(response: &Path, product: &str, clusters: &[String]) -> Result<()> {
    let stats = cluster_stats(response, product, clusters)?;
    print_json(&stats)
}

pub async fn run_fetch_stats(
    config: &Config,
    product: &str,
    clusters: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<()> {
    tracing::info!(
        "Fetching {} stats for {} clusters from {}",
        product,
        clusters.len(),
        config.search.base_url
    );

    let source = HttpStatsSource::new(&config.search)?;
    let stats = get_high_level_stats(&source, &config.monitoring, product, clusters, start, end)
        .await
        .with_context(|| format!("Failed to collect {} stats", product))?;
    print_json(&stats)
}
