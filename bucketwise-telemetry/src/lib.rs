//! Cluster usage telemetry
//!
//! Collects the latest monitoring document of every product instance in a set
//! of clusters and rolls them up into per-cluster counts of instances,
//! versions and cloud placement.

pub mod error;
pub mod high_level_stats;
pub mod query;
pub mod source;

pub use error::{Result, TelemetryError};
pub use high_level_stats::{
    handle_high_level_stats_response, restrict_to, ClusterRecord, ClusterStats, CloudRecord,
};
pub use query::{build_high_level_stats_query, HighLevelStatsQuery};
pub use source::{HttpStatsSource, StatsSource};

use bucketwise::config::MonitoringConfig;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Run the monitoring search and return the raw response
pub async fn fetch_high_level_stats(
    source: &dyn StatsSource,
    config: &MonitoringConfig,
    product: &str,
    cluster_uuids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Value> {
    let query = build_high_level_stats_query(config, product, cluster_uuids, start, end);
    source.search(&query).await
}

/// Per-cluster stats for `product`, limited to `cluster_uuids`
pub async fn get_high_level_stats(
    source: &dyn StatsSource,
    config: &MonitoringConfig,
    product: &str,
    cluster_uuids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ClusterStats> {
    let response =
        fetch_high_level_stats(source, config, product, cluster_uuids, start, end).await?;
    let stats = handle_high_level_stats_response(&response, product);
    tracing::info!(product, clusters = stats.len(), "Collected high level stats");
    Ok(restrict_to(stats, cluster_uuids))
}
