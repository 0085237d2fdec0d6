//! Monitoring search request for the high level stats

use bucketwise::config::MonitoringConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A search request against a monitoring index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighLevelStatsQuery {
    pub index: String,
    pub size: usize,
    pub ignore_unavailable: bool,
    pub filter_path: Vec<String>,
    pub body: Value,
}

impl HighLevelStatsQuery {
    /// Query string parameters for `_search`
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("size", self.size.to_string()),
            ("ignore_unavailable", self.ignore_unavailable.to_string()),
            ("filter_path", self.filter_path.join(",")),
        ]
    }
}

/// Latest document per product instance for the given clusters and time range.
pub fn build_high_level_stats_query(
    config: &MonitoringConfig,
    product: &str,
    cluster_uuids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> HighLevelStatsQuery {
    let stats = format!("{product}_stats");

    let body = json!({
        "query": {
            "bool": {
                "filter": [
                    { "term": { "type": { "value": stats } } },
                    {
                        "range": {
                            "timestamp": {
                                "format": "epoch_millis",
                                "gte": start.timestamp_millis(),
                                "lte": end.timestamp_millis(),
                            }
                        }
                    },
                    { "terms": { "cluster_uuid": cluster_uuids } },
                ]
            }
        },
        "collapse": { "field": format!("{stats}.{product}.uuid") },
        "sort": [{ "timestamp": "desc" }],
    });

    HighLevelStatsQuery {
        index: config.index_pattern(product),
        size: config.max_bucket_size,
        ignore_unavailable: true,
        filter_path: vec![
            "hits.hits._source.cluster_uuid".to_string(),
            format!("hits.hits._source.{stats}.{product}.version"),
            format!("hits.hits._source.{stats}.cloud"),
        ],
        body,
    }
}
