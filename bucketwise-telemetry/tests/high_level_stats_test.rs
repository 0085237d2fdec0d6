//! Integration tests for the cluster stats rollup

use async_trait::async_trait;
use bucketwise::config::MonitoringConfig;
use bucketwise_telemetry::high_level_stats::{
    RegionCount, VersionCount, VmTypeCount, ZoneCount,
};
use bucketwise_telemetry::{
    fetch_high_level_stats, get_high_level_stats, handle_high_level_stats_response,
    ClusterRecord, ClusterStats, CloudRecord, HighLevelStatsQuery, StatsSource, TelemetryError,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Mutex;

const PRODUCT: &str = "xyz";

fn hit(cluster_uuid: Option<&str>, version: Option<&str>, cloud: Option<Value>) -> Value {
    let mut stats = serde_json::Map::new();
    if let Some(version) = version {
        stats.insert(PRODUCT.into(), json!({ "version": version }));
    }
    if let Some(cloud) = cloud {
        stats.insert("cloud".into(), cloud);
    }

    let mut source = serde_json::Map::new();
    if let Some(uuid) = cluster_uuid {
        source.insert("cluster_uuid".into(), json!(uuid));
    }
    if !stats.is_empty() {
        source.insert(format!("{PRODUCT}_stats"), Value::Object(stats));
    }
    json!({ "_source": source })
}

fn response() -> Value {
    json!({
        "hits": {
            "hits": [
                hit(Some("a"), Some("1.2.3-alpha1"), None),
                hit(Some("a"), Some("1.2.3-alpha1"), None),
                hit(Some("b"), Some("2.3.4-rc1"), None),
                hit(Some("b"), Some("2.3.4"), None),
                hit(Some("b"), None, None),
                hit(Some("c"), Some("5.6.1"), Some(json!({
                    "name": "bare-metal", "id": "123", "vm_type": "x1", "region": "abc-123"
                }))),
                hit(Some("c"), Some("5.6.1"), Some(json!({
                    "name": "bare-metal", "id": "234", "vm_type": "ps4",
                    "region": "def-123", "zone": "def-123-A"
                }))),
                // same instance as above
                hit(Some("c"), Some("5.6.1"), Some(json!({
                    "name": "bare-metal", "id": "234", "vm_type": "ps4",
                    "region": "def-123", "zone": "def-123-A"
                }))),
                hit(Some("c"), Some("5.6.1"), Some(json!({ "name": "bare-metal" }))),
                hit(None, Some("2.3.4"), None),
            ]
        }
    })
}

fn versions(list: &[(&str, u64)]) -> Vec<VersionCount> {
    list.iter()
        .map(|(version, count)| VersionCount {
            version: version.to_string(),
            count: *count,
        })
        .collect()
}

fn expected() -> ClusterStats {
    let mut stats = ClusterStats::new();
    stats.insert(
        "a".into(),
        ClusterRecord {
            count: 2,
            versions: versions(&[("1.2.3-alpha1", 2)]),
            cloud: None,
        },
    );
    stats.insert(
        "b".into(),
        ClusterRecord {
            count: 3,
            versions: versions(&[("2.3.4-rc1", 1), ("2.3.4", 1)]),
            cloud: None,
        },
    );
    stats.insert(
        "c".into(),
        ClusterRecord {
            count: 4,
            versions: versions(&[("5.6.1", 4)]),
            cloud: Some(vec![CloudRecord {
                name: "bare-metal".into(),
                count: 4,
                vms: 2,
                vm_types: vec![
                    VmTypeCount { vm_type: "x1".into(), count: 1 },
                    VmTypeCount { vm_type: "ps4".into(), count: 2 },
                ],
                regions: vec![
                    RegionCount { region: "abc-123".into(), count: 1 },
                    RegionCount { region: "def-123".into(), count: 2 },
                ],
                zones: vec![ZoneCount { zone: "def-123-A".into(), count: 2 }],
            }]),
        },
    );
    stats
}

fn cluster_uuids() -> Vec<String> {
    vec!["a".into(), "b".into(), "c".into()]
}

/// In-memory source that records the queries it receives
struct FixedSource {
    response: Value,
    seen: Mutex<Vec<HighLevelStatsQuery>>,
}

impl FixedSource {
    fn new(response: Value) -> Self {
        Self {
            response,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StatsSource for FixedSource {
    async fn search(&self, query: &HighLevelStatsQuery) -> bucketwise_telemetry::Result<Value> {
        self.seen.lock().unwrap().push(query.clone());
        Ok(self.response.clone())
    }
}

struct FailingSource;

#[async_trait]
impl StatsSource for FailingSource {
    async fn search(&self, _query: &HighLevelStatsQuery) -> bucketwise_telemetry::Result<Value> {
        Err(TelemetryError::Status {
            status: 503,
            body: "unavailable".into(),
        })
    }
}

fn monitoring() -> MonitoringConfig {
    let mut config = MonitoringConfig::default();
    config.max_bucket_size = 123;
    config
        .index_patterns
        .insert(PRODUCT.into(), format!(".monitoring-{PRODUCT}-N-*"));
    config
}

#[test]
fn test_handles_valid_response() {
    let stats = handle_high_level_stats_response(&response(), PRODUCT);
    assert_eq!(stats, expected());
}

#[test]
fn test_handles_unexpected_response() {
    assert!(handle_high_level_stats_response(&json!({}), PRODUCT).is_empty());
    assert!(handle_high_level_stats_response(&json!({ "hits": {} }), PRODUCT).is_empty());
    assert!(handle_high_level_stats_response(&json!([1, 2]), PRODUCT).is_empty());
}

#[test]
fn test_handles_no_hits_response() {
    let stats = handle_high_level_stats_response(&json!({ "hits": { "hits": [] } }), PRODUCT);
    assert!(stats.is_empty());
}

#[test]
fn test_handling_is_idempotent() {
    let response = response();
    let first = handle_high_level_stats_response(&response, PRODUCT);
    let second = handle_high_level_stats_response(&response, PRODUCT);
    assert_eq!(first, second);
}

#[test]
fn test_cloud_omitted_from_json_when_absent() {
    let stats = handle_high_level_stats_response(&response(), PRODUCT);
    let value = serde_json::to_value(&stats).unwrap();

    assert!(value["a"].get("cloud").is_none());
    assert_eq!(value["c"]["cloud"][0]["vms"], json!(2));
    assert_eq!(value["c"]["cloud"][0]["zones"], json!([{ "zone": "def-123-A", "count": 2 }]));
}

#[tokio::test]
async fn test_fetch_returns_raw_response() {
    let source = FixedSource::new(response());
    let start = Utc.timestamp_millis_opt(0).unwrap();
    let end = Utc.timestamp_millis_opt(1).unwrap();

    let raw = fetch_high_level_stats(&source, &monitoring(), PRODUCT, &cluster_uuids(), start, end)
        .await
        .unwrap();
    assert_eq!(raw, response());

    let seen = source.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].index, ".monitoring-xyz-N-*");
    assert_eq!(seen[0].size, 123);
    assert_eq!(
        seen[0].body["query"]["bool"]["filter"][2],
        json!({ "terms": { "cluster_uuid": ["a", "b", "c"] } })
    );
}

#[tokio::test]
async fn test_get_returns_clusters() {
    let source = FixedSource::new(response());
    let start = Utc.timestamp_millis_opt(0).unwrap();
    let end = Utc.timestamp_millis_opt(1).unwrap();

    let stats = get_high_level_stats(&source, &monitoring(), PRODUCT, &cluster_uuids(), start, end)
        .await
        .unwrap();
    assert_eq!(stats, expected());
}

#[tokio::test]
async fn test_get_drops_clusters_not_requested() {
    let source = FixedSource::new(response());
    let start = Utc.timestamp_millis_opt(0).unwrap();
    let end = Utc.timestamp_millis_opt(1).unwrap();

    let stats = get_high_level_stats(&source, &monitoring(), PRODUCT, &["b".to_string()], start, end)
        .await
        .unwrap();
    assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["b"]);
}

#[tokio::test]
async fn test_get_propagates_search_errors() {
    let start = Utc.timestamp_millis_opt(0).unwrap();
    let end = Utc.timestamp_millis_opt(1).unwrap();

    let err = get_high_level_stats(&FailingSource, &monitoring(), PRODUCT, &cluster_uuids(), start, end)
        .await
        .unwrap_err();
    assert!(matches!(err, TelemetryError::Status { status: 503, .. }));
}
