//! Per-cluster rollup of monitoring hits
//!
//! Every hit is one product instance reporting on behalf of a cluster. The
//! rollup counts instances per cluster, how many run each version, and which
//! cloud providers they run on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Rollup keyed by cluster uuid
pub type ClusterStats = BTreeMap<String, ClusterRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub count: u64,
    pub versions: Vec<VersionCount>,
    /// Absent when no instance reported cloud metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<Vec<CloudRecord>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCount {
    pub version: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudRecord {
    pub name: String,
    /// Instances reporting this cloud
    pub count: u64,
    /// Distinct instance ids
    pub vms: u64,
    pub vm_types: Vec<VmTypeCount>,
    pub regions: Vec<RegionCount>,
    pub zones: Vec<ZoneCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmTypeCount {
    pub vm_type: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCount {
    pub region: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneCount {
    pub zone: String,
    pub count: u64,
}

/// Counter that remembers first-seen order
#[derive(Debug, Default)]
struct Tally {
    order: Vec<String>,
    counts: HashMap<String, u64>,
}

impl Tally {
    fn increment(&mut self, key: Option<&str>) {
        let Some(key) = key else {
            return;
        };
        match self.counts.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                self.order.push(key.to_string());
                self.counts.insert(key.to_string(), 1);
            }
        }
    }

    fn into_list<T>(self, make: impl Fn(String, u64) -> T) -> Vec<T> {
        let Tally { order, counts } = self;
        order
            .into_iter()
            .map(|key| {
                let count = counts.get(&key).copied().unwrap_or_default();
                make(key, count)
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct CloudAccumulator {
    count: u64,
    ids: HashSet<String>,
    vm_types: Tally,
    regions: Tally,
    zones: Tally,
}

#[derive(Debug, Default)]
struct ClusterAccumulator {
    count: u64,
    versions: Tally,
    cloud_order: Vec<String>,
    clouds: HashMap<String, CloudAccumulator>,
}

impl ClusterAccumulator {
    /// Cloud metadata without a name is ignored
    fn add_cloud(&mut self, cloud: &Value) {
        let Some(name) = cloud.get("name").and_then(Value::as_str) else {
            return;
        };
        if !self.clouds.contains_key(name) {
            self.cloud_order.push(name.to_string());
        }
        let entry = self.clouds.entry(name.to_string()).or_default();

        entry.count += 1;
        // vms counts distinct ids; an instance without an id is never a vm
        if let Some(id) = cloud.get("id").and_then(Value::as_str) {
            entry.ids.insert(id.to_string());
        }
        entry.vm_types.increment(cloud.get("vm_type").and_then(Value::as_str));
        entry.regions.increment(cloud.get("region").and_then(Value::as_str));
        entry.zones.increment(cloud.get("zone").and_then(Value::as_str));
    }

    fn finish(mut self) -> ClusterRecord {
        let cloud = if self.cloud_order.is_empty() {
            None
        } else {
            let records = self
                .cloud_order
                .iter()
                .filter_map(|name| {
                    let acc = self.clouds.remove(name)?;
                    Some(CloudRecord {
                        name: name.clone(),
                        count: acc.count,
                        vms: acc.ids.len() as u64,
                        vm_types: acc
                            .vm_types
                            .into_list(|vm_type, count| VmTypeCount { vm_type, count }),
                        regions: acc
                            .regions
                            .into_list(|region, count| RegionCount { region, count }),
                        zones: acc.zones.into_list(|zone, count| ZoneCount { zone, count }),
                    })
                })
                .collect();
            Some(records)
        };

        ClusterRecord {
            count: self.count,
            versions: self
                .versions
                .into_list(|version, count| VersionCount { version, count }),
            cloud,
        }
    }
}

/// Roll up `hits.hits` of a monitoring search response.
///
/// Hits without `cluster_uuid` are ignored. A response of any other shape
/// yields an empty rollup.
pub fn handle_high_level_stats_response(response: &Value, product: &str) -> ClusterStats {
    let Some(hits) = response.pointer("/hits/hits").and_then(Value::as_array) else {
        tracing::debug!(product, "Response has no hits");
        return ClusterStats::new();
    };

    let stats_key = format!("{product}_stats");
    let mut clusters: BTreeMap<String, ClusterAccumulator> = BTreeMap::new();
    let mut skipped = 0usize;

    for hit in hits {
        let source = hit.get("_source");
        let Some(cluster_uuid) = source
            .and_then(|s| s.get("cluster_uuid"))
            .and_then(Value::as_str)
        else {
            skipped += 1;
            continue;
        };

        let cluster = clusters.entry(cluster_uuid.to_string()).or_default();
        cluster.count += 1;

        let product_stats = source.and_then(|s| s.get(&stats_key));
        cluster.versions.increment(
            product_stats
                .and_then(|s| s.get(product))
                .and_then(|p| p.get("version"))
                .and_then(Value::as_str),
        );
        if let Some(cloud) = product_stats
            .and_then(|s| s.get("cloud"))
            .filter(|c| c.is_object())
        {
            cluster.add_cloud(cloud);
        }
    }

    if skipped > 0 {
        tracing::debug!(product, skipped, "Ignored hits without cluster_uuid");
    }

    clusters
        .into_iter()
        .map(|(uuid, acc)| (uuid, acc.finish()))
        .collect()
}

/// Keep only the clusters that were asked for
pub fn restrict_to(mut stats: ClusterStats, cluster_uuids: &[String]) -> ClusterStats {
    stats.retain(|uuid, _| cluster_uuids.iter().any(|wanted| wanted == uuid));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tally_keeps_first_seen_order() {
        let mut tally = Tally::default();
        for key in ["b", "a", "b", "c", "a", "b"] {
            tally.increment(Some(key));
        }
        tally.increment(None);

        let list = tally.into_list(|k, c| (k, c));
        assert_eq!(
            list,
            vec![("b".to_string(), 3), ("a".to_string(), 2), ("c".to_string(), 1)]
        );
    }

    #[test]
    fn test_cloud_without_name_is_ignored() {
        let response = json!({
            "hits": { "hits": [
                { "_source": { "cluster_uuid": "x", "kibana_stats": { "cloud": { "id": "i-1", "region": "r1" } } } },
                { "_source": { "cluster_uuid": "x", "kibana_stats": { "cloud": { "name": "aws", "id": "i-2" } } } }
            ] }
        });
        let stats = handle_high_level_stats_response(&response, "kibana");
        assert_eq!(stats["x"].count, 2);
        let cloud = stats["x"].cloud.as_ref().unwrap();
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud[0].name, "aws");
        assert_eq!(cloud[0].count, 1);
        assert_eq!(cloud[0].vms, 1);
        assert!(cloud[0].regions.is_empty());
    }

    #[test]
    fn test_only_nameless_clouds_leave_cloud_unset() {
        let response = json!({
            "hits": { "hits": [
                { "_source": { "cluster_uuid": "x", "kibana_stats": { "cloud": { "id": "i-1" } } } }
            ] }
        });
        let stats = handle_high_level_stats_response(&response, "kibana");
        assert!(stats["x"].cloud.is_none());
    }

    #[test]
    fn test_non_object_cloud_is_ignored() {
        let response = json!({
            "hits": { "hits": [
                { "_source": { "cluster_uuid": "x", "kibana_stats": { "cloud": "aws" } } }
            ] }
        });
        let stats = handle_high_level_stats_response(&response, "kibana");
        assert_eq!(stats["x"].count, 1);
        assert!(stats["x"].cloud.is_none());
    }

    #[test]
    fn test_restrict_to() {
        let response = json!({
            "hits": { "hits": [
                { "_source": { "cluster_uuid": "a" } },
                { "_source": { "cluster_uuid": "b" } }
            ] }
        });
        let stats = handle_high_level_stats_response(&response, "kibana");
        let restricted = restrict_to(stats, &["b".to_string(), "z".to_string()]);
        assert_eq!(restricted.keys().collect::<Vec<_>>(), vec!["b"]);
    }
}
