//! Typed search response model
//!
//! Only the parts this crate navigates are typed; everything else is carried
//! through untouched so a merged response serializes back to what the backend
//! sent plus the synthesized buckets.

use crate::aggs::{DEFAULT_MISSING_BUCKET_LABEL, DEFAULT_OTHER_BUCKET_LABEL, MISSING_SENTINEL};
use crate::filters::Filter;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Wire key of a synthesized Other bucket
pub const OTHER_SENTINEL: &str = "__other__";

/// Results keyed by aggregation id
pub type Aggregations = BTreeMap<String, AggResult>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Aggregations>,

    /// took, hits, _shards and anything else the backend returned
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl SearchResponse {
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Replace every `Missing`/`Other` key with its display label.
    ///
    /// The result is meant for display only: once the labels are on the wire
    /// the buckets read back as ordinary terms and can no longer be told apart
    /// from real values.
    pub fn into_display_keys(mut self) -> Self {
        if let Some(aggregations) = self.aggregations.as_mut() {
            display_keys(aggregations);
        }
        self
    }

    /// Bucket aggregation stored directly under `aggregations[id]`
    pub fn bucket_agg(&self, id: &str) -> Option<&BucketAggResult> {
        match self.aggregations.as_ref()?.get(id)? {
            AggResult::Buckets(result) => Some(result),
            AggResult::Value(_) => None,
        }
    }
}

fn display_keys(level: &mut Aggregations) {
    for result in level.values_mut().filter_map(AggResult::as_buckets_mut) {
        for (_, bucket) in result.buckets.iter_mut() {
            let fallback = match bucket.key {
                Some(BucketKey::Missing) => DEFAULT_MISSING_BUCKET_LABEL,
                Some(BucketKey::Other) => DEFAULT_OTHER_BUCKET_LABEL,
                _ => {
                    display_keys(&mut bucket.sub_aggs);
                    continue;
                }
            };
            let label = bucket
                .key_as_string
                .clone()
                .unwrap_or_else(|| fallback.to_string());
            bucket.key = Some(BucketKey::Term(Value::String(label)));
            display_keys(&mut bucket.sub_aggs);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggResult {
    Buckets(BucketAggResult),
    /// Metric results and any other shape, kept verbatim
    Value(Value),
}

impl AggResult {
    pub fn as_buckets(&self) -> Option<&BucketAggResult> {
        match self {
            AggResult::Buckets(result) => Some(result),
            AggResult::Value(_) => None,
        }
    }

    pub fn as_buckets_mut(&mut self) -> Option<&mut BucketAggResult> {
        match self {
            AggResult::Buckets(result) => Some(result),
            AggResult::Value(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketAggResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_count_error_upper_bound: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_other_doc_count: Option<u64>,
    pub buckets: Buckets,
}

/// Bucket list; filters-style aggregations return buckets keyed by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Buckets {
    List(Vec<Bucket>),
    Keyed(BTreeMap<String, Bucket>),
}

impl Default for Buckets {
    fn default() -> Self {
        Buckets::List(Vec::new())
    }
}

impl Buckets {
    pub fn len(&self) -> usize {
        match self {
            Buckets::List(list) => list.len(),
            Buckets::Keyed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buckets with their map name when keyed
    pub fn iter(&self) -> Box<dyn Iterator<Item = (Option<&str>, &Bucket)> + '_> {
        match self {
            Buckets::List(list) => Box::new(list.iter().map(|b| (None, b))),
            Buckets::Keyed(map) => Box::new(map.iter().map(|(k, b)| (Some(k.as_str()), b))),
        }
    }

    pub fn iter_mut(&mut self) -> Box<dyn Iterator<Item = (Option<&str>, &mut Bucket)> + '_> {
        match self {
            Buckets::List(list) => Box::new(list.iter_mut().map(|b| (None, b))),
            Buckets::Keyed(map) => {
                Box::new(map.iter_mut().map(|(k, b)| (Some(k.as_str()), b)))
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<(Option<&str>, &Bucket)> {
        self.iter().nth(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<(Option<&str>, &mut Bucket)> {
        self.iter_mut().nth(index)
    }

    /// Append a bucket. Keyed buckets are stored under the bucket's label.
    pub fn push(&mut self, bucket: Bucket) {
        match self {
            Buckets::List(list) => list.push(bucket),
            Buckets::Keyed(map) => {
                map.insert(bucket.label(None), bucket);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<BucketKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,

    #[serde(default)]
    pub doc_count: u64,

    /// Set on synthesized buckets to describe their membership
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,

    /// Sub-aggregation results keyed by aggregation id
    #[serde(flatten)]
    pub sub_aggs: Aggregations,
}

impl Bucket {
    pub fn new(key: BucketKey, doc_count: u64) -> Self {
        Self {
            key: Some(key),
            key_as_string: None,
            doc_count,
            filters: None,
            sub_aggs: Aggregations::new(),
        }
    }

    /// Key as used in other-bucket labels: the map name for keyed buckets,
    /// otherwise the wire form of `key`
    pub fn label(&self, name: Option<&str>) -> String {
        match (name, &self.key) {
            (Some(name), _) => name.to_string(),
            (None, Some(key)) => key.to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.key, Some(BucketKey::Missing))
    }

    pub fn is_other(&self) -> bool {
        matches!(self.key, Some(BucketKey::Other))
    }

    /// Display text: `key_as_string` when set, else the key itself
    pub fn display_key(&self) -> String {
        self.key_as_string
            .clone()
            .unwrap_or_else(|| self.label(None))
    }
}

/// Bucket key with the backend's reserved sentinels lifted into variants
#[derive(Debug, Clone, PartialEq)]
pub enum BucketKey {
    Term(Value),
    Missing,
    Other,
}

impl BucketKey {
    pub fn term(value: impl Into<Value>) -> Self {
        BucketKey::Term(value.into())
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self, BucketKey::Term(_))
    }

    pub fn as_term(&self) -> Option<&Value> {
        match self {
            BucketKey::Term(value) => Some(value),
            _ => None,
        }
    }

    fn to_wire(&self) -> Value {
        match self {
            BucketKey::Term(value) => value.clone(),
            BucketKey::Missing => Value::String(MISSING_SENTINEL.into()),
            BucketKey::Other => Value::String(OTHER_SENTINEL.into()),
        }
    }

    fn from_wire(value: Value) -> Self {
        match value.as_str() {
            Some(MISSING_SENTINEL) => BucketKey::Missing,
            Some(OTHER_SENTINEL) => BucketKey::Other,
            _ => BucketKey::Term(value),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Term(Value::String(s)) => f.write_str(s),
            BucketKey::Term(value) => write!(f, "{value}"),
            BucketKey::Missing => f.write_str(MISSING_SENTINEL),
            BucketKey::Other => f.write_str(OTHER_SENTINEL),
        }
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BucketKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(BucketKey::from_wire)
    }
}
