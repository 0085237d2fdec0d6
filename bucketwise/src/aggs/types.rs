use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_OTHER_BUCKET_LABEL: &str = "Other";
pub const DEFAULT_MISSING_BUCKET_LABEL: &str = "Missing";

/// Aggregation kinds understood by the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggType {
    Terms,
    Histogram,
    DateHistogram,
    Filters,
    Range,
    Count,
    Avg,
    Sum,
    Min,
    Max,
    Cardinality,
}

impl AggType {
    /// Bucket aggregations may carry children; metrics are always leaves.
    pub fn is_bucket(&self) -> bool {
        matches!(
            self,
            AggType::Terms
                | AggType::Histogram
                | AggType::DateHistogram
                | AggType::Filters
                | AggType::Range
        )
    }

    /// Name of the aggregation in the request DSL. `Count` has none because
    /// the backend reports it as `doc_count` on every bucket.
    pub fn dsl_name(&self) -> Option<&'static str> {
        match self {
            AggType::Terms => Some("terms"),
            AggType::Histogram => Some("histogram"),
            AggType::DateHistogram => Some("date_histogram"),
            AggType::Filters => Some("filters"),
            AggType::Range => Some("range"),
            AggType::Count => None,
            AggType::Avg => Some("avg"),
            AggType::Sum => Some("sum"),
            AggType::Min => Some("min"),
            AggType::Max => Some("max"),
            AggType::Cardinality => Some("cardinality"),
        }
    }
}

/// Role of an aggregation within a visualization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggSchema {
    #[default]
    Segment,
    Group,
    Split,
    Bucket,
    Metric,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,

    /// Backend order clause, e.g. `{"_count": "desc"}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Value>,

    #[serde(default, alias = "otherBucket")]
    pub other_bucket: bool,

    #[serde(default, alias = "missingBucket")]
    pub missing_bucket: bool,

    #[serde(
        default,
        alias = "otherBucketLabel",
        skip_serializing_if = "Option::is_none"
    )]
    pub other_bucket_label: Option<String>,

    #[serde(
        default,
        alias = "missingBucketLabel",
        skip_serializing_if = "Option::is_none"
    )]
    pub missing_bucket_label: Option<String>,

    /// Type-specific settings passed through to the DSL untouched
    /// (`filters` for filters aggregations, `ranges` for range aggregations).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AggParams {
    pub fn other_bucket_label(&self) -> &str {
        self.other_bucket_label
            .as_deref()
            .unwrap_or(DEFAULT_OTHER_BUCKET_LABEL)
    }

    pub fn missing_bucket_label(&self) -> &str {
        self.missing_bucket_label
            .as_deref()
            .unwrap_or(DEFAULT_MISSING_BUCKET_LABEL)
    }
}

/// One aggregation as configured by the caller, before it is placed in a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggConfig {
    /// Response key; assigned from insertion order when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub agg_type: AggType,

    #[serde(default)]
    pub schema: AggSchema,

    #[serde(default)]
    pub params: AggParams,
}

impl AggConfig {
    pub fn new(agg_type: AggType, params: AggParams) -> Self {
        let schema = if agg_type.is_bucket() {
            AggSchema::Segment
        } else {
            AggSchema::Metric
        };
        Self {
            id: None,
            agg_type,
            schema,
            params,
        }
    }

    /// Terms aggregation over `field`
    pub fn terms(field: impl Into<String>) -> Self {
        Self::new(
            AggType::Terms,
            AggParams {
                field: Some(field.into()),
                ..Default::default()
            },
        )
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.params.size = Some(size);
        self
    }

    pub fn with_other_bucket(mut self, enabled: bool) -> Self {
        self.params.other_bucket = enabled;
        self
    }

    pub fn with_missing_bucket(mut self, enabled: bool) -> Self {
        self.params.missing_bucket = enabled;
        self
    }
}
