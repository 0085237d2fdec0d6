use super::pin::{bucket_filters, BucketRef};
use crate::aggs::{AggId, AggNode, AggTree, AggType};
use crate::error::{Error, Result};
use crate::filters::{BoolQuery, Filter};
use crate::response::{AggResult, Aggregations, BucketKey, SearchResponse};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Name of the filters aggregation carrying the residual counts
pub const OTHER_FILTER_AGG: &str = "other-filter";

/// Position of an ancestor bucket inside the original response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    /// Aggregation id whose buckets were walked
    pub agg_id: String,
    /// Bucket position within that aggregation
    pub index: usize,
    /// Bucket label at that position, checked again when merging
    pub key: String,
}

/// Clauses describing one residual bucket
#[derive(Debug, Clone, PartialEq)]
pub struct OtherBucketFilter {
    pub path: Vec<PathStep>,
    /// Constraints pinning the ancestor buckets
    pub ancestor_filters: Vec<Filter>,
    /// Term keys already returned as top-N buckets
    pub excluded: Vec<Value>,
}

/// Other-bucket request computed from a first response.
///
/// [`OtherBucketAgg::request`] is the deferred query builder: it has no side
/// effects and can be called any number of times, from any thread.
#[derive(Debug, Clone, PartialEq)]
pub struct OtherBucketAgg {
    target_id: String,
    field: String,
    index_pattern: String,
    sub_aggs: Option<Value>,
    filters: BTreeMap<String, OtherBucketFilter>,
}

impl OtherBucketAgg {
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn filter(&self, label: &str) -> Option<&OtherBucketFilter> {
        self.filters.get(label)
    }

    fn index(&self) -> Option<&str> {
        Some(self.index_pattern.as_str()).filter(|p| !p.is_empty())
    }

    /// Every clause sent for `label`, in request order
    pub fn clauses(&self, filter: &OtherBucketFilter) -> Vec<Filter> {
        let mut clauses = filter.ancestor_filters.clone();
        clauses.push(Filter::field_exists(&self.field, self.index()));
        clauses.push(Filter::negated_match_values(
            &self.field,
            filter.excluded.clone(),
            self.index(),
        ));
        clauses
    }

    /// Clauses on the target field alone, as attached to a merged Other bucket
    pub fn target_clauses(&self, filter: &OtherBucketFilter) -> Vec<Filter> {
        target_clauses(&self.field, filter.excluded.clone(), self.index())
    }

    /// Request body for the residual query
    pub fn request(&self) -> Value {
        let mut labelled = Map::new();
        for (label, filter) in &self.filters {
            let query = BoolQuery::from_filters(&self.clauses(filter));
            labelled.insert(label.clone(), query.to_value());
        }

        let mut body = Map::new();
        if let Some(sub_aggs) = &self.sub_aggs {
            body.insert("aggs".into(), sub_aggs.clone());
        }
        body.insert("filters".into(), json!({ "filters": labelled }));

        let mut request = Map::new();
        request.insert(OTHER_FILTER_AGG.into(), Value::Object(body));
        Value::Object(request)
    }
}

pub(crate) fn target_clauses(field: &str, excluded: Vec<Value>, index: Option<&str>) -> Vec<Filter> {
    vec![
        Filter::negated_match_values(field, excluded, index),
        Filter::field_exists(field, index),
    ]
}

/// Build the filters aggregation that counts documents outside the top-N
/// buckets of `target`, once per combination of ancestor buckets present in
/// `response`.
///
/// Returns `Ok(None)` when no residual query is needed: the node does not ask
/// for an Other bucket, the response has no aggregations, or an ancestor level
/// returned no buckets. Fails with [`Error::BucketFilter`] when an ancestor
/// bucket cannot be described as a filter.
pub fn build_other_bucket_agg(
    tree: &AggTree,
    target: AggId,
    response: &SearchResponse,
) -> Result<Option<OtherBucketAgg>> {
    let node = tree.node(target)?;
    if node.agg_type != AggType::Terms {
        return Err(Error::NotTermsAgg {
            id: node.id.clone(),
            found: format!("{:?}", node.agg_type),
        });
    }
    if !node.params.other_bucket {
        tracing::debug!(agg = %node.id, "Other bucket disabled, no residual query");
        return Ok(None);
    }
    let field = node
        .field()
        .ok_or_else(|| Error::MissingField(node.id.clone()))?
        .to_string();

    let Some(aggregations) = response.aggregations.as_ref() else {
        tracing::debug!(agg = %node.id, "Response has no aggregations");
        return Ok(None);
    };

    let mut chain = tree.ancestors(target)?;
    chain.push(node);

    let walker = BucketWalker {
        chain: &chain,
        index: Some(tree.index_pattern()).filter(|p| !p.is_empty()),
    };
    let mut filters = BTreeMap::new();
    walker.walk(0, aggregations, Vec::new(), Vec::new(), String::new(), &mut filters)?;

    if filters.is_empty() {
        tracing::debug!(agg = %node.id, "No ancestor buckets, no residual query");
        return Ok(None);
    }
    tracing::debug!(agg = %node.id, labels = filters.len(), "Built other-bucket request");

    Ok(Some(OtherBucketAgg {
        target_id: node.id.clone(),
        field,
        index_pattern: tree.index_pattern().to_string(),
        sub_aggs: tree.subtree_dsl(target)?,
        filters,
    }))
}

struct BucketWalker<'a> {
    /// Ancestors followed by the target node
    chain: &'a [&'a AggNode],
    index: Option<&'a str>,
}

impl BucketWalker<'_> {
    fn walk(
        &self,
        depth: usize,
        level: &Aggregations,
        ancestor_filters: Vec<Filter>,
        path: Vec<PathStep>,
        label: String,
        out: &mut BTreeMap<String, OtherBucketFilter>,
    ) -> Result<()> {
        let current = self.chain[depth];
        let Some(AggResult::Buckets(result)) = level.get(&current.id) else {
            tracing::debug!(agg = %current.id, label = %label, "No result at this position");
            return Ok(());
        };

        if depth + 1 == self.chain.len() {
            let excluded = result
                .buckets
                .iter()
                .filter_map(|(_, bucket)| bucket.key.as_ref().and_then(BucketKey::as_term))
                .cloned()
                .collect();
            let label = unique_label(out, label, &path);
            out.insert(
                label,
                OtherBucketFilter {
                    path,
                    ancestor_filters,
                    excluded,
                },
            );
            return Ok(());
        }

        for (position, (name, bucket)) in result.buckets.iter().enumerate() {
            let at = BucketRef {
                name,
                position,
                bucket,
                siblings: &result.buckets,
            };
            let key = bucket.label(name);
            let mut next_filters = ancestor_filters.clone();
            next_filters.extend(bucket_filters(current, &at, self.index)?);

            let mut next_path = path.clone();
            next_path.push(PathStep {
                agg_id: current.id.clone(),
                index: position,
                key: key.clone(),
            });

            self.walk(
                depth + 1,
                &bucket.sub_aggs,
                next_filters,
                next_path,
                format!("{label}-{key}"),
                out,
            )?;
        }
        Ok(())
    }
}

/// `label`, or `label` qualified by bucket positions when another ancestor
/// combination already produced the same text (keys containing `-`)
fn unique_label(
    out: &BTreeMap<String, OtherBucketFilter>,
    label: String,
    path: &[PathStep],
) -> String {
    if !out.contains_key(&label) {
        return label;
    }

    let positions = path
        .iter()
        .map(|step| step.index.to_string())
        .collect::<Vec<_>>()
        .join(".");
    let mut candidate = format!("{label}@{positions}");
    let mut attempt = 1;
    while out.contains_key(&candidate) {
        attempt += 1;
        candidate = format!("{label}@{positions}~{attempt}");
    }
    tracing::warn!(label = %label, renamed = %candidate, "Other-bucket label collides, renamed");
    candidate
}
