//! Missing bucket rewriting
//!
//! Terms aggregations with `missing_bucket` ask the backend to report
//! documents without the field under a reserved key. This turns those buckets
//! into display-ready `Missing` buckets carrying a "field does not exist"
//! filter.

use crate::aggs::{AggId, AggTree, AggType};
use crate::error::{Error, Result};
use crate::filters::Filter;
use crate::response::{AggResult, Aggregations, SearchResponse};

/// Label every missing-value bucket of `target` and attach a negated exists
/// filter for its field. Buckets are found at any nesting depth; a response
/// without one, or a target that does not request a missing bucket, is
/// returned unchanged.
pub fn update_missing_bucket(
    response: &SearchResponse,
    tree: &AggTree,
    target: AggId,
) -> Result<SearchResponse> {
    let node = tree.node(target)?;
    if node.agg_type != AggType::Terms {
        return Err(Error::NotTermsAgg {
            id: node.id.clone(),
            found: format!("{:?}", node.agg_type),
        });
    }
    let field = node
        .field()
        .ok_or_else(|| Error::MissingField(node.id.clone()))?;
    if !node.params.missing_bucket {
        tracing::debug!(agg = %node.id, "Missing bucket not requested, response unchanged");
        return Ok(response.clone());
    }

    let index = Some(tree.index_pattern()).filter(|p| !p.is_empty());
    let filter = Filter::field_not_exists(field, index);
    let label = node.params.missing_bucket_label();

    let mut updated = response.clone();
    if let Some(aggregations) = updated.aggregations.as_mut() {
        let rewritten = rewrite(aggregations, &node.id, &filter, label);
        tracing::debug!(agg = %node.id, rewritten, "Updated missing buckets");
    }
    Ok(updated)
}

fn rewrite(level: &mut Aggregations, target_id: &str, filter: &Filter, label: &str) -> usize {
    if let Some(result) = level.get_mut(target_id).and_then(AggResult::as_buckets_mut) {
        let mut count = 0;
        for (_, bucket) in result.buckets.iter_mut() {
            if bucket.is_missing() {
                bucket.key_as_string = Some(label.to_string());
                bucket.filters = Some(vec![filter.clone()]);
                count += 1;
            }
        }
        return count;
    }

    let mut count = 0;
    for result in level.values_mut().filter_map(AggResult::as_buckets_mut) {
        for (_, bucket) in result.buckets.iter_mut() {
            count += rewrite(&mut bucket.sub_aggs, target_id, filter, label);
        }
    }
    count
}
