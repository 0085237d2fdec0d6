use super::builder::{target_clauses, OtherBucketAgg, PathStep, OTHER_FILTER_AGG};
use crate::aggs::{AggId, AggTree};
use crate::error::Result;
use crate::response::{AggResult, Aggregations, Bucket, BucketKey, Buckets, SearchResponse};

/// Split an other-filter label (`"-US-ios"`) into ancestor bucket keys.
///
/// Only needed for labels that did not come from an [`OtherBucketAgg`]; keys
/// that themselves contain `-` cannot be recovered this way. The root label is
/// empty; any other label without a leading `-` is not an other-filter label.
pub fn parse_other_label(label: &str) -> Option<Vec<String>> {
    if label.is_empty() {
        return Some(Vec::new());
    }
    label
        .strip_prefix('-')
        .map(|rest| rest.split('-').map(str::to_string).collect())
}

/// Merge the residual counts of `other_response` into a copy of `response`.
///
/// Each non-empty label of the `other-filter` aggregation becomes one `Other`
/// bucket appended to the matching bucket list. Labels produced by `request`
/// are located through their recorded bucket path; any other label is resolved
/// by splitting it on `-`. Labels that resolve to nothing are skipped.
///
/// Neither input is modified. Merging the same pair twice appends twice.
pub fn merge_other_bucket_response(
    tree: &AggTree,
    response: &SearchResponse,
    other_response: &SearchResponse,
    target: AggId,
    request: &OtherBucketAgg,
) -> Result<SearchResponse> {
    let node = tree.node(target)?;
    let ancestor_ids: Vec<String> = tree
        .ancestors(target)?
        .into_iter()
        .map(|n| n.id.clone())
        .collect();
    let index = Some(tree.index_pattern()).filter(|p| !p.is_empty());
    let other_label = node.params.other_bucket_label().to_string();

    let mut merged = response.clone();

    let Some(residuals) = other_response.bucket_agg(OTHER_FILTER_AGG) else {
        tracing::warn!(agg = %node.id, "Other-bucket response has no {} aggregation", OTHER_FILTER_AGG);
        return Ok(merged);
    };
    let Some(aggregations) = merged.aggregations.as_mut() else {
        return Ok(merged);
    };

    for (name, residual) in residuals.buckets.iter() {
        let label = residual.label(name);
        if residual.doc_count == 0 {
            tracing::debug!(label = %label, "Empty residual, no Other bucket");
            continue;
        }

        let (target_buckets, filters) = match request.filter(&label) {
            Some(recorded) => (
                locate_by_path(aggregations, &recorded.path, &node.id),
                request.target_clauses(recorded),
            ),
            None => {
                let Some(keys) = parse_other_label(&label) else {
                    tracing::warn!(label = %label, "Not an other-filter label, skipped");
                    continue;
                };
                let located = locate_by_keys(aggregations, &ancestor_ids, &keys, &node.id);
                let excluded: Vec<_> = located
                    .as_deref()
                    .map(|buckets| {
                        buckets
                            .iter()
                            .filter_map(|(_, b)| b.key.as_ref().and_then(BucketKey::as_term))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                (located, target_clauses(request.field(), excluded, index))
            }
        };

        let Some(target_buckets) = target_buckets else {
            tracing::warn!(label = %label, agg = %node.id, "Label does not match the response, skipped");
            continue;
        };

        let mut bucket = residual.clone();
        bucket.key = Some(BucketKey::Other);
        bucket.key_as_string = Some(other_label.clone());
        bucket.filters = Some(filters);
        target_buckets.push(bucket);
    }

    Ok(merged)
}

fn target_list<'a>(level: &'a mut Aggregations, target_id: &str) -> Option<&'a mut Buckets> {
    level
        .get_mut(target_id)
        .and_then(AggResult::as_buckets_mut)
        .map(|result| &mut result.buckets)
}

fn locate_by_path<'a>(
    aggregations: &'a mut Aggregations,
    path: &[PathStep],
    target_id: &str,
) -> Option<&'a mut Buckets> {
    let mut level = aggregations;
    for step in path {
        let result = level.get_mut(&step.agg_id)?.as_buckets_mut()?;
        let (name, bucket) = result.buckets.get_mut(step.index)?;
        if bucket.label(name) != step.key {
            return None;
        }
        level = &mut bucket.sub_aggs;
    }
    target_list(level, target_id)
}

fn locate_by_keys<'a>(
    aggregations: &'a mut Aggregations,
    ancestor_ids: &[String],
    keys: &[String],
    target_id: &str,
) -> Option<&'a mut Buckets> {
    if ancestor_ids.len() != keys.len() {
        return None;
    }
    let mut level = aggregations;
    for (agg_id, key) in ancestor_ids.iter().zip(keys) {
        let result = level.get_mut(agg_id)?.as_buckets_mut()?;
        let bucket: &mut Bucket = result
            .buckets
            .iter_mut()
            .find(|(name, bucket)| bucket.label(*name) == *key)
            .map(|(_, bucket)| bucket)?;
        level = &mut bucket.sub_aggs;
    }
    target_list(level, target_id)
}
