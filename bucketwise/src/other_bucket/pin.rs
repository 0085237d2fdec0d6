//! Filters that pin an ancestor bucket
//!
//! Each residual query is scoped to one combination of ancestor buckets. How a
//! bucket is described depends on the aggregation that produced it: a term
//! value, an interval of a histogram, the bounds of a range or the query of a
//! filters aggregation.

use super::builder::target_clauses;
use crate::aggs::{AggNode, AggType};
use crate::error::{Error, Result};
use crate::filters::Filter;
use crate::response::{AggResult, Bucket, BucketKey, Buckets};
use chrono::{DateTime, Months, Utc};
use serde_json::{json, Number, Value};

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;

/// Default key of the catch-all bucket of a filters aggregation
const FILTERS_OTHER_KEY: &str = "_other_";

/// Where one ancestor bucket sits in the first response
pub(crate) struct BucketRef<'a> {
    pub name: Option<&'a str>,
    pub position: usize,
    pub bucket: &'a Bucket,
    pub siblings: &'a Buckets,
}

/// Clauses restricting documents to `at`. Buckets that already carry filters
/// (merged Other buckets, rewritten Missing buckets) reuse them.
pub(crate) fn bucket_filters(
    node: &AggNode,
    at: &BucketRef<'_>,
    index: Option<&str>,
) -> Result<Vec<Filter>> {
    if let Some(filters) = &at.bucket.filters {
        return Ok(filters.clone());
    }

    match node.agg_type {
        AggType::Terms => terms_filters(node, at, index),
        AggType::Histogram => Ok(vec![histogram_filter(node, at, index)?]),
        AggType::DateHistogram => Ok(vec![date_histogram_filter(node, at, index)?]),
        AggType::Range => Ok(vec![range_filter(node, at, index)?]),
        AggType::Filters => filters_agg_filters(node, at, index),
        other => Err(fail(node, at, format!("{other:?} is not a bucket aggregation"))),
    }
}

fn fail(node: &AggNode, at: &BucketRef<'_>, reason: impl Into<String>) -> Error {
    Error::BucketFilter {
        id: node.id.clone(),
        bucket: at.bucket.label(at.name),
        reason: reason.into(),
    }
}

fn require_field<'a>(node: &'a AggNode) -> Result<&'a str> {
    node.field()
        .ok_or_else(|| Error::MissingField(node.id.clone()))
}

fn term_key<'a>(node: &AggNode, at: &BucketRef<'a>) -> Result<&'a Value> {
    at.bucket
        .key
        .as_ref()
        .and_then(BucketKey::as_term)
        .ok_or_else(|| fail(node, at, "bucket has no key"))
}

fn terms_filters(node: &AggNode, at: &BucketRef<'_>, index: Option<&str>) -> Result<Vec<Filter>> {
    let field = require_field(node)?;
    match &at.bucket.key {
        Some(BucketKey::Term(value)) => Ok(vec![Filter::match_value(field, value.clone(), index)]),
        Some(BucketKey::Missing) => Ok(vec![Filter::field_not_exists(field, index)]),
        Some(BucketKey::Other) => {
            let excluded = at
                .siblings
                .iter()
                .filter_map(|(_, b)| b.key.as_ref().and_then(BucketKey::as_term))
                .cloned()
                .collect();
            Ok(target_clauses(field, excluded, index))
        }
        None => Err(fail(node, at, "bucket has no key")),
    }
}

fn histogram_filter(node: &AggNode, at: &BucketRef<'_>, index: Option<&str>) -> Result<Filter> {
    let field = require_field(node)?;
    let key = term_key(node, at)?;
    let interval = node
        .params
        .interval
        .as_ref()
        .or_else(|| node.params.extra.get("interval"))
        .ok_or_else(|| fail(node, at, "histogram has no interval"))?;
    let end = interval_end(key, interval)
        .ok_or_else(|| fail(node, at, format!("cannot add interval {interval} to key {key}")))?;

    Ok(Filter::range(field, Some(key.clone()), Some(end), None, index))
}

/// `key + interval`, kept integral when both are integers
fn interval_end(key: &Value, interval: &Value) -> Option<Value> {
    let interval = match interval {
        Value::Number(n) => n.clone(),
        Value::String(s) => serde_json::from_str::<Number>(s.trim()).ok()?,
        _ => return None,
    };
    if interval.as_f64()? <= 0.0 {
        return None;
    }
    if let (Some(key), Some(step)) = (key.as_i64(), interval.as_i64()) {
        return key.checked_add(step).map(Value::from);
    }
    Number::from_f64(key.as_f64()? + interval.as_f64()?).map(Value::Number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateStep {
    Millis(i64),
    Months(u32),
}

impl DateStep {
    fn parse(raw: &Value) -> Option<Self> {
        let raw = match raw {
            Value::Number(n) => return n.as_i64().filter(|ms| *ms > 0).map(DateStep::Millis),
            Value::String(s) => s.trim(),
            _ => return None,
        };

        match raw {
            "second" => return Some(DateStep::Millis(SECOND_MS)),
            "minute" => return Some(DateStep::Millis(MINUTE_MS)),
            "hour" => return Some(DateStep::Millis(HOUR_MS)),
            "day" => return Some(DateStep::Millis(DAY_MS)),
            "week" => return Some(DateStep::Millis(WEEK_MS)),
            "month" => return Some(DateStep::Months(1)),
            "quarter" => return Some(DateStep::Months(3)),
            "year" => return Some(DateStep::Months(12)),
            _ => {}
        }

        let split = raw.find(|c: char| !c.is_ascii_digit())?;
        let (count, unit) = raw.split_at(split);
        let count: u32 = count.parse().ok().filter(|n| *n > 0)?;
        let fixed = |unit_ms: i64| i64::from(count).checked_mul(unit_ms).map(DateStep::Millis);
        match unit {
            "ms" => fixed(1),
            "s" => fixed(SECOND_MS),
            "m" => fixed(MINUTE_MS),
            "h" => fixed(HOUR_MS),
            "d" => fixed(DAY_MS),
            "w" => fixed(WEEK_MS),
            "M" => Some(DateStep::Months(count)),
            "q" => count.checked_mul(3).map(DateStep::Months),
            "y" => count.checked_mul(12).map(DateStep::Months),
            _ => None,
        }
    }

    fn after(self, start_ms: i64) -> Option<i64> {
        match self {
            DateStep::Millis(ms) => start_ms.checked_add(ms),
            DateStep::Months(months) => DateTime::<Utc>::from_timestamp_millis(start_ms)?
                .checked_add_months(Months::new(months))
                .map(|end| end.timestamp_millis()),
        }
    }
}

fn date_histogram_filter(node: &AggNode, at: &BucketRef<'_>, index: Option<&str>) -> Result<Filter> {
    let field = require_field(node)?;
    let key = term_key(node, at)?;
    let start = key
        .as_i64()
        .or_else(|| key.as_f64().map(|ms| ms as i64))
        .ok_or_else(|| fail(node, at, format!("date key {key} is not epoch millis")))?;

    let raw = node
        .params
        .interval
        .as_ref()
        .or_else(|| node.params.extra.get("fixed_interval"))
        .or_else(|| node.params.extra.get("calendar_interval"))
        .or_else(|| node.params.extra.get("interval"))
        .ok_or_else(|| fail(node, at, "date histogram has no interval"))?;
    let end = DateStep::parse(raw)
        .and_then(|step| step.after(start))
        .ok_or_else(|| fail(node, at, format!("unsupported date interval {raw}")))?;

    Ok(Filter::range(
        field,
        Some(json!(start)),
        Some(json!(end)),
        Some("epoch_millis"),
        index,
    ))
}

fn range_filter(node: &AggNode, at: &BucketRef<'_>, index: Option<&str>) -> Result<Filter> {
    let field = require_field(node)?;
    let bound = |name: &str| match at.bucket.sub_aggs.get(name) {
        Some(AggResult::Value(value)) if !value.is_null() => Some(value.clone()),
        _ => None,
    };
    Ok(Filter::range(field, bound("from"), bound("to"), None, index))
}

fn filters_agg_filters(
    node: &AggNode,
    at: &BucketRef<'_>,
    index: Option<&str>,
) -> Result<Vec<Filter>> {
    let definitions = node
        .params
        .extra
        .get("filters")
        .ok_or_else(|| fail(node, at, "filters aggregation has no filter definitions"))?;

    let other_key = node
        .params
        .extra
        .get("other_bucket_key")
        .and_then(Value::as_str)
        .unwrap_or(FILTERS_OTHER_KEY);
    let is_other = at.name == Some(other_key)
        || (at.name.is_none() && definitions.as_array().map(Vec::len) == Some(at.position));

    if is_other {
        // everything no named filter matched
        let all: Vec<&Value> = match definitions {
            Value::Object(map) => map.values().collect(),
            Value::Array(list) => list.iter().collect(),
            _ => Vec::new(),
        };
        return Ok(all
            .into_iter()
            .map(|query| Filter::query(query.clone(), index).negated())
            .collect());
    }

    let query = match (definitions, at.name) {
        (Value::Object(map), Some(name)) => map.get(name),
        (Value::Array(list), None) => list.get(at.position),
        _ => None,
    }
    .ok_or_else(|| fail(node, at, "no filter definition for this bucket"))?;

    Ok(vec![Filter::query(query.clone(), index)])
}
