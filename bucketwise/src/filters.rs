//! Filter clauses attached to synthesized buckets and compiled into queries
//!
//! A [`Filter`] is a predicate plus display metadata. On the wire it uses the
//! dashboard filter shape:
//!
//! - exists: `{"meta": {...}, "exists": {"field": "f"}}`
//! - phrase: `{"meta": {...}, "query": {"match_phrase": {"f": {"query": v}}}}`
//! - phrases: `{"meta": {...}, "query": {"bool": {"should": [...], "minimum_should_match": 1}}}`
//! - range: `{"meta": {...}, "range": {"f": {"gte": a, "lt": b}}}`
//! - any other `query` is kept as a custom query filter

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default)]
    pub negate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    /// Field equals one value
    Phrase { field: String, value: Value },
    /// Field equals any of the values
    Phrases { field: String, values: Vec<Value> },
    /// Field is present
    Exists { field: String },
    /// Field lies in `[gte, lt)`; an absent bound is open
    Range {
        field: String,
        gte: Option<Value>,
        lt: Option<Value>,
        format: Option<String>,
    },
    /// Arbitrary query DSL, e.g. one entry of a filters aggregation
    Query { query: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FilterWire", into = "FilterWire")]
pub struct Filter {
    pub meta: FilterMeta,
    pub kind: FilterKind,
}

impl Filter {
    fn new(kind: FilterKind, negate: bool, index: Option<&str>) -> Self {
        Self {
            meta: FilterMeta {
                index: index.map(str::to_string),
                negate,
            },
            kind,
        }
    }

    pub fn match_value(field: impl Into<String>, value: Value, index: Option<&str>) -> Self {
        Self::new(
            FilterKind::Phrase {
                field: field.into(),
                value,
            },
            false,
            index,
        )
    }

    pub fn negated_match_values(
        field: impl Into<String>,
        values: Vec<Value>,
        index: Option<&str>,
    ) -> Self {
        Self::new(
            FilterKind::Phrases {
                field: field.into(),
                values,
            },
            true,
            index,
        )
    }

    pub fn field_exists(field: impl Into<String>, index: Option<&str>) -> Self {
        Self::new(FilterKind::Exists { field: field.into() }, false, index)
    }

    pub fn field_not_exists(field: impl Into<String>, index: Option<&str>) -> Self {
        Self::new(FilterKind::Exists { field: field.into() }, true, index)
    }

    pub fn range(
        field: impl Into<String>,
        gte: Option<Value>,
        lt: Option<Value>,
        format: Option<&str>,
        index: Option<&str>,
    ) -> Self {
        Self::new(
            FilterKind::Range {
                field: field.into(),
                gte,
                lt,
                format: format.map(str::to_string),
            },
            false,
            index,
        )
    }

    pub fn query(query: Value, index: Option<&str>) -> Self {
        Self::new(FilterKind::Query { query }, false, index)
    }

    /// Same predicate with the opposite sense
    pub fn negated(mut self) -> Self {
        self.meta.negate = !self.meta.negate;
        self
    }

    /// Field the filter constrains; custom queries have none
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            FilterKind::Phrase { field, .. }
            | FilterKind::Phrases { field, .. }
            | FilterKind::Exists { field }
            | FilterKind::Range { field, .. } => Some(field),
            FilterKind::Query { .. } => None,
        }
    }

    pub fn is_negated(&self) -> bool {
        self.meta.negate
    }

    /// Positive query DSL for this filter; negation is applied by the caller
    pub fn to_query(&self) -> Value {
        match &self.kind {
            FilterKind::Phrase { field, value } => match_phrase(field, value),
            FilterKind::Phrases { field, values } => json!({
                "bool": {
                    "should": values.iter().map(|v| match_phrase(field, v)).collect::<Vec<_>>(),
                    "minimum_should_match": 1
                }
            }),
            FilterKind::Exists { field } => json!({ "exists": { "field": field } }),
            FilterKind::Range { field, .. } => {
                let mut inner = Map::new();
                inner.insert(field.clone(), Value::Object(self.range_bounds()));
                json!({ "range": Value::Object(inner) })
            }
            FilterKind::Query { query } => query.clone(),
        }
    }

    fn range_bounds(&self) -> Map<String, Value> {
        let mut bounds = Map::new();
        if let FilterKind::Range { gte, lt, format, .. } = &self.kind {
            if let Some(gte) = gte {
                bounds.insert("gte".into(), gte.clone());
            }
            if let Some(lt) = lt {
                bounds.insert("lt".into(), lt.clone());
            }
            if let Some(format) = format {
                bounds.insert("format".into(), Value::String(format.clone()));
            }
        }
        bounds
    }
}

fn match_phrase(field: &str, value: &Value) -> Value {
    let mut inner = Map::new();
    inner.insert(field.to_string(), json!({ "query": value }));
    json!({ "match_phrase": Value::Object(inner) })
}

/// `bool` query assembled from filters: plain filters go to `must`, negated
/// ones to `must_not`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    #[serde(default)]
    pub must: Vec<Value>,
    #[serde(default)]
    pub filter: Vec<Value>,
    #[serde(default)]
    pub should: Vec<Value>,
    #[serde(default)]
    pub must_not: Vec<Value>,
}

impl BoolQuery {
    pub fn from_filters<'a>(filters: impl IntoIterator<Item = &'a Filter>) -> Self {
        let mut query = BoolQuery::default();
        for filter in filters {
            if !filter.is_negated() {
                query.must.push(filter.to_query());
                continue;
            }
            match &filter.kind {
                // not (a or b) == not a and not b; one clause per value keeps
                // the request flat
                FilterKind::Phrases { field, values } => query
                    .must_not
                    .extend(values.iter().map(|v| match_phrase(field, v))),
                _ => query.must_not.push(filter.to_query()),
            }
        }
        query
    }

    pub fn to_value(&self) -> Value {
        json!({ "bool": self })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExistsWire {
    field: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetaWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<String>,
    #[serde(default)]
    negate: bool,
    /// Field of a phrases filter, so an empty value list still names it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

impl MetaWire {
    fn split(self) -> (FilterMeta, Option<String>) {
        (
            FilterMeta {
                index: self.index,
                negate: self.negate,
            },
            self.key,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterWire {
    #[serde(default)]
    meta: MetaWire,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exists: Option<ExistsWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<Value>,
}

impl From<Filter> for FilterWire {
    fn from(filter: Filter) -> Self {
        let query = filter.to_query();
        let bounds = filter.range_bounds();
        let mut wire = FilterWire {
            meta: MetaWire {
                index: filter.meta.index,
                negate: filter.meta.negate,
                key: None,
            },
            exists: None,
            range: None,
            query: None,
        };
        match filter.kind {
            FilterKind::Exists { field } => wire.exists = Some(ExistsWire { field }),
            FilterKind::Range { field, .. } => {
                let mut range = Map::new();
                range.insert(field, Value::Object(bounds));
                wire.range = Some(range);
            }
            FilterKind::Phrases { field, .. } => {
                wire.meta.key = Some(field);
                wire.query = Some(query);
            }
            FilterKind::Phrase { .. } | FilterKind::Query { .. } => wire.query = Some(query),
        }
        wire
    }
}

impl TryFrom<FilterWire> for Filter {
    type Error = Error;

    fn try_from(wire: FilterWire) -> Result<Self, Self::Error> {
        let (meta, key) = wire.meta.split();
        if let Some(exists) = wire.exists {
            return Ok(Filter {
                meta,
                kind: FilterKind::Exists {
                    field: exists.field,
                },
            });
        }

        if let Some(range) = wire.range {
            let (field, gte, lt, format) = parse_range(range)?;
            return Ok(Filter {
                meta,
                kind: FilterKind::Range {
                    field,
                    gte,
                    lt,
                    format,
                },
            });
        }

        let query = wire.query.ok_or_else(|| {
            Error::InvalidFilter("filter has neither exists, range nor query".into())
        })?;

        if let Some(Ok((field, value))) = query.get("match_phrase").map(parse_match_phrase) {
            return Ok(Filter {
                meta,
                kind: FilterKind::Phrase { field, value },
            });
        }

        if let Some(should) = query.pointer("/bool/should").and_then(Value::as_array) {
            if let Some((field, values)) = parse_phrases(should, key) {
                return Ok(Filter {
                    meta,
                    kind: FilterKind::Phrases { field, values },
                });
            }
        }

        Ok(Filter {
            meta,
            kind: FilterKind::Query { query },
        })
    }
}

/// `should` clauses that are all `match_phrase` on one field, or `None`
fn parse_phrases(should: &[Value], key: Option<String>) -> Option<(String, Vec<Value>)> {
    let mut field = key;
    let mut values = Vec::with_capacity(should.len());
    for clause in should {
        let (clause_field, value) = parse_match_phrase(clause.get("match_phrase")?).ok()?;
        if field.get_or_insert_with(|| clause_field.clone()) != &clause_field {
            return None;
        }
        values.push(value);
    }
    Some((field?, values))
}

type RangeParts = (String, Option<Value>, Option<Value>, Option<String>);

fn parse_range(range: Map<String, Value>) -> Result<RangeParts, Error> {
    if range.len() != 1 {
        return Err(Error::InvalidFilter("range must name exactly one field".into()));
    }
    let Some((field, bounds)) = range.into_iter().next() else {
        return Err(Error::InvalidFilter("empty range".into()));
    };
    let Value::Object(mut bounds) = bounds else {
        return Err(Error::InvalidFilter(format!("range bounds for {field} must be an object")));
    };
    let gte = bounds.remove("gte");
    let lt = bounds.remove("lt");
    let format = match bounds.remove("format") {
        Some(Value::String(format)) => Some(format),
        Some(other) => {
            return Err(Error::InvalidFilter(format!("range format must be a string, got {other}")))
        }
        None => None,
    };
    if let Some(bound) = bounds.keys().next() {
        return Err(Error::InvalidFilter(format!("unsupported range bound {bound}")));
    }
    Ok((field, gte, lt, format))
}

fn parse_match_phrase(phrase: &Value) -> Result<(String, Value), Error> {
    let object = phrase
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| Error::InvalidFilter("match_phrase must name exactly one field".into()))?;
    let (field, body) = object
        .iter()
        .next()
        .ok_or_else(|| Error::InvalidFilter("empty match_phrase".into()))?;
    let value = match body.get("query") {
        Some(value) => value.clone(),
        None => body.clone(),
    };
    Ok((field.clone(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_exists_wire_shape() {
        let filter = Filter::field_not_exists("geo.src", Some("logstash-*"));
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({
                "meta": { "index": "logstash-*", "negate": true },
                "exists": { "field": "geo.src" }
            })
        );
    }

    #[test]
    fn test_phrases_wire_shape_parses_back() {
        let filter = Filter::negated_match_values(
            "machine.os.raw",
            vec![json!("ios"), json!("win xp")],
            Some("logstash-*"),
        );
        let wire = serde_json::to_value(&filter).unwrap();
        assert_eq!(wire["meta"]["key"], json!("machine.os.raw"));
        assert_eq!(
            wire["query"]["bool"]["should"][1],
            json!({ "match_phrase": { "machine.os.raw": { "query": "win xp" } } })
        );
        let parsed: Filter = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed, filter);
    }

    #[test]
    fn test_empty_phrases_keep_their_field() {
        let filter = Filter::negated_match_values("host", vec![], None);
        let wire = serde_json::to_value(&filter).unwrap();
        let parsed: Filter = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed.field(), Some("host"));
        assert!(parsed.is_negated());
    }

    #[test]
    fn test_short_match_phrase_form() {
        let filter: Filter = serde_json::from_value(json!({
            "meta": { "negate": false },
            "query": { "match_phrase": { "geo.src": "US" } }
        }))
        .unwrap();
        assert_eq!(
            filter.kind,
            FilterKind::Phrase {
                field: "geo.src".into(),
                value: json!("US")
            }
        );
        assert_eq!(filter.meta.index, None);
    }

    #[test]
    fn test_malformed_filter_is_rejected() {
        let result: Result<Filter, _> = serde_json::from_value(json!({ "meta": {} }));
        assert!(result.is_err());

        let result: Result<Filter, _> = serde_json::from_value(json!({
            "meta": {},
            "range": { "bytes": { "gte": 1 }, "other": { "lt": 2 } }
        }));
        assert!(result.is_err());

        let result: Result<Filter, _> = serde_json::from_value(json!({
            "meta": {},
            "range": { "bytes": { "gt": 1 } }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_range_wire_shape_parses_back() {
        let filter = Filter::range(
            "@timestamp",
            Some(json!(1000)),
            Some(json!(2000)),
            Some("epoch_millis"),
            Some("logstash-*"),
        );
        let wire = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            wire,
            json!({
                "meta": { "index": "logstash-*", "negate": false },
                "range": { "@timestamp": { "gte": 1000, "lt": 2000, "format": "epoch_millis" } }
            })
        );
        let parsed: Filter = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed, filter);
        assert_eq!(
            filter.to_query(),
            json!({ "range": { "@timestamp": { "gte": 1000, "lt": 2000, "format": "epoch_millis" } } })
        );
    }

    #[test]
    fn test_open_range_omits_bound() {
        let filter = Filter::range("bytes", None, Some(json!(100)), None, None);
        assert_eq!(filter.to_query(), json!({ "range": { "bytes": { "lt": 100 } } }));
    }

    #[test]
    fn test_other_queries_are_custom_filters() {
        let query = json!({ "query_string": { "query": "status:500" } });
        let parsed: Filter = serde_json::from_value(json!({
            "meta": { "index": "logs-*" },
            "query": query.clone()
        }))
        .unwrap();
        assert_eq!(parsed.kind, FilterKind::Query { query: query.clone() });
        assert_eq!(parsed.field(), None);
        assert_eq!(parsed.to_query(), query);

        let mixed = json!({ "bool": { "should": [{ "term": { "a": 1 } }] } });
        let parsed: Filter = serde_json::from_value(json!({ "query": mixed.clone() })).unwrap();
        assert_eq!(parsed.kind, FilterKind::Query { query: mixed });
    }

    #[test]
    fn test_bool_query_splits_negated_values() {
        let filters = vec![
            Filter::match_value("geo.src", json!("US"), None),
            Filter::field_exists("machine.os.raw", None),
            Filter::negated_match_values("machine.os.raw", vec![json!("ios"), json!("win xp")], None),
        ];
        let query = BoolQuery::from_filters(&filters);

        assert_eq!(
            query.to_value(),
            json!({
                "bool": {
                    "must": [
                        { "match_phrase": { "geo.src": { "query": "US" } } },
                        { "exists": { "field": "machine.os.raw" } }
                    ],
                    "filter": [],
                    "should": [],
                    "must_not": [
                        { "match_phrase": { "machine.os.raw": { "query": "ios" } } },
                        { "match_phrase": { "machine.os.raw": { "query": "win xp" } } }
                    ]
                }
            })
        );
    }

    #[test]
    fn test_empty_negated_values_contribute_nothing() {
        let filters = vec![Filter::negated_match_values("host", vec![], None)];
        let query = BoolQuery::from_filters(&filters);
        assert!(query.must.is_empty());
        assert!(query.must_not.is_empty());
    }

    #[test]
    fn test_negated_exists_goes_to_must_not() {
        let filters = vec![Filter::field_not_exists("host", None)];
        let query = BoolQuery::from_filters(&filters);
        assert_eq!(query.must_not, vec![json!({ "exists": { "field": "host" } })]);
    }
}
