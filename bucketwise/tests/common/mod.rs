//! Shared fixtures: a single and a nested terms visualization with their
//! first and residual responses.

#![allow(dead_code)]

use bucketwise::aggs::{AggConfig, AggTree};
use bucketwise::response::SearchResponse;
use serde_json::json;

pub fn single_term_tree() -> AggTree {
    AggTree::from_configs(
        "logstash-*",
        vec![AggConfig::terms("machine.os.raw")
            .with_other_bucket(true)
            .with_missing_bucket(true)],
    )
    .unwrap()
}

pub fn nested_term_tree() -> AggTree {
    AggTree::from_configs(
        "logstash-*",
        vec![
            AggConfig::terms("geo.src")
                .with_size(2)
                .with_other_bucket(false)
                .with_missing_bucket(false),
            AggConfig::terms("machine.os.raw")
                .with_size(2)
                .with_other_bucket(true)
                .with_missing_bucket(true),
        ],
    )
    .unwrap()
}

fn envelope(aggregations: serde_json::Value) -> SearchResponse {
    SearchResponse::from_value(json!({
        "took": 10,
        "timed_out": false,
        "_shards": { "total": 1, "successful": 1, "skipped": 0, "failed": 0 },
        "hits": { "total": 14005, "max_score": 0, "hits": [] },
        "aggregations": aggregations,
        "status": 200
    }))
    .unwrap()
}

pub fn single_term_response() -> SearchResponse {
    envelope(json!({
        "1": {
            "doc_count_error_upper_bound": 0,
            "sum_other_doc_count": 8325,
            "buckets": [
                { "key": "ios", "doc_count": 2850 },
                { "key": "win xp", "doc_count": 2830 },
                { "key": "__missing__", "doc_count": 1430 }
            ]
        }
    }))
}

pub fn nested_term_response() -> SearchResponse {
    envelope(json!({
        "1": {
            "doc_count_error_upper_bound": 0,
            "sum_other_doc_count": 8325,
            "buckets": [
                {
                    "2": {
                        "doc_count_error_upper_bound": 0,
                        "sum_other_doc_count": 8325,
                        "buckets": [
                            { "key": "ios", "doc_count": 2850 },
                            { "key": "win xp", "doc_count": 2830 },
                            { "key": "__missing__", "doc_count": 1430 }
                        ]
                    },
                    "key": "US",
                    "doc_count": 2850
                },
                {
                    "2": {
                        "doc_count_error_upper_bound": 0,
                        "sum_other_doc_count": 8325,
                        "buckets": [
                            { "key": "ios", "doc_count": 1850 },
                            { "key": "win xp", "doc_count": 1830 },
                            { "key": "__missing__", "doc_count": 130 }
                        ]
                    },
                    "key": "IN",
                    "doc_count": 2830
                }
            ]
        }
    }))
}

pub fn single_other_response() -> SearchResponse {
    envelope(json!({
        "other-filter": { "buckets": { "": { "doc_count": 2805 } } }
    }))
}

pub fn nested_other_response() -> SearchResponse {
    envelope(json!({
        "other-filter": {
            "buckets": { "-US": { "doc_count": 2805 }, "-IN": { "doc_count": 2804 } }
        }
    }))
}
