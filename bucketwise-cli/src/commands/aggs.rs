use anyhow::{Context, Result};
use bucketwise::aggs::{AggConfig, AggTree};
use bucketwise::missing::update_missing_bucket;
use bucketwise::other_bucket::{build_other_bucket_agg, merge_other_bucket_response};
use bucketwise::response::SearchResponse;
use bucketwise::Config;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use super::{print_json, read_json};

/// Aggregation definitions file
#[derive(Debug, Deserialize)]
pub struct AggsFile {
    pub index_pattern: String,
    pub aggs: Vec<AggConfig>,
}

/// Build the tree from a definitions file, with configured labels filled in
pub fn load_tree(config: &Config, path: &Path) -> Result<AggTree> {
    let file: AggsFile = read_json(path)?;
    let mut tree = AggTree::from_configs(file.index_pattern, file.aggs)
        .with_context(|| format!("Invalid aggregations in {:?}", path))?;
    config.labels.apply(&mut tree);
    Ok(tree)
}

/// The residual request for `target`, or `None` when there is nothing to ask
pub fn other_query(
    config: &Config,
    aggs: &Path,
    response: &Path,
    target: &str,
) -> Result<Option<Value>> {
    let tree = load_tree(config, aggs)?;
    let response: SearchResponse = read_json(response)?;
    let target = tree.find(target)?;

    let other = build_other_bucket_agg(&tree, target, &response)?;
    Ok(other.map(|other| other.request()))
}

pub fn run_other_query(config: &Config, aggs: &Path, response: &Path, target: &str) -> Result<()> {
    match other_query(config, aggs, response, target)? {
        Some(request) => print_json(&request),
        None => {
            tracing::info!("No Other bucket request needed for aggregation {}", target);
            print_json(&Value::Null)
        }
    }
}

pub fn merge(
    config: &Config,
    aggs: &Path,
    response: &Path,
    other_response: &Path,
    target: &str,
) -> Result<SearchResponse> {
    let tree = load_tree(config, aggs)?;
    let response: SearchResponse = read_json(response)?;
    let other_response: SearchResponse = read_json(other_response)?;
    let target = tree.find(target)?;

    let Some(request) = build_other_bucket_agg(&tree, target, &response)? else {
        tracing::info!("Aggregation has no Other bucket, response unchanged");
        return Ok(response);
    };
    Ok(merge_other_bucket_response(
        &tree,
        &response,
        &other_response,
        target,
        &request,
    )?)
}

pub fn run_merge(
    config: &Config,
    aggs: &Path,
    response: &Path,
    other_response: &Path,
    target: &str,
    display_keys: bool,
) -> Result<()> {
    let merged = merge(config, aggs, response, other_response, target)?;
    print_response(merged, display_keys)
}

pub fn missing(config: &Config, aggs: &Path, response: &Path, target: &str) -> Result<SearchResponse> {
    let tree = load_tree(config, aggs)?;
    let response: SearchResponse = read_json(response)?;
    let target = tree.find(target)?;
    Ok(update_missing_bucket(&response, &tree, target)?)
}

pub fn run_missing(
    config: &Config,
    aggs: &Path,
    response: &Path,
    target: &str,
    display_keys: bool,
) -> Result<()> {
    let updated = missing(config, aggs, response, target)?;
    print_response(updated, display_keys)
}

fn print_response(response: SearchResponse, display_keys: bool) -> Result<()> {
    if display_keys {
        print_json(&response.into_display_keys())
    } else {
        print_json(&response)
    }
}
