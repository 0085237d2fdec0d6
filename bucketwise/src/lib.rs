//! Other and Missing bucket post-processing for terms aggregations
//!
//! A terms aggregation returns its top-N buckets only. This crate builds the
//! follow-up request that counts everything else, merges that count back as an
//! `Other` bucket at every nesting level, and turns the backend's missing-value
//! buckets into labelled `Missing` buckets with a filter describing them.
//!
//! The search backend itself is out of scope: functions here take and return
//! JSON-shaped documents only.
//!
//! ```no_run
//! use bucketwise::aggs::{AggConfig, AggTree};
//! use bucketwise::other_bucket::{build_other_bucket_agg, merge_other_bucket_response};
//! use bucketwise::response::SearchResponse;
//!
//! # fn run(first: SearchResponse, second: SearchResponse) -> bucketwise::Result<()> {
//! let tree = AggTree::from_configs(
//!     "logstash-*",
//!     vec![AggConfig::terms("machine.os.raw").with_other_bucket(true)],
//! )?;
//! let target = tree.find("1")?;
//! if let Some(other) = build_other_bucket_agg(&tree, target, &first)? {
//!     let _body = other.request(); // send it to the backend
//!     let _merged = merge_other_bucket_response(&tree, &first, &second, target, &other)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggs;
pub mod config;
pub mod error;
pub mod filters;
pub mod missing;
pub mod other_bucket;
pub mod response;

pub use config::Config;
pub use error::{Error, Result};
