//! Other bucket support for terms aggregations
//!
//! A terms aggregation only returns its top-N buckets. The Other bucket is
//! computed with a second request: a filters aggregation with one filter per
//! combination of ancestor buckets, each excluding the keys already returned.
//! [`build_other_bucket_agg`] derives that request from the first response and
//! [`merge_other_bucket_response`] folds its counts back in as `Other` buckets.

mod builder;
mod merge;
mod pin;

pub use builder::{
    build_other_bucket_agg, OtherBucketAgg, OtherBucketFilter, PathStep, OTHER_FILTER_AGG,
};
pub use merge::{merge_other_bucket_response, parse_other_label};
