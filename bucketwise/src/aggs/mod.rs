mod tree;
pub mod types;

pub use tree::{AggId, AggNode, AggTree, MISSING_SENTINEL};
pub use types::{
    AggConfig, AggParams, AggSchema, AggType, DEFAULT_MISSING_BUCKET_LABEL,
    DEFAULT_OTHER_BUCKET_LABEL,
};
