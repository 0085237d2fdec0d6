//! Aggregation tree and the walker used to navigate it
//!
//! Nodes live in an arena owned by [`AggTree`]; parents are plain indices so
//! ancestor lookups never need shared ownership. Every node has a response key
//! (`id`) and the backend response mirrors the tree: the result of node `n` is
//! stored under `n.id` inside the bucket of its parent.

use crate::aggs::types::{AggConfig, AggParams, AggSchema, AggType};
use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Missing-value sentinel sent to the backend for terms aggregations
pub const MISSING_SENTINEL: &str = "__missing__";

/// Index of a node inside its [`AggTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggId(usize);

impl AggId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggNode {
    /// Response key for this node ("1", "2", ...)
    pub id: String,
    pub agg_type: AggType,
    pub schema: AggSchema,
    pub params: AggParams,
    parent: Option<AggId>,
    children: Vec<AggId>,
}

impl AggNode {
    pub fn parent(&self) -> Option<AggId> {
        self.parent
    }

    pub fn field(&self) -> Option<&str> {
        self.params.field.as_deref()
    }

    /// Request DSL for this node alone, without children
    fn params_dsl(&self) -> Value {
        let mut body = Map::new();
        if let Some(field) = &self.params.field {
            body.insert("field".into(), Value::String(field.clone()));
        }

        match self.agg_type {
            AggType::Terms => {
                body.insert("size".into(), Value::from(self.params.size.unwrap_or(5)));
                let order = self
                    .params
                    .order
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({ "_count": "desc" }));
                body.insert("order".into(), order);
                if let Some(include) = &self.params.include {
                    body.insert("include".into(), include.clone());
                }
                if let Some(exclude) = &self.params.exclude {
                    body.insert("exclude".into(), exclude.clone());
                }
                if self.params.missing_bucket {
                    body.insert("missing".into(), Value::String(MISSING_SENTINEL.into()));
                }
            }
            AggType::Histogram | AggType::DateHistogram => {
                if let Some(interval) = &self.params.interval {
                    body.insert("interval".into(), interval.clone());
                }
                body.insert("min_doc_count".into(), Value::from(1));
            }
            _ => {}
        }

        for (key, value) in &self.params.extra {
            body.insert(key.clone(), value.clone());
        }

        Value::Object(body)
    }
}

/// Ordered tree of aggregation nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggTree {
    nodes: Vec<AggNode>,
    roots: Vec<AggId>,
    index_pattern: String,
}

impl AggTree {
    pub fn new(index_pattern: impl Into<String>) -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            index_pattern: index_pattern.into(),
        }
    }

    /// Build a tree from a flat list the way visualizations describe them:
    /// bucket aggregations nest in list order and metrics attach to the
    /// deepest bucket. Ids default to the 1-based position in `configs`.
    pub fn from_configs(index_pattern: impl Into<String>, configs: Vec<AggConfig>) -> Result<Self> {
        let mut tree = Self::new(index_pattern);
        let numbered: Vec<AggConfig> = configs
            .into_iter()
            .enumerate()
            .map(|(i, mut config)| {
                if config.id.is_none() {
                    config.id = Some((i + 1).to_string());
                }
                config
            })
            .collect();

        let (buckets, metrics): (Vec<_>, Vec<_>) = numbered
            .into_iter()
            .partition(|config| config.agg_type.is_bucket());

        let mut deepest = None;
        for config in buckets {
            deepest = Some(tree.add(config, deepest)?);
        }
        for config in metrics {
            tree.add(config, deepest)?;
        }
        Ok(tree)
    }

    /// Append a node under `parent` (or as a root) and return its handle
    pub fn add(&mut self, config: AggConfig, parent: Option<AggId>) -> Result<AggId> {
        if let Some(parent_id) = parent {
            let parent_node = self.node(parent_id)?;
            if !parent_node.agg_type.is_bucket() {
                return Err(Error::Config(format!(
                    "aggregation {} is a metric and cannot have children",
                    parent_node.id
                )));
            }
        }

        let handle = AggId(self.nodes.len());
        let id = config.id.unwrap_or_else(|| (handle.0 + 1).to_string());
        if self.nodes.iter().any(|n| n.id == id) {
            return Err(Error::Config(format!("duplicate aggregation id {id}")));
        }

        self.nodes.push(AggNode {
            id,
            agg_type: config.agg_type,
            schema: config.schema,
            params: config.params,
            parent,
            children: Vec::new(),
        });

        match parent {
            Some(parent_id) => self.nodes[parent_id.0].children.push(handle),
            None => self.roots.push(handle),
        }
        Ok(handle)
    }

    pub fn index_pattern(&self) -> &str {
        &self.index_pattern
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[AggId] {
        &self.roots
    }

    pub fn node(&self, id: AggId) -> Result<&AggNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::NodeNotFound(format!("#{}", id.0)))
    }

    pub fn node_mut(&mut self, id: AggId) -> Result<&mut AggNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::NodeNotFound(format!("#{}", id.0)))
    }

    /// Look up a node by its response key
    pub fn find(&self, id: &str) -> Result<AggId> {
        self.nodes
            .iter()
            .position(|n| n.id == id)
            .map(AggId)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (AggId, &AggNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (AggId(i), n))
    }

    pub fn children(&self, id: AggId) -> Result<Vec<&AggNode>> {
        let node = self.node(id)?;
        Ok(node.children.iter().map(|c| &self.nodes[c.0]).collect())
    }

    /// Ancestors of `id`, ordered from the root down to its direct parent
    pub fn ancestors(&self, id: AggId) -> Result<Vec<&AggNode>> {
        let mut chain = Vec::new();
        let mut cursor = self.node(id)?.parent;
        while let Some(parent) = cursor {
            let node = &self.nodes[parent.0];
            chain.push(node);
            cursor = node.parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Nodes sharing the parent of `id` (the roots for a root node), `id` included
    pub fn siblings(&self, id: AggId) -> Result<Vec<&AggNode>> {
        let handles = match self.node(id)?.parent {
            Some(parent) => &self.nodes[parent.0].children,
            None => &self.roots,
        };
        Ok(handles.iter().map(|h| &self.nodes[h.0]).collect())
    }

    /// Response keys leading from the top of `aggregations` to the result of `id`
    pub fn response_key_path(&self, id: AggId) -> Result<Vec<String>> {
        let mut path: Vec<String> = self
            .ancestors(id)?
            .into_iter()
            .map(|n| n.id.clone())
            .collect();
        path.push(self.node(id)?.id.clone());
        Ok(path)
    }

    /// Request DSL for the whole tree, keyed by node id
    pub fn to_dsl(&self) -> Value {
        Value::Object(self.level_dsl(&self.roots))
    }

    /// The `aggs` object nested below `id`, or `None` for a leaf
    pub fn subtree_dsl(&self, id: AggId) -> Result<Option<Value>> {
        let node = self.node(id)?;
        let level = self.level_dsl(&node.children);
        Ok((!level.is_empty()).then_some(Value::Object(level)))
    }

    fn level_dsl(&self, handles: &[AggId]) -> Map<String, Value> {
        let mut level = Map::new();
        for handle in handles {
            let node = &self.nodes[handle.0];
            let Some(name) = node.agg_type.dsl_name() else {
                continue;
            };
            let mut body = Map::new();
            body.insert(name.to_string(), node.params_dsl());
            let children = self.level_dsl(&node.children);
            if !children.is_empty() {
                body.insert("aggs".into(), Value::Object(children));
            }
            level.insert(node.id.clone(), Value::Object(body));
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested_tree() -> AggTree {
        AggTree::from_configs(
            "logstash-*",
            vec![
                AggConfig::terms("geo.src").with_size(2),
                AggConfig::terms("machine.os.raw")
                    .with_size(2)
                    .with_other_bucket(true)
                    .with_missing_bucket(true),
                AggConfig::new(
                    AggType::Avg,
                    AggParams {
                        field: Some("bytes".into()),
                        ..Default::default()
                    },
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_configs_nests_buckets_and_attaches_metrics() {
        let tree = nested_tree();
        let inner = tree.find("2").unwrap();
        let metric = tree.find("3").unwrap();

        let ancestors: Vec<&str> = tree
            .ancestors(metric)
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ancestors, vec!["1", "2"]);
        assert_eq!(tree.children(inner).unwrap().len(), 1);
        assert_eq!(tree.roots().len(), 1);
    }

    #[test]
    fn test_ancestors_of_root_is_empty() {
        let tree = nested_tree();
        let root = tree.find("1").unwrap();
        assert!(tree.ancestors(root).unwrap().is_empty());
    }

    #[test]
    fn test_siblings_keep_insertion_order() {
        let mut tree = AggTree::new("logs-*");
        let root = tree.add(AggConfig::terms("host"), None).unwrap();
        let a = tree
            .add(AggConfig::new(AggType::Count, AggParams::default()), Some(root))
            .unwrap();
        tree.add(AggConfig::terms("status"), Some(root)).unwrap();

        let ids: Vec<&str> = tree
            .siblings(a)
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["2", "3"]);

        let roots: Vec<&str> = tree
            .siblings(root)
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(roots, vec!["1"]);
    }

    #[test]
    fn test_response_key_path() {
        let tree = nested_tree();
        let inner = tree.find("2").unwrap();
        assert_eq!(tree.response_key_path(inner).unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn test_unknown_node_is_an_error() {
        let tree = nested_tree();
        assert!(matches!(tree.find("9"), Err(Error::NodeNotFound(_))));
        assert!(matches!(
            tree.ancestors(AggId(42)),
            Err(Error::NodeNotFound(_))
        ));
        assert!(tree.response_key_path(AggId(42)).is_err());
    }

    #[test]
    fn test_metric_cannot_have_children() {
        let mut tree = AggTree::new("logs-*");
        let metric = tree
            .add(AggConfig::new(AggType::Sum, AggParams::default()), None)
            .unwrap();
        assert!(tree.add(AggConfig::terms("host"), Some(metric)).is_err());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut tree = AggTree::new("logs-*");
        tree.add(AggConfig::terms("a").with_id("x"), None).unwrap();
        assert!(tree.add(AggConfig::terms("b").with_id("x"), None).is_err());
    }

    #[test]
    fn test_to_dsl() {
        let tree = nested_tree();
        assert_eq!(
            tree.to_dsl(),
            json!({
                "1": {
                    "terms": { "field": "geo.src", "size": 2, "order": { "_count": "desc" } },
                    "aggs": {
                        "2": {
                            "terms": {
                                "field": "machine.os.raw",
                                "size": 2,
                                "order": { "_count": "desc" },
                                "missing": "__missing__"
                            },
                            "aggs": {
                                "3": { "avg": { "field": "bytes" } }
                            }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_subtree_dsl() {
        let tree = nested_tree();
        let inner = tree.find("2").unwrap();
        let metric = tree.find("3").unwrap();
        assert_eq!(
            tree.subtree_dsl(inner).unwrap(),
            Some(json!({ "3": { "avg": { "field": "bytes" } } }))
        );
        assert_eq!(tree.subtree_dsl(metric).unwrap(), None);
    }
}
