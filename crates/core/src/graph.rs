use crate::error::StoreError;
use crate::models::ComponentRecord;
use crate::traits::GraphSource;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Hard cap on emitted nodes, protecting callers from unbounded views on
/// pathologically large or cyclic-looking data.
pub const MAX_GRAPH_NODES: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: i64,
    pub component_id: String,
    pub clean_name: String,
    pub abs_level: i64,
    pub path: String,
    pub parent_id: Option<i64>,
    pub usage_count: i64,
    pub is_assembly: bool,
    pub is_subassembly: bool,
    pub is_leaf: bool,
    pub material: String,
    pub vendor: String,
    pub size: String,
    pub standard: String,
}

impl GraphNode {
    fn from_record(record: &ComponentRecord) -> Self {
        Self {
            id: record.id,
            component_id: record.component_id.clone(),
            clean_name: record.clean_name.clone(),
            abs_level: record.abs_level,
            path: record.path.clone(),
            parent_id: record.parent_id,
            usage_count: record.usage_count,
            is_assembly: record.is_assembly,
            is_subassembly: record.is_subassembly,
            is_leaf: record.is_leaf,
            material: record.material.clone(),
            vendor: record.vendor.clone(),
            size: record.size.clone(),
            standard: record.standard.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct GraphEdge {
    pub source: i64,
    pub target: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Whole adjacency for one root material; immutable once built, so readers
/// share it through an `Arc` without further locking.
struct MaterialGraph {
    nodes: HashMap<i64, GraphNode>,
    children: HashMap<i64, Vec<i64>>,
    roots: Vec<i64>,
}

impl MaterialGraph {
    fn build(records: &[ComponentRecord]) -> Self {
        let mut nodes = HashMap::new();
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut roots = Vec::new();

        for record in records {
            nodes.insert(record.id, GraphNode::from_record(record));
            match record.parent_id {
                Some(parent_id) => children.entry(parent_id).or_default().push(record.id),
                None => roots.push(record.id),
            }
        }

        Self {
            nodes,
            children,
            roots,
        }
    }
}

#[derive(Default)]
struct CacheState {
    fingerprint: Option<String>,
    by_material: HashMap<String, Arc<MaterialGraph>>,
}

/// Serves depth-bounded hierarchy views from a per-material adjacency
/// cache. Any store change, detected through the fingerprint, drops the
/// whole cache; per-root invalidation is a deliberate non-feature.
pub struct GraphMaterializer<S>
where
    S: GraphSource,
{
    source: S,
    cache: Mutex<CacheState>,
    max_nodes: usize,
}

impl<S> GraphMaterializer<S>
where
    S: GraphSource + Send + Sync,
{
    pub fn new(source: S) -> Self {
        Self::with_node_cap(source, MAX_GRAPH_NODES)
    }

    pub fn with_node_cap(source: S, max_nodes: usize) -> Self {
        Self {
            source,
            cache: Mutex::new(CacheState::default()),
            max_nodes,
        }
    }

    pub fn clear_cache(&self) {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.by_material.clear();
        cache.fingerprint = None;
        info!("graph: cache cleared");
    }

    pub async fn build_view(
        &self,
        material_id: &str,
        max_depth: i64,
    ) -> Result<GraphView, StoreError> {
        let fingerprint = self.source.store_fingerprint().await?;

        let cached = {
            let mut cache = self
                .cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if cache.fingerprint.as_deref() != Some(fingerprint.as_str()) {
                cache.by_material.clear();
                cache.fingerprint = Some(fingerprint);
            }
            cache.by_material.get(material_id).cloned()
        };

        let graph = match cached {
            Some(graph) => graph,
            None => {
                let records = self.source.material_components(material_id).await?;
                let graph = Arc::new(MaterialGraph::build(&records));
                let mut cache = self
                    .cache
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                cache
                    .by_material
                    .insert(material_id.to_string(), graph.clone());
                graph
            }
        };

        Ok(self.bfs_limited(&graph, max_depth))
    }

    fn bfs_limited(&self, graph: &MaterialGraph, max_depth: i64) -> GraphView {
        let mut view = GraphView::default();
        if graph.roots.is_empty() {
            return view;
        }

        let mut queue: VecDeque<(i64, i64)> =
            graph.roots.iter().map(|root| (*root, 0)).collect();
        let mut visited = std::collections::HashSet::new();

        while let Some((node_id, depth)) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            let Some(node) = graph.nodes.get(&node_id) else {
                continue;
            };
            view.nodes.push(node.clone());

            if view.nodes.len() >= self.max_nodes {
                break;
            }
            if depth >= max_depth {
                continue;
            }

            if let Some(children) = graph.children.get(&node_id) {
                for child_id in children {
                    view.edges.push(GraphEdge {
                        source: node_id,
                        target: *child_id,
                    });
                    queue.push_back((*child_id, depth + 1));
                }
            }
        }

        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordRole;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        records: Mutex<Vec<ComponentRecord>>,
        fingerprint: Mutex<String>,
        loads: AtomicUsize,
    }

    impl FakeSource {
        fn new(records: Vec<ComponentRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                fingerprint: Mutex::new("fp-1".to_string()),
                loads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GraphSource for FakeSource {
        async fn store_fingerprint(&self) -> Result<String, StoreError> {
            Ok(self.fingerprint.lock().unwrap().clone())
        }

        async fn material_components(
            &self,
            material_id: &str,
        ) -> Result<Vec<ComponentRecord>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|record| record.material_id == material_id)
                .cloned()
                .collect())
        }
    }

    fn record(id: i64, parent_id: Option<i64>, path: &str) -> ComponentRecord {
        ComponentRecord {
            id,
            unique_id: format!("u-{id}"),
            material_id: "M1".to_string(),
            component_id: format!("C{id}"),
            description: String::new(),
            qty: 1.0,
            path: path.to_string(),
            parent_id,
            abs_level: path.matches('.').count() as i64,
            record_type: RecordRole::Leaf,
            is_assembly: parent_id.is_none(),
            is_subassembly: false,
            is_leaf: parent_id.is_some(),
            usage_count: 1,
            clean_name: format!("part {id}"),
            vendor: String::new(),
            material: String::new(),
            size: String::new(),
            component_type: String::new(),
            standard: String::new(),
            embedding_vector: None,
            updated_at: Utc::now(),
        }
    }

    fn chain() -> Vec<ComponentRecord> {
        vec![
            record(1, None, "1"),
            record(2, Some(1), "1.2"),
            record(3, Some(2), "1.2.3"),
        ]
    }

    #[tokio::test]
    async fn bfs_respects_the_depth_bound() {
        let materializer = GraphMaterializer::new(FakeSource::new(chain()));

        let shallow = materializer.build_view("M1", 1).await.unwrap();
        assert_eq!(shallow.nodes.len(), 2);
        assert_eq!(shallow.edges.len(), 1);

        materializer.clear_cache();
        let deep = materializer.build_view("M1", 3).await.unwrap();
        assert_eq!(deep.nodes.len(), 3);
        assert_eq!(
            deep.edges,
            vec![
                GraphEdge { source: 1, target: 2 },
                GraphEdge { source: 2, target: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn adjacency_is_cached_until_the_fingerprint_changes() {
        let source = FakeSource::new(chain());
        let materializer = GraphMaterializer::new(source);

        materializer.build_view("M1", 2).await.unwrap();
        materializer.build_view("M1", 3).await.unwrap();
        assert_eq!(materializer.source.loads.load(Ordering::SeqCst), 1);

        *materializer.source.fingerprint.lock().unwrap() = "fp-2".to_string();
        materializer.build_view("M1", 2).await.unwrap();
        assert_eq!(materializer.source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn explicit_clear_forces_a_rebuild() {
        let materializer = GraphMaterializer::new(FakeSource::new(chain()));

        materializer.build_view("M1", 2).await.unwrap();
        materializer.clear_cache();
        materializer.build_view("M1", 2).await.unwrap();

        assert_eq!(materializer.source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn node_cap_halts_traversal() {
        let materializer = GraphMaterializer::with_node_cap(FakeSource::new(chain()), 2);

        let view = materializer.build_view("M1", 10).await.unwrap();
        assert_eq!(view.nodes.len(), 2);
    }

    #[tokio::test]
    async fn unknown_material_yields_an_empty_view() {
        let materializer = GraphMaterializer::new(FakeSource::new(chain()));

        let view = materializer.build_view("M9", 3).await.unwrap();
        assert!(view.nodes.is_empty());
        assert!(view.edges.is_empty());
    }
}
