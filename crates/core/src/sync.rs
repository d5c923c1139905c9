use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{ComponentRecord, VectorMetadata, VectorPoint};
use crate::stores::sqlite::SqliteComponentStore;
use crate::traits::VectorIndex;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

const SCROLL_PAGE: usize = 1000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    pub total: i64,
    pub recomputed: usize,
    pub skipped: usize,
    pub index_empty: bool,
}

fn point_from_record(record: &ComponentRecord, embedding: Vec<f32>, stamp: &str) -> VectorPoint {
    VectorPoint {
        unique_id: record.unique_id.clone(),
        embedding,
        metadata: VectorMetadata {
            component_id: record.component_id.clone(),
            material_id: record.material_id.clone(),
            vendor: record.vendor.clone(),
            is_assembly: record.is_assembly,
            is_subassembly: record.is_subassembly,
            is_leaf: record.is_leaf,
            abs_level: record.abs_level,
            updated_at: Some(stamp.to_string()),
        },
    }
}

/// Reconciliation sweep between the store and the vector index: pages the
/// store in id order, re-encodes rows whose stored embedding is missing or
/// newer than the index's copy, and commits each batch to the store before
/// upserting the index so a crash only loses the in-flight batch.
pub async fn rebuild_embeddings<V, E>(
    store: &SqliteComponentStore,
    index: &V,
    embedder: &E,
    batch_size: i64,
) -> Result<RebuildReport, SearchError>
where
    V: VectorIndex + Send + Sync,
    E: Embedder + Send + Sync,
{
    let mut index_updated: HashMap<String, Option<String>> = HashMap::new();
    let mut cursor = None;
    loop {
        let (unique_ids, next) = index.list_ids(cursor, SCROLL_PAGE).await?;
        if !unique_ids.is_empty() {
            for (unique_id, metadata) in index.metadata_by_ids(&unique_ids).await? {
                index_updated.insert(unique_id, metadata.updated_at);
            }
        }
        match next {
            Some(offset) => cursor = Some(offset),
            None => break,
        }
    }

    let index_empty = index_updated.is_empty();
    let total = store.count().await.map_err(SearchError::Store)?;

    let mut report = RebuildReport {
        total,
        index_empty,
        ..Default::default()
    };

    let mut last_id = 0i64;
    loop {
        let batch = store
            .page_after(last_id, batch_size)
            .await
            .map_err(SearchError::Store)?;
        let Some(last) = batch.last() else {
            break;
        };
        last_id = last.id;

        let mut to_recompute: Vec<ComponentRecord> = Vec::new();
        for record in batch {
            if index_empty || record.embedding_vector.is_none() {
                to_recompute.push(record);
                continue;
            }

            match index_updated.get(&record.unique_id) {
                None => to_recompute.push(record),
                Some(index_stamp) => {
                    let row_stamp = record.updated_at.to_rfc3339();
                    let stale = index_stamp
                        .as_deref()
                        .map(|stamp| row_stamp.as_str() > stamp)
                        .unwrap_or(true);
                    if stale {
                        to_recompute.push(record);
                    } else {
                        report.skipped += 1;
                    }
                }
            }
        }

        if to_recompute.is_empty() {
            continue;
        }

        let texts: Vec<String> = to_recompute
            .iter()
            .map(|record| record.clean_name.clone())
            .collect();
        let embeddings = embedder.encode_batch(&texts);

        let now = Utc::now();
        let stamp = now.to_rfc3339();
        for (record, embedding) in to_recompute.iter().zip(&embeddings) {
            store
                .set_embedding(record.id, embedding, now)
                .await
                .map_err(SearchError::Store)?;
        }

        let points: Vec<VectorPoint> = to_recompute
            .iter()
            .zip(embeddings)
            .map(|(record, embedding)| point_from_record(record, embedding, &stamp))
            .collect();
        index.upsert_points(&points).await?;

        report.recomputed += to_recompute.len();
        info!(
            recomputed = report.recomputed,
            skipped = report.skipped,
            "embedding rebuild: batch committed"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{EnrichedRow, FilterExpr, RecordRole, UsageCategory, VectorHit};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory index whose contents drive the freshness comparison.
    #[derive(Default)]
    struct MemoryIndex {
        points: Mutex<HashMap<String, VectorMetadata>>,
    }

    #[async_trait]
    impl VectorIndex for MemoryIndex {
        async fn upsert_points(&self, points: &[VectorPoint]) -> Result<(), SearchError> {
            let mut stored = self.points.lock().unwrap();
            for point in points {
                stored.insert(point.unique_id.clone(), point.metadata.clone());
            }
            Ok(())
        }

        async fn query_points(
            &self,
            _embedding: &[f32],
            _limit: usize,
            _filter: Option<&FilterExpr>,
        ) -> Result<Vec<VectorHit>, SearchError> {
            Ok(Vec::new())
        }

        async fn delete_points(&self, unique_ids: &[String]) -> Result<(), SearchError> {
            let mut stored = self.points.lock().unwrap();
            for unique_id in unique_ids {
                stored.remove(unique_id);
            }
            Ok(())
        }

        async fn list_ids(
            &self,
            _cursor: Option<String>,
            _limit: usize,
        ) -> Result<(Vec<String>, Option<String>), SearchError> {
            let stored = self.points.lock().unwrap();
            Ok((stored.keys().cloned().collect(), None))
        }

        async fn metadata_by_ids(
            &self,
            unique_ids: &[String],
        ) -> Result<Vec<(String, VectorMetadata)>, SearchError> {
            let stored = self.points.lock().unwrap();
            Ok(unique_ids
                .iter()
                .filter_map(|unique_id| {
                    stored
                        .get(unique_id)
                        .map(|metadata| (unique_id.clone(), metadata.clone()))
                })
                .collect())
        }
    }

    fn enriched(unique_id: &str, row_id: i64) -> EnrichedRow {
        EnrichedRow {
            row_id,
            unique_id: unique_id.to_string(),
            material_id: "M1".to_string(),
            component_id: format!("C{row_id}"),
            description: format!("part {row_id}"),
            qty: 1.0,
            path: row_id.to_string(),
            parent_id: None,
            abs_level: 0,
            record_type: RecordRole::Leaf,
            is_assembly: false,
            is_subassembly: false,
            is_leaf: true,
            usage_count: 1,
            usage_norm: 1.0,
            usage_category: UsageCategory::Unique,
            clean_name: format!("part {row_id}"),
            component_type: String::new(),
            material: String::new(),
            size: String::new(),
            vendor: String::new(),
            standard: String::new(),
            confidence_scores: Default::default(),
            embedding_text: String::new(),
            search_text: String::new(),
            qty_log: 0.0,
        }
    }

    #[tokio::test]
    async fn empty_index_recomputes_every_row() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        store
            .bulk_replace(&[enriched("u-1", 1), enriched("u-2", 2)])
            .await
            .unwrap();

        let index = MemoryIndex::default();
        let embedder = CharacterNgramEmbedder::default();

        let report = rebuild_embeddings(&store, &index, &embedder, 10)
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.recomputed, 2);
        assert_eq!(report.skipped, 0);
        assert!(report.index_empty);
        assert_eq!(index.points.lock().unwrap().len(), 2);

        let record = store.get_by_unique_id("u-1").await.unwrap().expect("row");
        assert!(record.embedding_vector.is_some());
    }

    #[tokio::test]
    async fn fresh_rows_are_skipped_on_a_second_sweep() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        store
            .bulk_replace(&[enriched("u-1", 1), enriched("u-2", 2)])
            .await
            .unwrap();

        let index = MemoryIndex::default();
        let embedder = CharacterNgramEmbedder::default();

        rebuild_embeddings(&store, &index, &embedder, 10)
            .await
            .unwrap();
        let second = rebuild_embeddings(&store, &index, &embedder, 10)
            .await
            .unwrap();

        assert_eq!(second.recomputed, 0);
        assert_eq!(second.skipped, 2);
        assert!(!second.index_empty);
    }

    #[tokio::test]
    async fn rows_updated_after_the_index_are_re_encoded() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        store.bulk_replace(&[enriched("u-1", 1)]).await.unwrap();

        let index = MemoryIndex::default();
        let embedder = CharacterNgramEmbedder::default();
        rebuild_embeddings(&store, &index, &embedder, 10)
            .await
            .unwrap();

        // Make the stored row strictly newer than the index copy.
        let record = store.get_by_unique_id("u-1").await.unwrap().expect("row");
        let later = record.updated_at + chrono::Duration::seconds(5);
        store
            .set_embedding(record.id, &[0.5; 128], later)
            .await
            .unwrap();

        let report = rebuild_embeddings(&store, &index, &embedder, 10)
            .await
            .unwrap();
        assert_eq!(report.recomputed, 1);
    }

    #[tokio::test]
    async fn batching_covers_the_whole_store() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let rows: Vec<EnrichedRow> = (1..=7)
            .map(|row_id| enriched(&format!("u-{row_id}"), row_id))
            .collect();
        store.bulk_replace(&rows).await.unwrap();

        let index = MemoryIndex::default();
        let embedder = CharacterNgramEmbedder::default();
        let report = rebuild_embeddings(&store, &index, &embedder, 3)
            .await
            .unwrap();

        assert_eq!(report.recomputed, 7);
        assert_eq!(index.points.lock().unwrap().len(), 7);
    }
}
