use crate::embeddings::Embedder;
use crate::error::StoreError;
use crate::models::{
    ComponentRecord, ComponentUpdate, EnrichedRow, ListFilter, NewComponent, RecordRole,
    StoreStats, VectorMetadata, VectorPoint,
};
use crate::stores::sqlite::SqliteComponentStore;
use crate::traits::VectorIndex;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

const UPDATABLE_FIELDS: [&str; 8] = [
    "description",
    "qty",
    "clean_name",
    "vendor",
    "material",
    "size",
    "component_type",
    "standard",
];

/// Parse a partial update from loose JSON, rejecting retired attribute
/// fields and anything unknown.
pub fn parse_update(value: &Value) -> Result<ComponentUpdate, StoreError> {
    let object = value
        .as_object()
        .ok_or_else(|| StoreError::InvalidArgument("update must be an object".to_string()))?;

    for key in object.keys() {
        if ComponentUpdate::RETIRED_FIELDS.contains(&key.as_str()) {
            return Err(StoreError::InvalidArgument(format!(
                "field is retired and cannot be written: {key}"
            )));
        }
        if !UPDATABLE_FIELDS.contains(&key.as_str()) {
            return Err(StoreError::InvalidArgument(format!(
                "unknown update field: {key}"
            )));
        }
    }

    serde_json::from_value(value.clone()).map_err(StoreError::Serialization)
}

/// CRUD over component records with vector-index synchronization layered on
/// top of the relational store. Vector-sync failures are logged and never
/// roll back the relational write.
pub struct ComponentService<V, E>
where
    V: VectorIndex,
    E: Embedder,
{
    store: Arc<SqliteComponentStore>,
    index: V,
    embedder: E,
}

impl<V, E> ComponentService<V, E>
where
    V: VectorIndex + Send + Sync,
    E: Embedder + Send + Sync,
{
    pub fn new(store: Arc<SqliteComponentStore>, index: V, embedder: E) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }

    pub fn store(&self) -> &SqliteComponentStore {
        &self.store
    }

    fn vector_point(record: &ComponentRecord, embedding: Vec<f32>) -> VectorPoint {
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
                updated_at: Some(record.updated_at.to_rfc3339()),
            },
        }
    }

    /// Compute a missing embedding from the record's text and persist it;
    /// returns the refreshed record.
    async fn ensure_embedding(
        &self,
        record: ComponentRecord,
    ) -> Result<ComponentRecord, StoreError> {
        if record.embedding_vector.is_some() {
            return Ok(record);
        }

        let text = if record.clean_name.is_empty() {
            record.description.clone()
        } else {
            record.clean_name.clone()
        };
        let embedding = self.embedder.encode(&text);
        self.store
            .set_embedding(record.id, &embedding, Utc::now())
            .await?;

        self.store.get(record.id).await?.ok_or_else(|| {
            StoreError::NotFound(format!("component {} after embedding", record.id))
        })
    }

    async fn sync_vector(&self, record: &ComponentRecord) {
        let Some(embedding) = record.embedding_vector.clone() else {
            return;
        };
        let point = Self::vector_point(record, embedding);
        if let Err(error) = self.index.upsert_points(&[point]).await {
            warn!(
                unique_id = %record.unique_id,
                %error,
                "vector upsert failed; relational write kept"
            );
        }
    }

    pub async fn create(&self, data: NewComponent) -> Result<ComponentRecord, StoreError> {
        let record = self.store.create(data).await?;
        let record = self.ensure_embedding(record).await?;
        self.sync_vector(&record).await;
        Ok(record)
    }

    pub async fn get(&self, id: i64) -> Result<Option<ComponentRecord>, StoreError> {
        self.store.get(id).await
    }

    pub async fn get_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<ComponentRecord>, StoreError> {
        self.store.get_by_unique_id(unique_id).await
    }

    pub async fn update(
        &self,
        id: i64,
        updates: &ComponentUpdate,
    ) -> Result<Option<ComponentRecord>, StoreError> {
        let Some(mut record) = self.store.update(id, updates).await? else {
            return Ok(None);
        };

        if updates.touches_text() {
            let text = if record.clean_name.is_empty() {
                record.description.clone()
            } else {
                record.clean_name.clone()
            };
            let embedding = self.embedder.encode(&text);
            self.store
                .set_embedding(record.id, &embedding, Utc::now())
                .await?;
            record = self.store.get(id).await?.ok_or_else(|| {
                StoreError::NotFound(format!("component {id} after re-embedding"))
            })?;
        }

        self.sync_vector(&record).await;
        Ok(Some(record))
    }

    /// Delete a record and every strict descendant, removing each from the
    /// vector index as well. Returns false when the id does not exist.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let Some(record) = self.store.get(id).await? else {
            return Ok(false);
        };

        let descendants = self.store.descendants(&record.path).await?;

        let mut unique_ids: Vec<String> = descendants
            .iter()
            .map(|child| child.unique_id.clone())
            .collect();
        unique_ids.push(record.unique_id.clone());
        if let Err(error) = self.index.delete_points(&unique_ids).await {
            warn!(%error, "vector delete failed; relational delete continues");
        }

        let mut row_ids: Vec<i64> = descendants.iter().map(|child| child.id).collect();
        row_ids.push(record.id);
        self.store.delete_rows(&row_ids).await?;

        Ok(true)
    }

    /// Destructive wholesale replace of the store from a processed batch.
    pub async fn bulk_import(&self, rows: &[EnrichedRow]) -> Result<usize, StoreError> {
        self.store.bulk_replace(rows).await
    }

    pub async fn list(
        &self,
        filter: &ListFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        self.store.list(filter, limit, offset).await
    }

    pub async fn search_text(
        &self,
        needle: &str,
        column: Option<&str>,
        record_type: Option<RecordRole>,
        limit: i64,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        self.store.search_text(needle, column, record_type, limit).await
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::SearchError;
    use crate::models::{FilterExpr, VectorHit};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records upserts and deletes so tests can assert sync behavior.
    #[derive(Default)]
    struct RecordingIndex {
        upserts: Mutex<Vec<VectorPoint>>,
        deletes: Mutex<Vec<String>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn upsert_points(&self, points: &[VectorPoint]) -> Result<(), SearchError> {
            if self.fail_writes {
                return Err(SearchError::Request("index offline".to_string()));
            }
            self.upserts.lock().unwrap().extend(points.iter().cloned());
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
            if self.fail_writes {
                return Err(SearchError::Request("index offline".to_string()));
            }
            self.deletes.lock().unwrap().extend(unique_ids.iter().cloned());
            Ok(())
        }

        async fn list_ids(
            &self,
            _cursor: Option<String>,
            _limit: usize,
        ) -> Result<(Vec<String>, Option<String>), SearchError> {
            Ok((Vec::new(), None))
        }

        async fn metadata_by_ids(
            &self,
            _unique_ids: &[String],
        ) -> Result<Vec<(String, VectorMetadata)>, SearchError> {
            Ok(Vec::new())
        }
    }

    async fn service(
        fail_writes: bool,
    ) -> ComponentService<RecordingIndex, CharacterNgramEmbedder> {
        let store = Arc::new(SqliteComponentStore::connect_in_memory().await.unwrap());
        let index = RecordingIndex {
            fail_writes,
            ..Default::default()
        };
        ComponentService::new(store, index, CharacterNgramEmbedder::default())
    }

    fn new_component(unique_id: &str, component_id: &str, path: &str) -> NewComponent {
        NewComponent {
            unique_id: Some(unique_id.to_string()),
            material_id: "M1".to_string(),
            component_id: component_id.to_string(),
            description: format!("{component_id} description"),
            qty: 1.0,
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_embeds_lazily_and_upserts_the_index() {
        let service = service(false).await;
        let record = service.create(new_component("u-1", "A", "1")).await.unwrap();

        assert!(record.embedding_vector.is_some());
        let upserts = service.index.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].unique_id, "u-1");
        assert_eq!(upserts[0].metadata.material_id, "M1");
    }

    #[tokio::test]
    async fn index_failure_does_not_roll_back_the_relational_write() {
        let service = service(true).await;
        let record = service.create(new_component("u-1", "A", "1")).await.unwrap();

        assert!(service.store().get(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_re_embeds_when_text_changes() {
        let service = service(false).await;
        let record = service.create(new_component("u-1", "A", "1")).await.unwrap();
        let before = record.embedding_vector.clone().unwrap();

        let updated = service
            .update(
                record.id,
                &ComponentUpdate {
                    clean_name: Some("completely different text".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .expect("row");

        assert_ne!(updated.embedding_vector.unwrap(), before);
        assert_eq!(service.index.upserts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retired_fields_are_rejected() {
        let result = parse_update(&json!({ "grade": "8.8" }));
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));

        let result = parse_update(&json!({ "nonsense": 1 }));
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));

        let update = parse_update(&json!({ "clean_name": "PUMP", "qty": 2.0 })).unwrap();
        assert_eq!(update.clean_name.as_deref(), Some("PUMP"));
    }

    #[tokio::test]
    async fn delete_cascades_to_descendants_and_the_index() {
        let service = service(false).await;
        let root = service.create(new_component("u-a", "A", "1")).await.unwrap();
        service.create(new_component("u-b", "B", "1.2")).await.unwrap();
        service.create(new_component("u-c", "C", "1.2.3")).await.unwrap();

        let deleted = service.delete(root.id).await.unwrap();
        assert!(deleted);

        assert!(service.store().get_by_unique_id("u-a").await.unwrap().is_none());
        assert!(service.store().get_by_unique_id("u-b").await.unwrap().is_none());
        assert!(service.store().get_by_unique_id("u-c").await.unwrap().is_none());

        let deletes = service.index.deletes.lock().unwrap();
        assert!(deletes.contains(&"u-a".to_string()));
        assert!(deletes.contains(&"u-b".to_string()));
        assert!(deletes.contains(&"u-c".to_string()));
    }

    #[tokio::test]
    async fn delete_of_missing_id_returns_false() {
        let service = service(false).await;
        assert!(!service.delete(404).await.unwrap());
    }
}
