use crate::error::{SearchError, StoreError};
use crate::models::{ComponentRecord, FilterExpr, VectorHit, VectorMetadata, VectorPoint};
use async_trait::async_trait;

/// Read side of the component store needed to hydrate search candidates.
#[async_trait]
pub trait ComponentReader {
    async fn component_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<ComponentRecord>, StoreError>;

    async fn components_by_unique_ids(
        &self,
        unique_ids: &[String],
    ) -> Result<Vec<ComponentRecord>, StoreError>;
}

/// External approximate-nearest-neighbor service keyed by unique id.
#[async_trait]
pub trait VectorIndex {
    async fn upsert_points(&self, points: &[VectorPoint]) -> Result<(), SearchError>;

    async fn query_points(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<VectorHit>, SearchError>;

    async fn delete_points(&self, unique_ids: &[String]) -> Result<(), SearchError>;

    /// Paginated id listing; returns the ids and the cursor for the next
    /// page, if any.
    async fn list_ids(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<(Vec<String>, Option<String>), SearchError>;

    async fn metadata_by_ids(
        &self,
        unique_ids: &[String],
    ) -> Result<Vec<(String, VectorMetadata)>, SearchError>;
}

/// Rows and freshness signal the graph materializer reads from the store.
#[async_trait]
pub trait GraphSource {
    async fn store_fingerprint(&self) -> Result<String, StoreError>;

    async fn material_components(
        &self,
        material_id: &str,
    ) -> Result<Vec<ComponentRecord>, StoreError>;
}
