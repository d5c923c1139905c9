use crate::error::SearchError;
use crate::models::{FilterExpr, FilterValue, VectorHit, VectorMetadata, VectorPoint};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

/// Every call to the index is an external request; a timeout keeps callers
/// from blocking indefinitely, and a timed-out request is retryable.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QdrantIndex {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

/// Qdrant point ids must be integers or UUIDs; derive a stable UUID from
/// the component's unique id and keep the unique id itself in the payload.
pub fn point_uuid(unique_id: &str) -> Uuid {
    let digest = Sha256::digest(unique_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn filter_value_json(value: &FilterValue) -> Value {
    match value {
        FilterValue::Str(value) => json!(value),
        FilterValue::Bool(value) => json!(value),
        FilterValue::Int(value) => json!(value),
    }
}

fn expr_to_condition(expr: &FilterExpr) -> Value {
    match expr {
        FilterExpr::Eq(field, value) => json!({
            "key": field.key(),
            "match": { "value": filter_value_json(value) },
        }),
        FilterExpr::And(terms) => json!({
            "must": terms.iter().map(expr_to_condition).collect::<Vec<_>>(),
        }),
        FilterExpr::Or(terms) => json!({
            "should": terms.iter().map(expr_to_condition).collect::<Vec<_>>(),
        }),
    }
}

/// Translate the closed filter expression into Qdrant's filter grammar.
pub fn to_qdrant_filter(expr: &FilterExpr) -> Value {
    match expr {
        FilterExpr::Eq(..) => json!({ "must": [expr_to_condition(expr)] }),
        FilterExpr::And(terms) => json!({
            "must": terms.iter().map(expr_to_condition).collect::<Vec<_>>(),
        }),
        FilterExpr::Or(terms) => json!({
            "should": terms.iter().map(expr_to_condition).collect::<Vec<_>>(),
        }),
    }
}

fn metadata_payload(metadata: &VectorMetadata, unique_id: &str) -> Value {
    json!({
        "unique_id": unique_id,
        "component_id": metadata.component_id,
        "material_id": metadata.material_id,
        "vendor": metadata.vendor,
        "is_assembly": metadata.is_assembly,
        "is_subassembly": metadata.is_subassembly,
        "is_leaf": metadata.is_leaf,
        "abs_level": metadata.abs_level,
        "updated_at": metadata.updated_at,
    })
}

fn payload_to_metadata(payload: &Value) -> VectorMetadata {
    VectorMetadata {
        component_id: payload
            .pointer("/component_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        material_id: payload
            .pointer("/material_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        vendor: payload
            .pointer("/vendor")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        is_assembly: payload
            .pointer("/is_assembly")
            .and_then(Value::as_bool)
            .unwrap_or_default(),
        is_subassembly: payload
            .pointer("/is_subassembly")
            .and_then(Value::as_bool)
            .unwrap_or_default(),
        is_leaf: payload
            .pointer("/is_leaf")
            .and_then(Value::as_bool)
            .unwrap_or_default(),
        abs_level: payload
            .pointer("/abs_level")
            .and_then(Value::as_i64)
            .unwrap_or_default(),
        updated_at: payload
            .pointer("/updated_at")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

impl QdrantIndex {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            vector_size,
        }
    }

    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .get(format!("{}/collections/{}", self.endpoint, self.collection))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!(
                "qdrant collection setup failed with {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert_points(&self, points: &[VectorPoint]) -> Result<(), SearchError> {
        if points.is_empty() {
            return Ok(());
        }

        let body: Vec<Value> = points
            .iter()
            .map(|point| {
                if point.embedding.len() != self.vector_size {
                    return Err(SearchError::Request(format!(
                        "embedding dimension {} != {}",
                        point.embedding.len(),
                        self.vector_size
                    )));
                }
                Ok(json!({
                    "id": point_uuid(&point.unique_id).to_string(),
                    "vector": point.embedding,
                    "payload": metadata_payload(&point.metadata, &point.unique_id),
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": body }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn query_points(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<VectorHit>, SearchError> {
        if embedding.len() != self.vector_size {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                embedding.len(),
                self.vector_size
            )));
        }

        let mut body = json!({
            "vector": embedding,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(expr) = filter {
            body["filter"] = to_qdrant_filter(expr);
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for hit in hits {
            let payload = hit.pointer("/payload").cloned().unwrap_or(Value::Null);
            let unique_id = payload
                .pointer("/unique_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if unique_id.is_empty() {
                continue;
            }

            // Cosine scores come back as similarity; convert to a distance
            // so lower always means closer.
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            let distance = 1.0 - score;

            result.push(VectorHit {
                unique_id,
                distance,
                metadata: Some(payload_to_metadata(&payload)),
            });
        }

        Ok(result)
    }

    async fn delete_points(&self, unique_ids: &[String]) -> Result<(), SearchError> {
        if unique_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = unique_ids
            .iter()
            .map(|unique_id| point_uuid(unique_id).to_string())
            .collect();

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": ids }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn list_ids(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<(Vec<String>, Option<String>), SearchError> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(cursor) = cursor {
            body["offset"] = json!(cursor);
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/scroll",
                self.endpoint, self.collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let points = parsed
            .pointer("/result/points")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let ids = points
            .iter()
            .filter_map(|point| {
                point
                    .pointer("/payload/unique_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect();

        let next = parsed
            .pointer("/result/next_page_offset")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok((ids, next))
    }

    async fn metadata_by_ids(
        &self,
        unique_ids: &[String],
    ) -> Result<Vec<(String, VectorMetadata)>, SearchError> {
        if unique_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = unique_ids
            .iter()
            .map(|unique_id| point_uuid(unique_id).to_string())
            .collect();

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points",
                self.endpoint, self.collection
            ))
            .json(&json!({ "ids": ids, "with_payload": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let points = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for point in points {
            let payload = point.pointer("/payload").cloned().unwrap_or(Value::Null);
            let unique_id = payload
                .pointer("/unique_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if unique_id.is_empty() {
                continue;
            }
            result.push((unique_id, payload_to_metadata(&payload)));
        }

        Ok(result)
    }
}
