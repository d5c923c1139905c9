use crate::error::SearchError;
use crate::models::{ComponentRecord, SearchFilters, SearchMatch};
use crate::traits::{ComponentReader, VectorIndex};
use std::collections::{HashMap, HashSet};

/// Candidate pool requested from the vector index, deliberately much larger
/// than any sane result size so post-filtering and dedup still fill top_k.
pub const CANDIDATE_POOL: usize = 200;

pub struct HybridSearchEngine<R, V>
where
    R: ComponentReader,
    V: VectorIndex,
{
    reader: R,
    index: V,
    pool_size: usize,
}

impl<R, V> HybridSearchEngine<R, V>
where
    R: ComponentReader + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(reader: R, index: V) -> Self {
        Self {
            reader,
            index,
            pool_size: CANDIDATE_POOL,
        }
    }

    pub fn with_pool_size(reader: R, index: V, pool_size: usize) -> Self {
        Self {
            reader,
            index,
            pool_size,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Query the index, hydrate candidates from the store, re-apply the
    /// structured filters in process, and sort ascending by distance.
    /// Not deduplicated; `search` layers that on top.
    pub async fn candidate_pool(
        &self,
        query_embedding: &[f32],
        pool_size: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<SearchMatch>, SearchError> {
        let expr = filters.and_then(SearchFilters::to_expr);

        let hits = self
            .index
            .query_points(query_embedding, pool_size, expr.as_ref())
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let unique_ids: Vec<String> = hits.iter().map(|hit| hit.unique_id.clone()).collect();
        let records = self.reader.components_by_unique_ids(&unique_ids).await?;
        let by_unique_id: HashMap<String, ComponentRecord> = records
            .into_iter()
            .map(|record| (record.unique_id.clone(), record))
            .collect();

        let mut matches: Vec<SearchMatch> = hits
            .iter()
            .filter_map(|hit| {
                by_unique_id.get(&hit.unique_id).map(|record| SearchMatch {
                    record: record.clone(),
                    distance: hit.distance,
                    similarity: 1.0 / (1.0 + hit.distance),
                })
            })
            .filter(|candidate| {
                expr.as_ref()
                    .map(|expr| expr.matches(&candidate.record))
                    .unwrap_or(true)
            })
            .collect();

        matches.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        Ok(matches)
    }

    /// Ranked hybrid search: nearest first, one result per logical
    /// component id, truncated to `top_k`.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<SearchMatch>, SearchError> {
        let pool_size = self.pool_size.max(top_k);
        let candidates = self
            .candidate_pool(query_embedding, pool_size, filters)
            .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        for candidate in candidates {
            if !seen.insert(candidate.record.component_id.clone()) {
                continue;
            }
            results.push(candidate);
            if results.len() == top_k {
                break;
            }
        }

        Ok(results)
    }
}
