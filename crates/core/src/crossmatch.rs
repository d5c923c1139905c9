use crate::error::SearchError;
use crate::models::{CrossMatchReport, SearchMatch};
use crate::search::HybridSearchEngine;
use crate::traits::{ComponentReader, VectorIndex};
use std::collections::HashSet;

/// Neighbor pool used before partitioning; large enough that every bucket
/// can fill even after the source and level restrictions.
pub const CROSS_MATCH_POOL: usize = 500;

/// Analogs get their own floor, independent of the requested bucket caps.
pub const ANALOG_FLOOR: usize = 10;

impl<R, V> HybridSearchEngine<R, V>
where
    R: ComponentReader + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    /// Partition the neighborhood of one component into exact structural
    /// duplicates, the same part instantiated elsewhere, and analogs.
    pub async fn cross_match(
        &self,
        unique_id: &str,
        top_k: usize,
        same_level_only: bool,
    ) -> Result<CrossMatchReport, SearchError> {
        let source = self
            .reader()
            .component_by_unique_id(unique_id)
            .await?
            .ok_or_else(|| {
                SearchError::Store(crate::error::StoreError::NotFound(unique_id.to_string()))
            })?;

        let mut report = CrossMatchReport {
            source: source.clone(),
            same_assembly: Vec::new(),
            other_assemblies: Vec::new(),
            analogs: Vec::new(),
        };

        let Some(embedding) = source.embedding_vector.clone() else {
            return Ok(report);
        };

        let pool = self
            .candidate_pool(&embedding, CROSS_MATCH_POOL, None)
            .await?;

        let candidates: Vec<SearchMatch> = pool
            .into_iter()
            .filter(|candidate| candidate.record.unique_id != source.unique_id)
            .filter(|candidate| !same_level_only || candidate.record.abs_level == source.abs_level)
            .collect();

        let mut seen_same: HashSet<String> = HashSet::new();
        let mut seen_paths: HashSet<String> = HashSet::new();
        let mut seen_components: HashSet<String> = HashSet::new();
        let analog_cap = ANALOG_FLOOR.max(top_k);

        for candidate in candidates {
            let record = &candidate.record;

            if record.component_id == source.component_id {
                if record.path == source.path {
                    if report.same_assembly.len() < top_k
                        && seen_same.insert(record.unique_id.clone())
                    {
                        report.same_assembly.push(candidate);
                    }
                } else if report.other_assemblies.len() < top_k
                    && seen_paths.insert(record.path.clone())
                {
                    report.other_assemblies.push(candidate);
                }
                continue;
            }

            if record.clean_name != source.clean_name
                && report.analogs.len() < analog_cap
                && seen_components.insert(record.component_id.clone())
            {
                report.analogs.push(candidate);
            }
        }

        Ok(report)
    }
}
