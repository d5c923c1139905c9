use crate::error::ProcessError;
use crate::extractor::{AttributeExtractor, ExtractionStats, VocabularySet};
use crate::hierarchy::{HierarchyBuilder, HierarchyStats, SeedRow};
use crate::models::{EnrichedRow, PipelineOptions, RawRow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

pub const REQUIRED_COLUMNS: [&str; 5] =
    ["material_id", "component_id", "description", "qty", "path"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub input_rows: usize,
    pub final_rows: usize,
    pub dropped_duplicates: usize,
    pub dropped_empty_paths: usize,
    pub assemblies: i64,
    pub subassemblies: i64,
    pub leafs: i64,
    pub total_nodes: i64,
    pub hierarchy: HierarchyStats,
    pub extraction: ExtractionStats,
}

#[derive(Debug)]
pub struct ProcessedBatch {
    pub rows: Vec<EnrichedRow>,
    pub stats: PipelineStats,
}

struct CleanRow {
    material_id: String,
    component_id: String,
    description: String,
    qty: f64,
    path: String,
}

/// Read a raw batch file, failing fast when a required column is absent
/// from the header.
pub fn read_raw_rows(path: &Path) -> Result<Vec<RawRow>, ProcessError> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers: HashSet<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.contains(*column))
        .collect();
    if !missing.is_empty() {
        return Err(ProcessError::MissingColumns(missing.join(", ")));
    }

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Whole-batch transformation: validation and cleanup, per-row attribute
/// extraction, hierarchy reconstruction, and derived text features.
pub struct BomProcessor {
    extractor: AttributeExtractor,
    hierarchy: HierarchyBuilder,
    options: PipelineOptions,
}

impl BomProcessor {
    pub fn new(vocabularies: &VocabularySet) -> Result<Self, ProcessError> {
        Self::with_options(vocabularies, PipelineOptions::default())
    }

    pub fn with_options(
        vocabularies: &VocabularySet,
        options: PipelineOptions,
    ) -> Result<Self, ProcessError> {
        Ok(Self {
            extractor: AttributeExtractor::with_clean_name_cap(
                vocabularies,
                options.clean_name_max_chars,
            )?,
            hierarchy: HierarchyBuilder::new(),
            options,
        })
    }

    pub fn process(&mut self, rows: Vec<RawRow>) -> Result<ProcessedBatch, ProcessError> {
        let input_rows = rows.len();
        info!(rows = input_rows, "pipeline: starting batch");

        let mut stats = PipelineStats {
            input_rows,
            ..Default::default()
        };

        let clean = self.validate_and_clean(rows, &mut stats);
        info!(rows = clean.len(), "pipeline: validation complete");

        let descriptions: Vec<String> = clean.iter().map(|row| row.description.clone()).collect();
        let parsed = self.extractor.parse_batch(&descriptions);

        let seeds: Vec<SeedRow> = clean
            .iter()
            .map(|row| SeedRow {
                material_id: row.material_id.clone(),
                component_id: row.component_id.clone(),
                path: row.path.clone(),
            })
            .collect();
        let nodes = self.hierarchy.build(seeds);

        let rows: Vec<EnrichedRow> = clean
            .into_iter()
            .zip(parsed)
            .zip(nodes)
            .map(|((row, attributes), node)| {
                let embedding_text = format!(
                    "{}. Type: {}. Material: {}. Size: {}. Vendor: {}",
                    attributes.clean_name,
                    attributes.component_type,
                    attributes.material,
                    attributes.size,
                    attributes.vendor
                )
                .trim()
                .to_string();
                let search_text = format!(
                    "{} {} {} {}",
                    row.component_id,
                    attributes.clean_name,
                    attributes.component_type,
                    attributes.vendor
                )
                .trim()
                .to_string();

                EnrichedRow {
                    row_id: node.row_id,
                    unique_id: node.unique_id,
                    material_id: node.material_id,
                    component_id: node.component_id,
                    description: row.description,
                    qty: row.qty,
                    path: node.path,
                    parent_id: node.parent_id,
                    abs_level: node.abs_level,
                    record_type: node.record_type,
                    is_assembly: node.is_assembly,
                    is_subassembly: node.is_subassembly,
                    is_leaf: node.is_leaf,
                    usage_count: node.usage_count,
                    usage_norm: node.usage_norm,
                    usage_category: node.usage_category,
                    clean_name: attributes.clean_name,
                    component_type: attributes.component_type,
                    material: attributes.material,
                    size: attributes.size,
                    vendor: attributes.vendor,
                    standard: attributes.standard,
                    confidence_scores: attributes.confidence_scores,
                    embedding_text,
                    search_text,
                    qty_log: row.qty.ln_1p(),
                }
            })
            .collect();

        stats.final_rows = rows.len();
        stats.hierarchy = self.hierarchy.stats().clone();
        stats.extraction = self.extractor.stats();

        let distribution = &stats.hierarchy.record_type_distribution;
        stats.assemblies = distribution.get("ASSEMBLY").copied().unwrap_or(0);
        stats.subassemblies = distribution.get("SUBASSEMBLY").copied().unwrap_or(0);
        stats.leafs = distribution.get("LEAF").copied().unwrap_or(0);
        stats.total_nodes = distribution.values().sum();

        info!(
            rows = stats.final_rows,
            assemblies = stats.assemblies,
            subassemblies = stats.subassemblies,
            leafs = stats.leafs,
            "pipeline: batch complete"
        );

        Ok(ProcessedBatch { rows, stats })
    }

    fn validate_and_clean(&self, rows: Vec<RawRow>, stats: &mut PipelineStats) -> Vec<CleanRow> {
        let mut seen: HashSet<(String, String, String)> = HashSet::new();
        let mut clean = Vec::new();

        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        for row in rows {
            let key = (
                present(&row.material_id).unwrap_or_default(),
                present(&row.component_id).unwrap_or_default(),
                row.path.trim().to_string(),
            );
            if !seen.insert(key) {
                stats.dropped_duplicates += 1;
                continue;
            }

            let path = row.path.trim().to_string();
            if path.is_empty() {
                stats.dropped_empty_paths += 1;
                continue;
            }

            let segments: Vec<&str> = path.split('.').collect();
            let first_segment = segments.first().map(|segment| segment.trim().to_string());
            let last_segment = segments.last().map(|segment| segment.trim().to_string());

            let material_id = present(&row.material_id)
                .or(first_segment)
                .unwrap_or_default();
            let component_id = present(&row.component_id)
                .or(last_segment)
                .unwrap_or_default();
            let description = present(&row.description)
                .unwrap_or_else(|| {
                    if component_id.is_empty() {
                        "NO_DESCRIPTION".to_string()
                    } else {
                        component_id.clone()
                    }
                });
            let qty = row.qty.unwrap_or(1.0).max(self.options.qty_floor);

            clean.push(CleanRow {
                material_id,
                component_id,
                description,
                qty,
                path,
            });
        }

        clean
    }
}
