use crate::models::{RecordRole, UsageCategory};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// One row entering hierarchy reconstruction.
#[derive(Debug, Clone)]
pub struct SeedRow {
    pub material_id: String,
    pub component_id: String,
    pub path: String,
}

/// One row after reconstruction: repaired and renumbered path, depth,
/// parent linkage, structural role, identity, and usage statistics.
#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub material_id: String,
    pub component_id: String,
    /// Numeric materialized path after surrogate-id rewriting.
    pub path: String,
    /// Repaired component-id path, before renumbering; identity hash input.
    pub component_path: String,
    pub abs_level: i64,
    pub row_id: i64,
    pub parent_id: Option<i64>,
    pub is_assembly: bool,
    pub is_subassembly: bool,
    pub is_leaf: bool,
    pub record_type: RecordRole,
    pub unique_id: String,
    pub usage_count: i64,
    pub usage_norm: f64,
    pub usage_category: UsageCategory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyStats {
    pub total_rows: usize,
    pub paths_fixed: usize,
    pub max_depth: i64,
    pub avg_depth: f64,
    pub std_depth: f64,
    pub record_type_distribution: BTreeMap<String, i64>,
    pub level_distribution: BTreeMap<i64, i64>,
    pub max_usage: i64,
    pub min_usage: i64,
}

/// Trim stray separators and whitespace, collapse runs of dots, and drop
/// empty segments. Collapsing repeats until stable because a single pass
/// leaves runs of three or more dots incompletely reduced.
pub fn repair_path(raw: &str) -> String {
    let mut path: String = raw
        .trim()
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string();

    loop {
        let collapsed = path.replace("..", ".");
        if collapsed == path {
            break;
        }
        path = collapsed;
    }

    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn parent_segment(path: &str) -> Option<&str> {
    if !path.contains('.') {
        return None;
    }
    path.rsplit('.').nth(1)
}

fn make_unique_id(material_id: &str, component_id: &str, component_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(component_path.as_bytes());
    format!("{}_{}_{:x}", material_id, component_id, hasher.finalize())
}

/// Whole-table reconstruction of the assembly tree from materialized paths.
///
/// Structural role uses the relational strategy: a row is a parent when at
/// least one other row's parent segment equals its component id. The
/// sorted-path-prefix strategy can disagree when a component id repeats at
/// several tree positions and is not used here.
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    stats: HierarchyStats,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &HierarchyStats {
        &self.stats
    }

    pub fn build(&mut self, seeds: Vec<SeedRow>) -> Vec<HierarchyNode> {
        info!(rows = seeds.len(), "hierarchy: starting reconstruction");
        self.stats = HierarchyStats {
            total_rows: seeds.len(),
            ..Default::default()
        };

        if seeds.is_empty() {
            return Vec::new();
        }

        // Path repair.
        let mut nodes: Vec<HierarchyNode> = seeds
            .into_iter()
            .map(|seed| {
                let repaired = repair_path(&seed.path);
                if repaired != seed.path {
                    self.stats.paths_fixed += 1;
                }
                HierarchyNode {
                    material_id: seed.material_id,
                    component_id: seed.component_id,
                    path: repaired.clone(),
                    component_path: repaired,
                    abs_level: 0,
                    row_id: 0,
                    parent_id: None,
                    is_assembly: false,
                    is_subassembly: false,
                    is_leaf: false,
                    record_type: RecordRole::Unknown,
                    unique_id: String::new(),
                    usage_count: 0,
                    usage_norm: 0.0,
                    usage_category: UsageCategory::Unique,
                }
            })
            .collect();

        // Depth.
        for node in &mut nodes {
            node.abs_level = node.component_path.matches('.').count() as i64;
        }

        // Structural role from parent-segment frequencies.
        let mut child_counts: HashMap<String, i64> = HashMap::new();
        for node in &nodes {
            if let Some(parent) = parent_segment(&node.component_path) {
                *child_counts.entry(parent.to_string()).or_insert(0) += 1;
            }
        }
        for node in &mut nodes {
            let has_children = child_counts
                .get(&node.component_id)
                .is_some_and(|count| *count > 0);
            node.is_assembly = node.abs_level == 0;
            node.is_subassembly = has_children && node.abs_level > 0;
            node.is_leaf = !has_children && node.abs_level > 0;
            node.record_type =
                RecordRole::from_flags(node.is_assembly, node.is_subassembly, node.is_leaf);
        }

        // Identity from the repaired, pre-renumbering path.
        for node in &mut nodes {
            node.unique_id =
                make_unique_id(&node.material_id, &node.component_id, &node.component_path);
        }

        // Usage statistics.
        let mut usage: HashMap<&str, i64> = HashMap::new();
        for node in &nodes {
            *usage.entry(node.component_id.as_str()).or_insert(0) += 1;
        }
        let usage: HashMap<String, i64> = usage
            .into_iter()
            .map(|(component, count)| (component.to_string(), count))
            .collect();
        let max_usage = usage.values().copied().max().unwrap_or(0);
        for node in &mut nodes {
            let count = usage.get(&node.component_id).copied().unwrap_or(0);
            node.usage_count = count;
            node.usage_norm = if max_usage > 0 {
                count as f64 / max_usage as f64
            } else {
                0.0
            };
            node.usage_category = UsageCategory::from_count(count);
        }

        // Numeric path rewriting: dense surrogate ids, later rows winning
        // on duplicate component ids, then parent ids re-derived from the
        // rewritten path with dangling references nulled.
        let mut surrogates: HashMap<String, i64> = HashMap::new();
        for (index, node) in nodes.iter_mut().enumerate() {
            node.row_id = index as i64 + 1;
            surrogates.insert(node.component_id.clone(), node.row_id);
        }
        let valid_ids: std::collections::HashSet<i64> =
            nodes.iter().map(|node| node.row_id).collect();

        for node in &mut nodes {
            let numeric: Vec<String> = node
                .component_path
                .split('.')
                .filter(|segment| !segment.is_empty())
                .filter_map(|segment| surrogates.get(segment).map(|id| id.to_string()))
                .collect();
            node.path = numeric.join(".");

            node.parent_id = parent_segment(&node.path)
                .and_then(|segment| segment.parse::<i64>().ok())
                .filter(|id| valid_ids.contains(id));
        }

        self.collect_stats(&nodes, max_usage);
        info!(
            rows = nodes.len(),
            fixed = self.stats.paths_fixed,
            "hierarchy: reconstruction complete"
        );

        nodes
    }

    fn collect_stats(&mut self, nodes: &[HierarchyNode], max_usage: i64) {
        let depths: Vec<f64> = nodes.iter().map(|node| node.abs_level as f64).collect();
        let count = depths.len().max(1) as f64;
        let mean = depths.iter().sum::<f64>() / count;
        let variance = depths
            .iter()
            .map(|depth| (depth - mean).powi(2))
            .sum::<f64>()
            / count;

        self.stats.max_depth = nodes.iter().map(|node| node.abs_level).max().unwrap_or(0);
        self.stats.avg_depth = mean;
        self.stats.std_depth = variance.sqrt();
        self.stats.max_usage = max_usage;
        self.stats.min_usage = nodes.iter().map(|node| node.usage_count).min().unwrap_or(0);

        for node in nodes {
            *self
                .stats
                .record_type_distribution
                .entry(node.record_type.as_str().to_string())
                .or_insert(0) += 1;
            *self
                .stats
                .level_distribution
                .entry(node.abs_level)
                .or_insert(0) += 1;
        }
    }
}
