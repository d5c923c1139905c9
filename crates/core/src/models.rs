use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordRole {
    #[serde(rename = "ASSEMBLY")]
    Assembly,
    #[serde(rename = "SUBASSEMBLY")]
    Subassembly,
    #[serde(rename = "LEAF")]
    Leaf,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl RecordRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordRole::Assembly => "ASSEMBLY",
            RecordRole::Subassembly => "SUBASSEMBLY",
            RecordRole::Leaf => "LEAF",
            RecordRole::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(tag: &str) -> RecordRole {
        match tag {
            "ASSEMBLY" => RecordRole::Assembly,
            "SUBASSEMBLY" => RecordRole::Subassembly,
            "LEAF" => RecordRole::Leaf,
            _ => RecordRole::Unknown,
        }
    }

    pub fn from_flags(is_assembly: bool, is_subassembly: bool, is_leaf: bool) -> RecordRole {
        if is_assembly {
            RecordRole::Assembly
        } else if is_subassembly {
            RecordRole::Subassembly
        } else if is_leaf {
            RecordRole::Leaf
        } else {
            RecordRole::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UsageCategory {
    #[serde(rename = "UNIQUE")]
    Unique,
    #[serde(rename = "RARE")]
    Rare,
    #[serde(rename = "COMMON")]
    Common,
    #[serde(rename = "FREQUENT")]
    Frequent,
    #[serde(rename = "VERY_FREQUENT")]
    VeryFrequent,
}

impl UsageCategory {
    /// Bucket a usage count with bin edges [0, 1, 5, 20, 100, inf].
    pub fn from_count(count: i64) -> UsageCategory {
        match count {
            c if c <= 1 => UsageCategory::Unique,
            c if c <= 5 => UsageCategory::Rare,
            c if c <= 20 => UsageCategory::Common,
            c if c <= 100 => UsageCategory::Frequent,
            _ => UsageCategory::VeryFrequent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCategory::Unique => "UNIQUE",
            UsageCategory::Rare => "RARE",
            UsageCategory::Common => "COMMON",
            UsageCategory::Frequent => "FREQUENT",
            UsageCategory::VeryFrequent => "VERY_FREQUENT",
        }
    }
}

/// One flat input record as it arrives in a batch file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub material_id: Option<String>,
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub qty: Option<f64>,
    #[serde(default)]
    pub path: String,
}

/// Quantities arrive as free text; anything unparseable is treated as
/// absent rather than failing the row.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.trim().parse::<f64>().ok()))
}

/// One row after extraction and hierarchy reconstruction, superset of what
/// the store persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRow {
    pub row_id: i64,
    pub unique_id: String,
    pub material_id: String,
    pub component_id: String,
    pub description: String,
    pub qty: f64,
    pub path: String,
    pub parent_id: Option<i64>,
    pub abs_level: i64,
    pub record_type: RecordRole,
    pub is_assembly: bool,
    pub is_subassembly: bool,
    pub is_leaf: bool,
    pub usage_count: i64,
    pub usage_norm: f64,
    pub usage_category: UsageCategory,
    pub clean_name: String,
    pub component_type: String,
    pub material: String,
    pub size: String,
    pub vendor: String,
    pub standard: String,
    pub confidence_scores: BTreeMap<String, f32>,
    pub embedding_text: String,
    pub search_text: String,
    pub qty_log: f64,
}

/// The persisted component entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: i64,
    pub unique_id: String,
    pub material_id: String,
    pub component_id: String,
    pub description: String,
    pub qty: f64,
    pub path: String,
    pub parent_id: Option<i64>,
    pub abs_level: i64,
    pub record_type: RecordRole,
    pub is_assembly: bool,
    pub is_subassembly: bool,
    pub is_leaf: bool,
    pub usage_count: i64,
    pub clean_name: String,
    pub vendor: String,
    pub material: String,
    pub size: String,
    pub component_type: String,
    pub standard: String,
    pub embedding_vector: Option<Vec<f32>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewComponent {
    pub unique_id: Option<String>,
    pub material_id: String,
    pub component_id: String,
    pub description: String,
    pub qty: f64,
    pub path: String,
    pub parent_id: Option<i64>,
    pub abs_level: Option<i64>,
    pub record_type: Option<RecordRole>,
    pub is_assembly: Option<bool>,
    pub is_subassembly: Option<bool>,
    pub is_leaf: Option<bool>,
    pub usage_count: Option<i64>,
    pub clean_name: Option<String>,
    pub vendor: Option<String>,
    pub material: Option<String>,
    pub size: Option<String>,
    pub component_type: Option<String>,
    pub standard: Option<String>,
}

/// Partial update; retired attribute fields are rejected at parse time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub description: Option<String>,
    pub qty: Option<f64>,
    pub clean_name: Option<String>,
    pub vendor: Option<String>,
    pub material: Option<String>,
    pub size: Option<String>,
    pub component_type: Option<String>,
    pub standard: Option<String>,
}

impl ComponentUpdate {
    pub const RETIRED_FIELDS: [&'static str; 3] = ["thread_info", "grade", "finish"];

    pub fn touches_text(&self) -> bool {
        self.description.is_some() || self.clean_name.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.qty.is_none()
            && self.clean_name.is_none()
            && self.vendor.is_none()
            && self.material.is_none()
            && self.size.is_none()
            && self.component_type.is_none()
            && self.standard.is_none()
    }
}

/// Structured filters accepted by hybrid search requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchFilters {
    pub record_types: Vec<RecordRole>,
    pub material_id: Option<String>,
    pub vendor: Option<String>,
}

impl SearchFilters {
    /// Translate into the closed filter expression: role membership becomes
    /// a disjunction of role-flag equality, material/vendor equality become
    /// conjuncts, and both groups combine under an outer conjunction.
    pub fn to_expr(&self) -> Option<FilterExpr> {
        let mut or_terms: Vec<FilterExpr> = Vec::new();
        for role in &self.record_types {
            let field = match role {
                RecordRole::Assembly => FilterField::IsAssembly,
                RecordRole::Subassembly => FilterField::IsSubassembly,
                RecordRole::Leaf => FilterField::IsLeaf,
                RecordRole::Unknown => continue,
            };
            or_terms.push(FilterExpr::Eq(field, FilterValue::Bool(true)));
        }

        let mut and_terms = Vec::new();
        if let Some(material_id) = &self.material_id {
            and_terms.push(FilterExpr::Eq(
                FilterField::MaterialId,
                FilterValue::Str(material_id.clone()),
            ));
        }
        if let Some(vendor) = &self.vendor {
            and_terms.push(FilterExpr::Eq(
                FilterField::Vendor,
                FilterValue::Str(vendor.clone()),
            ));
        }

        let or_group = if or_terms.len() > 1 {
            Some(FilterExpr::Or(or_terms))
        } else {
            or_terms.pop()
        };

        match (or_group, and_terms.is_empty()) {
            (None, true) => None,
            (Some(group), true) => Some(group),
            (None, false) => {
                if and_terms.len() == 1 {
                    and_terms.into_iter().next()
                } else {
                    Some(FilterExpr::And(and_terms))
                }
            }
            (Some(group), false) => {
                let mut all = vec![group];
                all.extend(and_terms);
                Some(FilterExpr::And(all))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterField {
    MaterialId,
    ComponentId,
    Vendor,
    IsAssembly,
    IsSubassembly,
    IsLeaf,
    AbsLevel,
}

impl FilterField {
    pub fn key(&self) -> &'static str {
        match self {
            FilterField::MaterialId => "material_id",
            FilterField::ComponentId => "component_id",
            FilterField::Vendor => "vendor",
            FilterField::IsAssembly => "is_assembly",
            FilterField::IsSubassembly => "is_subassembly",
            FilterField::IsLeaf => "is_leaf",
            FilterField::AbsLevel => "abs_level",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FilterValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

/// Closed filter expression tree: equality leaves combined by and/or.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FilterExpr {
    Eq(FilterField, FilterValue),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Evaluate against a hydrated record; the in-process safety net behind
    /// partial metadata support in the vector index.
    pub fn matches(&self, record: &ComponentRecord) -> bool {
        match self {
            FilterExpr::Eq(field, value) => {
                let actual = match field {
                    FilterField::MaterialId => FilterValue::Str(record.material_id.clone()),
                    FilterField::ComponentId => FilterValue::Str(record.component_id.clone()),
                    FilterField::Vendor => FilterValue::Str(record.vendor.clone()),
                    FilterField::IsAssembly => FilterValue::Bool(record.is_assembly),
                    FilterField::IsSubassembly => FilterValue::Bool(record.is_subassembly),
                    FilterField::IsLeaf => FilterValue::Bool(record.is_leaf),
                    FilterField::AbsLevel => FilterValue::Int(record.abs_level),
                };
                actual == *value
            }
            FilterExpr::And(terms) => terms.iter().all(|term| term.matches(record)),
            FilterExpr::Or(terms) => terms.iter().any(|term| term.matches(record)),
        }
    }
}

/// Metadata stored next to each vector entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub component_id: String,
    pub material_id: String,
    pub vendor: String,
    pub is_assembly: bool,
    pub is_subassembly: bool,
    pub is_leaf: bool,
    pub abs_level: i64,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub unique_id: String,
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub unique_id: String,
    pub distance: f64,
    pub metadata: Option<VectorMetadata>,
}

/// One hydrated, scored hybrid search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    pub record: ComponentRecord,
    pub distance: f64,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossMatchReport {
    pub source: ComponentRecord,
    pub same_assembly: Vec<SearchMatch>,
    pub other_assemblies: Vec<SearchMatch>,
    pub analogs: Vec<SearchMatch>,
}

/// Equality filters for store listings.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub material_id: Option<String>,
    pub component_id: Option<String>,
    pub record_type: Option<RecordRole>,
    pub abs_level: Option<i64>,
    pub is_assembly: Option<bool>,
    pub is_subassembly: Option<bool>,
    pub is_leaf: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: i64,
    pub assemblies: i64,
    pub subassemblies: i64,
    pub leafs: i64,
    pub max_depth: i64,
    pub unique_materials: i64,
    pub unique_vendors: i64,
    pub unique_types: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub qty_floor: f64,
    pub clean_name_max_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            qty_floor: 0.001,
            clean_name_max_chars: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_buckets_match_bin_edges() {
        assert_eq!(UsageCategory::from_count(1), UsageCategory::Unique);
        assert_eq!(UsageCategory::from_count(5), UsageCategory::Rare);
        assert_eq!(UsageCategory::from_count(20), UsageCategory::Common);
        assert_eq!(UsageCategory::from_count(100), UsageCategory::Frequent);
        assert_eq!(UsageCategory::from_count(101), UsageCategory::VeryFrequent);
    }

    #[test]
    fn role_filters_become_a_disjunction_under_an_outer_conjunction() {
        let filters = SearchFilters {
            record_types: vec![RecordRole::Assembly, RecordRole::Leaf],
            material_id: Some("M1".to_string()),
            vendor: None,
        };

        let expr = filters.to_expr().expect("expression");
        match expr {
            FilterExpr::And(terms) => {
                assert_eq!(terms.len(), 2);
                assert!(matches!(terms[0], FilterExpr::Or(ref or_terms) if or_terms.len() == 2));
                assert!(matches!(
                    terms[1],
                    FilterExpr::Eq(FilterField::MaterialId, FilterValue::Str(_))
                ));
            }
            other => panic!("expected outer conjunction, got {other:?}"),
        }
    }

    #[test]
    fn single_role_filter_collapses_to_one_equality() {
        let filters = SearchFilters {
            record_types: vec![RecordRole::Leaf],
            material_id: None,
            vendor: None,
        };

        assert_eq!(
            filters.to_expr(),
            Some(FilterExpr::Eq(FilterField::IsLeaf, FilterValue::Bool(true)))
        );
    }

    #[test]
    fn empty_filters_have_no_expression() {
        assert_eq!(SearchFilters::default().to_expr(), None);
    }
}
