use crate::dictionary::{DictionaryMatcher, MatchResult};
use crate::error::ProcessError;
use crate::patterns::{PatternMatcher, THREAD_CONFIDENCE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Structured attributes parsed out of one free-text description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedAttributes {
    pub clean_name: String,
    pub component_type: String,
    pub material: String,
    pub size: String,
    pub vendor: String,
    pub standard: String,
    pub is_assembly: bool,
    pub is_subassembly: bool,
    pub is_leaf: bool,
    pub confidence_scores: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total: u64,
    pub component_type: u64,
    pub material: u64,
    pub vendor: u64,
    pub size: u64,
    pub standard: u64,
}

/// The four canonical vocabularies produced offline by the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularySet {
    pub component_types: Vec<String>,
    pub materials: Vec<String>,
    pub vendors: Vec<String>,
    pub standards: Vec<String>,
}

impl VocabularySet {
    /// Load vocabularies from a directory of JSON array files; a missing
    /// file yields an empty list for that category.
    pub fn from_dir(dir: &Path) -> Result<Self, ProcessError> {
        fn load_list(path: &Path) -> Result<Vec<String>, ProcessError> {
            if !path.exists() {
                return Ok(Vec::new());
            }
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)
                .map_err(|error| ProcessError::InvalidArgument(error.to_string()))
        }

        Ok(Self {
            component_types: load_list(&dir.join("component_types.json"))?,
            materials: load_list(&dir.join("materials.json"))?,
            vendors: load_list(&dir.join("vendors.json"))?,
            standards: load_list(&dir.join("standards.json"))?,
        })
    }
}

/// Parses descriptions with the dictionary and pattern matchers and merges
/// their results into one record per row.
pub struct AttributeExtractor {
    dictionary: DictionaryMatcher,
    patterns: PatternMatcher,
    clean_name_max_chars: usize,
    stats: ExtractionStats,
}

impl AttributeExtractor {
    pub fn new(vocabularies: &VocabularySet) -> Result<Self, ProcessError> {
        Self::with_clean_name_cap(vocabularies, 120)
    }

    pub fn with_clean_name_cap(
        vocabularies: &VocabularySet,
        max_chars: usize,
    ) -> Result<Self, ProcessError> {
        Ok(Self {
            dictionary: DictionaryMatcher::new(
                &vocabularies.component_types,
                &vocabularies.materials,
                &vocabularies.vendors,
                &vocabularies.standards,
            )?,
            patterns: PatternMatcher::new()?,
            clean_name_max_chars: max_chars,
            stats: ExtractionStats::default(),
        })
    }

    fn normalize_description(text: &str) -> String {
        text.trim()
            .replace(',', ".")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn record_category(
        result: &MatchResult,
        category: &str,
        field: &mut String,
        counter: &mut u64,
        confidence_scores: &mut BTreeMap<String, f32>,
    ) {
        if result.values.is_empty() {
            return;
        }
        *field = result.values.join(" ");
        *counter += 1;
        for (token, confidence) in &result.confidences {
            confidence_scores.insert(format!("{category}:{token}"), *confidence);
        }
    }

    pub fn parse_single(&mut self, description: &str) -> ParsedAttributes {
        self.stats.total += 1;

        let text = Self::normalize_description(description);
        let mut parsed = ParsedAttributes {
            clean_name: text.chars().take(self.clean_name_max_chars).collect(),
            ..Default::default()
        };

        let lower = text.to_lowercase();
        if lower.contains("subassembly") {
            parsed.is_subassembly = true;
        } else if lower.contains("assembly") || lower.contains("unit") {
            parsed.is_assembly = true;
        } else {
            parsed.is_leaf = true;
        }

        let dictionary = self.dictionary.match_all(&text);
        let pattern = self.patterns.match_all(&text);

        Self::record_category(
            &dictionary.component_type,
            "component_type",
            &mut parsed.component_type,
            &mut self.stats.component_type,
            &mut parsed.confidence_scores,
        );
        Self::record_category(
            &dictionary.material,
            "material",
            &mut parsed.material,
            &mut self.stats.material,
            &mut parsed.confidence_scores,
        );
        Self::record_category(
            &dictionary.vendor,
            "vendor",
            &mut parsed.vendor,
            &mut self.stats.vendor,
            &mut parsed.confidence_scores,
        );

        // Standards are the union of dictionary hits and the strict token
        // classifier, deduplicated, confidence maxed across sources.
        let mut standard_values = dictionary.standard.values.clone();
        let mut standard_confidences = dictionary.standard.confidences.clone();
        for token in &pattern.strict_standard.values {
            if !standard_values.iter().any(|value| value == token) {
                standard_values.push(token.clone());
            }
            let strict = pattern
                .strict_standard
                .confidences
                .get(token)
                .copied()
                .unwrap_or_default();
            let entry = standard_confidences.entry(token.clone()).or_insert(0.0);
            if strict > *entry {
                *entry = strict;
            }
        }
        if !standard_values.is_empty() {
            parsed.standard = standard_values.join(" ");
            self.stats.standard += 1;
            for (token, confidence) in &standard_confidences {
                parsed
                    .confidence_scores
                    .insert(format!("standard:{token}"), *confidence);
            }
        }

        // Size is regex-only; thread designations join the size field.
        let mut size_values = pattern.size.values.clone();
        let mut size_confidences = pattern.size.confidences.clone();
        for token in &pattern.thread.values {
            if !size_values.iter().any(|value| value == token) {
                size_values.push(token.clone());
            }
            let entry = size_confidences.entry(token.clone()).or_insert(0.0);
            if THREAD_CONFIDENCE > *entry {
                *entry = THREAD_CONFIDENCE;
            }
        }
        if !size_values.is_empty() {
            parsed.size = size_values.join(" ");
            self.stats.size += 1;
            for (token, confidence) in &size_confidences {
                parsed
                    .confidence_scores
                    .insert(format!("size:{token}"), *confidence);
            }
        }

        for (token, confidence) in &pattern.grade.confidences {
            parsed
                .confidence_scores
                .insert(format!("grade:{token}"), *confidence);
        }
        for (token, confidence) in &pattern.finish.confidences {
            parsed
                .confidence_scores
                .insert(format!("finish:{token}"), *confidence);
        }

        parsed
    }

    pub fn parse_batch(&mut self, descriptions: &[String]) -> Vec<ParsedAttributes> {
        descriptions
            .iter()
            .map(|description| self.parse_single(description))
            .collect()
    }

    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> AttributeExtractor {
        let vocabularies = VocabularySet {
            component_types: vec!["VALVE".to_string(), "BOLT".to_string()],
            materials: vec!["VITON".to_string()],
            vendors: vec!["SWAGELOK".to_string()],
            standards: vec!["ASTM A105".to_string()],
        };
        AttributeExtractor::new(&vocabularies).unwrap()
    }

    #[test]
    fn attributes_merge_from_both_matchers() {
        let parsed = extractor().parse_single("Gate valve VITON Swagelok 10 x 20");

        assert_eq!(parsed.component_type, "VALVE");
        assert_eq!(parsed.material, "VITON");
        assert_eq!(parsed.vendor, "SWAGELOK");
        assert_eq!(parsed.size, "10 X 20");
        assert_eq!(
            parsed.confidence_scores.get("size:10 X 20"),
            Some(&crate::patterns::SIZE_PAIR_CONFIDENCE)
        );
    }

    #[test]
    fn standards_union_keeps_max_confidence() {
        let parsed = extractor().parse_single("Flange ASTM A105 SCH40");

        assert!(parsed.standard.contains("ASTM A105"));
        assert!(parsed.standard.contains("SCH40"));
        assert_eq!(
            parsed.confidence_scores.get("standard:ASTM A105"),
            Some(&crate::dictionary::DICTIONARY_CONFIDENCE)
        );
        assert_eq!(
            parsed.confidence_scores.get("standard:SCH40"),
            Some(&crate::patterns::STRICT_STANDARD_CONFIDENCE)
        );
    }

    #[test]
    fn fastener_thread_tokens_land_in_size() {
        let parsed = extractor().parse_single("Bolt 1/4-20");

        assert_eq!(parsed.component_type, "BOLT");
        assert!(parsed.size.contains("1/4"));
    }

    #[test]
    fn clean_name_is_normalized_and_capped() {
        let long = format!("Valve {}", "x".repeat(200));
        let parsed = extractor().parse_single(&long);

        assert_eq!(parsed.clean_name.chars().count(), 120);
        assert!(parsed.clean_name.starts_with("Valve"));
    }

    #[test]
    fn commas_become_dots_before_matching() {
        let parsed = extractor().parse_single("Gasket 1,5");

        assert_eq!(parsed.clean_name, "Gasket 1.5");
        assert_eq!(parsed.size, "1.5");
    }

    #[test]
    fn role_hint_prefers_subassembly_keyword() {
        let mut ex = extractor();
        assert!(ex.parse_single("Pump assembly").is_assembly);
        assert!(ex.parse_single("Rotor subassembly").is_subassembly);
        assert!(ex.parse_single("Shaft").is_leaf);
    }

    #[test]
    fn empty_description_yields_empty_attributes() {
        let parsed = extractor().parse_single("   ");

        assert!(parsed.clean_name.is_empty());
        assert!(parsed.component_type.is_empty());
        assert!(parsed.size.is_empty());
        assert!(parsed.is_leaf);
    }
}
