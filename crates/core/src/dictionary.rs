use crate::error::ProcessError;
use aho_corasick::AhoCorasick;
use std::collections::BTreeMap;

pub const DICTIONARY_CONFIDENCE: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeCategory {
    ComponentType,
    Material,
    Vendor,
    Standard,
}

impl AttributeCategory {
    pub fn key(&self) -> &'static str {
        match self {
            AttributeCategory::ComponentType => "component_type",
            AttributeCategory::Material => "material",
            AttributeCategory::Vendor => "vendor",
            AttributeCategory::Standard => "standard",
        }
    }
}

/// Tokens matched for one category, first-seen order, deduplicated.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub values: Vec<String>,
    pub confidences: BTreeMap<String, f32>,
}

impl MatchResult {
    pub(crate) fn record(&mut self, token: &str, confidence: f32) {
        if !self.values.iter().any(|value| value == token) {
            self.values.push(token.to_string());
        }
        let entry = self.confidences.entry(token.to_string()).or_insert(0.0);
        if confidence > *entry {
            *entry = confidence;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DictionaryMatches {
    pub component_type: MatchResult,
    pub material: MatchResult,
    pub vendor: MatchResult,
    pub standard: MatchResult,
}

/// Single-pass substring matcher over the four canonical vocabularies.
pub struct DictionaryMatcher {
    automaton: AhoCorasick,
    tokens: Vec<(AttributeCategory, String)>,
}

impl DictionaryMatcher {
    pub fn new(
        component_types: &[String],
        materials: &[String],
        vendors: &[String],
        standards: &[String],
    ) -> Result<Self, ProcessError> {
        let mut tokens = Vec::new();
        let mut add = |category: AttributeCategory, list: &[String]| {
            for token in list {
                let token = token.trim().to_uppercase();
                if !token.is_empty() {
                    tokens.push((category, token));
                }
            }
        };

        add(AttributeCategory::ComponentType, component_types);
        add(AttributeCategory::Material, materials);
        add(AttributeCategory::Vendor, vendors);
        add(AttributeCategory::Standard, standards);

        let automaton = AhoCorasick::new(tokens.iter().map(|(_, token)| token.as_str()))
            .map_err(|error| ProcessError::InvalidArgument(error.to_string()))?;

        Ok(Self { automaton, tokens })
    }

    fn normalize_text(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase()
    }

    /// One left-to-right scan yielding every vocabulary hit, tagged by
    /// category, at fixed dictionary confidence.
    pub fn match_all(&self, text: &str) -> DictionaryMatches {
        let normalized = Self::normalize_text(text);
        let mut matches = DictionaryMatches::default();

        for hit in self.automaton.find_overlapping_iter(&normalized) {
            let (category, token) = &self.tokens[hit.pattern().as_usize()];
            let result = match category {
                AttributeCategory::ComponentType => &mut matches.component_type,
                AttributeCategory::Material => &mut matches.material,
                AttributeCategory::Vendor => &mut matches.vendor,
                AttributeCategory::Standard => &mut matches.standard,
            };
            result.record(token, DICTIONARY_CONFIDENCE);
        }

        matches
    }
}
