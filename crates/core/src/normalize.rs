use crate::error::ProcessError;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Offline vocabulary normalization: raw token lists in, a clean set, a
/// noise list, and the exercised abbreviation mappings out.
#[derive(Debug, Clone, Default)]
pub struct NormalizerReport {
    pub clean: BTreeSet<String>,
    pub noise: Vec<String>,
    pub mapping_used: BTreeMap<String, String>,
}

/// Clean vocabularies consulted for cross-dictionary exclusivity checks.
#[derive(Debug, Clone, Default)]
pub struct CrossVocabularies {
    pub vendors: BTreeSet<String>,
    pub component_types: BTreeSet<String>,
    pub standards: BTreeSet<String>,
}

const COMPONENT_FORCE_NOISE: [&str; 2] = ["CSG", "CVB"];

pub fn clean_token(raw: &str) -> String {
    let mut token = raw.to_uppercase();
    token = token.replace(['"', '\''], " ");
    token = token.replace('_', " ");
    token = token.replace(['/', '-'], " ");
    token.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn apply_abbreviation(
    token: &str,
    raw: &str,
    abbreviations: &BTreeMap<String, String>,
    report: &mut NormalizerReport,
) -> Option<String> {
    abbreviations.get(token).map(|mapped| {
        let normalized = mapped.to_uppercase();
        report
            .mapping_used
            .insert(raw.to_string(), normalized.clone());
        normalized
    })
}

/// Component-type tokens: digits, size or material markers, embedded
/// whitespace, and short tokens are noise unless the token is already part
/// of the canonical vocabulary.
pub fn normalize_component_types(
    raw_tokens: &[String],
    abbreviations: &BTreeMap<String, String>,
    canonical: &BTreeSet<String>,
) -> Result<NormalizerReport, ProcessError> {
    let digit = Regex::new(r"\d")?;
    let size_marker = Regex::new(r"\b(UNC|UNF|UNRC|RF|FF|PSI|#)\b")?;
    let material_marker = Regex::new(r"\b(SS|SST|WCB|CI|BRZ|BRONZE)\b")?;

    let mut report = NormalizerReport::default();

    for raw in raw_tokens {
        let mut token = clean_token(raw);

        if COMPONENT_FORCE_NOISE.contains(&token.as_str()) {
            report.noise.push(raw.clone());
            continue;
        }

        if let Some(mapped) = apply_abbreviation(&token, raw, abbreviations, &mut report) {
            token = mapped;
        }

        let valid = canonical.contains(&token)
            || (!digit.is_match(&token)
                && !size_marker.is_match(&token)
                && !material_marker.is_match(&token)
                && !token.contains(' ')
                && token.len() >= 3);

        if valid {
            report.clean.insert(token);
        } else {
            report.noise.push(raw.clone());
        }
    }

    Ok(report)
}

/// Material tokens: anything colliding with a known vendor, component type,
/// or standard is noise; otherwise length >= 2 is accepted.
pub fn normalize_materials(
    raw_tokens: &[String],
    abbreviations: &BTreeMap<String, String>,
    cross: &CrossVocabularies,
) -> NormalizerReport {
    let mut report = NormalizerReport::default();

    let collides = |token: &str, cross: &CrossVocabularies| {
        cross.vendors.contains(token)
            || cross.component_types.contains(token)
            || cross.standards.contains(token)
    };

    for raw in raw_tokens {
        let token = clean_token(raw);

        if let Some(abbrev) = abbreviations.get(&token) {
            let normalized = abbrev.to_uppercase();
            if collides(&normalized, cross) {
                report.noise.push(raw.clone());
            } else {
                report
                    .mapping_used
                    .insert(raw.clone(), normalized.clone());
                report.clean.insert(normalized);
            }
            continue;
        }

        if collides(&token, cross) {
            report.noise.push(raw.clone());
            continue;
        }

        if token.len() >= 2 {
            report.mapping_used.insert(raw.clone(), token.clone());
            report.clean.insert(token);
        } else {
            report.noise.push(raw.clone());
        }
    }

    report
}

/// Standards family patterns: a standards-body prefix optionally followed by
/// a clause or number, plus a handful of fitting designations.
pub fn standard_family_patterns() -> Result<Vec<Regex>, ProcessError> {
    [
        r"^ASTM(\s+[A-Z]\d+.*)?$",
        r"^ASME(\s+[A-Z]\d+.*)?$",
        r"^API(\s*\d+[A-Z]?)?$",
        r"^ISO(\s*\d+.*)?$",
        r"^DIN(\s*\d+.*)?$",
        r"^EN(\s*\d+.*)?$",
        r"^NPTF?$",
        r"^NPTM$",
        r"^UNC(\s*-?\s*\d+[A-Z]?)?$",
        r"^UNF(\s*-?\s*\d+[A-Z]?)?$",
        r"^UNRC$",
        r"^RTJ$",
        r"^RF\d*$",
        r"^FF\d*$",
        r"^SCH\s*\d+$",
        r"^SCH\d+$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).map_err(ProcessError::from))
    .collect()
}

/// Standard tokens: accepted only via the abbreviation map or one of the
/// fixed family patterns.
pub fn normalize_standards(
    raw_tokens: &[String],
    abbreviations: &BTreeMap<String, String>,
) -> Result<NormalizerReport, ProcessError> {
    let patterns = standard_family_patterns()?;
    let mut report = NormalizerReport::default();

    for raw in raw_tokens {
        let token = clean_token(raw);

        if let Some(mapped) = apply_abbreviation(&token, raw, abbreviations, &mut report) {
            report.clean.insert(mapped);
            continue;
        }

        if patterns.iter().any(|pattern| pattern.is_match(&token)) {
            report.mapping_used.insert(raw.clone(), token.clone());
            report.clean.insert(token);
        } else {
            report.noise.push(raw.clone());
        }
    }

    Ok(report)
}

/// Vendor tokens: a closed curated list, accepted only through the
/// abbreviation map.
pub fn normalize_vendors(
    raw_tokens: &[String],
    abbreviations: &BTreeMap<String, String>,
) -> NormalizerReport {
    let mut report = NormalizerReport::default();

    for raw in raw_tokens {
        let token = clean_token(raw);

        if let Some(mapped) = abbreviations.get(&token) {
            let normalized = mapped.to_uppercase();
            report
                .mapping_used
                .insert(raw.clone(), normalized.clone());
            report.clean.insert(normalized);
        } else {
            report.noise.push(raw.clone());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn clean_token_collapses_separators_and_quotes() {
        assert_eq!(clean_token("gate_valve"), "GATE VALVE");
        assert_eq!(clean_token("  a//b--c  "), "A B C");
        assert_eq!(clean_token("\"SS316\""), "SS316");
    }

    #[test]
    fn component_types_reject_digits_and_short_tokens() {
        let report = normalize_component_types(
            &strings(&["VALVE", "X2", "AB", "GATE VALVE"]),
            &BTreeMap::new(),
            &BTreeSet::new(),
        )
        .unwrap();

        assert!(report.clean.contains("VALVE"));
        assert_eq!(report.noise.len(), 3);
    }

    #[test]
    fn canonical_component_tokens_bypass_validity_filters() {
        let canonical: BTreeSet<String> = ["GATE VALVE".to_string()].into_iter().collect();
        let report =
            normalize_component_types(&strings(&["gate_valve"]), &BTreeMap::new(), &canonical)
                .unwrap();

        assert!(report.clean.contains("GATE VALVE"));
        assert!(report.noise.is_empty());
    }

    #[test]
    fn component_abbreviations_take_precedence() {
        let abbreviations: BTreeMap<String, String> =
            [("ASSY".to_string(), "ASSEMBLY".to_string())].into_iter().collect();
        let report =
            normalize_component_types(&strings(&["ASSY"]), &abbreviations, &BTreeSet::new())
                .unwrap();

        assert!(report.clean.contains("ASSEMBLY"));
        assert_eq!(
            report.mapping_used.get("ASSY"),
            Some(&"ASSEMBLY".to_string())
        );
    }

    #[test]
    fn materials_exclude_cross_dictionary_collisions() {
        let cross = CrossVocabularies {
            vendors: ["ACME".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let report = normalize_materials(&strings(&["ACME", "SS316", "A"]), &BTreeMap::new(), &cross);

        assert!(report.clean.contains("SS316"));
        assert!(!report.clean.contains("ACME"));
        assert_eq!(report.noise, strings(&["ACME", "A"]));
    }

    #[test]
    fn standards_accept_family_patterns_only() {
        let report =
            normalize_standards(&strings(&["ASTM A105", "SCH40", "RANDOM"]), &BTreeMap::new())
                .unwrap();

        assert!(report.clean.contains("ASTM A105"));
        assert!(report.clean.contains("SCH40"));
        assert_eq!(report.noise, strings(&["RANDOM"]));
    }

    #[test]
    fn vendors_are_a_closed_list() {
        let abbreviations: BTreeMap<String, String> =
            [("SWGLK".to_string(), "SWAGELOK".to_string())].into_iter().collect();
        let report = normalize_vendors(&strings(&["SWGLK", "UNKNOWN CO"]), &abbreviations);

        assert!(report.clean.contains("SWAGELOK"));
        assert_eq!(report.noise, strings(&["UNKNOWN CO"]));
    }
}
