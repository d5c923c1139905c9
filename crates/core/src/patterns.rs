use crate::dictionary::MatchResult;
use crate::error::ProcessError;
use regex::Regex;

const MASTER_PATTERN: &str = r"(?xi)
    (?P<size_triplet>\.?\d+(?:\.\d+)?\s*[xX]\s*\.?\d+(?:\.\d+)?\s*[xX]\s*\.?\d+(?:\.\d+)?)
    |
    (?P<size_pair>\.?\d+(?:\.\d+)?\s*[xX]\s*\.?\d+(?:\.\d+)?)
    |
    (?P<size_range>\.?\d+(?:\.\d+)?\s*[-/]\s*\.?\d+(?:\.\d+)?)
    |
    (?P<size_suffix>\.?\d+(?:\.\d+)?(?:DIA|OD|ID|SQ|T|P|THK|LG))
    |
    (?P<size_single>\.?\d+(?:\.\d+)?)
    |
    (?P<grade>A2-?\d*|A4-?\d*|8\.8|10\.9|12\.9|GRADE\s*\d+)
    |
    (?P<finish>ZINC|GALVANIZED|NICKEL|PAINTED|COATED|PASSIVATED|ANODIZED|PLATED|ZN)
    |
    (?P<thread>
        M\d{1,3}X\d+(?:\.\d+)? |
        M\d{1,3} |
        \#\d+ |
        UNC | UNF | UNRC |
        NPTF? | NPTM |
        10-32 |
        1/4-20
    )
";

const STRICT_STANDARD_PATTERNS: [&str; 14] = [
    r"^ASTM[A-Z0-9\-]*$",
    r"^ASME[A-Z0-9\-]*$",
    r"^API[A-Z0-9\-]*$",
    r"^ISO[A-Z0-9\-]*$",
    r"^DIN[A-Z0-9\-]*$",
    r"^EN[A-Z0-9\-]*$",
    r"^NPTF?$",
    r"^UNC$",
    r"^UNF$",
    r"^UNRC$",
    r"^RTJ$",
    r"^RF\d*$",
    r"^FF\d*$",
    r"^SCH\d+$",
];

pub const SIZE_TRIPLET_CONFIDENCE: f32 = 1.0;
pub const SIZE_PAIR_CONFIDENCE: f32 = 0.95;
pub const SIZE_RANGE_CONFIDENCE: f32 = 0.9;
pub const SIZE_SUFFIX_CONFIDENCE: f32 = 0.85;
pub const SIZE_SINGLE_CONFIDENCE: f32 = 0.8;
pub const GRADE_CONFIDENCE: f32 = 0.9;
pub const FINISH_CONFIDENCE: f32 = 0.8;
pub const THREAD_CONFIDENCE: f32 = 0.85;
pub const STRICT_STANDARD_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Default)]
pub struct PatternMatches {
    pub size: MatchResult,
    pub grade: MatchResult,
    pub finish: MatchResult,
    pub thread: MatchResult,
    pub strict_standard: MatchResult,
}

/// One composite pass recognizing sizes, grades, finishes, and threads, plus
/// a separate per-token strict standards classifier.
pub struct PatternMatcher {
    master: Regex,
    standards: Vec<Regex>,
}

impl PatternMatcher {
    pub fn new() -> Result<Self, ProcessError> {
        let master = Regex::new(MASTER_PATTERN)?;
        let standards = STRICT_STANDARD_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern).map_err(ProcessError::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { master, standards })
    }

    fn normalize(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase()
    }

    pub fn match_all(&self, text: &str) -> PatternMatches {
        let normalized = Self::normalize(text);
        let mut matches = PatternMatches::default();

        for capture in self.master.captures_iter(&normalized) {
            if let Some(value) = capture.name("size_triplet") {
                matches.size.record(value.as_str(), SIZE_TRIPLET_CONFIDENCE);
            } else if let Some(value) = capture.name("size_pair") {
                matches.size.record(value.as_str(), SIZE_PAIR_CONFIDENCE);
            } else if let Some(value) = capture.name("size_range") {
                matches.size.record(value.as_str(), SIZE_RANGE_CONFIDENCE);
            } else if let Some(value) = capture.name("size_suffix") {
                matches.size.record(value.as_str(), SIZE_SUFFIX_CONFIDENCE);
            } else if let Some(value) = capture.name("size_single") {
                matches.size.record(value.as_str(), SIZE_SINGLE_CONFIDENCE);
            } else if let Some(value) = capture.name("grade") {
                matches.grade.record(value.as_str(), GRADE_CONFIDENCE);
            } else if let Some(value) = capture.name("finish") {
                matches.finish.record(value.as_str(), FINISH_CONFIDENCE);
            } else if let Some(value) = capture.name("thread") {
                matches.thread.record(value.as_str(), THREAD_CONFIDENCE);
            }
        }

        for token in normalized.split(' ') {
            if token.is_empty() {
                continue;
            }
            if self.standards.iter().any(|pattern| pattern.is_match(token)) {
                matches
                    .strict_standard
                    .record(token, STRICT_STANDARD_CONFIDENCE);
            }
        }

        matches
    }
}
