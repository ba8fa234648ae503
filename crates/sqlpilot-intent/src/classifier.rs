//! Rule-based intent classification
//!
//! Each intent owns a list of weighted regular expressions evaluated over
//! the normalized question. Scores are summed per intent; the best score
//! wins and the margin to the runner-up drives the confidence.

use crate::text;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlpilot_core::IntentConfig;

/// Coarse shape of the query a question asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Count,
    List,
    Aggregate,
    Describe,
    Unknown,
}

impl Intent {
    /// Stable uppercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::List => "LIST",
            Self::Aggregate => "AGGREGATE",
            Self::Describe => "DESCRIBE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Rank used to break equal scores (lower wins)
    fn tie_rank(&self) -> u8 {
        match self {
            Self::Count => 0,
            Self::Aggregate => 1,
            Self::List => 2,
            Self::Describe => 3,
            Self::Unknown => 4,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signals for later stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntentFlags {
    /// The question names a year, month, quarter or relative period
    pub has_time_filter: bool,

    /// The question asks for grouping
    pub has_grouping: bool,

    /// AGGREGATE had no usable target column and was answered as LIST
    pub aggregate_downgraded: bool,

    /// No intent scored high enough
    pub ambiguous: bool,
}

/// Outcome of [`IntentClassifier::detect`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub intent: Intent,

    /// In `[0, 1]`; zero when the intent is UNKNOWN
    pub confidence: f64,

    /// Lowercased, diacritic-free question
    pub normalized_question: String,

    /// Matched rules, in evaluation order
    pub reasons: Vec<String>,

    pub flags: IntentFlags,
}

/// A regular expression and the score it contributes when it matches
#[derive(Debug, Clone)]
pub struct WeightedPattern {
    pub regex: Regex,
    pub weight: f64,
}

/// Pattern compilation failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

pub(crate) fn compile(pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|e| PatternError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

const COUNT_RULES: &[(&str, f64)] = &[
    (r"\bcuant(?:as|os)\b", 1.0),
    (r"\bnumero de\b", 0.9),
    (r"\bcantidad de\b", 0.9),
    (r"\btotal(?:es)? de\b", 1.0),
    (r"\bconteo\b", 1.0),
    (r"\bcount\b", 1.0),
    (r"\bhow many\b", 1.0),
    (r"\bnumber of\b", 0.9),
];

const LIST_RULES: &[(&str, f64)] = &[
    (r"\blistar?\b", 0.9),
    (r"\blista\b", 0.8),
    (r"\bmostrar?\b", 0.7),
    (r"\bmuestrame\b", 0.9),
    (r"\bdame\b", 0.6),
    (r"\bver\b", 0.5),
    (r"\bconsulta(r)?\b", 0.6),
    (r"\blist\b", 0.8),
    (r"\bshow\b", 0.7),
    (r"\bselect\b", 0.6),
    (r"\bdistinct\b", 0.6),
];

const AGGREGATE_RULES: &[(&str, f64)] = &[
    (r"\bpromedio\b", 1.0),
    (r"\bmedia\b", 0.9),
    (r"\bavg\b", 1.0),
    (r"\baverage\b", 1.0),
    (r"\bsuma(?:toria)?\b", 1.0),
    (r"\bsum\b", 1.0),
    (r"\btotal(?:es)?\b", 0.6),
    (r"\bmax(?:imo|imum)?\b", 0.9),
    (r"\bmin(?:imo|imum)?\b", 0.9),
    (r"\bmediana\b", 0.9),
    (r"\bpercentil(?:es)?\b", 0.9),
    (r"\bgroup by\b", 0.9),
    (r"\bagrup(?:ar|ados?|adas?)\b", 0.9),
];

const DESCRIBE_RULES: &[(&str, f64)] = &[
    (r"\bcolumnas?\b", 1.0),
    (r"\bcolumns?\b", 1.0),
    (r"\bcampos?\b", 1.0),
    (r"\bestructura\b", 1.0),
    (r"\besquema\b", 1.0),
    (r"\bschema\b", 1.0),
    (r"\bdescribe(r)?\b", 1.0),
    (r"\bmetadata\b", 0.9),
    (r"\bque tablas?\b", 0.9),
    (r"\bcuales tablas\b", 0.9),
    (r"\ben que tablas\b", 0.9),
    (r"\bddl\b", 0.8),
];

const LEADING_COUNT_BONUS: f64 = 1.2;

const TIME_RULES: &[&str] = &[
    r"\b(?:19|20)\d{2}\b",
    r"\bhoy\b|\bayer\b|\bmanana\b|\btoday\b|\byesterday\b",
    r"\beste (?:ano|mes|trimestre)\b|\bel (?:mes|ano|trimestre) pasado\b",
    r"\b(?:this|last) (?:year|month|quarter)\b",
    r"\ben (?:ene|feb|mar|abr|may|jun|jul|ago|sep|oct|nov|dic)\b",
    r"\b(?:enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|setiembre|octubre|noviembre|diciembre)\b",
    r"\btrimestre\b|\bsemestre\b|\bq[1-4]\b",
];

const GROUPING_RULES: &[&str] = &[
    r"\bgroup by\b",
    r"\bagrup(?:ar|ados?|adas?)\b",
    r"\b(?:por|by|per) (?:cada )?[a-z_]{3,}\b",
];

/// Weighted patterns per intent
#[derive(Debug, Clone)]
pub struct IntentPatterns {
    rules: Vec<(Intent, Vec<WeightedPattern>)>,
}

impl IntentPatterns {
    /// Compile `(intent, regex, weight)` triples
    pub fn from_rules<'a, I>(rules: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = (Intent, &'a str, f64)>,
    {
        let mut patterns = Self { rules: Vec::new() };
        for (intent, pattern, weight) in rules {
            patterns.add(intent, pattern, weight)?;
        }
        Ok(patterns)
    }

    /// Spanish and English business-question vocabulary
    pub fn builtin() -> Result<Self, PatternError> {
        let tagged = |intent: Intent, rules: &'static [(&'static str, f64)]| {
            rules.iter().map(move |(p, w)| (intent, *p, *w))
        };

        Self::from_rules(
            tagged(Intent::Count, COUNT_RULES)
                .chain(tagged(Intent::List, LIST_RULES))
                .chain(tagged(Intent::Aggregate, AGGREGATE_RULES))
                .chain(tagged(Intent::Describe, DESCRIBE_RULES)),
        )
    }

    /// Add one rule
    pub fn add(&mut self, intent: Intent, pattern: &str, weight: f64) -> Result<(), PatternError> {
        let regex = compile(pattern)?;
        let entry = match self.rules.iter_mut().position(|(i, _)| *i == intent) {
            Some(idx) => &mut self.rules[idx].1,
            None => {
                self.rules.push((intent, Vec::new()));
                let last = self.rules.len() - 1;
                &mut self.rules[last].1
            }
        };
        entry.push(WeightedPattern { regex, weight });
        Ok(())
    }

    /// Patterns registered for an intent
    pub fn for_intent(&self, intent: Intent) -> &[WeightedPattern] {
        self.rules
            .iter()
            .find(|(i, _)| *i == intent)
            .map(|(_, p)| p.as_slice())
            .unwrap_or(&[])
    }

    /// Whether a token is part of the intent vocabulary itself
    pub fn is_keyword(&self, token: &str) -> bool {
        self.rules
            .iter()
            .flat_map(|(_, patterns)| patterns.iter())
            .any(|p| {
                p.regex
                    .find(token)
                    .map(|m| m.start() == 0 && m.end() == token.len())
                    .unwrap_or(false)
            })
    }
}

/// Deterministic, explainable intent detector
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    patterns: IntentPatterns,
    time_rules: Vec<Regex>,
    grouping_rules: Vec<Regex>,
    min_score: f64,
    tie_penalty: f64,
}

impl IntentClassifier {
    /// Classifier with the builtin vocabulary
    pub fn new(config: &IntentConfig) -> Result<Self, PatternError> {
        Self::with_patterns(IntentPatterns::builtin()?, config)
    }

    /// Classifier with custom patterns
    pub fn with_patterns(patterns: IntentPatterns, config: &IntentConfig) -> Result<Self, PatternError> {
        Ok(Self {
            patterns,
            time_rules: TIME_RULES.iter().map(|p| compile(p)).collect::<Result<_, _>>()?,
            grouping_rules: GROUPING_RULES.iter().map(|p| compile(p)).collect::<Result<_, _>>()?,
            min_score: config.min_score,
            tie_penalty: 0.1,
        })
    }

    pub fn patterns(&self) -> &IntentPatterns {
        &self.patterns
    }

    /// Classify a question
    pub fn detect(&self, question: &str) -> DetectionResult {
        let normalized = text::normalize(question);
        if normalized.is_empty() {
            return DetectionResult {
                intent: Intent::Unknown,
                confidence: 0.0,
                normalized_question: normalized,
                reasons: vec!["empty_input".to_string()],
                flags: IntentFlags {
                    ambiguous: true,
                    ..IntentFlags::default()
                },
            };
        }

        let mut reasons = Vec::new();
        let mut scores: Vec<(Intent, f64)> = [
            Intent::Count,
            Intent::List,
            Intent::Aggregate,
            Intent::Describe,
        ]
        .iter()
        .map(|i| (*i, 0.0))
        .collect();

        if ["cuantas ", "cuantos ", "how many "]
            .iter()
            .any(|prefix| normalized.starts_with(prefix))
        {
            add_score(&mut scores, Intent::Count, LEADING_COUNT_BONUS);
            reasons.push("leading_count_phrase".to_string());
        }

        for (intent, patterns) in &self.patterns.rules {
            for pattern in patterns {
                if pattern.regex.is_match(&normalized) {
                    add_score(&mut scores, *intent, pattern.weight);
                    reasons.push(format!("match:{}:{}", intent, pattern.regex.as_str()));
                }
            }
        }

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.tie_rank().cmp(&b.0.tie_rank()))
        });

        let (winner, best) = scores[0];
        let second = scores.get(1).map(|(_, s)| *s).unwrap_or(0.0);

        let mut flags = IntentFlags {
            has_time_filter: self.time_rules.iter().any(|r| r.is_match(&normalized)),
            has_grouping: self.grouping_rules.iter().any(|r| r.is_match(&normalized)),
            ..IntentFlags::default()
        };

        if best <= self.min_score {
            flags.ambiguous = true;
            reasons.push("below_min_score".to_string());
            return DetectionResult {
                intent: Intent::Unknown,
                confidence: 0.0,
                normalized_question: normalized,
                reasons,
                flags,
            };
        }

        DetectionResult {
            intent: winner,
            confidence: round3(self.confidence(best, second)),
            normalized_question: normalized,
            reasons,
            flags,
        }
    }

    fn confidence(&self, best: f64, second: f64) -> f64 {
        if best <= 0.0 {
            return 0.0;
        }

        let margin = (best - second).max(0.0);
        let base = (best / (best + second + 1e-6)).min(1.0);

        if margin < 0.2 {
            (base - self.tie_penalty).max(0.5)
        } else if margin < 0.5 {
            (base - self.tie_penalty * 0.5).max(0.55)
        } else {
            (base + 0.1).min(0.99)
        }
    }
}

fn add_score(scores: &mut [(Intent, f64)], intent: Intent, weight: f64) {
    if let Some(entry) = scores.iter_mut().find(|(i, _)| *i == intent) {
        entry.1 += weight;
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(&IntentConfig::default()).unwrap()
    }

    #[test]
    fn cuantas_is_count() {
        let result = classifier().detect("¿Cuántas citas hay?");
        assert_eq!(result.intent, Intent::Count);
        assert!(result.confidence >= 0.9);
        assert_eq!(result.normalized_question, "cuantas citas hay?");
    }

    #[test]
    fn how_many_is_count() {
        let result = classifier().detect("How many appointments were cancelled?");
        assert_eq!(result.intent, Intent::Count);
    }

    #[test]
    fn total_de_prefers_count() {
        let result = classifier().detect("total de clientes registrados");
        assert_eq!(result.intent, Intent::Count);
    }

    #[test]
    fn list_and_describe_and_aggregate() {
        let c = classifier();
        assert_eq!(c.detect("muéstrame las citas de hoy").intent, Intent::List);
        assert_eq!(c.detect("qué columnas tiene la tabla cliente").intent, Intent::Describe);
        assert_eq!(c.detect("promedio del monto de los pagos").intent, Intent::Aggregate);
    }

    #[test]
    fn empty_question_is_unknown() {
        let result = classifier().detect("   ");
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reasons, vec!["empty_input".to_string()]);
    }

    #[test]
    fn no_signal_is_unknown() {
        let result = classifier().detect("hola buenas tardes");
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.flags.ambiguous);
    }

    #[test]
    fn singular_cuanto_is_not_a_count() {
        let c = classifier();
        assert_eq!(c.detect("¿Cuánto suma el monto de los pagos?").intent, Intent::Aggregate);
        assert_eq!(c.detect("cuanto es el promedio de edad").intent, Intent::Aggregate);
        assert_eq!(c.detect("¿Cuántos clientes hay?").intent, Intent::Count);
    }

    #[test]
    fn single_signal_depends_on_min_score() {
        // "ver" alone weighs 0.5; above 0.45 so it counts
        assert_eq!(classifier().detect("ver pagos").intent, Intent::List);

        let strict = IntentClassifier::new(&IntentConfig { min_score: 0.6 }).unwrap();
        assert_eq!(strict.detect("ver pagos").intent, Intent::Unknown);
    }

    #[test]
    fn equal_scores_prefer_count_over_list() {
        let patterns = IntentPatterns::from_rules([
            (Intent::List, r"\bfoo\b", 1.0),
            (Intent::Count, r"\bfoo\b", 1.0),
        ])
        .unwrap();
        let c = IntentClassifier::with_patterns(patterns, &IntentConfig::default()).unwrap();

        let result = c.detect("foo");
        assert_eq!(result.intent, Intent::Count);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn flags_detect_time_and_grouping() {
        let result = classifier().detect("cuantas citas en enero 2025 agrupadas por estado");
        assert!(result.flags.has_time_filter);
        assert!(result.flags.has_grouping);

        let plain = classifier().detect("cuantas citas hay");
        assert!(!plain.flags.has_time_filter);
        assert!(!plain.flags.has_grouping);
    }

    #[test]
    fn keywords_are_recognized() {
        let c = classifier();
        assert!(c.patterns().is_keyword("cuantas"));
        assert!(c.patterns().is_keyword("promedio"));
        assert!(!c.patterns().is_keyword("citas"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = IntentPatterns::from_rules([(Intent::List, "(", 1.0)]).unwrap_err();
        assert!(matches!(err, PatternError::InvalidPattern { .. }));
    }
}
