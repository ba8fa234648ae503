//! sqlpilot Intent
//!
//! Question understanding: text normalization, rule-based intent
//! classification and entity extraction. Everything here is pure and
//! deterministic; the only clock input is the `today` passed to
//! [`EntityExtractor::extract`].

pub mod classifier;
pub mod entities;
pub mod text;

pub use classifier::{
    DetectionResult, Intent, IntentClassifier, IntentFlags, IntentPatterns, PatternError,
    WeightedPattern,
};
pub use entities::{
    AggregateFunc, DateGranularity, DateRange, EntityExtractor, ExtractedEntities, OrderHint,
};
