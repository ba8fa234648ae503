//! Iteration controller
//!
//! A pass moves through an explicit, bounded state machine:
//!
//! ```text
//! Planning -> Validating -> Executing -> Evaluating -> Done
//!     |            |            |            |
//!     +------------+------------+--> Evaluating -> Replanning -> Planning
//! ```
//!
//! A failed stage skips ahead to `Evaluating`, which either accepts the
//! result, stops, or asks for another round with wider [`Tuning`]. The
//! pipeline never runs more than `max_iterations` rounds.

use crate::answer::{Attempt, PassFailure};
use crate::selection::Tuning;
use sqlpilot_core::IterationConfig;
use sqlpilot_intent::{DetectionResult, Intent};

/// Lowest selection threshold the controller will decay to
const MIN_THRESHOLD: f64 = 0.05;

/// State of a pipeline pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Validating,
    Executing,
    Evaluating,
    Replanning,
    Done,
}

/// Result of running the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Proceed,
    Fail,
    Stop,
}

impl Phase {
    pub fn next(self, step: StepOutcome) -> Phase {
        use Phase::*;
        match (self, step) {
            (_, StepOutcome::Stop) | (Done, _) => Done,
            (Planning, StepOutcome::Proceed) => Validating,
            (Validating, StepOutcome::Proceed) => Executing,
            (Executing, StepOutcome::Proceed) => Evaluating,
            (Planning | Validating | Executing, StepOutcome::Fail) => Evaluating,
            (Evaluating, StepOutcome::Proceed) => Done,
            (Evaluating, StepOutcome::Fail) => Replanning,
            (Replanning, StepOutcome::Proceed) => Planning,
            (Replanning, StepOutcome::Fail) => Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Validating => "validating",
            Phase::Executing => "executing",
            Phase::Evaluating => "evaluating",
            Phase::Replanning => "replanning",
            Phase::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What `Evaluating` decided for a pass
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept,
    Replan(PassFailure),
    Stop(PassFailure),
}

/// Decides between accepting a pass and replanning, and widens tuning
#[derive(Debug, Clone)]
pub struct IterationController {
    config: IterationConfig,
}

impl IterationController {
    pub fn new(config: IterationConfig) -> Self {
        Self { config }
    }

    /// Round cap; at least one pass always runs
    pub fn max_iterations(&self) -> usize {
        self.config.max_iterations.max(1)
    }

    /// Judge a finished pass against the question's intent detection
    pub fn evaluate(&self, attempt: &Attempt, detection: &DetectionResult) -> Decision {
        if let Some(failure) = &attempt.failure {
            return match failure {
                failure if !failure.is_recoverable() => Decision::Stop(failure.clone()),
                // Nothing matched at all: a lower threshold cannot help
                PassFailure::NoRelevantTable if attempt.scored_tables == 0 => {
                    Decision::Stop(failure.clone())
                }
                _ => Decision::Replan(failure.clone()),
            };
        }

        let expects_rows = matches!(attempt.intent, Intent::List | Intent::Aggregate);
        if self.config.replan_on_empty && expects_rows && attempt.row_count == Some(0) {
            return Decision::Replan(PassFailure::EmptyResult);
        }

        if detection.intent == Intent::Unknown || detection.flags.ambiguous {
            return Decision::Replan(PassFailure::ClassificationAmbiguous);
        }

        let confidence = detection.confidence;
        if confidence < self.config.min_confidence {
            return Decision::Replan(PassFailure::LowConfidence {
                confidence,
                minimum: self.config.min_confidence,
            });
        }

        Decision::Accept
    }

    /// Tuning for the next round after `failure`
    pub fn adjust(&self, tuning: &Tuning, failure: &PassFailure) -> Tuning {
        let mut next = tuning.clone();
        next.threshold = (tuning.threshold * self.config.threshold_decay).max(MIN_THRESHOLD);
        next.max_columns = tuning.max_columns + self.config.column_cap_step;
        next.retrieval_top_k = tuning.retrieval_top_k + self.config.top_k_step;

        if matches!(failure, PassFailure::NoJoinPath { .. }) {
            next.max_tables = tuning.max_tables.saturating_sub(1).max(1);
        }
        next
    }
}

impl Default for IterationController {
    fn default() -> Self {
        Self::new(IterationConfig::default())
    }
}
