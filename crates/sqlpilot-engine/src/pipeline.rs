//! Question-to-answer pipeline
//!
//! [`Pipeline::answer`] runs classification and entity extraction once,
//! then drives selection, planning, validation and execution through the
//! [`IterationController`] until a pass is accepted, a fatal failure
//! occurs, or the round cap is reached.

use crate::answer::{Answer, Attempt, Explanation, PassFailure};
use crate::controller::{Decision, IterationController, Phase, StepOutcome};
use crate::formatter::{AnswerFormatter, FormatRequest};
use crate::selection::{ColumnSelector, SelectionResult, TableSelector, Tuning};
use chrono::NaiveDate;
use sqlpilot_catalog::{
    backend_from_config, ExecutionError, Executor, LexicalRetriever, RetrievalAdapter,
    RetrievedCandidate, Row,
};
use sqlpilot_core::{Config, Outcome, SchemaModel, TableDef};
use sqlpilot_intent::{
    DetectionResult, EntityExtractor, ExtractedEntities, Intent, IntentClassifier, PatternError,
};
use sqlpilot_sql::{PlanError, QueryPlan, SqlPlanner, SqlValidator};
use std::collections::HashSet;
use std::sync::Arc;

/// Pipeline construction failures
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid intent pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Backend setup failed: {0}")]
    Execution(#[from] ExecutionError),
}

/// Question understanding shared by every round
struct Understanding {
    detection: DetectionResult,
    entities: ExtractedEntities,
}

/// Selection and planning output of one round
struct Planned {
    attempt: Attempt,
    selection: SelectionResult,
    plan: Option<QueryPlan>,
    downgraded: bool,
    columns: Option<sqlpilot_sql::ColumnSelection>,
}

/// One completed round
struct Pass {
    attempt: Attempt,
    plan: Option<QueryPlan>,
    rows: Vec<Row>,
    downgraded: bool,
}

/// The query-resolution pipeline
///
/// Holds no mutable state; one instance serves concurrent questions.
pub struct Pipeline {
    schema: Arc<SchemaModel>,
    retriever: Arc<dyn RetrievalAdapter>,
    executor: Executor,
    config: Config,
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    table_selector: TableSelector,
    column_selector: ColumnSelector,
    planner: SqlPlanner,
    controller: IterationController,
    formatter: AnswerFormatter,
    today: Option<NaiveDate>,
}

impl Pipeline {
    pub fn new(
        schema: Arc<SchemaModel>,
        retriever: Arc<dyn RetrievalAdapter>,
        executor: Executor,
        config: Config,
    ) -> Result<Self, PipelineError> {
        let classifier = IntentClassifier::new(&config.intent)?;
        let extractor = EntityExtractor::new(classifier.patterns())?;

        Ok(Self {
            table_selector: TableSelector::new(config.selection.clone()),
            column_selector: ColumnSelector::new(config.columns.clone()),
            planner: SqlPlanner::new(config.planner.clone()),
            controller: IterationController::new(config.iteration.clone()),
            formatter: AnswerFormatter::new(config.formatter.clone()),
            schema,
            retriever,
            executor,
            config,
            classifier,
            extractor,
            today: None,
        })
    }

    /// Build the offline pipeline: lexical retrieval and the configured backend
    ///
    /// A `dialect` set in the configuration overrides the schema's own.
    pub fn from_config(config: Config, schema: SchemaModel) -> Result<Self, PipelineError> {
        let schema = match config.dialect {
            Some(dialect) => schema.with_dialect(dialect),
            None => schema,
        };

        let retriever = Arc::new(LexicalRetriever::from_schema(&schema));
        let executor = Executor::new(backend_from_config(&config.backend, schema.dialect())?);

        Self::new(Arc::new(schema), retriever, executor, config)
    }

    /// Pin the date relative periods are resolved against
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn schema(&self) -> &Arc<SchemaModel> {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Answer a question
    pub async fn answer(&self, question: &str) -> Answer {
        self.answer_with_deadline(question, &|| false).await
    }

    /// Answer a question, consulting `expired` before every replanning round
    ///
    /// An expired deadline returns the latest attempt as best effort; a
    /// round already in flight is never interrupted.
    pub async fn answer_with_deadline(
        &self,
        question: &str,
        expired: &(dyn Fn() -> bool + Sync),
    ) -> Answer {
        let understanding = self.understand(question);

        let mut tuning = Tuning::from_config(&self.config);
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut fingerprints: HashSet<String> = HashSet::new();
        let mut previous: Option<Pass> = None;
        let mut iteration = 0;

        let final_pass = loop {
            iteration += 1;
            let mut phase = Phase::Planning;

            let planned = self.plan(question, &understanding, &tuning, iteration).await;

            if let Some(fingerprint) = &planned.attempt.fingerprint {
                if !fingerprints.insert(fingerprint.clone()) {
                    if let Some(prev) = previous.take() {
                        tracing::debug!(iteration, "plan repeats an earlier round; stopping");
                        break prev;
                    }
                }
            }

            let mut pass = self.run(planned, &mut phase).await;

            let decision = self.controller.evaluate(&pass.attempt, &understanding.detection);
            match decision {
                Decision::Accept => {
                    self.transition(phase, StepOutcome::Proceed);
                    attempts.push(pass.attempt.clone());
                    break pass;
                }
                Decision::Stop(failure) => {
                    self.transition(phase, StepOutcome::Stop);
                    pass.attempt.failure = Some(failure);
                    attempts.push(pass.attempt.clone());
                    break pass;
                }
                Decision::Replan(failure) => {
                    pass.attempt.failure = Some(failure.clone());
                    attempts.push(pass.attempt.clone());

                    if iteration >= self.controller.max_iterations() {
                        tracing::debug!(iteration, "iteration cap reached");
                        self.transition(phase, StepOutcome::Stop);
                        break pass;
                    }
                    if expired() {
                        tracing::debug!(iteration, "deadline expired before replanning");
                        self.transition(phase, StepOutcome::Stop);
                        break pass;
                    }

                    let replanning = self.transition(phase, StepOutcome::Fail);
                    tuning = self.controller.adjust(&tuning, &failure);
                    tracing::debug!(
                        iteration,
                        reason = failure.as_str(),
                        threshold = tuning.threshold,
                        max_tables = tuning.max_tables,
                        max_columns = tuning.max_columns,
                        top_k = tuning.retrieval_top_k,
                        "replanning"
                    );
                    self.transition(replanning, StepOutcome::Proceed);
                    previous = Some(pass);
                }
            }
        };

        self.finish(question, understanding, final_pass, attempts)
    }

    /// Classify, select and plan with the initial tuning, without executing
    pub async fn explain(&self, question: &str) -> Explanation {
        let understanding = self.understand(question);
        let tuning = Tuning::from_config(&self.config);
        let planned = self.plan(question, &understanding, &tuning, 1).await;

        let validation = planned
            .plan
            .as_ref()
            .map(|plan| SqlValidator::validate(plan, &self.schema));
        let failure = planned.attempt.failure.clone().or_else(|| {
            validation
                .as_ref()
                .filter(|v| !v.is_valid)
                .map(|v| PassFailure::ValidationFailed {
                    errors: v.errors.clone(),
                })
        });

        let mut detection = understanding.detection;
        detection.flags.aggregate_downgraded = planned.downgraded;

        Explanation {
            question: question.to_string(),
            detection,
            entities: understanding.entities,
            selection: planned.selection,
            intent: planned.attempt.intent,
            columns: planned.columns,
            sql: planned.attempt.sql.clone(),
            plan: planned.plan,
            validation,
            failure,
        }
    }

    fn understand(&self, question: &str) -> Understanding {
        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let detection = self.classifier.detect(question);
        let entities = self.extractor.extract(question, today);

        tracing::debug!(
            intent = detection.intent.as_str(),
            confidence = detection.confidence,
            terms = ?entities.terms,
            "question classified"
        );
        Understanding {
            detection,
            entities,
        }
    }

    async fn retrieve(&self, question: &str, top_k: usize) -> Vec<RetrievedCandidate> {
        match self.retriever.search(question, top_k).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(
                    adapter = self.retriever.name(),
                    error = %e,
                    "retrieval failed; scoring tables lexically only"
                );
                Vec::new()
            }
        }
    }

    /// The planning phase: retrieval, table and column selection, plan
    async fn plan(
        &self,
        question: &str,
        understanding: &Understanding,
        tuning: &Tuning,
        iteration: usize,
    ) -> Planned {
        let detection = &understanding.detection;
        let entities = &understanding.entities;

        let intent = match detection.intent {
            Intent::Unknown => Intent::List,
            other => other,
        };
        let mut attempt = Attempt::new(iteration, tuning.clone(), intent);

        let candidates = self.retrieve(question, tuning.retrieval_top_k).await;
        let selection = self
            .table_selector
            .select(entities, &candidates, &self.schema, tuning);
        attempt.selected_tables = selection.selected_names();
        attempt.scored_tables = selection.scored_count();

        if !selection.has_selection() {
            return Planned {
                attempt: attempt.failed(PassFailure::NoRelevantTable),
                selection,
                plan: None,
                downgraded: false,
                columns: None,
            };
        }

        let tables: Vec<&TableDef> = attempt
            .selected_tables
            .iter()
            .filter_map(|name| self.schema.table(name))
            .collect();
        let choice = self
            .column_selector
            .select(&tables, intent, entities, tuning);
        attempt.intent = choice.intent;

        let plan = match self.planner.generate(
            &attempt.selected_tables,
            &choice.selection,
            choice.intent,
            entities,
            &self.schema,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                return Planned {
                    attempt: attempt.failed(plan_failure(e)),
                    selection,
                    plan: None,
                    downgraded: choice.downgraded,
                    columns: Some(choice.selection),
                };
            }
        };

        attempt.sql = Some(plan.render(self.schema.dialect()));
        attempt.fingerprint = Some(plan.fingerprint());

        Planned {
            attempt,
            selection,
            plan: Some(plan),
            downgraded: choice.downgraded,
            columns: Some(choice.selection),
        }
    }

    /// Validating and executing phases of a planned round
    async fn run(&self, planned: Planned, phase: &mut Phase) -> Pass {
        let Planned {
            mut attempt,
            plan,
            downgraded,
            ..
        } = planned;

        let plan = match plan {
            Some(plan) if attempt.failure.is_none() => plan,
            plan => {
                *phase = self.transition(*phase, StepOutcome::Fail);
                return Pass {
                    attempt,
                    plan,
                    rows: Vec::new(),
                    downgraded,
                };
            }
        };
        *phase = self.transition(*phase, StepOutcome::Proceed);

        let validation = SqlValidator::validate(&plan, &self.schema);
        if !validation.is_valid {
            *phase = self.transition(*phase, StepOutcome::Fail);
            attempt.validation_errors = validation.errors.clone();
            return Pass {
                attempt: attempt.failed(PassFailure::ValidationFailed {
                    errors: validation.errors,
                }),
                plan: Some(plan),
                rows: Vec::new(),
                downgraded,
            };
        }
        *phase = self.transition(*phase, StepOutcome::Proceed);

        let sql = attempt.sql.clone().unwrap_or_default();
        let rows = match self.executor.execute(&sql, self.schema.dialect()).await {
            Ok(rows) => rows,
            Err(e) => {
                *phase = self.transition(*phase, StepOutcome::Fail);
                return Pass {
                    attempt: attempt.failed(PassFailure::ExecutionError { message: e.message }),
                    plan: Some(plan),
                    rows: Vec::new(),
                    downgraded,
                };
            }
        };
        *phase = self.transition(*phase, StepOutcome::Proceed);
        attempt.row_count = Some(rows.len());

        Pass {
            attempt,
            plan: Some(plan),
            rows,
            downgraded,
        }
    }

    fn transition(&self, from: Phase, step: StepOutcome) -> Phase {
        let to = from.next(step);
        if to != from {
            tracing::debug!(from = %from, to = %to, "phase transition");
        }
        to
    }

    fn finish(
        &self,
        question: &str,
        understanding: Understanding,
        pass: Pass,
        attempts: Vec<Attempt>,
    ) -> Answer {
        let outcome = match &pass.attempt.failure {
            None => Outcome::Answered,
            Some(PassFailure::NoRelevantTable) => Outcome::NoRelevantTable,
            Some(PassFailure::ExecutionError { .. }) => Outcome::ExecutionFailed,
            Some(_) => Outcome::BestEffort,
        };

        let mut detection = understanding.detection;
        detection.flags.aggregate_downgraded = pass.downgraded;

        let table = pass
            .plan
            .as_ref()
            .and_then(|p| p.tables().next())
            .and_then(|name| self.schema.table(name));
        let payload = self.formatter.format(FormatRequest {
            intent: pass.attempt.intent,
            detection: &detection,
            outcome,
            plan: pass.plan.as_ref(),
            rows: &pass.rows,
            failure: pass.attempt.failure.as_ref(),
            table,
        });

        tracing::info!(
            intent = pass.attempt.intent.as_str(),
            outcome = outcome.as_str(),
            iterations = attempts.len(),
            rows = pass.rows.len(),
            tables = ?pass.attempt.selected_tables,
            "question answered"
        );

        Answer {
            question: question.to_string(),
            intent: pass.attempt.intent,
            detection,
            selected_tables: pass.attempt.selected_tables.clone(),
            generated_sql: pass.attempt.sql.clone(),
            validation_errors: pass.attempt.validation_errors.clone(),
            rows: pass.rows,
            iterations_used: attempts.len(),
            outcome,
            attempts,
            payload,
        }
    }
}

fn plan_failure(error: PlanError) -> PassFailure {
    match error {
        PlanError::NoTables => PassFailure::NoRelevantTable,
        PlanError::NoJoinPath { left, right } => PassFailure::NoJoinPath { left, right },
        other => PassFailure::PlanFailed {
            message: other.to_string(),
        },
    }
}
