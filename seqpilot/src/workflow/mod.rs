//! "Open sequence for candidate": the multi-stage flow driven through the
//! target application's UI.
//!
//! Stages run strictly in order. Discovery stages wait with a timeout; the
//! navigation stages (`advance`, `mode`) are retry-wrapped and report a
//! [`StageResult`]. Any failure ends the run with a single terminal event.

pub(crate) mod select;
mod stages;

use crate::config::{FlowVocabulary, WorkflowTimings};
use crate::diagnostics::capture_diagnostics;
use crate::errors::AutomationError;
use crate::observe::Observer;
use crate::retry::StageResult;
use crate::strategy::StrategyChain;
use crate::trigger::WorkflowParams;
use crate::Page;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Trigger,
    Subflow,
    Scope,
    Select,
    Submit,
    Advance,
    Mode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Trigger => "trigger",
            Stage::Subflow => "subflow",
            Stage::Scope => "scope",
            Stage::Select => "select",
            Stage::Submit => "submit",
            Stage::Advance => "advance",
            Stage::Mode => "mode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowReport {
    pub run_id: String,
    pub sequence_name: Option<String>,
    pub sequence_id: Option<String>,
    /// Label of the item actually chosen in the selection scope
    pub selected: String,
    /// Strategy that reached the sub-flow
    pub subflow_strategy: String,
    /// Retry-wrapped stages by name
    pub stages: BTreeMap<String, StageResult>,
}

pub struct OpenSequenceFlow {
    page: Page,
    observer: Observer,
    timings: WorkflowTimings,
    vocab: FlowVocabulary,
    chain: Arc<StrategyChain>,
}

impl OpenSequenceFlow {
    pub fn new(page: Page, observer: Observer) -> Self {
        Self {
            page,
            observer,
            timings: WorkflowTimings::default(),
            vocab: FlowVocabulary::default(),
            chain: Arc::new(StrategyChain::default()),
        }
    }

    pub fn with_timings(mut self, timings: WorkflowTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_vocabulary(mut self, vocab: FlowVocabulary) -> Self {
        self.vocab = vocab;
        self
    }

    pub fn with_strategies(mut self, chain: Arc<StrategyChain>) -> Self {
        self.chain = chain;
        self
    }

    /// Drive every stage. Emits exactly one of `<domain>.run.success` or
    /// `<domain>.run.failed`.
    #[instrument(level = "debug", skip(self, params), fields(run_id = %params.run_id))]
    pub async fn run(&self, params: &WorkflowParams) -> Result<FlowReport, AutomationError> {
        self.observer.info(
            "run",
            "started",
            "starting open-sequence flow",
            Some(json!({
                "candidateId": params.candidate_id,
                "sequenceId": params.sequence_id,
                "sequenceName": params.sequence_name,
            })),
        );
        match self.execute(params).await {
            Ok(report) => {
                let name = report
                    .sequence_name
                    .clone()
                    .unwrap_or_else(|| report.selected.clone());
                self.observer.info(
                    "run",
                    "success",
                    format!("candidate added to sequence \"{name}\""),
                    Some(json!({
                        "sequenceName": name,
                        "sequenceId": report.sequence_id,
                        "candidateId": params.candidate_id,
                        "selected": report.selected,
                        "subflowStrategy": report.subflow_strategy,
                        "stages": report.stages,
                    })),
                );
                Ok(report)
            }
            Err(e) => {
                let stage = match &e {
                    AutomationError::StageFailed { stage, .. } => Some(stage.clone()),
                    _ => None,
                };
                self.observer.error(
                    "run",
                    "failed",
                    e.to_string(),
                    Some(json!({ "reason": e.reason_code(), "stage": stage })),
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, params: &WorkflowParams) -> Result<FlowReport, AutomationError> {
        if params.sequence_name.is_none() && params.sequence_id.is_none() {
            return Err(AutomationError::InvalidArgument(
                "a sequence name or id is required".to_string(),
            ));
        }

        let subflow_strategy = self.open_subflow().await?;
        let scope = self.find_scope().await?;
        let selected = self.select_item(&scope, params).await?;
        self.submit(&scope).await?;

        let mut stages = BTreeMap::new();
        let advance = self.advance().await?;
        stages.insert(Stage::Advance.to_string(), advance);
        let mode = self.activate_mode().await?;
        stages.insert(Stage::Mode.to_string(), mode);

        Ok(FlowReport {
            run_id: self.observer.run_id().to_string(),
            sequence_name: params.sequence_name.clone(),
            sequence_id: params.sequence_id.clone(),
            selected,
            subflow_strategy,
            stages,
        })
    }

    /// Log `<stage>.failed` with a diagnostic snapshot and wrap `error`.
    pub(crate) fn stage_failed(&self, stage: Stage, error: AutomationError) -> AutomationError {
        if error.is_runtime_disconnected() {
            return error;
        }
        let snapshot = capture_diagnostics(&self.page);
        self.observer.error(
            stage.as_str(),
            "failed",
            error.to_string(),
            Some(json!({
                "reason": error.reason_code(),
                "diagnostics": snapshot.to_value(),
            })),
        );
        match error {
            AutomationError::StageFailed { .. } => error,
            other => AutomationError::StageFailed {
                stage: stage.to_string(),
                code: other.reason_code().to_string(),
                reason: other.to_string(),
            },
        }
    }
}
