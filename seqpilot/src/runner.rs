//! Page-load entry point.
//!
//! On every page load the runner reads the trigger from the URL, strips it,
//! makes sure the run has not already happened in this page context and
//! dispatches the requested action. Every outcome ends up as a toast.

use crate::config::{
    FlowVocabulary, SettingsClient, WorkflowTimings, ADD_TO_JOB_ACTION, OPEN_SEQUENCE_ACTION,
};
use crate::errors::AutomationError;
use crate::host::{HostClient, JobListItem};
use crate::notify::{Notifier, Toast, TracingNotifier};
use crate::observe::{EventLevel, EventSink, NullSink, Observer};
use crate::picker::{HostItemSource, ItemSource};
use crate::strategy::StrategyChain;
use crate::trigger::{already_ran, consume_trigger, mark_ran, WorkflowParams};
use crate::workflow::OpenSequenceFlow;
use crate::Page;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const JOB_DOMAIN: &str = "job";
const ACTION_DOMAIN: &str = "action";

/// Shows the picker to the user and reports their choice.
#[async_trait]
pub trait PickerPresenter: Send + Sync {
    /// `Ok(None)` when the user cancelled.
    async fn pick(&self, source: Arc<dyn ItemSource>) -> Result<Option<JobListItem>, AutomationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The URL carried no trigger.
    NoTrigger,
    /// This run id already ran in the page context.
    Skipped { run_id: String },
    Disabled { run_id: String },
    Completed { action: String, run_id: String },
    /// The user backed out of an interactive step.
    Cancelled { run_id: String },
    Failed {
        action: String,
        run_id: String,
        reason: String,
    },
}

pub struct ActionRunner {
    page: Page,
    host: HostClient,
    settings: Arc<SettingsClient>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn EventSink>,
    picker: Option<Arc<dyn PickerPresenter>>,
    timings: WorkflowTimings,
    chain: Arc<StrategyChain>,
    recovery_attempted: AtomicBool,
}

impl ActionRunner {
    pub fn new(page: Page, host: HostClient) -> Self {
        let settings = Arc::new(SettingsClient::new(host.clone()));
        Self {
            page,
            host,
            settings,
            notifier: Arc::new(TracingNotifier),
            sink: Arc::new(NullSink),
            picker: None,
            timings: WorkflowTimings::default(),
            chain: Arc::new(StrategyChain::default()),
            recovery_attempted: AtomicBool::new(false),
        }
    }

    pub fn with_settings(mut self, settings: Arc<SettingsClient>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_picker(mut self, picker: Arc<dyn PickerPresenter>) -> Self {
        self.picker = Some(picker);
        self
    }

    pub fn with_timings(mut self, timings: WorkflowTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_strategies(mut self, chain: Arc<StrategyChain>) -> Self {
        self.chain = chain;
        self
    }

    pub fn settings(&self) -> &Arc<SettingsClient> {
        &self.settings
    }

    /// Handle one page load. Never fails: every error is reported through
    /// the notifier and the event sink and folded into the outcome.
    #[instrument(level = "debug", skip(self), fields(url = %self.page.url()))]
    pub async fn on_page_load(&self) -> RunOutcome {
        let settings = match self.settings.reload().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "settings unavailable, using last known");
                self.settings.current()
            }
        };

        let Some(params) = consume_trigger(&self.page, &settings.trigger.param_prefix) else {
            debug!("no trigger on this page");
            return RunOutcome::NoTrigger;
        };
        let observer = Observer::new(&settings.flow.domain, &params.run_id, self.sink.clone());

        if already_ran(&self.page, &params.run_id) {
            observer.info(
                "run",
                "skipped",
                "run already handled in this page",
                Some(json!({ "action": params.action })),
            );
            return RunOutcome::Skipped {
                run_id: params.run_id,
            };
        }
        if let Err(e) = mark_ran(&self.page, &params.run_id) {
            warn!(error = %e, run_id = %params.run_id, "could not record run marker");
        }

        if !settings.enabled {
            info!(run_id = %params.run_id, "automation disabled, ignoring trigger");
            return RunOutcome::Disabled {
                run_id: params.run_id,
            };
        }

        let result = match params.action.as_str() {
            OPEN_SEQUENCE_ACTION => {
                let mut params = params.clone();
                if params.sequence_id.is_none() && params.sequence_name.is_none() {
                    params.sequence_id = settings.defaults.sequence_id.clone();
                }
                self.open_sequence(&params, observer, settings.flow.clone())
                    .await
            }
            ADD_TO_JOB_ACTION => {
                self.add_to_job(&params, observer.with_domain(JOB_DOMAIN))
                    .await
            }
            _ => {
                self.passthrough(&params, observer.with_domain(ACTION_DOMAIN))
                    .await
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report_failure(&e).await;
                RunOutcome::Failed {
                    action: params.action,
                    run_id: params.run_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn open_sequence(
        &self,
        params: &WorkflowParams,
        observer: Observer,
        vocab: FlowVocabulary,
    ) -> Result<RunOutcome, AutomationError> {
        let flow = OpenSequenceFlow::new(self.page.clone(), observer)
            .with_timings(self.timings.clone())
            .with_vocabulary(vocab)
            .with_strategies(self.chain.clone());
        let report = flow.run(params).await?;
        let name = report.sequence_name.as_deref().unwrap_or(&report.selected);
        self.notifier
            .toast(Toast::success(format!("Candidate added to sequence \"{name}\"")));
        Ok(RunOutcome::Completed {
            action: params.action.clone(),
            run_id: params.run_id.clone(),
        })
    }

    async fn add_to_job(
        &self,
        params: &WorkflowParams,
        observer: Observer,
    ) -> Result<RunOutcome, AutomationError> {
        let Some(presenter) = self.picker.as_ref() else {
            return Err(run_failed(
                &observer,
                &params.action,
                AutomationError::UnsupportedOperation(
                    "no picker available to choose a job".to_string(),
                ),
            ));
        };
        observer.info("picker", "opened", "choose a job", None);
        let source: Arc<dyn ItemSource> = Arc::new(HostItemSource::new(
            self.host.clone(),
            Some(params.run_id.clone()),
        ));
        let picked = presenter
            .pick(source)
            .await
            .map_err(|e| run_failed(&observer, &params.action, e))?;
        let Some(job) = picked else {
            observer.info("picker", "cancelled", "job selection cancelled", None);
            return Ok(RunOutcome::Cancelled {
                run_id: params.run_id.clone(),
            });
        };
        observer.info(
            "picker",
            "selected",
            format!("job \"{}\" chosen", job.name),
            Some(json!({ "jobId": job.id })),
        );

        let context = json!({ "candidateId": params.candidate_id, "jobId": job.id });
        let meta = json!({ "runId": params.run_id, "jobName": job.name });
        self.dispatch(&params.action, context, meta, &observer).await?;
        Ok(RunOutcome::Completed {
            action: params.action.clone(),
            run_id: params.run_id.clone(),
        })
    }

    async fn passthrough(
        &self,
        params: &WorkflowParams,
        observer: Observer,
    ) -> Result<RunOutcome, AutomationError> {
        let context = json!({
            "candidateId": params.candidate_id,
            "sequenceId": params.sequence_id,
            "sequenceName": params.sequence_name,
        });
        let meta = json!({ "runId": params.run_id });
        self.dispatch(&params.action, context, meta, &observer).await?;
        Ok(RunOutcome::Completed {
            action: params.action.clone(),
            run_id: params.run_id.clone(),
        })
    }

    /// `RUN_ACTION` plus the matching toast and `run.success`/`run.failed`.
    /// Callers must not report a failure returned from here again.
    async fn dispatch(
        &self,
        action: &str,
        context: Value,
        meta: Value,
        observer: &Observer,
    ) -> Result<(), AutomationError> {
        let response = match self.host.run_action(action, context, meta).await {
            Ok(response) => response,
            Err(e) => return Err(run_failed(observer, action, e.into())),
        };
        let message = response.message.clone().unwrap_or_else(|| {
            if response.ok {
                format!("{action} done")
            } else {
                format!("{action} failed")
            }
        });
        if response.ok {
            observer.emit(
                EventLevel::Info,
                "run",
                "success",
                message.clone(),
                Some(json!({ "action": action, "hostRunId": response.run_id })),
                response.link.clone(),
            );
            self.notifier
                .toast(Toast::success(message).with_link(response.link));
            Ok(())
        } else {
            observer.error(
                "run",
                "failed",
                message.clone(),
                Some(json!({ "reason": "rejected", "action": action })),
            );
            Err(AutomationError::Host(message))
        }
    }

    async fn report_failure(&self, e: &AutomationError) {
        if !e.is_runtime_disconnected() {
            self.notifier.toast(Toast::error(e.to_string()));
            return;
        }
        // one reload per runner; a second disconnect only gets the toast
        if self.recovery_attempted.swap(true, Ordering::SeqCst) {
            self.notifier.toast(Toast::error(
                "The extension lost its connection. Please reload the page.",
            ));
            return;
        }
        self.notifier.toast(Toast::info(
            "The extension was updated. Reloading the page to reconnect.",
        ));
        if let Err(reload_error) = self.page.engine().reload().await {
            error!(error = %reload_error, "page reload after disconnect failed");
        }
    }
}

/// The terminal `run.failed` event for a failure that ends the run.
fn run_failed(observer: &Observer, action: &str, e: AutomationError) -> AutomationError {
    observer.error(
        "run",
        "failed",
        e.to_string(),
        Some(json!({ "reason": e.reason_code(), "action": action })),
    );
    e
}
