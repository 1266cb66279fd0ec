use super::{OpenSequenceFlow, Stage};
use crate::actions::{activate, click, press_key};
use crate::config::FlowVocabulary;
use crate::diagnostics::capture_diagnostics;
use crate::discovery::{
    find_all_controls_by_text, find_by_text_deep, find_listboxes, find_native_selects,
    find_overlay_roots, find_search_inputs, MAX_ANCESTOR_HOPS,
};
use crate::element::Element;
use crate::errors::AutomationError;
use crate::locator::Locator;
use crate::oracle::normalized_label;
use crate::retry::{retry_stage, AttemptFailure, MatchedBy, RetryPolicy, StageResult};
use crate::selector::{DiscoveryQuery, Scope, TextPredicate};
use crate::strategy::{DiscoveryTarget, Resolution, StrategyContext};
use crate::wait::{wait_for, wait_for_found, wait_for_result};
use crate::Page;
use serde_json::json;
use tracing::{debug, instrument};

/// A container holding a selection control and evidence that it belongs to
/// this flow. Overlays are preferred; inline panels are found by climbing
/// from each control.
pub(super) fn find_selection_scope(page: &Page, vocab: &FlowVocabulary) -> Option<Element> {
    let scope_text = vocab.scope_text();
    let submit = vocab.submit();
    let belongs = |container: &Element| {
        scope_text.matches_normalized(&normalized_label(container))
            || !find_all_controls_by_text(&submit, container).is_empty()
    };
    let has_control = |container: &Element| {
        !find_search_inputs(container).is_empty()
            || !find_listboxes(container).is_empty()
            || !find_native_selects(container).is_empty()
    };

    let root = page.root();
    if let Some(overlay) = find_overlay_roots(&root)
        .into_iter()
        .find(|o| has_control(o) && belongs(o))
    {
        return Some(overlay);
    }

    let controls = find_search_inputs(&root)
        .into_iter()
        .chain(find_listboxes(&root))
        .chain(find_native_selects(&root));
    for control in controls {
        if let Some(container) = control
            .ancestors(MAX_ANCESTOR_HOPS)
            .into_iter()
            .take_while(|a| a != &root)
            .find(|a| belongs(a))
        {
            return Some(container);
        }
    }
    None
}

impl OpenSequenceFlow {
    fn locate(&self, query: impl Into<DiscoveryQuery>) -> Locator {
        self.page
            .locator(query)
            .poll_interval(self.timings.poll_interval)
    }

    /// Menu triggers, `aria-haspopup` ones first, capped.
    fn trigger_candidates(&self) -> Vec<Element> {
        let mut found = self
            .locate(self.vocab.trigger())
            .scope(Scope::Document)
            .all_now();
        found.sort_by_key(|el| !el.has_attribute("aria-haspopup"));
        found.truncate(self.timings.max_trigger_candidates);
        found
    }

    fn subflow_target(&self) -> DiscoveryTarget {
        let vocab = self.vocab.clone();
        let mut target = DiscoveryTarget::new(self.vocab.sub_action())
            .with_open_check(move |page| find_selection_scope(page, &vocab).is_some());
        for (name, value) in &self.vocab.sub_action_attributes {
            target = target.with_attribute(name, value);
        }
        target
    }

    /// Stages 1 and 2: find a menu trigger, then reach the sub-action behind
    /// it. Returns the name of the strategy that got there.
    #[instrument(level = "debug", skip(self))]
    pub(super) async fn open_subflow(&self) -> Result<String, AutomationError> {
        let target = self.subflow_target();
        if target.is_open(&self.page) {
            self.observer
                .info(Stage::Subflow.as_str(), "already_open", "selection scope already open", None);
            return Ok("open_check".to_string());
        }

        let triggers = wait_for_found(
            || self.trigger_candidates(),
            self.timings.trigger_timeout,
            self.timings.poll_interval,
        )
        .await;
        let Some(triggers) = triggers else {
            return Err(self.stage_failed(
                Stage::Trigger,
                AutomationError::ElementNotFound(format!(
                    "no menu trigger matching {}",
                    self.vocab.trigger()
                )),
            ));
        };
        self.observer.info(
            Stage::Trigger.as_str(),
            "found",
            format!("{} menu trigger candidate(s)", triggers.len()),
            Some(json!({ "count": triggers.len() })),
        );

        for index in 0..triggers.len() {
            // the page may have re-rendered since the last candidate
            let Some(trigger) = self.trigger_candidates().into_iter().nth(index) else {
                break;
            };
            if let Err(e) = click(&trigger) {
                debug!(error = %e, index, "trigger click failed");
                continue;
            }
            self.observer.info(
                Stage::Subflow.as_str(),
                "trigger_clicked",
                format!("clicked menu trigger {}", index + 1),
                Some(json!({ "candidate": index, "label": normalized_label(&trigger) })),
            );

            let ctx = StrategyContext::new(&self.page, &target)
                .with_trigger(&trigger)
                .with_timing(self.timings.menu_open_timeout, self.timings.poll_interval);
            let chain = &self.chain;
            let ctx_ref = &ctx;
            let mut resolved = wait_for_result(
                move || chain.resolve_passive(ctx_ref),
                self.timings.menu_open_timeout,
                self.timings.poll_interval,
            )
            .await;
            if resolved.is_none() {
                resolved = self.chain.resolve_fallbacks(&ctx).await;
            }

            if let Some(found) = resolved {
                match found.resolution {
                    Resolution::AlreadyOpen => {
                        self.observer.info(
                            Stage::Subflow.as_str(),
                            "already_open",
                            "selection scope opened",
                            Some(json!({ "strategy": found.strategy })),
                        );
                        return Ok(found.strategy.to_string());
                    }
                    Resolution::Node(node) => match activate(&node) {
                        Ok(result) => {
                            self.observer.info(
                                Stage::Subflow.as_str(),
                                "clicked",
                                format!("activated \"{}\"", normalized_label(&node)),
                                Some(json!({
                                    "strategy": found.strategy,
                                    "details": result.details,
                                })),
                            );
                            return Ok(found.strategy.to_string());
                        }
                        Err(e) => debug!(error = %e, "sub-action activation failed"),
                    },
                }
            }

            self.observer.warn(
                Stage::Subflow.as_str(),
                "retry",
                format!("sub-action not reachable from trigger {}", index + 1),
                Some(json!({ "candidate": index })),
            );
            // close whatever the trigger opened before trying the next one
            if let Some(active) = self.page.engine().active_element() {
                if let Err(e) = press_key(&active, "Escape") {
                    debug!(error = %e, "could not dismiss menu");
                }
            }
        }

        Err(self.stage_failed(
            Stage::Subflow,
            AutomationError::ElementNotFound(format!(
                "sub-action {} not found behind {} trigger(s)",
                self.vocab.sub_action(),
                triggers.len()
            )),
        ))
    }

    /// Stage 3
    #[instrument(level = "debug", skip(self))]
    pub(super) async fn find_scope(&self) -> Result<Element, AutomationError> {
        let scope = wait_for(
            || find_selection_scope(&self.page, &self.vocab),
            self.timings.scope_timeout,
            self.timings.poll_interval,
        )
        .await;
        match scope {
            Some(scope) => {
                self.observer.info(
                    Stage::Scope.as_str(),
                    "found",
                    "selection scope found",
                    Some(json!({ "tag": scope.tag(), "role": scope.role() })),
                );
                Ok(scope)
            }
            None => Err(self.stage_failed(
                Stage::Scope,
                AutomationError::ElementNotFound("no selection scope appeared".to_string()),
            )),
        }
    }

    fn submit_locator(&self, scope: &Element) -> Locator {
        let submit = self.locate(self.vocab.submit()).include_disabled();
        if scope.is_connected() {
            submit.within(scope.clone())
        } else {
            submit.scope(Scope::OverlaysFirst)
        }
    }

    /// Stage 5
    #[instrument(level = "debug", skip(self, scope))]
    pub(super) async fn submit(&self, scope: &Element) -> Result<(), AutomationError> {
        let submit = self.submit_locator(scope);
        let Ok(button) = submit.wait_enabled(Some(self.timings.submit_timeout)).await else {
            let error = if submit.all_now().is_empty() {
                AutomationError::ElementNotFound(format!("submit control {}", self.vocab.submit()))
            } else {
                AutomationError::ElementNotEnabled(format!(
                    "submit control {} never became enabled",
                    self.vocab.submit()
                ))
            };
            return Err(self.stage_failed(Stage::Submit, error));
        };

        click(&button).map_err(|e| self.stage_failed(Stage::Submit, e))?;
        self.observer.info(
            Stage::Submit.as_str(),
            "clicked",
            format!("clicked \"{}\"", normalized_label(&button)),
            None,
        );
        Ok(())
    }

    fn stage_marker_present(&self) -> bool {
        find_by_text_deep(&self.vocab.stage_marker(), &self.page.root()).is_some()
    }

    /// Already on the stage `next` leads to, and how we know.
    fn on_target_stage(&self) -> Option<MatchedBy> {
        let path = &self.vocab.target_stage_path;
        if !path.is_empty() && self.page.url().contains(path.as_str()) {
            return Some(MatchedBy::Url);
        }
        self.stage_marker_present().then_some(MatchedBy::DomMarker)
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.timings.stage_attempts, self.timings.stage_backoff)
    }

    fn report_attempt_failure(&self, stage: Stage, failure: &AttemptFailure<'_>) {
        let details = json!({
            "attempt": failure.attempt,
            "maxAttempts": failure.max_attempts,
            "reason": failure.error.reason_code(),
        });
        if failure.is_final {
            let mut details = details;
            details["diagnostics"] = capture_diagnostics(&self.page).to_value();
            self.observer
                .error(stage.as_str(), "failed", failure.error.to_string(), Some(details));
        } else {
            self.observer
                .warn(stage.as_str(), "retry", failure.error.to_string(), Some(details));
        }
    }

    /// Wait for an enabled control. Once the wait runs out, report absent
    /// and disabled distinctly.
    async fn wait_for_control(
        &self,
        stage: Stage,
        predicate: &TextPredicate,
    ) -> Result<Element, AutomationError> {
        let controls = self
            .locate(predicate.clone())
            .include_disabled()
            .set_default_timeout(self.timings.next_timeout);
        if let Ok(el) = controls.wait_enabled(None).await {
            return Ok(el);
        }
        if controls.all_now().is_empty() {
            self.observer.warn(
                stage.as_str(),
                "control_missing",
                format!("no control matching {predicate}"),
                None,
            );
            Err(AutomationError::ElementNotFound(predicate.to_string()))
        } else {
            self.observer.warn(
                stage.as_str(),
                "control_disabled",
                format!("control matching {predicate} stayed disabled"),
                None,
            );
            Err(AutomationError::ElementNotEnabled(predicate.to_string()))
        }
    }

    async fn advance_attempt(&self) -> Result<MatchedBy, AutomationError> {
        let next = self.wait_for_control(Stage::Advance, &self.vocab.next()).await?;
        click(&next)?;
        self.observer.info(
            Stage::Advance.as_str(),
            "clicked",
            format!("clicked \"{}\"", normalized_label(&next)),
            None,
        );
        wait_for(
            || self.on_target_stage(),
            self.timings.marker_timeout,
            self.timings.poll_interval,
        )
        .await
        .ok_or_else(|| {
            AutomationError::NavigationTimeout(format!(
                "stage marker {} not reached",
                self.vocab.stage_marker()
            ))
        })
    }

    /// Stage 6
    #[instrument(level = "debug", skip(self))]
    pub(super) async fn advance(&self) -> Result<StageResult, AutomationError> {
        if let Some(matched_by) = self.on_target_stage() {
            self.observer.info(
                Stage::Advance.as_str(),
                "skipped",
                "already on target stage",
                Some(json!({ "matchedBy": matched_by })),
            );
            return Ok(StageResult::success(matched_by, 0));
        }
        let report = retry_stage(
            self.policy(),
            |_| self.advance_attempt(),
            |failure| self.report_attempt_failure(Stage::Advance, failure),
        )
        .await;
        let result = report.into_result(Stage::Advance.as_str())?;
        self.observer.info(
            Stage::Advance.as_str(),
            "reached",
            "target stage reached",
            Some(json!({ "result": result })),
        );
        Ok(result)
    }

    fn find_mode_toggle(&self) -> Option<Element> {
        self.locate(self.vocab.mode_toggle())
            .include_disabled()
            .first_now()
    }

    fn toggle_pressed(toggle: &Element) -> bool {
        toggle.attribute_is_true("aria-pressed") || toggle.attribute_is_true("aria-selected")
    }

    /// Default-mode marker gone and either the editing marker or a pressed
    /// toggle present.
    fn mode_active(&self) -> bool {
        let root = self.page.root();
        if find_by_text_deep(&self.vocab.default_mode_marker(), &root).is_some() {
            return false;
        }
        find_by_text_deep(&self.vocab.editing_marker(), &root).is_some()
            || self
                .find_mode_toggle()
                .map(|t| Self::toggle_pressed(&t))
                .unwrap_or(false)
    }

    async fn mode_attempt(&self) -> Result<MatchedBy, AutomationError> {
        let toggle = self.wait_for_control(Stage::Mode, &self.vocab.mode_toggle()).await?;
        if !Self::toggle_pressed(&toggle) {
            click(&toggle)?;
            self.observer.info(
                Stage::Mode.as_str(),
                "clicked",
                format!("clicked \"{}\"", normalized_label(&toggle)),
                None,
            );
        }
        wait_for(
            || self.mode_active().then_some(MatchedBy::DomMarker),
            self.timings.marker_timeout,
            self.timings.poll_interval,
        )
        .await
        .ok_or_else(|| {
            AutomationError::NavigationTimeout(format!(
                "{} still showing after toggling",
                self.vocab.default_mode_marker
            ))
        })
    }

    /// Stage 7
    #[instrument(level = "debug", skip(self))]
    pub(super) async fn activate_mode(&self) -> Result<StageResult, AutomationError> {
        if self.mode_active() {
            self.observer
                .info(Stage::Mode.as_str(), "skipped", "secondary mode already active", None);
            return Ok(StageResult::success(MatchedBy::DomMarker, 0));
        }
        let report = retry_stage(
            self.policy(),
            |_| self.mode_attempt(),
            |failure| self.report_attempt_failure(Stage::Mode, failure),
        )
        .await;
        let result = report.into_result(Stage::Mode.as_str())?;
        self.observer.info(
            Stage::Mode.as_str(),
            "activated",
            "secondary mode active",
            Some(json!({ "result": result })),
        );
        Ok(result)
    }
}
