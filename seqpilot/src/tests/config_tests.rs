use crate::config::{
    deep_merge, render_template, FlowVocabulary, Settings, WorkflowTimings, ADD_TO_JOB_ACTION,
    OPEN_SEQUENCE_ACTION,
};
use crate::errors::AutomationError;
use serde_json::json;
use std::time::Duration;

#[test]
fn test_partial_settings_keep_defaults() -> Result<(), AutomationError> {
    let stored = json!({
        "enabled": false,
        "backend": { "token": "abc" },
        "shortcuts": { "openSequenceForCandidate": "Ctrl+K" },
    });
    let settings = Settings::merged_over_defaults(&stored)?;

    assert!(!settings.enabled);
    assert_eq!(settings.backend.token, "abc");
    assert_eq!(settings.backend.base_url, "http://localhost:3000");
    assert_eq!(settings.shortcuts[OPEN_SEQUENCE_ACTION], "Ctrl+K");
    assert_eq!(settings.shortcuts[ADD_TO_JOB_ACTION], "Alt+Shift+J");
    assert_eq!(settings.trigger.param_prefix, "sp_");
    assert_eq!(settings.flow, FlowVocabulary::default());
    Ok(())
}

#[test]
fn test_null_or_empty_store_yields_defaults() -> Result<(), AutomationError> {
    assert_eq!(Settings::merged_over_defaults(&json!(null))?, Settings::default());
    assert_eq!(Settings::merged_over_defaults(&json!({}))?, Settings::default());
    Ok(())
}

#[test]
fn test_wrongly_typed_settings_are_rejected() {
    let err = Settings::merged_over_defaults(&json!({ "enabled": "yes" })).unwrap_err();
    assert!(matches!(err, AutomationError::InvalidArgument(_)));
}

#[test]
fn test_deep_merge_ignores_nulls_and_replaces_scalars() {
    let mut base = json!({ "a": { "b": 1, "c": [1, 2] }, "d": "keep" });
    deep_merge(
        &mut base,
        &json!({ "a": { "b": null, "c": [3] }, "d": null, "e": null, "f": 5 }),
    );
    assert_eq!(base, json!({ "a": { "b": 1, "c": [3] }, "d": "keep", "f": 5 }));
}

#[test]
fn test_render_template_leaves_unknown_placeholders() {
    let rendered = render_template(
        "https://app.example.com/candidates/{candidateId}?tab={tab}",
        &[("candidateId", "42")],
    );
    assert_eq!(rendered, "https://app.example.com/candidates/42?tab={tab}");

    let settings = Settings::default();
    let candidate = settings.url_template("candidate").unwrap_or_default();
    assert_eq!(
        render_template(candidate, &[("candidateId", "7")]),
        "https://app.example.com/candidates/7"
    );
    assert!(settings.url_template("missing").is_none());
}

#[test]
fn test_vocabulary_predicates() {
    let vocab = FlowVocabulary::default();
    assert!(vocab.trigger().matches("  More   Actions "));
    assert!(!vocab.trigger().matches("More actions for Jane"));
    assert!(vocab.sub_action().matches("+ Add to sequence"));
    assert!(vocab.next().matches("Continue to review"));
    assert!(vocab.editing_marker().matches("Editing for Jane Doe"));
    assert!(!vocab.editing_marker().matches("Stop editing for Jane"));
    assert!(vocab.default_mode_marker().matches("You are in Preview Mode"));
}

#[test]
fn test_vocabulary_is_configurable_through_settings() -> Result<(), AutomationError> {
    let settings = Settings::merged_over_defaults(&json!({
        "flow": { "domain": "campaign", "next": "exact:weiter" }
    }))?;
    assert_eq!(settings.flow.domain, "campaign");
    assert!(settings.flow.next().matches("Weiter"));
    assert!(!settings.flow.next().matches("Next"));
    assert_eq!(settings.flow.stage_marker, FlowVocabulary::default().stage_marker);
    Ok(())
}

#[test]
fn test_timings_builders() {
    let timings = WorkflowTimings::default()
        .with_retries(0, Duration::from_millis(50))
        .with_stage_timeouts(Duration::from_secs(1), Duration::from_secs(2));
    assert_eq!(timings.stage_attempts, 1);
    assert_eq!(timings.stage_backoff, Duration::from_millis(50));
    assert_eq!(timings.next_timeout, Duration::from_secs(1));
    assert_eq!(timings.marker_timeout, Duration::from_secs(2));
    assert_eq!(timings.poll_interval, WorkflowTimings::default().poll_interval);
}

#[test]
fn test_log_level_names() {
    use crate::logging::parse_level;
    use tracing::Level;
    assert_eq!(parse_level("DEBUG"), Level::DEBUG);
    assert_eq!(parse_level("warn"), Level::WARN);
    assert_eq!(parse_level("verbose"), Level::INFO);
}
