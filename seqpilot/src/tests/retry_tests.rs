use crate::errors::AutomationError;
use crate::retry::{retry_stage, MatchedBy, RetryPolicy, StageResult};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_exhausted_stage_reports_one_final_failure() {
    let policy = RetryPolicy::new(3, Duration::from_millis(500));
    let mut attempts = Vec::new();
    let mut failures = Vec::new();
    let start = Instant::now();

    let report = retry_stage(
        policy,
        |n| {
            attempts.push(n);
            async move { Err(AutomationError::ElementNotFound(format!("next #{n}"))) }
        },
        |failure| failures.push((failure.attempt, failure.is_final, failure.error.reason_code().to_string())),
    )
    .await;

    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(
        failures,
        vec![
            (1, false, "not_found".to_string()),
            (2, false, "not_found".to_string()),
            (3, true, "not_found".to_string()),
        ]
    );
    assert_eq!(report.result, StageResult::failure(2));
    // backoff only between attempts
    assert!(start.elapsed() >= Duration::from_millis(1000));
    assert!(start.elapsed() < Duration::from_millis(1500));

    match report.into_result("advance") {
        Err(AutomationError::StageFailed { stage, code, reason }) => {
            assert_eq!(stage, "advance");
            assert_eq!(code, "not_found");
            assert!(reason.contains("next #3"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_counts_previous_failures_as_retries() {
    let mut calls = 0;
    let report = retry_stage(
        RetryPolicy::default(),
        |n| {
            calls += 1;
            async move {
                if n < 3 {
                    Err(AutomationError::NavigationTimeout("marker".to_string()))
                } else {
                    Ok(MatchedBy::DomMarker)
                }
            }
        },
        |_| {},
    )
    .await;
    assert_eq!(calls, 3);
    assert_eq!(report.result, StageResult::success(MatchedBy::DomMarker, 2));
    assert!(matches!(
        report.last_error,
        Some(AutomationError::NavigationTimeout(_))
    ));
    assert_eq!(
        report.into_result("advance").map(|r| r.retries),
        Ok(2)
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_aborts_without_retrying() {
    let mut calls = 0;
    let mut finals = 0;
    let report = retry_stage(
        RetryPolicy::new(5, Duration::from_secs(1)),
        |_| {
            calls += 1;
            async { Err(AutomationError::Host("Extension context invalidated.".to_string())) }
        },
        |failure| {
            if failure.is_final {
                finals += 1;
            }
        },
    )
    .await;
    assert_eq!(calls, 1);
    assert_eq!(finals, 1);
    assert!(matches!(
        report.into_result("mode"),
        Err(AutomationError::RuntimeDisconnected(_))
    ));
}

#[test]
fn test_policy_never_below_one_attempt() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
}

#[test]
fn test_stage_result_wire_shape() {
    let value = serde_json::to_value(StageResult::success(MatchedBy::Url, 1)).unwrap();
    assert_eq!(
        value,
        serde_json::json!({ "ok": true, "matchedBy": "url", "retries": 1 })
    );
}
