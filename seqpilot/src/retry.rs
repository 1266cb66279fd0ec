//! Stage retry loop shared by every retry-wrapped workflow stage.

use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Which signal confirmed a stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Url,
    DomMarker,
}

/// Outcome of one retry-wrapped stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub ok: bool,
    pub matched_by: Option<MatchedBy>,
    /// Failed attempts before the final one.
    pub retries: u32,
}

impl StageResult {
    pub fn success(matched_by: MatchedBy, retries: u32) -> Self {
        Self {
            ok: true,
            matched_by: Some(matched_by),
            retries,
        }
    }

    pub fn failure(retries: u32) -> Self {
        Self {
            ok: false,
            matched_by: None,
            retries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Passed to the failure hook after every failed attempt.
#[derive(Debug)]
pub struct AttemptFailure<'a> {
    /// 1-based
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: &'a AutomationError,
    /// No further attempt will be made.
    pub is_final: bool,
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub result: StageResult,
    pub last_error: Option<AutomationError>,
}

impl StageReport {
    /// Turn a failed report into a `StageFailed` error for `stage`.
    pub fn into_result(self, stage: &str) -> Result<StageResult, AutomationError> {
        if self.result.ok {
            return Ok(self.result);
        }
        let (code, reason) = match &self.last_error {
            Some(e) if e.is_runtime_disconnected() => {
                return Err(AutomationError::RuntimeDisconnected(e.to_string()))
            }
            Some(e) => (e.reason_code().to_string(), e.to_string()),
            None => ("not_found".to_string(), "no attempt succeeded".to_string()),
        };
        Err(AutomationError::StageFailed {
            stage: stage.to_string(),
            code,
            reason,
        })
    }
}

/// Run `attempt` up to `policy.max_attempts` times with a fixed backoff in
/// between. `on_failure` sees every failed attempt; the last one is flagged
/// `is_final`. A disconnected host ends the loop immediately.
pub async fn retry_stage<F, Fut, H>(policy: RetryPolicy, mut attempt: F, mut on_failure: H) -> StageReport
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<MatchedBy, AutomationError>>,
    H: FnMut(&AttemptFailure<'_>),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;
    for n in 1..=max_attempts {
        match attempt(n).await {
            Ok(matched_by) => {
                debug!(attempt = n, ?matched_by, "stage attempt succeeded");
                return StageReport {
                    result: StageResult::success(matched_by, n - 1),
                    last_error,
                };
            }
            Err(error) => {
                let disconnected = error.is_runtime_disconnected();
                let is_final = n == max_attempts || disconnected;
                warn!(attempt = n, max_attempts, is_final, %error, "stage attempt failed");
                on_failure(&AttemptFailure {
                    attempt: n,
                    max_attempts,
                    error: &error,
                    is_final,
                });
                last_error = Some(error);
                if is_final {
                    return StageReport {
                        result: StageResult::failure(n - 1),
                        last_error,
                    };
                }
                sleep(policy.backoff).await;
            }
        }
    }
    StageReport {
        result: StageResult::failure(max_attempts - 1),
        last_error,
    }
}
