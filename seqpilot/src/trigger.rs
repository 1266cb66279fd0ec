//! Page-load trigger: run instructions encoded in URL query parameters, and
//! the per-run idempotency marker.

use crate::errors::AutomationError;
use crate::Page;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

pub const IDEMPOTENCY_KEY_PREFIX: &str = "seqpilot:run:";

const ACTION: &str = "action";
const RUN: &str = "run";
const CANDIDATE: &str = "candidate";
const SEQUENCE: &str = "sequence";
const SEQUENCE_NAME: &str = "sequence_name";
const PARAM_NAMES: [&str; 5] = [ACTION, RUN, CANDIDATE, SEQUENCE, SEQUENCE_NAME];

/// Instructions for one run, read once at page load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowParams {
    pub action: String,
    /// Idempotency key of the run
    pub run_id: String,
    pub candidate_id: Option<String>,
    pub sequence_id: Option<String>,
    pub sequence_name: Option<String>,
}

impl WorkflowParams {
    pub fn new(action: &str, run_id: &str) -> Self {
        Self {
            action: action.to_string(),
            run_id: run_id.to_string(),
            candidate_id: None,
            sequence_id: None,
            sequence_name: None,
        }
    }

    pub fn candidate(mut self, id: &str) -> Self {
        self.candidate_id = Some(id.to_string());
        self
    }

    pub fn sequence(mut self, id: Option<&str>, name: Option<&str>) -> Self {
        self.sequence_id = id.map(str::to_string);
        self.sequence_name = name.map(str::to_string);
        self
    }
}

fn is_trigger_param(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .map(|name| PARAM_NAMES.contains(&name))
        .unwrap_or(false)
}

/// Whether `url` carries any trigger parameter at all.
pub fn has_trigger_params(url: &str, prefix: &str) -> bool {
    Url::parse(url)
        .map(|u| u.query_pairs().any(|(k, _)| is_trigger_param(&k, prefix)))
        .unwrap_or(false)
}

/// Read the run instructions from `url`. A missing action means no run; a
/// missing run id gets a fresh one so the run is still consumed exactly once.
pub fn parse_trigger(url: &str, prefix: &str) -> Option<WorkflowParams> {
    let parsed = Url::parse(url).ok()?;
    let get = |name: &str| {
        let key = format!("{prefix}{name}");
        parsed
            .query_pairs()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let action = get(ACTION)?;
    let run_id = get(RUN).unwrap_or_else(|| {
        let generated = Uuid::new_v4().to_string();
        debug!(%generated, "trigger has no run id, generated one");
        generated
    });
    Some(WorkflowParams {
        action,
        run_id,
        candidate_id: get(CANDIDATE),
        sequence_id: get(SEQUENCE),
        sequence_name: get(SEQUENCE_NAME),
    })
}

/// `url` without any trigger parameter; everything else is preserved.
pub fn strip_trigger(url: &str, prefix: &str) -> Result<String, AutomationError> {
    let mut parsed = Url::parse(url)
        .map_err(|e| AutomationError::InvalidArgument(format!("bad url {url:?}: {e}")))?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_trigger_param(k, prefix))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    Ok(parsed.to_string())
}

/// `base` with `params` encoded as trigger parameters.
pub fn build_trigger_url(
    base: &str,
    prefix: &str,
    params: &WorkflowParams,
) -> Result<String, AutomationError> {
    let mut url = Url::parse(base)
        .map_err(|e| AutomationError::InvalidArgument(format!("bad url {base:?}: {e}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(&format!("{prefix}{ACTION}"), &params.action);
        pairs.append_pair(&format!("{prefix}{RUN}"), &params.run_id);
        let optional = [
            (CANDIDATE, &params.candidate_id),
            (SEQUENCE, &params.sequence_id),
            (SEQUENCE_NAME, &params.sequence_name),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                pairs.append_pair(&format!("{prefix}{name}"), value);
            }
        }
    }
    Ok(url.to_string())
}

/// Parse the page's trigger and erase it from the address bar. Whenever any
/// trigger parameter is present the URL is cleaned, even if the trigger
/// itself turns out to be unusable.
pub fn consume_trigger(page: &Page, prefix: &str) -> Option<WorkflowParams> {
    let url = page.url();
    if !has_trigger_params(&url, prefix) {
        return None;
    }
    let params = parse_trigger(&url, prefix);
    match strip_trigger(&url, prefix) {
        Ok(clean) => {
            if let Err(e) = page.engine().replace_url(&clean) {
                warn!(error = %e, "could not strip trigger parameters");
            }
        }
        Err(e) => warn!(error = %e, "could not strip trigger parameters"),
    }
    params
}

pub fn idempotency_key(run_id: &str) -> String {
    format!("{IDEMPOTENCY_KEY_PREFIX}{run_id}")
}

pub fn already_ran(page: &Page, run_id: &str) -> bool {
    page.engine().session_get(&idempotency_key(run_id)).is_some()
}

/// Record that `run_id` has started on this page.
pub fn mark_ran(page: &Page, run_id: &str) -> Result<(), AutomationError> {
    page.engine()
        .session_set(&idempotency_key(run_id), &chrono::Utc::now().to_rfc3339())
}
