//! Settings, timings and the target application's vocabulary.

use crate::errors::AutomationError;
use crate::host::HostClient;
use crate::selector::TextPredicate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const OPEN_SEQUENCE_ACTION: &str = "openSequenceForCandidate";
pub const ADD_TO_JOB_ACTION: &str = "addCandidateToJob";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub base_url: String,
    pub token: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultIds {
    pub sequence_id: Option<String>,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerSettings {
    /// Prefix of the URL parameters that carry a run, e.g. `sp_`
    pub param_prefix: String,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            param_prefix: "sp_".to_string(),
        }
    }
}

/// User settings as stored by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub backend: BackendSettings,
    /// Action id -> keyboard shortcut
    pub shortcuts: BTreeMap<String, String>,
    /// Named URL templates with `{placeholder}` slots
    pub url_templates: BTreeMap<String, String>,
    pub defaults: DefaultIds,
    pub trigger: TriggerSettings,
    pub flow: FlowVocabulary,
}

impl Default for Settings {
    fn default() -> Self {
        let shortcuts = [
            (OPEN_SEQUENCE_ACTION, "Alt+Shift+S"),
            (ADD_TO_JOB_ACTION, "Alt+Shift+J"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let url_templates = [(
            "candidate",
            "https://app.example.com/candidates/{candidateId}",
        )]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            enabled: true,
            backend: BackendSettings::default(),
            shortcuts,
            url_templates,
            defaults: DefaultIds::default(),
            trigger: TriggerSettings::default(),
            flow: FlowVocabulary::default(),
        }
    }
}

/// Recursively overlay `patch` onto `base`. Objects merge key by key; any
/// other non-null value replaces; nulls are ignored.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None if !patch_value.is_null() => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                    None => {}
                }
            }
        }
        (_, Value::Null) => {}
        (base, patch) => *base = patch.clone(),
    }
}

impl Settings {
    /// Merge a stored, possibly partial, settings object over the defaults.
    pub fn merged_over_defaults(stored: &Value) -> Result<Self, AutomationError> {
        let mut merged = serde_json::to_value(Settings::default())
            .map_err(|e| AutomationError::Internal(format!("default settings: {e}")))?;
        deep_merge(&mut merged, stored);
        serde_json::from_value(merged)
            .map_err(|e| AutomationError::InvalidArgument(format!("invalid settings: {e}")))
    }

    pub fn url_template(&self, name: &str) -> Option<&str> {
        self.url_templates.get(name).map(String::as_str)
    }
}

/// Fill `{name}` placeholders; unknown placeholders are left in place.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

/// Fetches and caches [`Settings`] from the host.
pub struct SettingsClient {
    host: HostClient,
    current: RwLock<Settings>,
}

impl SettingsClient {
    pub fn new(host: HostClient) -> Self {
        Self {
            host,
            current: RwLock::new(Settings::default()),
        }
    }

    /// Last loaded settings (defaults before the first load).
    pub fn current(&self) -> Settings {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch from the host and replace the cached copy.
    #[instrument(level = "debug", skip(self))]
    pub async fn reload(&self) -> Result<Settings, AutomationError> {
        let stored = self.host.get_settings().await?;
        let settings = Settings::merged_over_defaults(&stored)?;
        debug!(enabled = settings.enabled, "settings loaded");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(settings)
    }

    pub async fn save(&self, settings: &Settings) -> Result<Option<String>, AutomationError> {
        let value = serde_json::to_value(settings)
            .map_err(|e| AutomationError::Internal(format!("serialize settings: {e}")))?;
        let message = self.host.save_settings(value).await?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        info!("settings saved");
        Ok(message)
    }
}

/// Every wait, retry count and backoff the workflow uses.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTimings {
    pub trigger_timeout: Duration,
    /// How long to wait for a menu to render after clicking its trigger
    pub menu_open_timeout: Duration,
    pub scope_timeout: Duration,
    pub scan_timeout: Duration,
    /// Minimum gap between two retypes of the search term
    pub retype_interval: Duration,
    pub submit_timeout: Duration,
    pub next_timeout: Duration,
    pub marker_timeout: Duration,
    pub poll_interval: Duration,
    pub stage_attempts: u32,
    pub stage_backoff: Duration,
    pub max_trigger_candidates: usize,
}

impl Default for WorkflowTimings {
    fn default() -> Self {
        Self {
            trigger_timeout: Duration::from_secs(20),
            menu_open_timeout: Duration::from_millis(1500),
            scope_timeout: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(15),
            retype_interval: Duration::from_millis(600),
            submit_timeout: Duration::from_secs(10),
            next_timeout: Duration::from_secs(7),
            marker_timeout: Duration::from_secs(7),
            poll_interval: Duration::from_millis(200),
            stage_attempts: 3,
            stage_backoff: Duration::from_millis(500),
            max_trigger_candidates: 4,
        }
    }
}

impl WorkflowTimings {
    pub fn with_trigger_timeout(mut self, timeout: Duration) -> Self {
        self.trigger_timeout = timeout;
        self
    }

    pub fn with_scope_timeout(mut self, timeout: Duration) -> Self {
        self.scope_timeout = timeout;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn with_stage_timeouts(mut self, next: Duration, marker: Duration) -> Self {
        self.next_timeout = next;
        self.marker_timeout = marker;
        self
    }

    pub fn with_retries(mut self, attempts: u32, backoff: Duration) -> Self {
        self.stage_attempts = attempts.max(1);
        self.stage_backoff = backoff;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Visible copy of the target application. Each predicate field uses the
/// selector text syntax (`exact:`, `prefix:`, `text:`, `||`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowVocabulary {
    /// First segment of every event name
    pub domain: String,
    pub trigger: String,
    pub sub_action: String,
    /// `(attribute, value)` pairs that identify the sub-action structurally
    pub sub_action_attributes: Vec<(String, String)>,
    /// Text that identifies the selection container
    pub scope_text: String,
    pub submit: String,
    pub next: String,
    /// URL fragment of the stage reached after `next`
    pub target_stage_path: String,
    pub stage_marker: String,
    pub mode_toggle: String,
    pub default_mode_marker: String,
    /// Marker text shown once the secondary mode is active, e.g. `editing for <name>`
    pub editing_marker_prefix: String,
}

impl Default for FlowVocabulary {
    fn default() -> Self {
        Self {
            domain: "sequence".to_string(),
            trigger: "exact:more actions || exact:more || exact:actions".to_string(),
            sub_action: "text:add to sequence".to_string(),
            sub_action_attributes: vec![
                ("data-action".to_string(), "add-to-sequence".to_string()),
                ("data-testid".to_string(), "add-to-sequence".to_string()),
            ],
            scope_text: "text:sequence".to_string(),
            submit: "exact:add to sequence || exact:add || exact:continue".to_string(),
            next: "exact:next || exact:next step || prefix:continue to".to_string(),
            target_stage_path: "/review".to_string(),
            stage_marker: "text:review emails".to_string(),
            mode_toggle: "exact:edit || exact:personalize || prefix:personalize".to_string(),
            default_mode_marker: "preview mode".to_string(),
            editing_marker_prefix: "editing for".to_string(),
        }
    }
}

impl FlowVocabulary {
    pub fn trigger(&self) -> TextPredicate {
        TextPredicate::from(self.trigger.as_str())
    }

    pub fn sub_action(&self) -> TextPredicate {
        TextPredicate::from(self.sub_action.as_str())
    }

    pub fn scope_text(&self) -> TextPredicate {
        TextPredicate::from(self.scope_text.as_str())
    }

    pub fn submit(&self) -> TextPredicate {
        TextPredicate::from(self.submit.as_str())
    }

    pub fn next(&self) -> TextPredicate {
        TextPredicate::from(self.next.as_str())
    }

    pub fn stage_marker(&self) -> TextPredicate {
        TextPredicate::from(self.stage_marker.as_str())
    }

    pub fn mode_toggle(&self) -> TextPredicate {
        TextPredicate::from(self.mode_toggle.as_str())
    }

    pub fn default_mode_marker(&self) -> TextPredicate {
        TextPredicate::contains(&self.default_mode_marker)
    }

    pub fn editing_marker(&self) -> TextPredicate {
        TextPredicate::prefix(&self.editing_marker_prefix)
    }
}
