//! Structured workflow events.
//!
//! Every stage transition and terminal outcome is reported as one
//! [`LogEvent`] named `<domain>.<stage>.<outcome>`. Delivery is
//! fire-and-forget: a sink that fails or is slow never affects the workflow.

use crate::host::HostClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub level: EventLevel,
    /// Dotted name, e.g. `sequence.submit.clicked`
    pub event: String,
    pub run_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// `details.<key>`, if present.
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }
}

/// Destination for log events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: LogEvent);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn deliver(&self, _event: LogEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event).collect()
    }

    pub fn find(&self, name: &str) -> Option<LogEvent> {
        self.events().into_iter().find(|e| e.event == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.event == name).count()
    }
}

impl EventSink for RecordingSink {
    fn deliver(&self, event: LogEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Forwards events to the host as `LOG_EVENT` notifications on a detached task.
#[derive(Clone)]
pub struct HostEventSink {
    client: HostClient,
}

impl HostEventSink {
    pub fn new(client: HostClient) -> Self {
        Self { client }
    }
}

impl EventSink for HostEventSink {
    fn deliver(&self, event: LogEvent) {
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("log event not serializable: {}", e);
                return;
            }
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(event = %event.event, "no runtime, log event dropped");
            return;
        };
        let client = self.client.clone();
        handle.spawn(async move {
            if let Err(e) = client.log_event(payload).await {
                debug!("log event delivery failed: {}", e);
            }
        });
    }
}

/// Emits events for one run of one domain.
#[derive(Clone)]
pub struct Observer {
    domain: String,
    run_id: String,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("domain", &self.domain)
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl Observer {
    pub fn new(domain: &str, run_id: &str, sink: Arc<dyn EventSink>) -> Self {
        Self {
            domain: domain.to_string(),
            run_id: run_id.to_string(),
            sink,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Same sink and run, different domain.
    pub fn with_domain(&self, domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ..self.clone()
        }
    }

    pub fn event_name(&self, stage: &str, outcome: &str) -> String {
        format!("{}.{}.{}", self.domain, stage, outcome)
    }

    pub fn emit(
        &self,
        level: EventLevel,
        stage: &str,
        outcome: &str,
        message: impl Into<String>,
        details: Option<Value>,
        link: Option<String>,
    ) {
        let event = LogEvent {
            level,
            event: self.event_name(stage, outcome),
            run_id: self.run_id.clone(),
            message: message.into(),
            link,
            details,
            timestamp: Utc::now(),
        };
        match level {
            EventLevel::Info => info!(event = %event.event, run_id = %event.run_id, "{}", event.message),
            EventLevel::Warn => warn!(event = %event.event, run_id = %event.run_id, "{}", event.message),
            EventLevel::Error => error!(event = %event.event, run_id = %event.run_id, "{}", event.message),
        }
        self.sink.deliver(event);
    }

    pub fn info(&self, stage: &str, outcome: &str, message: impl Into<String>, details: Option<Value>) {
        self.emit(EventLevel::Info, stage, outcome, message, details, None);
    }

    pub fn warn(&self, stage: &str, outcome: &str, message: impl Into<String>, details: Option<Value>) {
        self.emit(EventLevel::Warn, stage, outcome, message, details, None);
    }

    pub fn error(&self, stage: &str, outcome: &str, message: impl Into<String>, details: Option<Value>) {
        self.emit(EventLevel::Error, stage, outcome, message, details, None);
    }
}
