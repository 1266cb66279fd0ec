//! Messaging bridge to the privileged host context.
//!
//! The page-side automation cannot hold credentials or call external APIs; it
//! asks the host to do that over a request/response channel. Requests are
//! JSON objects tagged with a `type` (`GET_SETTINGS`, `RUN_ACTION`, ...).

use std::{collections::HashMap, sync::Arc, time::Duration};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AutomationError;

/// Host error texts meaning the host context is gone for good.
pub const RUNTIME_DISCONNECTED_MARKERS: &[&str] = &[
    "Extension context invalidated",
    "Receiving end does not exist",
    "message port closed",
    "context invalidated",
];

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Whether a host error message means the host context was torn down.
pub fn is_runtime_disconnected(message: &str) -> bool {
    let message = message.to_lowercase();
    RUNTIME_DISCONNECTED_MARKERS
        .iter()
        .any(|marker| message.contains(&marker.to_lowercase()))
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Host message port closed: {0}")]
    Disconnected(String),

    #[error("Host did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Host rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed host message: {0}")]
    Protocol(String),
}

impl From<HostError> for AutomationError {
    fn from(error: HostError) -> Self {
        match error {
            HostError::Disconnected(_) => AutomationError::RuntimeDisconnected(error.to_string()),
            HostError::Timeout(_) => AutomationError::Timeout(error.to_string()),
            HostError::Rejected(ref message) if is_runtime_disconnected(message) => {
                AutomationError::RuntimeDisconnected(error.to_string())
            }
            HostError::Rejected(_) | HostError::Protocol(_) => {
                AutomationError::Host(error.to_string())
            }
        }
    }
}

/// Messages understood by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostRequest {
    GetSettings,
    SaveSettings {
        settings: Value,
    },
    #[serde(rename_all = "camelCase")]
    RunAction {
        action_id: String,
        context: Value,
        meta: Value,
    },
    #[serde(rename_all = "camelCase")]
    ListItems {
        query: String,
        limit: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
    },
    LogEvent {
        payload: Value,
    },
}

impl HostRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            HostRequest::GetSettings => "GET_SETTINGS",
            HostRequest::SaveSettings { .. } => "SAVE_SETTINGS",
            HostRequest::RunAction { .. } => "RUN_ACTION",
            HostRequest::ListItems { .. } => "LIST_ITEMS",
            HostRequest::LogEvent { .. } => "LOG_EVENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub ok: bool,
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

/// One selectable row for the picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItemsResponse {
    pub ok: bool,
    #[serde(default)]
    pub items: Vec<JobListItem>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Transport to the host.
#[async_trait]
pub trait HostChannel: Send + Sync {
    /// Send a request and wait for its response object.
    async fn request(&self, request: HostRequest) -> Result<Value, HostError>;

    /// Fire-and-forget. Never waits for the host to answer.
    async fn notify(&self, request: HostRequest) -> Result<(), HostError>;
}

fn decode<T: for<'de> Deserialize<'de>>(kind: &str, value: Value) -> Result<T, HostError> {
    serde_json::from_value(value).map_err(|e| HostError::Protocol(format!("{kind}: {e}")))
}

fn rejected(message: Option<String>, fallback: &str) -> HostError {
    HostError::Rejected(message.unwrap_or_else(|| fallback.to_string()))
}

/// Typed helpers over a [`HostChannel`].
#[derive(Clone)]
pub struct HostClient {
    channel: Arc<dyn HostChannel>,
}

impl HostClient {
    pub fn new(channel: Arc<dyn HostChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> Arc<dyn HostChannel> {
        self.channel.clone()
    }

    /// Raw stored settings; merging over defaults is the caller's job.
    pub async fn get_settings(&self) -> Result<Value, HostError> {
        let response: SettingsResponse =
            decode("GET_SETTINGS", self.channel.request(HostRequest::GetSettings).await?)?;
        if !response.ok {
            return Err(rejected(response.message, "settings unavailable"));
        }
        Ok(response.settings.unwrap_or(Value::Null))
    }

    pub async fn save_settings(&self, settings: Value) -> Result<Option<String>, HostError> {
        let response: AckResponse = decode(
            "SAVE_SETTINGS",
            self.channel
                .request(HostRequest::SaveSettings { settings })
                .await?,
        )?;
        if !response.ok {
            return Err(rejected(response.message, "settings not saved"));
        }
        Ok(response.message)
    }

    /// Execute an allowlisted action on the host. A response with `ok: false`
    /// is returned as-is so callers can surface its message.
    pub async fn run_action(
        &self,
        action_id: &str,
        context: Value,
        meta: Value,
    ) -> Result<ActionResponse, HostError> {
        let request = HostRequest::RunAction {
            action_id: action_id.to_string(),
            context,
            meta,
        };
        let response: ActionResponse = decode("RUN_ACTION", self.channel.request(request).await?)?;
        if let Some(message) = response.message.as_deref() {
            if !response.ok && is_runtime_disconnected(message) {
                return Err(HostError::Disconnected(message.to_string()));
            }
        }
        Ok(response)
    }

    pub async fn list_items(
        &self,
        query: &str,
        limit: u32,
        run_id: Option<String>,
    ) -> Result<Vec<JobListItem>, HostError> {
        let request = HostRequest::ListItems {
            query: query.to_string(),
            limit,
            run_id,
        };
        let response: ListItemsResponse =
            decode("LIST_ITEMS", self.channel.request(request).await?)?;
        if !response.ok {
            return Err(rejected(response.message, "list unavailable"));
        }
        Ok(response.items)
    }

    pub async fn log_event(&self, payload: Value) -> Result<(), HostError> {
        self.channel.notify(HostRequest::LogEvent { payload }).await
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(flatten)]
    request: &'a HostRequest,
}

type HostResult = Result<Value, HostError>;
type PendingMap = HashMap<String, oneshot::Sender<HostResult>>;
type Pending = Arc<Mutex<PendingMap>>;

/// [`HostChannel`] over a WebSocket. Responses are matched to requests by the
/// `id` field the channel stamps on every outgoing request.
pub struct WsHostChannel {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    connected: Arc<AtomicBool>,
    timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsHostChannel {
    pub async fn connect(url: &str) -> Result<Self, HostError> {
        Self::connect_with_timeout(url, DEFAULT_REQUEST_TIMEOUT).await
    }

    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, HostError> {
        let (ws_stream, _response) = connect_async(url).await.map_err(|e| {
            HostError::Disconnected(format!(
                "Could not establish connection. Receiving end does not exist: {e}"
            ))
        })?;
        info!(%url, "host bridge connected");

        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        // writer task
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("host ws send error: {}", e);
                    break;
                }
            }
        });

        // reader loop
        let reader_pending = pending.clone();
        let reader_connected = connected.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                if !msg.is_text() {
                    continue;
                }
                let txt = msg.into_text().unwrap_or_default();
                let value: Value = match serde_json::from_str(&txt) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("invalid host JSON: {}", e);
                        continue;
                    }
                };
                let Some(id) = value.get("id").and_then(Value::as_str).map(str::to_string) else {
                    debug!("host message without id ignored");
                    continue;
                };
                match reader_pending.lock().await.remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(Ok(value));
                    }
                    None => debug!(%id, "response for unknown or expired request"),
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            let mut pending = reader_pending.lock().await;
            if !pending.is_empty() {
                warn!(count = pending.len(), "host bridge closed with requests in flight");
            }
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(HostError::Disconnected(
                    "closed before a response was received".to_string(),
                )));
            }
            info!("host bridge disconnected");
        });

        Ok(Self {
            outgoing: tx,
            pending,
            connected,
            timeout,
            reader,
            writer,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, id: Option<&str>, request: &HostRequest) -> Result<(), HostError> {
        let payload = serde_json::to_string(&Envelope { id, request })
            .map_err(|e| HostError::Protocol(format!("serialize {}: {e}", request.kind())))?;
        self.outgoing
            .send(Message::Text(payload))
            .map_err(|_| HostError::Disconnected("writer task has stopped".to_string()))
    }
}

#[async_trait]
impl HostChannel for WsHostChannel {
    async fn request(&self, request: HostRequest) -> Result<Value, HostError> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel::<HostResult>();
        self.pending.lock().await.insert(id.clone(), tx);
        if !self.is_connected() {
            self.pending.lock().await.remove(&id);
            return Err(HostError::Disconnected("bridge is not connected".to_string()));
        }
        if let Err(e) = self.send(Some(&id), &request) {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        debug!(%id, kind = request.kind(), "host request sent");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => Err(HostError::Disconnected(
                "response channel dropped".to_string(),
            )),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&id);
                warn!(%id, kind = request.kind(), "timed out waiting for host response");
                Err(HostError::Timeout(self.timeout))
            }
        }
    }

    async fn notify(&self, request: HostRequest) -> Result<(), HostError> {
        if !self.is_connected() {
            return Err(HostError::Disconnected("bridge is not connected".to_string()));
        }
        self.send(None, &request)
    }
}

impl Drop for WsHostChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
