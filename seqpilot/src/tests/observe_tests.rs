use crate::host::{HostChannel, HostClient, HostError, HostRequest};
use crate::observe::{EventLevel, EventSink, HostEventSink, LogEvent, NullSink, Observer, RecordingSink};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[test]
fn test_event_names_are_dotted() {
    let observer = Observer::new("sequence", "r-1", Arc::new(NullSink));
    assert_eq!(observer.event_name("submit", "clicked"), "sequence.submit.clicked");
    assert_eq!(
        observer.with_domain("job").event_name("picker", "opened"),
        "job.picker.opened"
    );
    assert_eq!(observer.with_domain("job").run_id(), "r-1");
}

#[test]
fn test_recording_sink_keeps_order_and_details() {
    let sink = RecordingSink::new();
    let observer = Observer::new("sequence", "r-1", sink.clone());
    observer.info("trigger", "found", "trigger located", None);
    observer.warn("advance", "retry", "next not found", Some(json!({ "attempt": 1 })));
    observer.warn("advance", "retry", "next not found", Some(json!({ "attempt": 2 })));
    observer.error("run", "failed", "gave up", Some(json!({ "stage": "advance" })));

    assert_eq!(
        sink.names(),
        vec![
            "sequence.trigger.found",
            "sequence.advance.retry",
            "sequence.advance.retry",
            "sequence.run.failed",
        ]
    );
    assert_eq!(sink.count("sequence.advance.retry"), 2);
    assert_eq!(sink.count("sequence.run.success"), 0);

    let failed = sink.find("sequence.run.failed").expect("failure event");
    assert_eq!(failed.level, EventLevel::Error);
    assert_eq!(failed.run_id, "r-1");
    assert_eq!(failed.detail("stage"), Some(&json!("advance")));
    assert!(failed.detail("missing").is_none());
    assert!(sink.find("sequence.trigger.found").is_some_and(|e| e.details.is_none()));
}

#[test]
fn test_log_event_wire_shape() {
    let sink = RecordingSink::new();
    Observer::new("sequence", "r-1", sink.clone()).emit(
        EventLevel::Info,
        "run",
        "success",
        "done",
        None,
        Some("https://app.example.com/sequences/seq-1".to_string()),
    );
    let value = serde_json::to_value(&sink.events()[0]).expect("serializable");
    assert_eq!(value["level"], "info");
    assert_eq!(value["event"], "sequence.run.success");
    assert_eq!(value["runId"], "r-1");
    assert_eq!(value["link"], "https://app.example.com/sequences/seq-1");
    assert!(value.get("details").is_none());
    assert!(value["timestamp"].is_string());
}

/// Host side of a message port: forwards notifications to the test, or
/// fails or hangs on them.
enum Port {
    Forward(mpsc::UnboundedSender<HostRequest>),
    Closed,
    Stuck,
}

#[async_trait]
impl HostChannel for Port {
    async fn request(&self, _request: HostRequest) -> Result<Value, HostError> {
        Err(HostError::Disconnected("request not expected".to_string()))
    }

    async fn notify(&self, request: HostRequest) -> Result<(), HostError> {
        match self {
            Port::Forward(tx) => {
                let _ = tx.send(request);
                Ok(())
            }
            Port::Closed => Err(HostError::Disconnected(
                "Extension context invalidated.".to_string(),
            )),
            Port::Stuck => std::future::pending().await,
        }
    }
}

fn host_observer(port: Port) -> Observer {
    let sink = HostEventSink::new(HostClient::new(Arc::new(port)));
    Observer::new("sequence", "r-1", Arc::new(sink))
}

#[tokio::test]
async fn test_host_sink_sends_log_event() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    host_observer(Port::Forward(tx)).warn(
        "advance",
        "retry",
        "next not found",
        Some(json!({ "attempt": 1 })),
    );

    let request = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("log event delivered")
        .expect("port open");
    let HostRequest::LogEvent { payload } = request else {
        panic!("expected LOG_EVENT, got {request:?}");
    };
    assert_eq!(payload["event"], "sequence.advance.retry");
    assert_eq!(payload["runId"], "r-1");
    assert_eq!(payload["level"], "warn");
    assert_eq!(payload["details"]["attempt"], 1);
    assert!(payload.get("run_id").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_host_sink_loss_never_blocks() {
    for port in [Port::Closed, Port::Stuck] {
        let observer = host_observer(port);
        let started = tokio::time::Instant::now();
        for attempt in 0..5 {
            observer.info("trigger", "found", "trigger located", Some(json!({ "attempt": attempt })));
        }
        tokio::task::yield_now().await;
        observer.error("run", "failed", "gave up", None);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}

#[test]
fn test_host_sink_without_runtime_drops_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = HostEventSink::new(HostClient::new(Arc::new(Port::Forward(tx))));
    sink.deliver(LogEvent {
        level: EventLevel::Info,
        event: "sequence.run.started".to_string(),
        run_id: "r-1".to_string(),
        message: "go".to_string(),
        link: None,
        details: None,
        timestamp: chrono::Utc::now(),
    });
    assert!(rx.try_recv().is_err());
}
