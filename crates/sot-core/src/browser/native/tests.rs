use super::*;
use serde_json::{json, Value};
use sot_storage::Strictness;
use std::sync::Arc;
use tokio::io::{duplex, DuplexStream};

async fn write_json<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value) {
    let payload = serde_json::to_vec(value).unwrap();
    write_frame(writer, &payload).await.unwrap();
}

async fn read_json<R: AsyncRead + Unpin>(reader: &mut R) -> Value {
    let frame = read_frame(reader).await.unwrap().unwrap();
    serde_json::from_slice(&frame).unwrap()
}

struct Harness {
    bridge: Arc<NativeBridge>,
    /// What the host wrote, as the browser sees it
    host_out: DuplexStream,
    /// Where the browser writes to the host
    browser_in: DuplexStream,
    events: mpsc::Receiver<TabEvent>,
    controls: mpsc::Receiver<(u64, ControlRequest)>,
}

fn harness() -> Harness {
    let (bridge_writer, host_out) = duplex(64 * 1024);
    let (browser_in, bridge_reader) = duplex(64 * 1024);
    let bridge = Arc::new(NativeBridge::new(bridge_writer, Duration::from_secs(2)));

    let (event_tx, events) = mpsc::channel(16);
    let (control_tx, controls) = mpsc::channel(16);
    let reader_bridge = bridge.clone();
    tokio::spawn(async move {
        reader_bridge
            .run_reader(bridge_reader, event_tx, control_tx)
            .await
    });

    Harness {
        bridge,
        host_out,
        browser_in,
        events,
        controls,
    }
}

// ==================== Framing ====================

#[tokio::test]
async fn test_frame_uses_native_endian_length() {
    let (mut writer, mut reader) = duplex(1024);
    write_frame(&mut writer, b"{\"a\":1}").await.unwrap();

    let mut len = [0u8; 4];
    reader.read_exact(&mut len).await.unwrap();
    assert_eq!(u32::from_ne_bytes(len), 7);

    let mut body = [0u8; 7];
    reader.read_exact(&mut body).await.unwrap();
    assert_eq!(&body, b"{\"a\":1}");
}

#[tokio::test]
async fn test_read_frame_clean_eof() {
    let (mut writer, mut reader) = duplex(1024);
    write_frame(&mut writer, b"[]").await.unwrap();
    drop(writer);

    assert_eq!(read_frame(&mut reader).await.unwrap(), Some(b"[]".to_vec()));
    assert_eq!(read_frame(&mut reader).await.unwrap(), None);
}

#[tokio::test]
async fn test_truncated_frame_is_an_error() {
    let (mut writer, mut reader) = duplex(1024);
    writer.write_all(&10u32.to_ne_bytes()).await.unwrap();
    writer.write_all(b"abc").await.unwrap();
    drop(writer);

    assert!(matches!(
        read_frame(&mut reader).await,
        Err(BridgeError::Io(_))
    ));
}

#[tokio::test]
async fn test_truncated_length_prefix_is_an_error() {
    let (mut writer, mut reader) = duplex(1024);
    writer.write_all(&[7, 0]).await.unwrap();
    drop(writer);

    assert!(matches!(
        read_frame(&mut reader).await,
        Err(BridgeError::Io(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof
    ));
}

#[tokio::test]
async fn test_oversized_frames_rejected() {
    let (mut writer, mut reader) = duplex(1024);
    let big = vec![b' '; MAX_OUTGOING_FRAME + 1];
    assert!(matches!(
        write_frame(&mut writer, &big).await,
        Err(BridgeError::FrameTooLarge { .. })
    ));

    let huge = u32::try_from(MAX_INCOMING_FRAME + 1).unwrap();
    writer.write_all(&huge.to_ne_bytes()).await.unwrap();
    assert!(matches!(
        read_frame(&mut reader).await,
        Err(BridgeError::FrameTooLarge { .. })
    ));
}

// ==================== Message shapes ====================

#[test]
fn test_parse_tab_updated() {
    let message: BrowserMessage = serde_json::from_value(json!({
        "type": "TAB_UPDATED",
        "tabId": 12,
        "title": "Docs",
        "url": "https://docs.rs",
        "status": "complete"
    }))
    .unwrap();
    assert_eq!(
        message,
        BrowserMessage::TabUpdated {
            tab_id: 12,
            title: "Docs".to_string(),
            url: "https://docs.rs".to_string(),
            status: TabStatus::Complete,
        }
    );

    // Unknown statuses and missing titles are tolerated
    let message: BrowserMessage = serde_json::from_value(json!({
        "type": "TAB_UPDATED",
        "tabId": 3,
        "status": "unloaded"
    }))
    .unwrap();
    assert!(matches!(
        message,
        BrowserMessage::TabUpdated { status: TabStatus::Unknown, ref title, .. } if title.is_empty()
    ));
}

#[test]
fn test_parse_control_request() {
    let message: BrowserMessage = serde_json::from_value(json!({
        "type": "CONTROL",
        "requestId": 5,
        "request": {
            "START_SESSION": { "goal": "learn rust", "strictness": "hard", "threshold": 0.4 }
        }
    }))
    .unwrap();
    assert_eq!(
        message,
        BrowserMessage::Control {
            request_id: 5,
            request: ControlRequest::StartSession {
                goal: "learn rust".to_string(),
                strictness: Some(Strictness::Hard),
                threshold: Some(0.4),
            },
        }
    );

    let message: BrowserMessage = serde_json::from_value(json!({
        "type": "CONTROL",
        "requestId": 6,
        "request": { "CANCEL_CLOSURE": { "tabId": 44 } }
    }))
    .unwrap();
    assert!(matches!(
        message,
        BrowserMessage::Control {
            request: ControlRequest::CancelClosure { tab_id: 44 },
            ..
        }
    ));
}

#[tokio::test]
async fn test_malformed_control_request_gets_failure_reply() {
    let mut h = harness();

    write_json(
        &mut h.browser_in,
        &json!({
            "type": "CONTROL",
            "requestId": 9,
            "request": { "START_SESSION": { "goal": "learn rust", "strictness": "medium" } }
        }),
    )
    .await;
    write_json(
        &mut h.browser_in,
        &json!({ "type": "CONTROL", "requestId": 10, "request": "GET_SESSION" }),
    )
    .await;

    let sent = read_json(&mut h.host_out).await;
    assert_eq!(sent["type"], "CONTROL_REPLY");
    assert_eq!(sent["requestId"], 9);
    assert_eq!(sent["response"]["ACK"]["success"], false);
    assert!(sent["response"]["ACK"]["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid control request"));

    // The bad request is answered, not forwarded
    let (request_id, request) = h.controls.recv().await.unwrap();
    assert_eq!(request_id, 10);
    assert_eq!(request, ControlRequest::GetSession);
}

#[test]
fn test_off_topic_message_shape() {
    let message = HostMessage::OffTopic {
        request_id: 9,
        tab_id: 4,
        payload: WarningPayload {
            goal: "learn rust".to_string(),
            strictness: Strictness::Soft,
            score: 0.125,
            threshold: 0.3,
        },
    };
    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "OFF_TOPIC",
            "requestId": 9,
            "tabId": 4,
            "goal": "learn rust",
            "strictness": "soft",
            "similarity": 0.125,
            "threshold": 0.3
        })
    );
}

// ==================== Request / reply ====================

#[tokio::test]
async fn test_list_tabs_round_trip() {
    let mut h = harness();
    let bridge = h.bridge.clone();
    let request = tokio::spawn(async move { bridge.list_open_tabs().await });

    let sent = read_json(&mut h.host_out).await;
    assert_eq!(sent["type"], "LIST_TABS");
    let request_id = sent["requestId"].clone();

    write_json(
        &mut h.browser_in,
        &json!({
            "type": "REPLY",
            "requestId": request_id,
            "reply": {
                "success": true,
                "tabs": [
                    { "id": 1, "title": "Docs", "url": "https://docs.rs" },
                    { "id": 2, "url": "about:blank" }
                ]
            }
        }),
    )
    .await;

    let tabs = request.await.unwrap().unwrap();
    assert_eq!(
        tabs,
        vec![
            TabSnapshot::new(1, "Docs", "https://docs.rs"),
            TabSnapshot::new(2, "", "about:blank"),
        ]
    );
}

#[tokio::test]
async fn test_remove_tab_reports_already_closed() {
    let mut h = harness();
    let bridge = h.bridge.clone();
    let request = tokio::spawn(async move { bridge.close_tab(8).await });

    let sent = read_json(&mut h.host_out).await;
    assert_eq!(sent["type"], "REMOVE_TAB");
    assert_eq!(sent["tabId"], 8);

    write_json(
        &mut h.browser_in,
        &json!({
            "type": "REPLY",
            "requestId": sent["requestId"],
            "reply": { "success": false, "error": "No tab with id: 8." }
        }),
    )
    .await;

    assert_eq!(request.await.unwrap().unwrap(), CloseOutcome::AlreadyClosed);
}

#[tokio::test]
async fn test_remove_tab_failure_is_an_error() {
    let mut h = harness();
    let bridge = h.bridge.clone();
    let request = tokio::spawn(async move { bridge.close_tab(8).await });

    let sent = read_json(&mut h.host_out).await;
    write_json(
        &mut h.browser_in,
        &json!({
            "type": "REPLY",
            "requestId": sent["requestId"],
            "reply": {
                "success": false,
                "error": "Tabs cannot be edited right now (user may be dragging a tab)."
            }
        }),
    )
    .await;

    let err = request.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("cannot be edited"));
}

#[test]
fn test_missing_tab_errors() {
    assert!(is_missing_tab("No tab with id: 8."));
    assert!(is_missing_tab("Tab not found"));
    assert!(!is_missing_tab("Tabs cannot be edited right now"));
    assert!(!is_missing_tab(""));
}

#[tokio::test]
async fn test_tab_exists_reads_reply() {
    let mut h = harness();
    let bridge = h.bridge.clone();
    let request = tokio::spawn(async move { bridge.tab_exists(3).await });

    let sent = read_json(&mut h.host_out).await;
    assert_eq!(sent["type"], "GET_TAB");
    write_json(
        &mut h.browser_in,
        &json!({
            "type": "REPLY",
            "requestId": sent["requestId"],
            "reply": { "success": true, "tab": { "id": 3, "title": "T", "url": "https://t.example" } }
        }),
    )
    .await;

    assert!(request.await.unwrap().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_warning_is_unreachable() {
    let h = harness();
    let payload = WarningPayload {
        goal: "learn rust".to_string(),
        strictness: Strictness::Hard,
        score: 0.0,
        threshold: 0.3,
    };

    let delivery = h.bridge.send_warning(1, &payload).await.unwrap();
    assert_eq!(delivery, Delivery::Unreachable);
    assert!(h.bridge.pending.lock().await.is_empty());
}

#[tokio::test]
async fn test_pending_request_fails_when_browser_disconnects() {
    let h = harness();
    let bridge = h.bridge.clone();
    let request = tokio::spawn(async move {
        bridge
            .request(|request_id| HostMessage::ListTabs { request_id })
            .await
    });

    // Let the request register before the pipe closes
    while h.bridge.pending.lock().await.is_empty() {
        tokio::task::yield_now().await;
    }
    drop(h.browser_in);

    assert!(matches!(request.await.unwrap(), Err(BridgeError::Closed)));
}

#[tokio::test]
async fn test_events_and_controls_forwarded() {
    let mut h = harness();

    write_json(
        &mut h.browser_in,
        &json!({ "type": "TAB_UPDATED", "tabId": 2, "title": "News", "url": "https://news.example", "status": "loading" }),
    )
    .await;
    write_json(&mut h.browser_in, &json!({ "type": "nonsense" })).await;
    write_json(
        &mut h.browser_in,
        &json!({ "type": "CONTROL", "requestId": 1, "request": "GET_SESSION" }),
    )
    .await;

    let event = h.events.recv().await.unwrap();
    assert_eq!(event.tab, TabSnapshot::new(2, "News", "https://news.example"));
    assert_eq!(event.status, TabStatus::Loading);

    let (request_id, request) = h.controls.recv().await.unwrap();
    assert_eq!(request_id, 1);
    assert_eq!(request, ControlRequest::GetSession);

    assert!(!h.bridge.resolve(999, BrowserReply::default()).await);
}

#[tokio::test]
async fn test_control_reply_is_framed() {
    let mut h = harness();
    h.bridge
        .reply_control(4, ControlResponse::ok())
        .await
        .unwrap();

    let sent = read_json(&mut h.host_out).await;
    assert_eq!(sent["type"], "CONTROL_REPLY");
    assert_eq!(sent["requestId"], 4);
    assert_eq!(sent["response"]["ACK"]["success"], true);
}
