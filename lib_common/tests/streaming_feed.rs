//! F1 SignalR monitor against a wiremock negotiate endpoint and an in-process
//! websocket server.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use futures_util::{SinkExt, StreamExt};
use lib_common::ingestors::{F1Config, F1SignalRMonitor, FeedMonitor, MonitorContext};
use lib_common::loggers::LogSink;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn compress(value: &Value) -> String {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(value.to_string().as_bytes()).unwrap();
    STANDARD.encode(encoder.finish().unwrap())
}

fn config_for(server: &MockServer) -> F1Config {
    F1Config {
        base_url: format!("{}/signalr", server.uri()),
        no_session_backoff: Duration::from_secs(30),
        error_backoff: Duration::from_secs(30),
        request_timeout: Duration::from_secs(2),
        ..F1Config::default()
    }
}

#[tokio::test]
async fn missing_token_backs_off_without_connecting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/signalr/negotiate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = {
        let lines = lines.clone();
        LogSink::new(move |msg| lines.lock().unwrap().push(msg.to_string()))
    };

    let mut monitor = F1SignalRMonitor::new(config_for(&server)).unwrap();
    let connection = monitor.connection();
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let ctx = MonitorContext::new(tx, cancel.clone(), sink);
    let task = tokio::spawn(async move { monitor.run(ctx).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while !lines.lock().unwrap().iter().any(|l| l.contains("No active session")) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no 'no active session' line");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/signalr/negotiate");
    assert!(!connection.is_connected());

    cancel.cancel();
    task.await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn subscribes_and_decodes_the_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/signalr/negotiate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ConnectionToken": "tok/en+1"})))
        .mount(&server)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = listener.local_addr().unwrap();
    let (subscribed_tx, subscribed_rx) = oneshot::channel::<String>();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

        let subscribe = match ws.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            other => panic!("expected subscribe, got {other:?}"),
        };
        let _ = subscribed_tx.send(subscribe);

        let snapshot = json!({
            "R": {
                "TrackStatus.z": compress(&json!({"Status": "1", "Message": "AllClear"})),
                "SessionInfo": {"Name": "Race"}
            },
            "I": "1"
        });
        ws.send(Message::Text(snapshot.to_string().into())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = F1Config {
        stream_url: Some(format!("ws://{ws_addr}/signalr")),
        ..config_for(&server)
    };
    let mut monitor = F1SignalRMonitor::new(config).unwrap();
    let connection = monitor.connection();
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let ctx = MonitorContext::new(tx, cancel.clone(), LogSink::discard());
    let task = tokio::spawn(async move { monitor.run(ctx).await });

    let subscribe: Value = serde_json::from_str(&subscribed_rx.await.unwrap()).unwrap();
    assert_eq!(subscribe["M"], "Subscribe");
    assert_eq!(subscribe["A"][0][0], "TrackStatus");

    let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(update.get("TrackStatus.z").is_none());
    assert_eq!(update.get("TrackStatus").unwrap()["Message"], "AllClear");
    assert_eq!(update.flag_code().unwrap().as_str(), "1");
    assert!(connection.is_connected());

    cancel.cancel();
    task.await.unwrap();
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn stalled_handshake_times_out_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/signalr/negotiate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ConnectionToken": "tok"})))
        .mount(&server)
        .await;

    // Accepts TCP connections and never answers the upgrade request.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = {
        let lines = lines.clone();
        LogSink::new(move |msg| lines.lock().unwrap().push(msg.to_string()))
    };

    let config = F1Config {
        stream_url: Some(format!("ws://{ws_addr}/signalr")),
        request_timeout: Duration::from_millis(200),
        error_backoff: Duration::from_millis(100),
        ..config_for(&server)
    };
    let mut monitor = F1SignalRMonitor::new(config).unwrap();
    let connection = monitor.connection();
    let (tx, _rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let ctx = MonitorContext::new(tx, cancel.clone(), sink);
    let task = tokio::spawn(async move { monitor.run(ctx).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while server.received_requests().await.unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("monitor never retried after the stalled handshake");

    let logged = lines.lock().unwrap().clone();
    assert!(
        logged.iter().any(|l| l.contains("[F1 Error] timed out")),
        "missing timeout line in {logged:?}"
    );
    assert!(!connection.is_connected());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("monitor did not stop")
        .unwrap();
}
