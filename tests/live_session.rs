use futures_util::{SinkExt, StreamExt};
use liverun::live::{Dashboard, Renderer, RowMark, Session, Terminal, Update};
use liverun::Config;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

const OPEN: &str = r#"0{"sid":"e1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
const NS: &str = "/testipytests";

/// Keeps the indicator history, nothing else.
#[derive(Default)]
struct Indicators {
    seen: Vec<String>,
}

impl Renderer for Indicators {
    fn render(&mut self, update: &Update, dashboard: &Dashboard) {
        if *update == Update::Indicator {
            self.seen.push(dashboard.indicator.clone());
        }
    }
}

type Ws = WebSocketStream<tokio::net::TcpStream>;

async fn send(ws: &mut Ws, frame: String) {
    ws.send(Message::Text(frame)).await.unwrap();
}

async fn accept_namespace(listener: &TcpListener) -> Ws {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    send(&mut ws, OPEN.to_string()).await;

    match ws.next().await {
        Some(Ok(Message::Text(text))) => assert_eq!(text, format!("40{},", NS)),
        other => panic!("expected namespace connect, got {:?}", other),
    }
    send(&mut ws, format!(r#"40{},{{"sid":"s1"}}"#, NS)).await;
    ws
}

fn config(addr: std::net::SocketAddr) -> Config {
    Config {
        server_url: format!("http://{}/?namespace={}", addr, NS),
        ping_interval_ms: 20,
        max_reconnect_delay_ms: 1000,
        non_interactive: true,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_full_run_then_server_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept_namespace(&listener).await;
        let events = [
            r#"1["rm_params",{"env":"qa","debug":"False"}]"#,
            r#"["rm_selected_tests",{"data":[[41,"PKG","S1","T0"],[42,"PKG","S1","T1"]]}]"#,
            r#"["start_package",{"name":"PKG","ncycle":1}]"#,
            r#"["start_suite",{"name":"S1","ncycle":1}]"#,
            r#"["start_test",{"name":"T1","ncycle":1,"usecase":"UC","comment":"c","method_id":42,"test_id":7}]"#,
            r#"["test_info",{"test_id":7,"data":"<p>step one</p>"}]"#,
            r#"["end_test",{"data":["T1","UC","c","X","2s"],"status":"Passed","status_class":"passed","method_id":42,"test_id":7,"log_output":"log-text","global_duration_value":"12s"}]"#,
            r#"["an_event_from_the_future",{}]"#,
            r#"2["input_prompt_message",{"message":"Env?","default_value":"qa"}]"#,
            r#"["teardown",{"global_duration_value":"Ended after 12s"}]"#,
        ];
        for event in events {
            send(&mut ws, format!("42{},{}", NS, event)).await;
        }

        let mut received = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            if text.contains("\"my_ping\"") {
                let _ = ws
                    .send(Message::Text(format!(r#"42{},["my_pong"]"#, NS)))
                    .await;
                continue;
            }
            if text.contains("\"disconnect_request\"") {
                let _ = ws
                    .send(Message::Text(format!(
                        r#"42{},3["s2c","Server Disconnected!"]"#,
                        NS
                    )))
                    .await;
            }
            received.push(text);
        }
        received
    });

    let (_stdin, lines) = mpsc::unbounded_channel();
    let session = Session::connect(&config(addr), Indicators::default(), Terminal::new(lines, false))
        .unwrap();
    let view = tokio::time::timeout(Duration::from_secs(10), session.run())
        .await
        .expect("session did not finish")
        .unwrap();

    let dashboard = view.dashboard();
    assert_eq!(dashboard.ended_tests.len(), 1);
    assert_eq!(dashboard.ended_tests[0].status_class, "passed");
    assert_eq!(dashboard.counters.get("passed"), 1);
    assert_eq!(dashboard.counters.total(), 1);
    assert_eq!(dashboard.global_duration, "Ended after 12s");
    assert_eq!(dashboard.selected_test(42).unwrap().mark, RowMark::Ended);
    assert_eq!(dashboard.selected_test(41).unwrap().mark, RowMark::Idle);
    assert_eq!(dashboard.logs.get(7), Some("log-text"));
    assert_eq!(
        dashboard.params,
        vec![
            ("env".to_string(), "qa".to_string()),
            ("debug".to_string(), "False".to_string())
        ]
    );
    assert_eq!(dashboard.status_message, "Env? -> qa");
    assert_eq!(dashboard.test_output, "<p>step one</p><hr>");
    assert!(!dashboard.disconnect_enabled);
    assert_eq!(dashboard.indicator, "Server Disconnected!");
    assert!(dashboard.latency.len() <= dashboard.latency.capacity());

    let received = server.await.unwrap();
    let expected = [
        format!("43{},1[]", NS),
        format!(r#"43{},2["qa"]"#, NS),
        format!(r#"42{},["disconnect_request"]"#, NS),
        format!("43{},3[]", NS),
        format!("41{},", NS),
    ];
    for frame in &expected {
        assert!(received.contains(frame), "missing {} in {:?}", frame, received);
    }
    let position = |frame: &str| received.iter().position(|f| f == frame).unwrap();
    assert!(position(&expected[0]) < position(&expected[1]));
    assert!(position(&expected[2]) < position(&expected[3]));
}

#[tokio::test]
async fn test_reconnects_after_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // first attempt: upgrade, then drop before the open packet
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);

        let mut ws = accept_namespace(&listener).await;
        send(&mut ws, format!(r#"42{},["show_status","second try"]"#, NS)).await;
        send(&mut ws, format!("41{},", NS)).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (_stdin, lines) = mpsc::unbounded_channel();
    let session = Session::connect(&config(addr), Indicators::default(), Terminal::new(lines, false))
        .unwrap();
    let view = tokio::time::timeout(Duration::from_secs(10), session.run())
        .await
        .expect("session did not finish")
        .unwrap();

    let seen = &view.renderer().seen;
    let connecting = seen.iter().position(|s| s == "connecting...");
    let connected = seen.iter().position(|s| s == "connected");
    assert!(connecting.is_some(), "indicators: {:?}", seen);
    assert!(connecting < connected, "indicators: {:?}", seen);
    assert_eq!(view.dashboard().status_message, "second try");

    server.await.unwrap();
}

#[tokio::test]
async fn test_reconnects_after_silent_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // first attempt: upgrade, then never send the open packet
        let (stream, _) = listener.accept().await.unwrap();
        let silent = accept_async(stream).await.unwrap();

        let mut ws = accept_namespace(&listener).await;
        drop(silent);
        send(&mut ws, format!(r#"42{},["show_status","after timeout"]"#, NS)).await;
        send(&mut ws, format!("41{},", NS)).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = Config {
        connect_timeout_ms: 200,
        ..config(addr)
    };
    let (_stdin, lines) = mpsc::unbounded_channel();
    let session = Session::connect(&config, Indicators::default(), Terminal::new(lines, false))
        .unwrap();
    let view = tokio::time::timeout(Duration::from_secs(10), session.run())
        .await
        .expect("session did not finish")
        .unwrap();

    let seen = &view.renderer().seen;
    let connecting = seen.iter().position(|s| s == "connecting...");
    let connected = seen.iter().position(|s| s == "connected");
    assert!(connecting.is_some(), "indicators: {:?}", seen);
    assert!(connecting < connected, "indicators: {:?}", seen);
    assert_eq!(view.dashboard().status_message, "after timeout");

    server.await.unwrap();
}
