//! End-to-end cycles: supervisor bytes in, acknowledgements out, rendered
//! webhook bodies captured.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use events::{DeliveryError, EventRecord, Notifier, Subscription};
use listener::{Listener, ListenerOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use webhook::{render, PayloadFormat, WebhookNotifier};

const WORKER1_EXITED: &[u8] = b"ver:3.0 server:supervisor serial:21 pool:superhooks poolserial:10 \
eventname:PROCESS_STATE_EXITED len:51\n\
processname:worker1 groupname:g1 from_state:RUNNING";

/// Renders every batch as Discord would receive it.
#[derive(Default)]
struct CapturingNotifier {
    bodies: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn notify(&self, batch: &[EventRecord]) -> Result<(), DeliveryError> {
        let rendered = render(PayloadFormat::Discord, batch).map_err(|e| DeliveryError::Encode {
            message: e.to_string(),
        })?;
        self.bodies
            .lock()
            .unwrap()
            .extend(rendered.iter().map(|body| body.to_string()));
        Ok(())
    }
}

fn options(events: &str) -> ListenerOptions {
    ListenerOptions::new(Subscription::parse(events).unwrap())
}

#[tokio::test]
async fn exited_event_reaches_the_webhook_body() {
    let notifier = Arc::new(CapturingNotifier::default());
    let mut out = Vec::new();

    let stats = Listener::new(WORKER1_EXITED, &mut out, notifier.clone(), options("EXITED,FATAL"))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.events_read, 1);
    assert_eq!(stats.batches_delivered, 1);
    let bodies = notifier.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains("worker1"));
    assert!(bodies[0].contains("RUNNING"));
    assert!(bodies[0].contains("PROCESS_STATE_EXITED"));
    assert_eq!(out, b"READY\nRESULT 2\nOKREADY\n");
}

#[tokio::test]
async fn unsubscribed_event_is_only_acknowledged() {
    let notifier = Arc::new(CapturingNotifier::default());
    let mut out = Vec::new();

    let stats = Listener::new(WORKER1_EXITED, &mut out, notifier.clone(), options("STARTING"))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.filtered, 1);
    assert!(notifier.bodies.lock().unwrap().is_empty());
    assert_eq!(out, b"READY\nRESULT 2\nOKREADY\n");
}

#[tokio::test]
async fn malformed_payload_does_not_stop_the_listener() {
    let broken = b"groupname:g0 from_state:STARTING";
    let mut input = format!(
        "ver:3.0 server:supervisor serial:1 pool:superhooks poolserial:1 eventname:PROCESS_STATE_EXITED len:{}\n",
        broken.len()
    )
    .into_bytes();
    input.extend_from_slice(broken);
    input.extend_from_slice(WORKER1_EXITED);

    let notifier = Arc::new(CapturingNotifier::default());
    let mut out = Vec::new();
    let stats = Listener::new(&input[..], &mut out, notifier.clone(), options("EXITED"))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.batches_delivered, 1);
    let bodies = notifier.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains("worker1"));
    assert!(!bodies[0].contains("STARTING"));
    assert_eq!(out, b"READY\nRESULT 2\nOKREADY\nRESULT 2\nOKREADY\n");
}

#[tokio::test]
async fn webhook_notifier_posts_over_http() {
    let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/hooks/abc", server.local_addr().unwrap());
    let received = tokio::spawn(async move {
        let (mut socket, _) = server.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if request.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });

    let notifier = WebhookNotifier::new(&url, PayloadFormat::Generic, Duration::from_secs(5)).unwrap();
    let mut out = Vec::new();
    let stats = Listener::new(WORKER1_EXITED, &mut out, notifier, options("EXITED"))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.batches_delivered, 1);
    assert_eq!(stats.batches_failed, 0);
    let request = received.await.unwrap();
    assert!(request.starts_with("POST /hooks/abc HTTP/1.1"));
    assert!(request.contains(r#""title":"worker1""#));
    assert_eq!(out, b"READY\nRESULT 2\nOKREADY\n");
}
