//! Integration test: start the gateway on a free port with instrumented handlers and
//! drive the webhook over HTTP. The server task is aborted when each test ends.

use pagehook::config::Config;
use pagehook::events::{DeliveryReceipt, TextMessage};
use pagehook::gateway::{self, ACK_NOT_OK, ACK_OK, HANDSHAKE_REJECTED};
use pagehook::handlers::{HandlerRegistry, HandlerResult, ReplyContext};
use pagehook::signature::{sign, SIGNATURE_HEADER};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const SECRET: &str = "app-secret";
const VERIFY_TOKEN: &str = "verify-me";

const TWO_EVENTS: &str = r#"{
  "object": "page",
  "entry": [{
    "id": "1001",
    "time": 1543095111999,
    "messaging": [
      {"sender": {"id": "42"}, "recipient": {"id": "1001"}, "timestamp": 1543095111999,
       "message": {"mid": "m.1", "seq": 7, "text": "hello"}},
      {"sender": {"id": "42"}, "recipient": {"id": "1001"}, "timestamp": 1543095112000,
       "delivery": {"mids": ["m.0"], "watermark": 1543095110000, "seq": 8}},
      {"sender": {"id": "42"}, "recipient": {"id": "1001"}, "timestamp": 1543095112001}
    ]
  }]
}"#;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

struct Server {
    base: String,
    handle: JoinHandle<()>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start(verify_signature: bool) -> Server {
    let port = free_port();
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.webhook.path = "/webhook".to_string();
    config.webhook.verify_token = Some(VERIFY_TOKEN.to_string());
    config.webhook.verify_signature = verify_signature;
    config.webhook.app_secret = Some(SECRET.to_string());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = Arc::new(HandlerRegistry::new());
    let recorded = seen.clone();
    registry
        .register_text_handler(move |msg: TextMessage, _reply: ReplyContext| {
            let recorded = recorded.clone();
            async move {
                recorded
                    .lock()
                    .expect("lock")
                    .push(format!("text:{}:{}", msg.meta.sender, msg.body));
                HandlerResult::Ok(())
            }
        })
        .await;
    let recorded = seen.clone();
    registry
        .register_text_handler(move |_msg: TextMessage, _reply: ReplyContext| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().expect("lock").push("text:failing".to_string());
                HandlerResult::Err(anyhow::anyhow!("handler failure"))
            }
        })
        .await;
    let recorded = seen.clone();
    registry
        .register_delivery_handler(move |receipt: DeliveryReceipt, _reply: ReplyContext| {
            let recorded = recorded.clone();
            async move {
                recorded
                    .lock()
                    .expect("lock")
                    .push(format!("delivery:{}", receipt.message_ids.join(",")));
                HandlerResult::Ok(())
            }
        })
        .await;

    let handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config, registry).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(format!("{}/health", base)).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                return Server { base, handle, seen };
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.abort();
    panic!("gateway did not come up within 5s; last error: {:?}", last_err);
}

async fn post(server: &Server, body: &str, signature: Option<String>) -> (u16, String) {
    let client = reqwest::Client::new();
    let mut req = client
        .post(format!("{}/webhook", server.base))
        .header("Content-Type", "application/json")
        .body(body.to_string());
    if let Some(sig) = signature {
        req = req.header(SIGNATURE_HEADER, sig);
    }
    let resp = req.send().await.expect("post");
    let status = resp.status().as_u16();
    (status, resp.text().await.expect("body"))
}

#[tokio::test]
async fn handshake_echoes_challenge_only_for_matching_token() {
    let server = start(false).await;
    let client = reqwest::Client::new();

    let ok = client
        .get(format!(
            "{}/webhook?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1158201444",
            server.base, VERIFY_TOKEN
        ))
        .send()
        .await
        .expect("get");
    assert_eq!(ok.text().await.expect("body"), "1158201444");

    let bad = client
        .get(format!(
            "{}/webhook?hub.verify_token=wrong&hub.challenge=1158201444",
            server.base
        ))
        .send()
        .await
        .expect("get");
    assert_eq!(bad.text().await.expect("body"), HANDSHAKE_REJECTED);

    let duplicated = client
        .get(format!(
            "{}/webhook?hub.verify_token={}&hub.verify_token=other&hub.challenge=1",
            server.base, VERIFY_TOKEN
        ))
        .send()
        .await
        .expect("get");
    assert_eq!(duplicated.status().as_u16(), 200);
    assert_eq!(duplicated.text().await.expect("body"), HANDSHAKE_REJECTED);
}

#[tokio::test]
async fn signed_envelope_is_dispatched_in_order() {
    let server = start(true).await;
    let (status, body) = post(&server, TWO_EVENTS, Some(sign(TWO_EVENTS.as_bytes(), SECRET))).await;
    assert_eq!(status, 200);
    assert_eq!(body, ACK_OK);
    assert_eq!(
        *server.seen.lock().expect("lock"),
        vec![
            "text:42:hello".to_string(),
            "text:failing".to_string(),
            "delivery:m.0".to_string(),
        ]
    );
}

#[tokio::test]
async fn bad_signature_is_not_ok_and_runs_no_handler() {
    let server = start(true).await;
    let (status, body) = post(&server, TWO_EVENTS, Some(sign(TWO_EVENTS.as_bytes(), "wrong"))).await;
    assert_eq!(status, 200);
    assert_eq!(body, ACK_NOT_OK);

    let (_, body) = post(&server, TWO_EVENTS, None).await;
    assert_eq!(body, ACK_NOT_OK);
    assert!(server.seen.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn malformed_payload_is_not_ok() {
    let server = start(false).await;
    let (status, body) = post(&server, r#"{"object":"page","entry":[{"#, None).await;
    assert_eq!(status, 200);
    assert_eq!(body, ACK_NOT_OK);
    assert!(server.seen.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn empty_entry_list_is_ok() {
    let server = start(false).await;
    let (status, body) = post(&server, r#"{"object":"page","entry":[]}"#, None).await;
    assert_eq!(status, 200);
    assert_eq!(body, ACK_OK);
    assert!(server.seen.lock().expect("lock").is_empty());
}
