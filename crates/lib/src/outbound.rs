//! Outbound send API: the collaborator handlers use (through a reply context) to answer
//! a conversation.
//!
//! [`Outbound`] is the seam; [`GraphApiClient`] posts to the platform's `me/messages`
//! endpoint. Message construction beyond plain text and quick replies is up to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v11.0";

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("platform error: {0}")]
    Api(ApiError),
    #[error("page access token not configured")]
    MissingCredential,
}

/// Error object returned by the platform (`{"error": {...}}`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, thiserror::Error)]
#[error("{message} (type {kind}, code {code})")]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ApiError>,
}

/// Why a message is being sent; the platform applies different policies per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagingType {
    Response,
    Update,
    MessageTag,
    NonPromotionalSubscription,
}

/// Quick reply button offered with a text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickReply {
    pub content_type: String,
    pub title: String,
    pub payload: String,
}

impl QuickReply {
    pub fn text(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            title: title.into(),
            payload: payload.into(),
        }
    }
}

/// A message to send, minus the recipient (supplied by the reply context).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePayload {
    pub messaging_type: MessagingType,
    pub message: serde_json::Value,
    /// Message tag; only meaningful with [`MessagingType::MessageTag`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl MessagePayload {
    /// Plain text answering an inbound event.
    pub fn text(text: impl Into<String>) -> Self {
        Self::text_with_replies(text, Vec::new())
    }

    pub fn text_with_replies(text: impl Into<String>, replies: Vec<QuickReply>) -> Self {
        let mut message = serde_json::json!({ "text": text.into() });
        if !replies.is_empty() {
            message["quick_replies"] = serde_json::to_value(replies).unwrap_or_default();
        }
        Self {
            messaging_type: MessagingType::Response,
            message,
            tag: None,
        }
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    messaging_type: MessagingType,
    recipient: RecipientRef<'a>,
    message: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
}

#[derive(Serialize)]
struct RecipientRef<'a> {
    id: &'a str,
}

/// Sends messages to a conversation participant.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(
        &self,
        target: &str,
        payload: &MessagePayload,
        credential: &str,
    ) -> Result<(), SendError>;
}

/// HTTP client for the platform send API.
#[derive(Clone)]
pub struct GraphApiClient {
    api_base: String,
    client: reqwest::Client,
}

impl GraphApiClient {
    pub fn new(api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self {
            api_base,
            client: reqwest::Client::new(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl Outbound for GraphApiClient {
    /// POST {api_base}/me/messages?access_token=...
    async fn send(
        &self,
        target: &str,
        payload: &MessagePayload,
        credential: &str,
    ) -> Result<(), SendError> {
        if credential.trim().is_empty() {
            return Err(SendError::MissingCredential);
        }
        let url = format!("{}/me/messages", self.api_base);
        let body = SendRequest {
            messaging_type: payload.messaging_type,
            recipient: RecipientRef { id: target },
            message: &payload.message,
            tag: payload.tag.as_deref(),
        };
        let res = self
            .client
            .post(&url)
            .query(&[("access_token", credential)])
            .json(&body)
            .send()
            .await?;
        if res.status().is_success() {
            return Ok(());
        }
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        Err(SendError::Api(api_error(status.as_u16(), &text)))
    }
}

/// Extract the platform error object, or synthesize one from the HTTP status.
fn api_error(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { error: Some(e) }) => e,
        _ => ApiError {
            message: format!("{} {}", status, body),
            kind: "http".to_string(),
            code: i64::from(status),
            error_subcode: None,
            fbtrace_id: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, routing::post, Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[test]
    fn text_payload_shape() {
        let p = MessagePayload::text("hello");
        let v = serde_json::to_value(&p).expect("serialize");
        assert_eq!(
            v,
            serde_json::json!({ "messaging_type": "RESPONSE", "message": { "text": "hello" } })
        );
    }

    #[test]
    fn quick_replies_are_attached() {
        let p = MessagePayload::text_with_replies(
            "pick one",
            vec![QuickReply::text("Yes", "YES"), QuickReply::text("No", "NO")],
        );
        assert_eq!(p.message["quick_replies"][1]["payload"], "NO");
        assert_eq!(p.message["quick_replies"][0]["content_type"], "text");
    }

    #[test]
    fn messaging_type_wire_names() {
        let names: Vec<serde_json::Value> = [
            MessagingType::Response,
            MessagingType::Update,
            MessagingType::MessageTag,
            MessagingType::NonPromotionalSubscription,
        ]
        .iter()
        .map(|t| serde_json::to_value(t).expect("serialize"))
        .collect();
        assert_eq!(
            names,
            vec!["RESPONSE", "UPDATE", "MESSAGE_TAG", "NON_PROMOTIONAL_SUBSCRIPTION"]
        );
    }

    #[test]
    fn platform_error_is_parsed() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190,"fbtrace_id":"Abc"}}"#;
        let e = api_error(400, body);
        assert_eq!(e.code, 190);
        assert_eq!(e.kind, "OAuthException");
        assert_eq!(e.fbtrace_id.as_deref(), Some("Abc"));
    }

    #[test]
    fn non_json_error_falls_back_to_status() {
        let e = api_error(502, "bad gateway");
        assert_eq!(e.code, 502);
        assert_eq!(e.message, "502 bad gateway");
    }

    #[tokio::test]
    async fn missing_credential_is_rejected_before_any_request() {
        let client = GraphApiClient::new(Some("http://127.0.0.1:9".to_string()));
        let err = client
            .send("111", &MessagePayload::text("hi"), " ")
            .await
            .expect_err("no credential");
        assert!(matches!(err, SendError::MissingCredential));
    }

    #[tokio::test]
    async fn posts_recipient_message_and_token() {
        type Seen = Arc<Mutex<Vec<(HashMap<String, String>, serde_json::Value)>>>;
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let app = Router::new().route(
            "/me/messages",
            post(
                move |Query(q): Query<HashMap<String, String>>, Json(body): Json<serde_json::Value>| {
                    let recorded = recorded.clone();
                    async move {
                        let token_ok = q.get("access_token").map(String::as_str) == Some("page-token");
                        recorded.lock().expect("lock").push((q, body));
                        if token_ok {
                            (StatusCode::OK, r#"{"recipient_id":"111","message_id":"m"}"#)
                        } else {
                            (
                                StatusCode::BAD_REQUEST,
                                r#"{"error":{"message":"bad token","type":"OAuthException","code":190}}"#,
                            )
                        }
                    }
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = GraphApiClient::new(Some(format!("http://{}/", addr)));
        client
            .send("111", &MessagePayload::text("hello"), "page-token")
            .await
            .expect("send ok");
        let err = client
            .send("111", &MessagePayload::text("hello"), "wrong")
            .await
            .expect_err("bad token");
        match err {
            SendError::Api(e) => assert_eq!(e.code, 190),
            other => panic!("unexpected error: {}", other),
        }

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        let (_, body) = &seen[0];
        assert_eq!(body["recipient"]["id"], "111");
        assert_eq!(body["message"]["text"], "hello");
        assert_eq!(body["messaging_type"], "RESPONSE");
        assert!(body.get("tag").is_none());
    }
}
