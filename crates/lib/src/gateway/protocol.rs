//! Webhook wire protocol: handshake query and acknowledgment bodies.

use serde::Deserialize;

/// POST body when the envelope was accepted (even if some events were unknown or
/// some handlers failed).
pub const ACK_OK: &str = "{status: 'ok'}";

/// POST body when the signature or the envelope was rejected.
pub const ACK_NOT_OK: &str = "{status: 'not ok'}";

/// GET body when the handshake token does not match.
pub const HANDSHAKE_REJECTED: &str = "Incorrect verify token.";

/// Query of the subscription handshake: `?hub.verify_token=..&hub.challenge=..`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode", default)]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge", default)]
    pub challenge: Option<String>,
}

/// Body for a handshake: the challenge if the token matches `expected`, else the rejection.
/// With no configured token every handshake is rejected.
pub fn answer_handshake(params: &VerifyParams, expected: Option<&str>) -> String {
    match (expected, params.verify_token.as_deref()) {
        (Some(expected), Some(given)) if expected == given => {
            params.challenge.clone().unwrap_or_default()
        }
        _ => HANDSHAKE_REJECTED.to_string(),
    }
}
