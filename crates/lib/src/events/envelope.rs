//! Webhook envelope wire format and decoder.
//!
//! The platform POSTs `{ "object": "page", "entry": [ { "id", "time", "messaging": [..] } ] }`.
//! Each messaging record carries sender/recipient/timestamp plus at most one payload
//! object (`message`, `delivery`, `read`, `postback`, `optin`, `referral`,
//! `account_linking`). Unknown fields are ignored.

use serde::{Deserialize, Deserializer};

/// Expected value of the top-level `object` field.
pub const PAGE_OBJECT: &str = "page";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Top-level webhook payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    /// Platform object type; `page` for page subscriptions.
    #[serde(rename = "object", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(rename = "entry", default, deserialize_with = "null_as_default")]
    pub batches: Vec<Batch>,
}

/// One delivery unit (`entry` item).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Batch {
    #[serde(default, deserialize_with = "opaque_id")]
    pub id: String,
    /// When the batch was sent (platform milliseconds).
    #[serde(rename = "time", default, deserialize_with = "null_as_default")]
    pub sent_at: i64,
    /// Records that fail to decode are kept as payload-less records (classified Unknown).
    #[serde(rename = "messaging", default, deserialize_with = "lenient_records")]
    pub events: Vec<EventRecord>,
}

/// A messaging record as decoded from the wire. Which payload is "the" payload is
/// decided by [`classify`](crate::events::classify), not by this struct.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender: Participant,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recipient: Participant,
    /// Raw platform timestamp (milliseconds).
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
    #[serde(default)]
    pub message: Option<MessageBody>,
    #[serde(default)]
    pub delivery: Option<DeliveryBody>,
    #[serde(default)]
    pub read: Option<ReadBody>,
    #[serde(default)]
    pub postback: Option<PostBackBody>,
    #[serde(default)]
    pub optin: Option<OptInBody>,
    #[serde(default)]
    pub referral: Option<ReferralBody>,
    #[serde(default)]
    pub account_linking: Option<AccountLinkingBody>,
}

/// Page-scoped participant id. Sent as a JSON string; integers are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Participant {
    #[serde(default, deserialize_with = "opaque_id")]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub mid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub seq: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    /// True when the platform echoes a message the page itself sent.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_echo: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<AttachmentBody>,
    #[serde(default)]
    pub quick_reply: Option<QuickReplyBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentBody {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default)]
    pub payload: Option<AttachmentPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuickReplyBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub mids: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub watermark: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub seq: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub watermark: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub seq: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostBackBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: String,
    #[serde(default)]
    pub referral: Option<ReferralBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptInBody {
    #[serde(rename = "ref", default, deserialize_with = "null_as_default")]
    pub reference: String,
    #[serde(default)]
    pub user_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferralBody {
    #[serde(rename = "ref", default, deserialize_with = "null_as_default")]
    pub reference: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountLinkingBody {
    #[serde(default, deserialize_with = "link_status")]
    pub status: AccountLinkStatus,
    #[serde(default)]
    pub authorization_code: Option<String>,
}

/// New account linking state reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccountLinkStatus {
    Linked,
    Unlinked,
    /// Missing or unrecognized status value.
    #[default]
    Other,
}

impl AccountLinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountLinkStatus::Linked => "linked",
            AccountLinkStatus::Unlinked => "unlinked",
            AccountLinkStatus::Other => "other",
        }
    }
}

fn link_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AccountLinkStatus, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw.as_str() {
        Some("linked") => AccountLinkStatus::Linked,
        Some("unlinked") => AccountLinkStatus::Unlinked,
        _ => {
            log::debug!("webhook: unrecognized account linking status {}", raw);
            AccountLinkStatus::Other
        }
    })
}

/// JSON `null` reads as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode each record on its own so one bad record cannot reject its siblings.
fn lenient_records<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<EventRecord>, D::Error> {
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            EventRecord::deserialize(value).unwrap_or_else(|e| {
                log::warn!("webhook: undecodable event #{} treated as unknown: {}", index, e);
                EventRecord::default()
            })
        })
        .collect())
}

/// Ids arrive as strings (`"1234"`) but older payloads and test fixtures use numbers.
fn opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Int(i64),
        UInt(u64),
    }
    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Str(s)) => s,
        Some(RawId::Int(n)) => n.to_string(),
        Some(RawId::UInt(n)) => n.to_string(),
        None => String::new(),
    })
}

/// Decode a raw webhook body. An `object` other than `page` is logged and decoding proceeds.
pub fn decode(body: &[u8]) -> Result<Envelope, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    if envelope.kind != PAGE_OBJECT {
        log::warn!(
            "webhook: object is not \"{}\", proceeding anyway (got {:?})",
            PAGE_OBJECT,
            envelope.kind
        );
    }
    Ok(envelope)
}
