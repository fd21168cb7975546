//! Typed event payloads handed to handlers.
//!
//! Every payload carries an [`EventMeta`] with the sender, recipient and the event time
//! normalized to whole seconds. Platform timestamps and watermarks are milliseconds
//! since the Unix epoch.

use crate::events::envelope::{
    AccountLinkStatus, EventRecord, MessageBody, PostBackBody, ReferralBody,
};
use crate::events::kind::{classify, EventKind};
use chrono::{DateTime, Utc};

/// Convert a platform millisecond timestamp to a whole-second UTC time.
/// Values chrono cannot represent map to the Unix epoch.
pub fn normalize_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(millis.div_euclid(1000), 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Fields shared by every event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    /// Conversation participant that triggered the event; replies go here.
    pub sender: String,
    /// Receiving account (the page).
    pub recipient: String,
    pub time: DateTime<Utc>,
}

impl EventMeta {
    fn from_record(record: &EventRecord) -> Self {
        Self {
            sender: record.sender.id.clone(),
            recipient: record.recipient.id.clone(),
            time: normalize_timestamp(record.timestamp),
        }
    }
}

/// Incoming message (text and/or attachments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub meta: EventMeta,
    pub id: String,
    pub sequence: i64,
    pub body: String,
    pub is_echo: bool,
    pub attachments: Vec<Attachment>,
    /// Payload of the quick reply the user tapped, if any.
    pub selected_quick_reply: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// image, audio, video, file, location, ...
    pub kind: String,
    pub url: Option<String>,
}

/// Messages up to `watermark` were delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub meta: EventMeta,
    pub message_ids: Vec<String>,
    pub watermark: DateTime<Utc>,
    pub sequence: i64,
}

/// Messages up to `watermark` were read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub meta: EventMeta,
    pub watermark: DateTime<Utc>,
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostBack {
    pub meta: EventMeta,
    pub payload: String,
    pub referral: Option<ReferralInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptIn {
    pub meta: EventMeta,
    /// The `ref` parameter passed by the plugin entry point.
    pub reference: String,
    pub user_ref: Option<String>,
}

/// Where a user came from (m.me link, ad, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralInfo {
    pub reference: String,
    pub source: String,
    pub kind: String,
}

impl From<ReferralBody> for ReferralInfo {
    fn from(body: ReferralBody) -> Self {
        Self {
            reference: body.reference,
            source: body.source,
            kind: body.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referral {
    pub meta: EventMeta,
    pub referral: ReferralInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLinkingChange {
    pub meta: EventMeta,
    pub status: AccountLinkStatus,
    pub authorization_code: Option<String>,
}

/// A classified event with exactly one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Text(TextMessage),
    Delivery(DeliveryReceipt),
    Read(ReadReceipt),
    PostBack(PostBack),
    OptIn(OptIn),
    Referral(Referral),
    AccountLinking(AccountLinkingChange),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Text(_) => EventKind::Text,
            Event::Delivery(_) => EventKind::Delivery,
            Event::Read(_) => EventKind::Read,
            Event::PostBack(_) => EventKind::PostBack,
            Event::OptIn(_) => EventKind::OptIn,
            Event::Referral(_) => EventKind::Referral,
            Event::AccountLinking(_) => EventKind::AccountLinking,
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            Event::Text(e) => &e.meta,
            Event::Delivery(e) => &e.meta,
            Event::Read(e) => &e.meta,
            Event::PostBack(e) => &e.meta,
            Event::OptIn(e) => &e.meta,
            Event::Referral(e) => &e.meta,
            Event::AccountLinking(e) => &e.meta,
        }
    }
}

impl EventRecord {
    /// Build the typed event for this record's classified kind; `None` when Unknown.
    /// Payloads other than the winning one are dropped.
    pub fn into_event(self) -> Option<Event> {
        let meta = EventMeta::from_record(&self);
        match classify(&self) {
            EventKind::Text => self.message.map(|m| Event::Text(text_message(meta, m))),
            EventKind::Delivery => self.delivery.map(|d| {
                Event::Delivery(DeliveryReceipt {
                    meta,
                    message_ids: d.mids,
                    watermark: normalize_timestamp(d.watermark),
                    sequence: d.seq,
                })
            }),
            EventKind::Read => self.read.map(|r| {
                Event::Read(ReadReceipt {
                    meta,
                    watermark: normalize_timestamp(r.watermark),
                    sequence: r.seq,
                })
            }),
            EventKind::PostBack => self.postback.map(|p| Event::PostBack(postback(meta, p))),
            EventKind::OptIn => self.optin.map(|o| {
                Event::OptIn(OptIn {
                    meta,
                    reference: o.reference,
                    user_ref: o.user_ref,
                })
            }),
            EventKind::Referral => self.referral.map(|r| {
                Event::Referral(Referral {
                    meta,
                    referral: r.into(),
                })
            }),
            EventKind::AccountLinking => self.account_linking.map(|a| {
                Event::AccountLinking(AccountLinkingChange {
                    meta,
                    status: a.status,
                    authorization_code: a.authorization_code,
                })
            }),
            EventKind::Unknown => None,
        }
    }
}

fn text_message(meta: EventMeta, m: MessageBody) -> TextMessage {
    TextMessage {
        meta,
        id: m.mid,
        sequence: m.seq,
        body: m.text,
        is_echo: m.is_echo,
        attachments: m
            .attachments
            .into_iter()
            .map(|a| Attachment {
                kind: a.kind,
                url: a.payload.and_then(|p| p.url),
            })
            .collect(),
        selected_quick_reply: m.quick_reply.map(|q| q.payload),
    }
}

fn postback(meta: EventMeta, p: PostBackBody) -> PostBack {
    PostBack {
        meta,
        payload: p.payload,
        referral: p.referral.map(ReferralInfo::from),
    }
}
