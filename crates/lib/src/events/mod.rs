//! Inbound webhook events: wire envelope, classification and typed payloads.
//!
//! Raw bodies are decoded into an [`Envelope`]; each [`EventRecord`] is classified into
//! exactly one [`EventKind`] and converted into a typed [`Event`] for dispatch.

mod envelope;
mod kind;
mod types;

pub use envelope::{
    decode, AccountLinkStatus, AccountLinkingBody, AttachmentBody, AttachmentPayload, Batch,
    DecodeError, DeliveryBody, Envelope, EventRecord, MessageBody, OptInBody, Participant,
    PostBackBody, QuickReplyBody, ReadBody, ReferralBody, PAGE_OBJECT,
};
pub use kind::{classify, EventKind};
pub use types::{
    normalize_timestamp, AccountLinkingChange, Attachment, DeliveryReceipt, Event, EventMeta,
    OptIn, PostBack, ReadReceipt, Referral, ReferralInfo, TextMessage,
};
