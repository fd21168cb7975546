//! Event kinds and the classifier that picks exactly one kind per record.

use crate::events::envelope::EventRecord;
use std::fmt;

/// Kind of a messaging record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Text,
    Delivery,
    Read,
    PostBack,
    OptIn,
    Referral,
    AccountLinking,
    /// No payload populated; never dispatched.
    Unknown,
}

impl EventKind {
    /// Classification precedence, highest first.
    pub const PRECEDENCE: [EventKind; 7] = [
        EventKind::Text,
        EventKind::Delivery,
        EventKind::Read,
        EventKind::PostBack,
        EventKind::OptIn,
        EventKind::Referral,
        EventKind::AccountLinking,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Text => "text",
            EventKind::Delivery => "delivery",
            EventKind::Read => "read",
            EventKind::PostBack => "postback",
            EventKind::OptIn => "optin",
            EventKind::Referral => "referral",
            EventKind::AccountLinking => "account_linking",
            EventKind::Unknown => "unknown",
        }
    }

    fn is_present_in(self, record: &EventRecord) -> bool {
        match self {
            EventKind::Text => record.message.is_some(),
            EventKind::Delivery => record.delivery.is_some(),
            EventKind::Read => record.read.is_some(),
            EventKind::PostBack => record.postback.is_some(),
            EventKind::OptIn => record.optin.is_some(),
            EventKind::Referral => record.referral.is_some(),
            EventKind::AccountLinking => record.account_linking.is_some(),
            EventKind::Unknown => false,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Determine the record's kind: the first populated payload in [`EventKind::PRECEDENCE`],
/// or [`EventKind::Unknown`] when none is populated.
pub fn classify(record: &EventRecord) -> EventKind {
    EventKind::PRECEDENCE
        .into_iter()
        .find(|kind| kind.is_present_in(record))
        .unwrap_or(EventKind::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::envelope::{
        AccountLinkStatus, AccountLinkingBody, DeliveryBody, MessageBody, OptInBody,
        PostBackBody, ReadBody, ReferralBody,
    };

    #[test]
    fn empty_record_is_unknown() {
        assert_eq!(classify(&EventRecord::default()), EventKind::Unknown);
    }

    #[test]
    fn each_payload_classifies_to_its_kind() {
        let cases: Vec<(EventRecord, EventKind)> = vec![
            (
                EventRecord { message: Some(MessageBody::default()), ..Default::default() },
                EventKind::Text,
            ),
            (
                EventRecord { delivery: Some(DeliveryBody::default()), ..Default::default() },
                EventKind::Delivery,
            ),
            (
                EventRecord { read: Some(ReadBody::default()), ..Default::default() },
                EventKind::Read,
            ),
            (
                EventRecord { postback: Some(PostBackBody::default()), ..Default::default() },
                EventKind::PostBack,
            ),
            (
                EventRecord { optin: Some(OptInBody::default()), ..Default::default() },
                EventKind::OptIn,
            ),
            (
                EventRecord { referral: Some(ReferralBody::default()), ..Default::default() },
                EventKind::Referral,
            ),
            (
                EventRecord {
                    account_linking: Some(AccountLinkingBody {
                        status: AccountLinkStatus::Unlinked,
                        authorization_code: None,
                    }),
                    ..Default::default()
                },
                EventKind::AccountLinking,
            ),
        ];
        for (record, expected) in cases {
            assert_eq!(classify(&record), expected, "{}", expected);
        }
    }

    #[test]
    fn text_wins_over_delivery() {
        let record = EventRecord {
            message: Some(MessageBody::default()),
            delivery: Some(DeliveryBody::default()),
            ..Default::default()
        };
        assert_eq!(classify(&record), EventKind::Text);
    }

    #[test]
    fn precedence_holds_for_every_pair() {
        let populate = |record: &mut EventRecord, kind: EventKind| match kind {
            EventKind::Text => record.message = Some(MessageBody::default()),
            EventKind::Delivery => record.delivery = Some(DeliveryBody::default()),
            EventKind::Read => record.read = Some(ReadBody::default()),
            EventKind::PostBack => record.postback = Some(PostBackBody::default()),
            EventKind::OptIn => record.optin = Some(OptInBody::default()),
            EventKind::Referral => record.referral = Some(ReferralBody::default()),
            EventKind::AccountLinking => {
                record.account_linking = Some(AccountLinkingBody {
                    status: AccountLinkStatus::Linked,
                    authorization_code: None,
                })
            }
            EventKind::Unknown => {}
        };
        let order = EventKind::PRECEDENCE;
        for (i, high) in order.iter().enumerate() {
            for low in &order[i + 1..] {
                let mut record = EventRecord::default();
                populate(&mut record, *low);
                populate(&mut record, *high);
                assert_eq!(classify(&record), *high, "{} vs {}", high, low);
            }
        }
    }
}
