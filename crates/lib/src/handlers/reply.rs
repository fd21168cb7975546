//! Per-event reply handle: who to answer and with which credential.

use crate::outbound::{MessagePayload, Outbound, SendError};
use std::fmt;
use std::sync::Arc;

/// Built fresh for every dispatched event from the event's sender and the page access
/// token. Handlers receive their own clone; it is not retained after dispatch.
#[derive(Clone)]
pub struct ReplyContext {
    target: String,
    credential: Arc<str>,
    outbound: Arc<dyn Outbound>,
}

impl ReplyContext {
    pub fn new(target: impl Into<String>, credential: Arc<str>, outbound: Arc<dyn Outbound>) -> Self {
        Self {
            target: target.into(),
            credential,
            outbound,
        }
    }

    /// Conversation participant replies are addressed to.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Send a caller-built message to the target.
    pub async fn send(&self, payload: &MessagePayload) -> Result<(), SendError> {
        self.outbound
            .send(&self.target, payload, &self.credential)
            .await
    }

    /// Send a plain text response.
    pub async fn text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.send(&MessagePayload::text(text)).await
    }
}

impl fmt::Debug for ReplyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyContext")
            .field("target", &self.target)
            .field("credential", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every send instead of calling the platform.
    #[derive(Default)]
    pub struct RecordingOutbound {
        pub sent: Mutex<Vec<(String, MessagePayload, String)>>,
    }

    #[async_trait]
    impl Outbound for RecordingOutbound {
        async fn send(
            &self,
            target: &str,
            payload: &MessagePayload,
            credential: &str,
        ) -> Result<(), SendError> {
            self.sent.lock().expect("lock").push((
                target.to_string(),
                payload.clone(),
                credential.to_string(),
            ));
            Ok(())
        }
    }
}
