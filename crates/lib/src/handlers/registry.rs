//! Handler registry: per-kind, append-only, ordered lists of event handlers.
//!
//! Handlers are usually registered once at startup and read on every dispatch. Appends
//! happen under a write lock and dispatch works on a cloned snapshot, so a concurrent
//! reader sees either the old list or the new one, never a partial entry.

use crate::events::{
    AccountLinkingChange, DeliveryReceipt, EventKind, OptIn, PostBack, ReadReceipt, Referral,
    TextMessage,
};
use crate::handlers::reply::ReplyContext;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of one handler invocation. Errors are logged by the dispatcher and never
/// stop other handlers or events.
pub type HandlerResult = anyhow::Result<()>;

/// Callback for events of type `E`.
///
/// Any `Fn(E, ReplyContext) -> impl Future<Output = HandlerResult>` closure is a handler.
#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    async fn handle(&self, event: E, reply: ReplyContext) -> HandlerResult;
}

#[async_trait]
impl<E, F, Fut> EventHandler<E> for F
where
    E: Send + 'static,
    F: Fn(E, ReplyContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: E, reply: ReplyContext) -> HandlerResult {
        (self)(event, reply).await
    }
}

/// A registered handler and its insertion sequence number (unique per registry).
pub struct Registration<E> {
    pub seq: u64,
    pub handler: Arc<dyn EventHandler<E>>,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            handler: self.handler.clone(),
        }
    }
}

/// Ordered handlers for one event type.
pub struct HandlerList<E> {
    entries: RwLock<Vec<Registration<E>>>,
}

impl<E> Default for HandlerList<E> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<E> HandlerList<E> {
    async fn push(&self, registration: Registration<E>) {
        self.entries.write().await.push(registration);
    }

    async fn snapshot(&self) -> Vec<Registration<E>> {
        self.entries.read().await.clone()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Event payload types that have a handler list in the registry.
pub trait RegisteredEvent: Clone + Send + Sync + 'static {
    const KIND: EventKind;

    fn handler_list(registry: &HandlerRegistry) -> &HandlerList<Self>;
}

macro_rules! registered_event {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl RegisteredEvent for $ty {
            const KIND: EventKind = $kind;

            fn handler_list(registry: &HandlerRegistry) -> &HandlerList<Self> {
                &registry.$field
            }
        }
    };
}

registered_event!(TextMessage, EventKind::Text, text);
registered_event!(DeliveryReceipt, EventKind::Delivery, delivery);
registered_event!(ReadReceipt, EventKind::Read, read);
registered_event!(PostBack, EventKind::PostBack, postback);
registered_event!(OptIn, EventKind::OptIn, optin);
registered_event!(Referral, EventKind::Referral, referral);
registered_event!(AccountLinkingChange, EventKind::AccountLinking, account_linking);

/// Registry of handlers per event kind. Shared by the dispatcher across requests.
#[derive(Default)]
pub struct HandlerRegistry {
    next_seq: AtomicU64,
    text: HandlerList<TextMessage>,
    delivery: HandlerList<DeliveryReceipt>,
    read: HandlerList<ReadReceipt>,
    postback: HandlerList<PostBack>,
    optin: HandlerList<OptIn>,
    referral: HandlerList<Referral>,
    account_linking: HandlerList<AccountLinkingChange>,
}

macro_rules! register_fn {
    ($(#[$doc:meta])* $name:ident, $ty:ty) => {
        $(#[$doc])*
        pub async fn $name<F, Fut>(&self, handler: F) -> u64
        where
            F: Fn($ty, ReplyContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = HandlerResult> + Send + 'static,
        {
            self.register::<$ty, _>(handler).await
        }
    };
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for events of type `E`; returns its sequence number.
    pub async fn register<E, H>(&self, handler: H) -> u64
    where
        E: RegisteredEvent,
        H: EventHandler<E> + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        E::handler_list(self)
            .push(Registration {
                seq,
                handler: Arc::new(handler),
            })
            .await;
        log::debug!("registered {} handler #{}", E::KIND, seq);
        seq
    }

    /// Handlers for `E` in registration order (possibly empty).
    pub async fn handlers<E: RegisteredEvent>(&self) -> Vec<Registration<E>> {
        E::handler_list(self).snapshot().await
    }

    /// Number of handlers registered for `kind` (always 0 for Unknown).
    pub async fn count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Text => self.text.len().await,
            EventKind::Delivery => self.delivery.len().await,
            EventKind::Read => self.read.len().await,
            EventKind::PostBack => self.postback.len().await,
            EventKind::OptIn => self.optin.len().await,
            EventKind::Referral => self.referral.len().await,
            EventKind::AccountLinking => self.account_linking.len().await,
            EventKind::Unknown => 0,
        }
    }

    register_fn!(
        /// Handler for incoming messages.
        register_text_handler, TextMessage
    );
    register_fn!(
        /// Handler for delivery receipts.
        register_delivery_handler, DeliveryReceipt
    );
    register_fn!(
        /// Handler for read receipts.
        register_read_handler, ReadReceipt
    );
    register_fn!(
        /// Handler for postback button taps.
        register_postback_handler, PostBack
    );
    register_fn!(
        /// Handler for plugin opt-ins.
        register_optin_handler, OptIn
    );
    register_fn!(
        /// Handler for referrals (m.me links, ads).
        register_referral_handler, Referral
    );
    register_fn!(
        /// Handler for account link / unlink.
        register_account_linking_handler, AccountLinkingChange
    );
}
