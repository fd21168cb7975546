//! Dispatcher: fan out every event of a decoded envelope to its registered handlers.
//!
//! Batches and events are visited in wire order; handlers for one event run one after
//! another in registration order. A failing or panicking handler is logged and skipped.
//! The dispatcher keeps no state between requests beyond the shared registry.

use crate::events::{Batch, Envelope, Event};
use crate::handlers::{HandlerRegistry, RegisteredEvent, ReplyContext};
use crate::outbound::Outbound;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Counts for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub batches: usize,
    pub events: usize,
    /// Records with no recognized payload; skipped.
    pub unknown: usize,
    pub invocations: usize,
    /// Invocations that returned an error or panicked.
    pub failures: usize,
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    credential: Arc<str>,
    outbound: Arc<dyn Outbound>,
}

impl Dispatcher {
    /// `credential` is the page access token placed in every reply context.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        credential: impl Into<Arc<str>>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            registry,
            credential: credential.into(),
            outbound,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Reply context addressed to `target`, e.g. to message a user outside of a handler.
    pub fn reply_context(&self, target: &str) -> ReplyContext {
        ReplyContext::new(target, self.credential.clone(), self.outbound.clone())
    }

    pub async fn dispatch(&self, envelope: Envelope) -> DispatchReport {
        let mut report = DispatchReport::default();
        for batch in envelope.batches {
            self.dispatch_batch(batch, &mut report).await;
        }
        log::debug!(
            "dispatch: {} batch(es), {} event(s), {} unknown, {} handler call(s), {} failed",
            report.batches,
            report.events,
            report.unknown,
            report.invocations,
            report.failures
        );
        report
    }

    async fn dispatch_batch(&self, batch: Batch, report: &mut DispatchReport) {
        report.batches += 1;
        let Batch { id, events, .. } = batch;
        for (index, record) in events.into_iter().enumerate() {
            report.events += 1;
            let Some(event) = record.into_event() else {
                report.unknown += 1;
                log::debug!("dispatch: unknown event #{} in batch {:?}, skipping", index, id);
                continue;
            };
            let reply = self.reply_context(&event.meta().sender);
            match event {
                Event::Text(e) => self.fan_out(e, &reply, report).await,
                Event::Delivery(e) => self.fan_out(e, &reply, report).await,
                Event::Read(e) => self.fan_out(e, &reply, report).await,
                Event::PostBack(e) => self.fan_out(e, &reply, report).await,
                Event::OptIn(e) => self.fan_out(e, &reply, report).await,
                Event::Referral(e) => self.fan_out(e, &reply, report).await,
                Event::AccountLinking(e) => self.fan_out(e, &reply, report).await,
            }
        }
    }

    async fn fan_out<E: RegisteredEvent>(
        &self,
        event: E,
        reply: &ReplyContext,
        report: &mut DispatchReport,
    ) {
        for registration in self.registry.handlers::<E>().await {
            report.invocations += 1;
            let call = registration.handler.handle(event.clone(), reply.clone());
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failures += 1;
                    log::warn!("dispatch: {} handler #{} failed: {:#}", E::KIND, registration.seq, e);
                }
                Err(panic) => {
                    report.failures += 1;
                    log::error!(
                        "dispatch: {} handler #{} panicked: {}",
                        E::KIND,
                        registration.seq,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
