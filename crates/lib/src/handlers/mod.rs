//! Handler registration and the per-event reply context handed to handlers.

mod registry;
mod reply;

pub use registry::{
    EventHandler, HandlerList, HandlerRegistry, HandlerResult, RegisteredEvent, Registration,
};
pub use reply::ReplyContext;

#[cfg(test)]
pub(crate) use reply::testing;
