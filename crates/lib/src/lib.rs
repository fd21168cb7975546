//! Pagehook core library: webhook ingestion and event dispatch for page messaging
//! platforms.
//!
//! A request flows through the [`signature`] check (when enabled), the [`events`]
//! decoder and classifier, and the [`dispatch`]er, which fans each event out to the
//! handlers in the [`handlers`] registry. [`gateway`] wires this behind an HTTP server.

pub mod config;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod outbound;
pub mod signature;
