//! Gateway: the HTTP boundary of the webhook.
//!
//! One port serves the subscription handshake (GET), event delivery (POST) on the
//! configured webhook path, and a health probe on `/health`.

mod protocol;
mod server;

pub use protocol::{answer_handshake, VerifyParams, ACK_NOT_OK, ACK_OK, HANDSHAKE_REJECTED};
pub use server::{router, run_gateway, GatewayState, IngestError};
