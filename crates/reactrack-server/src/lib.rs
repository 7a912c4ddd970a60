//! Messenger webhook front end.
//!
//! `GET /webhook` answers the subscription handshake, `POST /webhook`
//! verifies the body signature and routes each messaging event to the
//! turn controller. Responses go out as soon as events are dispatched.

pub mod error;
pub mod server;
pub mod signature;
pub mod webhook;

pub use error::ServerError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle, GREETING};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
pub use webhook::{dispatch, InboundEvent, WebhookPayload};
