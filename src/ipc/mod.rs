//! Line protocol: one JSON request per stdin line, one JSON reply per stdout line.
//!
//! Requests carry `{id, method, params, callerId?}`. Replies are
//! `{id, ok: true, result}` or `{id, ok: false, error: {code, message, details?}}`.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
