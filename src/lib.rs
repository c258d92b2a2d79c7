//! Tianxing chatbot — a chat relay adapter for the Tianxing reply API.
//!
//! User chat text goes out as a GET to `api.tianapi.com`; the parsed replies
//! come back through a [`chat::MessageSink`]. The host owns the sink, the
//! configuration and the runtime; this crate owns the adapter.
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chat;
pub mod config;
pub mod logging;
pub mod sink;
