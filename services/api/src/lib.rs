//! Call Relay API Library Crate
//!
//! This library contains the process side of the call relay: configuration,
//! application state, the HTTP handlers and router, the media stream
//! WebSocket endpoint, and the concrete transcription and conversation-log
//! backends. The binaries in `bin/` are thin wrappers around it.

pub mod config;
pub mod conversation_log;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod transcription;
pub mod ws;
