//! WebSocket Call Handling
//!
//! This module hosts the per-call relay between the telephony media stream
//! and the realtime speech model. It is structured into submodules:
//!
//! - `realtime`: Dials and bootstraps the model-side WebSocket connection.
//! - `session`: Owns a call's two sockets and drives its `CallSession`.

mod realtime;
pub mod session;

pub use session::media_stream_handler;
