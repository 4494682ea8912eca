//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like configuration and service clients.

use crate::config::Config;
use phonebridge_core::{
    bootstrap::SessionBootstrap, conversation::ConversationLog, transcription::Transcriber,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transcriber: Arc<dyn Transcriber>,
    pub conversation_log: Arc<dyn ConversationLog>,
    /// Model session configuration applied to every call.
    pub bootstrap: Arc<SessionBootstrap>,
}
