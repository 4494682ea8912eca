//! Model session bootstrap.
//!
//! Once the model connection is open the relay configures the session for
//! telephony audio and seeds the conversation so the assistant speaks first.

use crate::realtime::{
    AUDIO_FORMAT_G711_ULAW, ClientEvent, ConversationItem, ItemContent, ItemKind, ItemRole,
    SessionConfig, TurnDetection,
};
use std::time::Duration;

pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_GREETING: &str = "Hi!";

/// How long the host waits after the model socket opens before configuring it.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Everything needed to configure a fresh model session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBootstrap {
    pub voice: String,
    /// System persona sent as the session instructions.
    pub instructions: String,
    pub temperature: f32,
    /// Opening user turn that prompts the assistant's first response.
    pub greeting: String,
}

impl SessionBootstrap {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            instructions: instructions.into(),
            temperature: DEFAULT_TEMPERATURE,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }

    /// The messages to send, in order, right after the connection opens.
    pub fn messages(&self) -> Vec<ClientEvent> {
        vec![
            ClientEvent::SessionUpdate {
                session: self.session_config(),
            },
            ClientEvent::ConversationItemCreate {
                item: ConversationItem {
                    kind: ItemKind::Message,
                    role: ItemRole::User,
                    content: vec![ItemContent::InputText {
                        text: self.greeting.clone(),
                    }],
                },
            },
            ClientEvent::ResponseCreate,
        ]
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            turn_detection: TurnDetection::ServerVad,
            input_audio_format: AUDIO_FORMAT_G711_ULAW.to_string(),
            output_audio_format: AUDIO_FORMAT_G711_ULAW.to_string(),
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
            modalities: vec!["text".to_string(), "audio".to_string()],
            temperature: self.temperature,
        }
    }
}
