//! Wire format of the realtime speech-model session.
//!
//! Only the events the relay sends or acts on are modelled. Every other
//! server event kind deserializes to [`ServerEvent::Other`].

use serde::{Deserialize, Serialize};

/// Audio format identifier for 8 kHz G.711 mu-law.
pub const AUDIO_FORMAT_G711_ULAW: &str = "g711_ulaw";

/// Events sent to the model.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate,

    /// Append base64 audio to the model's input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    /// Cut an assistant item short at `audio_end_ms` of played audio.
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        item_id: String,
        content_index: u32,
        audio_end_ms: u64,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub turn_detection: TurnDetection,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub voice: String,
    pub instructions: String,
    pub modalities: Vec<String>,
    pub temperature: f32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub role: ItemRole,
    pub content: Vec<ItemContent>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Message,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ItemRole {
    User,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemContent {
    InputText { text: String },
}

/// Events received from the model.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Server VAD heard the caller start talking.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Server VAD heard the caller stop talking.
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// Incremental text of the audio the model is speaking.
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone,

    /// A chunk of synthesized speech, base64 encoded in the session's output format.
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        delta: String,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}
