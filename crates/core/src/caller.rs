//! Wire format of the telephony media stream.
//!
//! Every frame on the caller socket is a JSON object tagged by its `event`
//! field. Inbound frames become [`CallerEvent`]s; everything the relay sends
//! back to the caller is a [`CallerInstruction`].

use serde::{Deserialize, Deserializer, Serialize};

/// Name attached to every playback mark sent to the caller.
pub const PLAYBACK_MARK: &str = "responsePart";

/// Events received from the caller transport.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallerEvent {
    /// The media stream has started. Carries the stream identifier.
    Start { start: StreamStart },
    /// One frame of caller audio.
    Media { media: MediaFrame },
    /// The caller transport finished playing a chunk we marked.
    Mark { mark: MarkPayload },
    /// The media stream has ended.
    Stop,
    /// `connected`, `dtmf` and anything else the relay does not act on.
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MediaFrame {
    /// Base64-encoded mu-law audio.
    pub payload: String,
    /// Milliseconds since the stream started.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Instructions sent to the caller transport.
///
/// `streamSid` is always present on the wire and is `null` if no `start`
/// event has been seen yet.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallerInstruction {
    /// Queue a chunk of audio for playback.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
        media: OutboundMedia,
    },
    /// Ask to be notified once everything queued so far has played.
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
        mark: MarkPayload,
    },
    /// Drop any audio still queued for playback.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
    },
}

// The telephony provider sends timestamps as decimal strings.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
