//! Per-call relay state machine.
//!
//! A [`CallSession`] sits between the caller's media stream and the model's
//! realtime session. The host feeds it events from both sockets, one at a
//! time, and sends whatever [`Outbound`] messages each handler returns in the
//! order they are returned. Handlers take `&mut self`, so a session is never
//! re-entered while a handler (including an outstanding transcription) runs.
//!
//! Barge-in works off playback marks: every audio chunk sent to the caller is
//! followed by a mark, and the caller acknowledges each mark once the chunk
//! has played. Unacknowledged marks when the caller starts talking mean the
//! assistant is being interrupted, so its response is truncated at the point
//! the caller actually heard and the caller's playback queue is cleared.

use crate::{
    caller::{
        CallerEvent, CallerInstruction, MarkPayload, MediaFrame, OutboundMedia, PLAYBACK_MARK,
    },
    conversation::{ConversationLog, Role},
    realtime::{ClientEvent, ServerEvent},
    transcription::{Transcriber, TranscriptionError},
    wav::ulaw_to_wav,
};
use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, error, info, trace, warn};

/// Added to the measured playback window when truncating, to cover audio
/// already in flight to the caller.
pub const PLAYBACK_LATENCY_MS: u64 = 100;

// Telephony payloads are not always padded.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// A message produced by a session handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    ToModel(ClientEvent),
    ToCaller(CallerInstruction),
}

/// State of one accepted call.
pub struct CallSession {
    transcriber: Arc<dyn Transcriber>,
    conversation_log: Arc<dyn ConversationLog>,
    model_ready: bool,
    stream_sid: Option<String>,
    latest_media_timestamp: u64,
    last_assistant_item: Option<String>,
    mark_queue: VecDeque<String>,
    response_start_timestamp: Option<u64>,
    utterance: Vec<u8>,
    assistant_transcript: String,
}

impl CallSession {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        conversation_log: Arc<dyn ConversationLog>,
    ) -> Self {
        Self {
            transcriber,
            conversation_log,
            model_ready: false,
            stream_sid: None,
            latest_media_timestamp: 0,
            last_assistant_item: None,
            mark_queue: VecDeque::new(),
            response_start_timestamp: None,
            utterance: Vec::new(),
            assistant_transcript: String::new(),
        }
    }

    /// Marks whether caller audio may be forwarded to the model.
    ///
    /// Until the model session is configured, caller frames are dropped
    /// rather than queued.
    pub fn set_model_ready(&mut self, ready: bool) {
        self.model_ready = ready;
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn latest_media_timestamp(&self) -> u64 {
        self.latest_media_timestamp
    }

    pub fn last_assistant_item(&self) -> Option<&str> {
        self.last_assistant_item.as_deref()
    }

    /// Number of playback marks sent to the caller and not yet acknowledged.
    pub fn pending_marks(&self) -> usize {
        self.mark_queue.len()
    }

    pub fn response_start_timestamp(&self) -> Option<u64> {
        self.response_start_timestamp
    }

    pub fn utterance_len(&self) -> usize {
        self.utterance.len()
    }

    pub fn assistant_transcript(&self) -> &str {
        &self.assistant_transcript
    }

    /// Handles one event from the caller transport.
    pub async fn handle_caller_event(&mut self, event: CallerEvent) -> Vec<Outbound> {
        let mut out = Vec::new();
        match event {
            CallerEvent::Start { start } => {
                info!(stream_sid = %start.stream_sid, call_sid = ?start.call_sid, "Stream started");
                self.restart(start.stream_sid);
            }
            CallerEvent::Media { media } => self.on_media(media, &mut out),
            CallerEvent::Mark { mark } => {
                if self.mark_queue.pop_front().is_none() {
                    trace!(name = %mark.name, "Mark acknowledged with no pending playback");
                }
            }
            CallerEvent::Stop => {
                info!("Stream stopped");
                self.flush_utterance().await;
            }
            CallerEvent::Other => trace!("Ignoring caller event"),
        }
        out
    }

    /// Handles one event from the model session.
    pub async fn handle_model_event(&mut self, event: ServerEvent) -> Vec<Outbound> {
        let mut out = Vec::new();
        match event {
            ServerEvent::SpeechStarted => {
                debug!("Caller speech started");
                self.utterance.clear();
                self.interrupt_playback(&mut out);
            }
            ServerEvent::SpeechStopped => {
                debug!("Caller speech stopped");
                self.flush_utterance().await;
            }
            ServerEvent::AudioTranscriptDelta { delta } => {
                self.assistant_transcript.push_str(&delta);
            }
            ServerEvent::ResponseDone => self.flush_assistant_transcript().await,
            ServerEvent::AudioDelta { delta, item_id } => {
                self.on_audio_delta(delta, item_id, &mut out)
            }
            ServerEvent::SessionCreated => debug!("Model session created"),
            ServerEvent::SessionUpdated => debug!("Model session updated"),
            ServerEvent::Error { error } => warn!(
                kind = ?error.kind,
                code = ?error.code,
                message = %error.message,
                "Model reported an error"
            ),
            ServerEvent::Other => {}
        }
        out
    }

    fn restart(&mut self, stream_sid: String) {
        self.stream_sid = Some(stream_sid);
        self.latest_media_timestamp = 0;
        self.response_start_timestamp = None;
        self.last_assistant_item = None;
        self.mark_queue.clear();
        self.utterance.clear();
        self.assistant_transcript.clear();
    }

    fn on_media(&mut self, media: MediaFrame, out: &mut Vec<Outbound>) {
        self.latest_media_timestamp = media.timestamp;
        if !self.model_ready {
            trace!(timestamp = media.timestamp, "Model not ready, dropping caller frame");
            return;
        }

        match PAYLOAD_ENGINE.decode(&media.payload) {
            Ok(chunk) => {
                self.utterance.extend_from_slice(&chunk);
                out.push(Outbound::ToModel(ClientEvent::InputAudioBufferAppend {
                    audio: media.payload,
                }));
            }
            Err(e) => warn!(error = %e, timestamp = media.timestamp, "Dropping undecodable caller frame"),
        }
    }

    fn on_audio_delta(&mut self, delta: String, item_id: Option<String>, out: &mut Vec<Outbound>) {
        if delta.is_empty() {
            return;
        }
        if let Err(e) = PAYLOAD_ENGINE.decode(&delta) {
            warn!(error = %e, "Dropping undecodable model audio");
            return;
        }

        out.push(Outbound::ToCaller(CallerInstruction::Media {
            stream_sid: self.stream_sid.clone(),
            media: OutboundMedia { payload: delta },
        }));

        if self.response_start_timestamp.is_none() {
            self.response_start_timestamp = Some(self.latest_media_timestamp);
        }
        if item_id.is_some() {
            self.last_assistant_item = item_id;
        }

        out.push(Outbound::ToCaller(CallerInstruction::Mark {
            stream_sid: self.stream_sid.clone(),
            mark: MarkPayload {
                name: PLAYBACK_MARK.to_string(),
            },
        }));
        self.mark_queue.push_back(PLAYBACK_MARK.to_string());
    }

    fn interrupt_playback(&mut self, out: &mut Vec<Outbound>) {
        if self.mark_queue.is_empty() {
            return;
        }
        let Some(start) = self.response_start_timestamp else {
            return;
        };

        let elapsed = self.latest_media_timestamp.saturating_sub(start) + PLAYBACK_LATENCY_MS;
        if let Some(item_id) = self.last_assistant_item.take() {
            info!(%item_id, audio_end_ms = elapsed, "Caller barged in, truncating response");
            out.push(Outbound::ToModel(ClientEvent::ConversationItemTruncate {
                item_id,
                content_index: 0,
                audio_end_ms: elapsed,
            }));
        }
        out.push(Outbound::ToCaller(CallerInstruction::Clear {
            stream_sid: self.stream_sid.clone(),
        }));

        self.mark_queue.clear();
        self.last_assistant_item = None;
        self.response_start_timestamp = None;
    }

    // Taking the buffer means an utterance is transcribed at most once, even
    // when both `speech_stopped` and `stop` fire for it. A failed
    // transcription hands the audio back so the next boundary retries it.
    async fn flush_utterance(&mut self) {
        if self.utterance.is_empty() {
            return;
        }
        let audio = std::mem::take(&mut self.utterance);
        if let Err(e) = self.transcribe_and_log(&audio).await {
            error!(error = %e, bytes = audio.len(), "Transcription failed, keeping utterance");
            self.utterance = audio;
        }
    }

    async fn transcribe_and_log(&self, audio: &[u8]) -> Result<(), TranscriptionError> {
        let text = self.transcriber.transcribe(ulaw_to_wav(audio)).await?;
        let text = text.trim();
        if text.is_empty() {
            debug!(bytes = audio.len(), "Transcription was empty, nothing to log");
            return Ok(());
        }
        if let Err(e) = self.conversation_log.append(Role::User, text).await {
            error!(error = ?e, "Failed to log caller turn");
        }
        Ok(())
    }

    async fn flush_assistant_transcript(&mut self) {
        let transcript = std::mem::take(&mut self.assistant_transcript);
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }
        if let Err(e) = self
            .conversation_log
            .append(Role::Assistant, transcript)
            .await
        {
            error!(error = ?e, "Failed to log assistant turn");
        }
    }
}
