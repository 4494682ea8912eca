//! HTTP transcription client.
//!
//! Uploads a finished utterance to an OpenAI-compatible
//! `/audio/transcriptions` endpoint. The WAV file is built in memory and
//! streamed as a multipart part, so nothing touches the filesystem.

use crate::config::Config;
use async_trait::async_trait;
use phonebridge_core::transcription::{Transcriber, TranscriptionError};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// A [`Transcriber`] backed by an OpenAI-compatible HTTP API.
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    language: String,
}

impl HttpTranscriber {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language: language.into(),
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            config.transcription_url.clone(),
            config.openai_api_key.clone(),
            config.transcription_model.clone(),
            config.transcription_language.clone(),
        )
    }

    fn form(&self, wav: Vec<u8>) -> Result<Form, TranscriptionError> {
        let file = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Transport(format!("Invalid MIME type: {e}")))?;
        Ok(Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", self.language.clone()))
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, TranscriptionError> {
        debug!(bytes = wav.len(), model = %self.model, "Submitting utterance for transcription");
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(self.form(wav)?)
            .send()
            .await
            .map_err(|e| TranscriptionError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        parse_transcript(&body)
    }
}

/// Extracts the transcript from a successful response body.
fn parse_transcript(body: &str) -> Result<String, TranscriptionError> {
    serde_json::from_str::<TranscriptionResponse>(body)
        .map(|r| r.text)
        .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))
}

/// Pulls `error.message` out of an API error body, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcript() {
        assert_eq!(
            parse_transcript(r#"{"text":"Hello, who is this?"}"#).unwrap(),
            "Hello, who is this?"
        );
        assert!(matches!(
            parse_transcript("<html>bad gateway</html>"),
            Err(TranscriptionError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"error":{"message":"Invalid file format.","type":"invalid_request_error","param":null,"code":null}}"#;
        assert_eq!(error_message(body), "Invalid file format.");
        assert_eq!(error_message(" upstream timeout \n"), "upstream timeout");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let transcriber = HttpTranscriber::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/v1/audio/transcriptions",
            "test-key",
            "whisper-1",
            "en",
        );
        let err = transcriber
            .transcribe(phonebridge_core::wav::ulaw_to_wav(&[0xFF; 80]))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptionError::Transport(_)));
    }
}
