//! Transcription backend contract.

use async_trait::async_trait;

/// Failure modes of a transcription request.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TranscriptionError {
    /// The backend answered with a non-success status.
    #[error("Transcription API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// The request never got an answer.
    #[error("Transcription request failed: {0}")]
    Transport(String),
    /// The backend answered but the body was not understood.
    #[error("Invalid transcription response: {0}")]
    InvalidResponse(String),
}

/// Turns one utterance into text.
///
/// Implementations receive a complete WAV file (see [`crate::wav::ulaw_to_wav`])
/// and own any temporary resources they need for the upload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, TranscriptionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let api = TranscriptionError::Api {
            status: 401,
            message: "Invalid API key".to_string(),
        };
        assert_eq!(
            api.to_string(),
            "Transcription API error (401): Invalid API key"
        );

        let transport = TranscriptionError::Transport("connection reset".to_string());
        assert_eq!(
            transport.to_string(),
            "Transcription request failed: connection reset"
        );
    }
}
