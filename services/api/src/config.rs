use phonebridge_core::bootstrap::{DEFAULT_GREETING, DEFAULT_TEMPERATURE, DEFAULT_VOICE};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub realtime_url: String,
    pub realtime_model: String,
    pub voice: String,
    pub temperature: f32,
    pub greeting: String,
    pub transcription_url: String,
    pub transcription_model: String,
    pub transcription_language: String,
    pub conversation_log_path: PathBuf,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = match std::env::var("BIND_ADDRESS") {
            Ok(addr) => addr,
            Err(_) => format!("0.0.0.0:{}", env_or("PORT", "5050")),
        };
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let realtime_url = env_or("REALTIME_URL", "wss://api.openai.com/v1/realtime");
        let realtime_model = env_or("REALTIME_MODEL", "gpt-4o-realtime-preview-2024-10-01");
        let voice = env_or("VOICE", DEFAULT_VOICE);
        let greeting = env_or("GREETING", DEFAULT_GREETING);

        let temperature = match std::env::var("TEMPERATURE") {
            Ok(raw) => raw.parse::<f32>().map_err(|_| {
                ConfigError::InvalidValue(
                    "TEMPERATURE".to_string(),
                    format!("'{}' is not a number", raw),
                )
            })?,
            Err(_) => DEFAULT_TEMPERATURE,
        };

        let transcription_url = env_or(
            "TRANSCRIPTION_URL",
            "https://api.openai.com/v1/audio/transcriptions",
        );
        let transcription_model = env_or("TRANSCRIPTION_MODEL", "whisper-1");
        let transcription_language = env_or("TRANSCRIPTION_LANGUAGE", "en");

        let conversation_log_path = PathBuf::from(env_or("CONVERSATION_LOG_PATH", "out.txt"));

        let log_level_str = env_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = PathBuf::from(env_or("PROMPTS_PATH", "./prompts"));

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_url,
            realtime_model,
            voice,
            temperature,
            greeting,
            transcription_url,
            transcription_model,
            transcription_language,
            conversation_log_path,
            log_level,
            prompts_path,
        })
    }

    /// Full URL of the realtime endpoint, including the model query.
    pub fn realtime_endpoint(&self) -> String {
        format!("{}?model={}", self.realtime_url, self.realtime_model)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
