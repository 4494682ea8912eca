//! Main Entrypoint for the Call Relay Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the assistant persona from the prompts directory.
//! 3. Initializing the transcription client and the conversation log.
//! 4. Constructing the Axum router.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use phonebridge_api::{
    config::Config, conversation_log::FileConversationLog, router::create_router,
    state::AppState, transcription::HttpTranscriber,
};
use phonebridge_core::bootstrap::SessionBootstrap;
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down.");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = std::fs::read_dir(prompts_path)
        .with_context(|| format!("Failed to read prompts from {}", prompts_path.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content.trim().to_string());
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load the Persona ---
    let prompts = load_prompts(&config.prompts_path)?;
    let instructions = prompts
        .get("system_prompt")
        .context("system_prompt.md not found in prompts directory")?
        .clone();
    let bootstrap = SessionBootstrap {
        voice: config.voice.clone(),
        instructions,
        temperature: config.temperature,
        greeting: config.greeting.clone(),
    };

    // --- 4. Initialize Shared Services ---
    let http_client = reqwest::Client::new();
    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        transcriber: Arc::new(HttpTranscriber::from_config(http_client, &config)),
        conversation_log: Arc::new(FileConversationLog::new(
            config.conversation_log_path.clone(),
        )),
        bootstrap: Arc::new(bootstrap),
    });

    // --- 5. Create Router ---
    let app = create_router(app_state);

    // --- 6. Start Server ---
    info!(
        model = %config.realtime_model,
        voice = %config.voice,
        conversation_log = %config.conversation_log_path.display(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
