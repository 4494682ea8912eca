//! Handles the WebSocket connection to the realtime speech model.

use crate::config::Config;
use anyhow::{Context, Result};
use futures_util::{Sink, SinkExt, stream::SplitSink, stream::SplitStream};
use phonebridge_core::{
    bootstrap::{SETTLE_DELAY, SessionBootstrap},
    realtime::ClientEvent,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info};

pub type ModelStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type ModelSink = SplitSink<ModelStream, WsMessage>;
pub type ModelSource = SplitStream<ModelStream>;

/// Connects to the realtime model and configures the session.
///
/// The returned stream has already received the bootstrap messages, so the
/// caller's audio can be forwarded as soon as this resolves.
pub async fn connect(config: &Config, bootstrap: &SessionBootstrap) -> Result<ModelStream> {
    let mut request = config.realtime_endpoint().into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", config.openai_api_key).parse()?,
    );
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (mut stream, _) = connect_async(request)
        .await
        .context("Failed to connect to realtime model WebSocket")?;
    info!(model = %config.realtime_model, "Connected to realtime model.");

    tokio::time::sleep(SETTLE_DELAY).await;
    for event in bootstrap.messages() {
        send_event(&mut stream, &event).await?;
    }
    debug!(voice = %bootstrap.voice, "Model session bootstrapped.");
    Ok(stream)
}

/// Serializes and sends one event to the model.
pub async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let serialized = serde_json::to_string(event)?;
    sink.send(WsMessage::Text(serialized.into())).await?;
    Ok(())
}
