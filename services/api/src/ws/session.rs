//! Manages the lifecycle of one call's media stream.
//!
//! Each accepted caller WebSocket gets its own [`CallSession`] and its own
//! model connection. Both sockets are multiplexed in a single task, so the
//! session's handlers run one at a time. When either side closes or fails,
//! the other side is closed and the session is dropped.

use super::realtime::{self, ModelSink, ModelSource};
use crate::state::AppState;
use anyhow::{Context, Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use phonebridge_core::{
    caller::{CallerEvent, CallerInstruction},
    realtime::ServerEvent,
    relay::{CallSession, Outbound},
};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{self, protocol::Message as WsMessage};
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

type CallerSink = SplitSink<WebSocket, Message>;

/// Axum handler to upgrade the media stream request to a WebSocket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

#[instrument(name = "call", skip_all, fields(call_id = %Uuid::new_v4(), stream_sid))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("Caller connected.");
    if let Err(e) = run_call(socket, state).await {
        error!(error = ?e, "Call terminated with error.");
    }
    info!("Caller disconnected.");
}

/// The main event loop for one call.
async fn run_call(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (mut caller_tx, mut caller_rx) = socket.split();
    let mut session = CallSession::new(state.transcriber.clone(), state.conversation_log.clone());

    // The model is dialled while the caller's first frames arrive; until it is
    // ready the session drops caller audio.
    let connect = realtime::connect(&state.config, &state.bootstrap);
    tokio::pin!(connect);
    let mut connecting = true;
    let mut model_tx: Option<ModelSink> = None;
    let mut model_rx: Option<ModelSource> = None;

    let result = loop {
        tokio::select! {
            biased;
            connected = &mut connect, if connecting => {
                connecting = false;
                match connected {
                    Ok(stream) => {
                        let (tx, rx) = stream.split();
                        model_tx = Some(tx);
                        model_rx = Some(rx);
                        session.set_model_ready(true);
                        info!("Model session ready.");
                    }
                    Err(e) => break Err(e),
                }
            },
            // Handle frames from the caller's media stream.
            msg = caller_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(event) = parse_caller_event(text.as_str()) else { continue };
                    if let CallerEvent::Start { start } = &event {
                        tracing::Span::current().record("stream_sid", start.stream_sid.as_str());
                    }
                    let outbound = session.handle_caller_event(event).await;
                    if let Err(e) = dispatch(outbound, &mut caller_tx, &mut model_tx).await {
                        break Err(e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Caller closed the media stream.");
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(anyhow!(e).context("Caller WebSocket error")),
            },
            // Handle events from the model.
            msg = next_model_message(&mut model_rx) => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    let Some(event) = parse_model_event(text.as_str()) else { continue };
                    let outbound = session.handle_model_event(event).await;
                    if let Err(e) = dispatch(outbound, &mut caller_tx, &mut model_tx).await {
                        break Err(e);
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "Model closed the connection.");
                    break Ok(());
                }
                None => {
                    info!("Model connection ended.");
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(anyhow!(e).context("Model WebSocket error")),
            },
        }
    };

    // Tear down whichever side is still open.
    if let Some(mut tx) = model_tx.take() {
        let _ = tx.close().await;
    }
    let _ = caller_tx.close().await;
    result
}

fn parse_caller_event(text: &str) -> Option<CallerEvent> {
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Dropping malformed caller event.");
            None
        }
    }
}

fn parse_model_event(text: &str) -> Option<ServerEvent> {
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Dropping malformed model event.");
            None
        }
    }
}

async fn next_model_message(
    model_rx: &mut Option<ModelSource>,
) -> Option<Result<WsMessage, tungstenite::Error>> {
    match model_rx {
        Some(rx) => rx.next().await,
        None => std::future::pending().await,
    }
}

/// Sends a handler's output to the two sockets, preserving its order.
async fn dispatch(
    outbound: Vec<Outbound>,
    caller_tx: &mut CallerSink,
    model_tx: &mut Option<ModelSink>,
) -> Result<()> {
    for message in outbound {
        match message {
            Outbound::ToCaller(instruction) => send_msg(caller_tx, &instruction)
                .await
                .context("Failed to send to caller")?,
            Outbound::ToModel(event) => match model_tx {
                Some(tx) => realtime::send_event(tx, &event)
                    .await
                    .context("Failed to send to model")?,
                None => debug!(?event, "Model not connected, dropping event."),
            },
        }
    }
    Ok(())
}

/// A helper function to serialize and send a `CallerInstruction` to the caller.
pub(crate) async fn send_msg(
    caller_tx: &mut CallerSink,
    instruction: &CallerInstruction,
) -> Result<()> {
    let serialized = serde_json::to_string(instruction)?;
    trace!(%serialized, "Sending to caller");
    caller_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, router::create_router};
    use async_trait::async_trait;
    use futures_util::Stream;
    use phonebridge_core::{
        bootstrap::SessionBootstrap,
        conversation::{ConversationLog, Role},
        transcription::{Transcriber, TranscriptionError},
    };
    use serde_json::{Value, json};
    use std::{net::SocketAddr, path::PathBuf, time::Duration};
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, connect_async};

    const WAIT: Duration = Duration::from_secs(3);

    struct SilentTranscriber;

    #[async_trait]
    impl Transcriber for SilentTranscriber {
        async fn transcribe(&self, _wav: Vec<u8>) -> Result<String, TranscriptionError> {
            Ok(String::new())
        }
    }

    struct NullLog;

    #[async_trait]
    impl ConversationLog for NullLog {
        async fn append(&self, _role: Role, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_config(realtime_url: String) -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            openai_api_key: "test-key".to_string(),
            realtime_url,
            realtime_model: "test-model".to_string(),
            voice: "alloy".to_string(),
            temperature: 0.8,
            greeting: "Hi!".to_string(),
            transcription_url: "http://127.0.0.1:9/transcribe".to_string(),
            transcription_model: "whisper-1".to_string(),
            transcription_language: "en".to_string(),
            conversation_log_path: PathBuf::from("unused.txt"),
            log_level: tracing::Level::INFO,
            prompts_path: PathBuf::from("./prompts"),
        }
    }

    /// Serves the relay on an ephemeral port, dialling the model at `realtime_url`.
    async fn spawn_relay(realtime_url: String) -> SocketAddr {
        let state = Arc::new(AppState {
            config: Arc::new(test_config(realtime_url)),
            transcriber: Arc::new(SilentTranscriber),
            conversation_log: Arc::new(NullLog),
            bootstrap: Arc::new(SessionBootstrap::new("Be brief.")),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, create_router(state)).await });
        addr
    }

    async fn next_json<S>(socket: &mut S) -> Value
    where
        S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(WAIT, socket.next())
                .await
                .expect("timed out waiting for a message")
                .expect("socket ended")
                .expect("socket error");
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn assert_closed<S>(socket: &mut S)
    where
        S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        loop {
            match tokio::time::timeout(WAIT, socket.next())
                .await
                .expect("socket was left open")
            {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    }

    async fn send_json<S>(socket: &mut S, value: Value)
    where
        S: futures_util::Sink<WsMessage> + Unpin,
        S::Error: std::fmt::Debug,
    {
        socket
            .send(WsMessage::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    /// Accepts the relay's model connection and consumes the bootstrap.
    async fn accept_model(
        listener: &TcpListener,
    ) -> tokio_tungstenite::WebSocketStream<tokio::net::TcpStream> {
        let (tcp, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("relay never dialled the model")
            .unwrap();
        let mut model = accept_async(tcp).await.unwrap();
        let kinds: Vec<Value> = [
            next_json(&mut model).await,
            next_json(&mut model).await,
            next_json(&mut model).await,
        ]
        .into_iter()
        .map(|m| m["type"].clone())
        .collect();
        assert_eq!(
            kinds,
            vec![
                json!("session.update"),
                json!("conversation.item.create"),
                json!("response.create")
            ]
        );
        model
    }

    #[tokio::test]
    async fn test_call_relays_between_caller_and_model() {
        let model_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let model_url = format!("ws://{}", model_listener.local_addr().unwrap());
        let relay = spawn_relay(model_url).await;

        let (mut caller, _) = connect_async(format!("ws://{relay}/media-stream"))
            .await
            .unwrap();
        let mut model = accept_model(&model_listener).await;

        send_json(
            &mut caller,
            json!({"event": "start", "start": {"streamSid": "S1"}}),
        )
        .await;

        // Readiness is flipped by the relay's own loop, so resend until a frame lands.
        let mut appended = None;
        for ts in (0..20u64).map(|i| i * 20) {
            send_json(
                &mut caller,
                json!({"event": "media", "media": {"payload": "AAAA", "timestamp": ts.to_string()}}),
            )
            .await;
            if let Ok(Some(Ok(WsMessage::Text(text)))) =
                tokio::time::timeout(Duration::from_millis(150), model.next()).await
            {
                appended = Some(serde_json::from_str::<Value>(text.as_str()).unwrap());
                break;
            }
        }
        assert_eq!(
            appended,
            Some(json!({"type": "input_audio_buffer.append", "audio": "AAAA"}))
        );

        send_json(
            &mut model,
            json!({"type": "response.audio.delta", "delta": "ZZZZ", "item_id": "R1"}),
        )
        .await;
        assert_eq!(
            next_json(&mut caller).await,
            json!({"event": "media", "streamSid": "S1", "media": {"payload": "ZZZZ"}})
        );
        assert_eq!(
            next_json(&mut caller).await,
            json!({"event": "mark", "streamSid": "S1", "mark": {"name": "responsePart"}})
        );

        model.close(None).await.unwrap();
        assert_closed(&mut caller).await;
    }

    #[tokio::test]
    async fn test_caller_close_closes_model() {
        let model_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let model_url = format!("ws://{}", model_listener.local_addr().unwrap());
        let relay = spawn_relay(model_url).await;

        let (mut caller, _) = connect_async(format!("ws://{relay}/media-stream"))
            .await
            .unwrap();
        let mut model = accept_model(&model_listener).await;

        caller.close(None).await.unwrap();
        assert_closed(&mut model).await;
    }

    #[tokio::test]
    async fn test_model_failure_closes_caller() {
        // Nothing listens on this address once the listener is dropped.
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let model_url = format!("ws://{}", unused.local_addr().unwrap());
        drop(unused);
        let relay = spawn_relay(model_url).await;

        let (mut caller, _) = connect_async(format!("ws://{relay}/media-stream"))
            .await
            .unwrap();
        assert_closed(&mut caller).await;
    }

    #[test]
    fn test_parse_caller_event() {
        assert_eq!(
            parse_caller_event(r#"{"event":"stop","streamSid":"MZ1"}"#),
            Some(CallerEvent::Stop)
        );
        assert_eq!(parse_caller_event("not json"), None);
        assert_eq!(parse_caller_event(r#"{"event":"media"}"#), None);
    }

    #[test]
    fn test_parse_model_event() {
        assert_eq!(
            parse_model_event(r#"{"type":"input_audio_buffer.speech_started"}"#),
            Some(ServerEvent::SpeechStarted)
        );
        assert_eq!(
            parse_model_event(r#"{"type":"response.text.delta","delta":"x"}"#),
            Some(ServerEvent::Other)
        );
        assert_eq!(parse_model_event("{"), None);
    }

    #[tokio::test]
    async fn test_pending_model_source_never_yields() {
        let mut model_rx: Option<ModelSource> = None;
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            next_model_message(&mut model_rx),
        )
        .await;
        assert!(result.is_err());
    }
}
