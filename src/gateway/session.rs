use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::events::{
    close_code, heartbeat_frame, identify_frame, opcode, request_soundboard_sounds_frame,
    GatewayEvent, GatewayPayload,
};
use super::GatewayError;
use crate::board::BoardHandle;

/// Lifecycle of the upstream gateway link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticated,
    Subscribed,
    /// Between a recoverable failure and the next connection attempt.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub token: String,
    pub guild_id: String,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub retry_budget: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// Why a session ended, and whether it got far enough to count as healthy.
#[derive(Debug)]
pub struct SessionEnd {
    pub cause: GatewayError,
    pub received_ready: bool,
}

impl SessionEnd {
    fn early(cause: GatewayError) -> Self {
        Self {
            cause,
            received_ready: false,
        }
    }
}

/// Run one gateway session from dial to teardown.
///
/// Outbound frames are taken from `outbound`, which outlives the session so
/// requests queued while reconnecting are delivered by the next one.
pub async fn run_session(
    config: &GatewayConfig,
    board: &BoardHandle,
    outbound: &mut mpsc::Receiver<String>,
    state: &watch::Sender<SessionState>,
) -> SessionEnd {
    state.send_replace(SessionState::Connecting);
    let ws = match tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()))
        .await
    {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => return SessionEnd::early(GatewayError::Dial(e.to_string())),
        Err(_) => return SessionEnd::early(GatewayError::Dial("connect timed out".to_string())),
    };
    let (mut sink, mut stream) = ws.split();

    if let Err(e) = sink
        .send(Message::Text(identify_frame(&config.token).into()))
        .await
    {
        return SessionEnd::early(GatewayError::Identify(e.to_string()));
    }
    state.send_replace(SessionState::Authenticated);

    if let Err(e) = sink
        .send(Message::Text(
            request_soundboard_sounds_frame(&config.guild_id).into(),
        ))
        .await
    {
        let _ = sink.close().await;
        return SessionEnd::early(GatewayError::Write(e.to_string()));
    }
    state.send_replace(SessionState::Subscribed);
    tracing::info!("gateway session subscribed to guild {}", config.guild_id);

    let seq = AtomicU64::new(0);
    let mut received_ready = false;
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let reader = async {
        let cause = read_loop(&mut stream, board, &seq, &mut received_ready).await;
        let _ = done_tx.send(());
        cause
    };
    let writer = write_loop(&mut sink, outbound, done_rx, &seq, config.heartbeat_interval);

    // The writer has returned by the time join! does, so the sink is free to close.
    let (cause, ()) = tokio::join!(reader, writer);
    let _ = sink.close().await;

    SessionEnd {
        cause,
        received_ready,
    }
}

async fn read_loop<S>(
    stream: &mut S,
    board: &BoardHandle,
    seq: &AtomicU64,
    received_ready: &mut bool,
) -> GatewayError
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let msg = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return GatewayError::Read(e.to_string()),
            None => return GatewayError::Closed(None),
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(frame) => {
                let code = frame.map(|f| u16::from(f.code));
                if code == Some(close_code::AUTHENTICATION_FAILED) {
                    return GatewayError::AuthenticationFailed;
                }
                return GatewayError::Closed(code);
            }
            _ => continue,
        };

        let payload: GatewayPayload = match serde_json::from_str(text.as_str()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("dropping undecodable gateway frame: {e}");
                continue;
            }
        };
        if let Some(s) = payload.s {
            seq.store(s, Ordering::Relaxed);
        }

        match payload.op {
            opcode::DISPATCH => {
                let (Some(name), Some(data)) = (payload.t, payload.d) else {
                    continue;
                };
                let event = match GatewayEvent::decode(&name, data) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("dropping malformed {name} event: {e}");
                        continue;
                    }
                };
                if matches!(event, GatewayEvent::Ready(_)) {
                    *received_ready = true;
                }
                if board.gateway_event(event).await.is_err() {
                    return GatewayError::BoardClosed;
                }
            }
            opcode::RECONNECT => return GatewayError::ReconnectRequested,
            opcode::INVALID_SESSION => return GatewayError::InvalidSession,
            opcode::HELLO | opcode::HEARTBEAT_ACK => {}
            other => tracing::debug!("ignoring gateway opcode {other}"),
        }
    }
}

async fn write_loop<S>(
    sink: &mut S,
    outbound: &mut mpsc::Receiver<String>,
    mut done: oneshot::Receiver<()>,
    seq: &AtomicU64,
    interval: Duration,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let heartbeat = tokio::time::sleep(interval);
    tokio::pin!(heartbeat);
    let mut outbound_open = true;

    loop {
        tokio::select! {
            biased;
            _ = &mut done => return,
            frame = outbound.recv(), if outbound_open => {
                let Some(frame) = frame else {
                    outbound_open = false;
                    continue;
                };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    tracing::error!("failed writing to gateway: {e}");
                }
                heartbeat.as_mut().reset(Instant::now() + interval);
            }
            _ = &mut heartbeat => {
                let last = match seq.load(Ordering::Relaxed) {
                    0 => None,
                    s => Some(s),
                };
                if sink.send(Message::Text(heartbeat_frame(last).into())).await.is_err() {
                    return;
                }
                heartbeat.as_mut().reset(Instant::now() + interval);
            }
        }
    }
}
