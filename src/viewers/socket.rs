use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};

use super::{ViewerHandle, ViewerRegistry};
use crate::state::AppState;

/// Keepalive ping cadence for idle viewers.
pub const PING_INTERVAL: Duration = Duration::from_secs(5);
const PING_DEADLINE: Duration = Duration::from_secs(2);
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// How long a viewer may stall before it is disconnected.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub ping_interval: Duration,
    pub ping: Duration,
    pub write: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            ping: PING_DEADLINE,
            write: WRITE_DEADLINE,
        }
    }
}

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_with_deadline<S>(sink: &mut S, msg: Message, deadline: Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    matches!(tokio::time::timeout(deadline, sink.send(msg)).await, Ok(Ok(())))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let viewer = state.viewers.register();
    if state.board.welcome(viewer.clone()).await.is_err() {
        tracing::warn!("board unavailable, closing viewer {}", viewer.id());
        state.viewers.unregister(viewer.id());
        return;
    }

    serve_viewer(
        &state.viewers,
        &viewer,
        &mut ws_sink,
        &mut ws_stream,
        Deadlines::default(),
    )
    .await;
    let _ = ws_sink.close().await;
}

/// Pump queued fragments to one viewer until it leaves or stalls, then
/// unregister it.
pub async fn serve_viewer<S, R, E>(
    viewers: &ViewerRegistry,
    viewer: &ViewerHandle,
    sink: &mut S,
    stream: &mut R,
    deadlines: Deadlines,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let viewer_id = viewer.id();
    let mut ping = tokio::time::interval(deadlines.ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            payload = viewer.recv() => {
                let Some(payload) = payload else { break };
                if !send_with_deadline(sink, Message::Text(payload.to_string().into()), deadlines.write).await {
                    tracing::debug!("viewer {viewer_id} write failed");
                    break;
                }
                ping.reset();
            }
            _ = ping.tick() => {
                if !send_with_deadline(sink, Message::Ping(Bytes::from_static(b"ping")), deadlines.ping).await {
                    tracing::debug!("viewer {viewer_id} missed keepalive");
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Viewers only listen; anything else they send is ignored.
                    _ => {}
                }
            }
        }
    }

    viewers.unregister(viewer_id);
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;

    use futures_util::sink;

    use super::*;

    fn stalled_sink() -> impl Sink<Message> + Unpin {
        Box::pin(sink::unfold((), |(), _msg: Message| async move {
            std::future::pending::<Result<(), Infallible>>().await
        }))
    }

    fn quick(ping_interval: Duration) -> Deadlines {
        Deadlines {
            ping_interval,
            ping: Duration::from_millis(20),
            write: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn stalled_write_unregisters_the_viewer() {
        let viewers = ViewerRegistry::new();
        let viewer = viewers.register();
        viewer.push(Arc::from("<div>update</div>"));

        let mut sink = stalled_sink();
        let mut stream = futures_util::stream::pending::<Result<Message, Infallible>>();
        tokio::time::timeout(
            Duration::from_secs(2),
            serve_viewer(&viewers, &viewer, &mut sink, &mut stream, quick(Duration::from_secs(60))),
        )
        .await
        .expect("stalled viewer was never disconnected");
        assert!(viewers.is_empty());
        assert!(viewer.is_closed());
    }

    #[tokio::test]
    async fn missed_keepalive_unregisters_the_viewer() {
        let viewers = ViewerRegistry::new();
        let viewer = viewers.register();
        // Only the count fragment is queued; drain it so the ping fires first.
        while viewer.try_recv().is_some() {}

        let mut sink = stalled_sink();
        let mut stream = futures_util::stream::pending::<Result<Message, Infallible>>();
        tokio::time::timeout(
            Duration::from_secs(2),
            serve_viewer(&viewers, &viewer, &mut sink, &mut stream, quick(Duration::from_millis(20))),
        )
        .await
        .expect("viewer with a dead socket was never disconnected");
        assert!(viewers.is_empty());
    }

    #[tokio::test]
    async fn viewer_close_frame_ends_the_session() {
        let viewers = ViewerRegistry::new();
        let viewer = viewers.register();
        while viewer.try_recv().is_some() {}

        let mut sink = sink::drain::<Message>();
        let mut stream = futures_util::stream::iter([Ok::<_, Infallible>(Message::Close(None))]);
        serve_viewer(&viewers, &viewer, &mut sink, &mut stream, Deadlines::default()).await;
        assert!(viewers.is_empty());
    }
}
