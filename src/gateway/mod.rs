pub mod events;
pub mod heartbeat;
pub mod session;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::board::BoardHandle;
use events::request_soundboard_sounds_frame;
use session::{run_session, GatewayConfig, SessionState};

const OUTBOUND_CAPACITY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to dial gateway: {0}")]
    Dial(String),
    #[error("failed to identify: {0}")]
    Identify(String),
    #[error("gateway invalidated the session")]
    InvalidSession,
    #[error("gateway rejected the token")]
    AuthenticationFailed,
    #[error("failed writing to gateway: {0}")]
    Write(String),
    #[error("failed reading from gateway: {0}")]
    Read(String),
    #[error("gateway closed the connection (code {0:?})")]
    Closed(Option<u16>),
    #[error("gateway requested a reconnect")]
    ReconnectRequested,
    #[error("board task stopped")]
    BoardClosed,
    #[error("gave up after {attempts} consecutive failures, last: {last}")]
    RetryBudgetExhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Critical errors end the process; everything else is retried.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            GatewayError::Dial(_)
                | GatewayError::Identify(_)
                | GatewayError::InvalidSession
                | GatewayError::AuthenticationFailed
                | GatewayError::BoardClosed
                | GatewayError::RetryBudgetExhausted { .. }
        )
    }
}

/// Cloneable sender for frames destined to the upstream gateway.
#[derive(Clone)]
pub struct GatewayHandle {
    tx: mpsc::Sender<String>,
    guild_id: Arc<str>,
}

impl GatewayHandle {
    pub fn channel(guild_id: &str) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let handle = Self {
            tx,
            guild_id: Arc::from(guild_id),
        };
        (handle, rx)
    }

    /// Ask the gateway to re-send the target guild's soundboard list.
    /// Never blocks; returns false when the request could not be queued.
    pub fn request_soundboard_sounds(&self) -> bool {
        match self
            .tx
            .try_send(request_soundboard_sounds_frame(&self.guild_id))
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("couldn't queue soundboard refresh: {e}");
                false
            }
        }
    }
}

/// Owns the gateway connection across reconnects.
pub struct Supervisor {
    config: GatewayConfig,
    board: BoardHandle,
    outbound: mpsc::Receiver<String>,
    state: watch::Sender<SessionState>,
}

impl Supervisor {
    pub fn new(config: GatewayConfig, board: BoardHandle, outbound: mpsc::Receiver<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            board,
            outbound,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run sessions until a critical failure. Only returns on error.
    pub async fn run(mut self) -> GatewayError {
        let mut failures = 0u32;
        let mut delay = self.config.initial_backoff;
        let mut ever_ready = false;

        loop {
            let end = run_session(&self.config, &self.board, &mut self.outbound, &self.state).await;
            self.state.send_replace(SessionState::Disconnected);

            if end.received_ready {
                ever_ready = true;
                failures = 0;
                delay = self.config.initial_backoff;
            }

            let redial = ever_ready && matches!(end.cause, GatewayError::Dial(_));
            if end.cause.is_critical() && !redial {
                tracing::error!("gateway session failed critically: {}", end.cause);
                return end.cause;
            }

            failures += 1;
            if failures >= self.config.retry_budget {
                return GatewayError::RetryBudgetExhausted {
                    attempts: failures,
                    last: Box::new(end.cause),
                };
            }

            self.state.send_replace(SessionState::Degraded);
            tracing::warn!(
                "gateway session ended: {}, reconnecting in {:?} ({failures}/{})",
                end.cause,
                delay,
                self.config.retry_budget
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.config.max_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failures() {
        assert!(GatewayError::AuthenticationFailed.is_critical());
        assert!(GatewayError::InvalidSession.is_critical());
        assert!(GatewayError::Dial("refused".into()).is_critical());
        assert!(!GatewayError::Read("reset".into()).is_critical());
        assert!(!GatewayError::ReconnectRequested.is_critical());
        assert!(!GatewayError::Closed(Some(1000)).is_critical());
    }

    #[tokio::test]
    async fn refresh_requests_are_queued_for_the_session() {
        let (handle, mut rx) = GatewayHandle::channel("g1");
        assert!(handle.request_soundboard_sounds());
        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["op"], 31);
        assert_eq!(frame["d"]["guild_ids"][0], "g1");
    }
}
