#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use http::{Method, Request};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, watch};

use soundrelay::board::{Board, BoardHandle, Target};
use soundrelay::gateway::events::{GatewayEvent, SoundboardSoundsData};
use soundrelay::gateway::session::SessionState;
use soundrelay::gateway::GatewayHandle;
use soundrelay::models::soundboard::{CreatedSound, RemoteSound};
use soundrelay::models::user::UserData;
use soundrelay::rest::{DownloadedSound, RestError, SoundboardApi};
use soundrelay::routes;
use soundrelay::state::AppState;
use soundrelay::storage::{self, SoundStore, StoredSoundIndex};
use soundrelay::viewers::ViewerRegistry;

pub const GUILD: &str = "g1";
pub const CHANNEL: &str = "c1";
pub const OPERATOR: &str = "me";

/// One recorded call against the fake REST collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Send(String),
    Delete(String),
    Create { name: String, mime: String, len: usize },
    Download(String),
}

/// In-memory `SoundboardApi` that records calls and can be told to fail.
#[derive(Default)]
pub struct FakeApi {
    pub calls: Mutex<Vec<ApiCall>>,
    pub fail: Mutex<bool>,
    pub download: Mutex<Option<DownloadedSound>>,
}

impl FakeApi {
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    fn record(&self, call: ApiCall) -> Result<(), RestError> {
        self.calls.lock().push(call);
        if *self.fail.lock() {
            return Err(RestError::ServerError {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SoundboardApi for FakeApi {
    async fn current_user(&self) -> Result<UserData, RestError> {
        Ok(UserData {
            id: OPERATOR.to_string(),
            username: "operator".to_string(),
            avatar: None,
        })
    }

    async fn send_sound(&self, _guild: &str, _channel: &str, sound_id: &str) -> Result<(), RestError> {
        self.record(ApiCall::Send(sound_id.to_string()))
    }

    async fn delete_sound(&self, _guild: &str, sound_id: &str) -> Result<(), RestError> {
        self.record(ApiCall::Delete(sound_id.to_string()))
    }

    async fn create_sound(
        &self,
        _guild: &str,
        name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<CreatedSound, RestError> {
        self.record(ApiCall::Create {
            name: name.to_string(),
            mime: mime_type.to_string(),
            len: data.len(),
        })?;
        Ok(CreatedSound {
            name: name.to_string(),
            sound_id: format!("new-{name}"),
            id: None,
            volume: 1.0,
        })
    }

    async fn download_sound(&self, sound_id: &str) -> Result<DownloadedSound, RestError> {
        self.record(ApiCall::Download(sound_id.to_string()))?;
        Ok(self.download.lock().clone().unwrap_or(DownloadedSound {
            bytes: b"remote-bytes".to_vec(),
            content_type: Some("audio/ogg".to_string()),
        }))
    }
}

/// Full application wired to a `FakeApi`, with the gateway outbound queue
/// kept so tests can see refresh requests.
pub struct TestApp {
    pub state: AppState,
    pub api: Arc<FakeApi>,
    pub outbound: mpsc::Receiver<String>,
    pub session: watch::Sender<SessionState>,
    pub sounds_dir: PathBuf,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_stored(&[]).await
    }

    /// Seed the sounds directory with `(file name, bytes)` pairs.
    pub async fn with_stored(files: &[(&str, &[u8])]) -> Self {
        let sounds_dir = storage::temp_storage_path();
        let store = SoundStore::new(sounds_dir.clone());
        std::fs::create_dir_all(&sounds_dir).unwrap();
        for (file_name, bytes) in files {
            std::fs::write(sounds_dir.join(file_name), bytes).unwrap();
        }
        let index = store.load_index().await.unwrap();
        let stored = Arc::new(ArcSwap::from_pointee(index));

        let api = Arc::new(FakeApi::default());
        let target = Target {
            guild_id: GUILD.to_string(),
            channel_id: CHANNEL.to_string(),
            operator_id: OPERATOR.to_string(),
        };
        let viewers = Arc::new(ViewerRegistry::new());
        let (gateway, outbound) = GatewayHandle::channel(GUILD);
        let board = Board::new(target.clone(), viewers.clone(), gateway.clone(), stored.clone()).spawn();
        let (session, session_rx) = watch::channel(SessionState::Subscribed);

        let state = AppState {
            board,
            viewers,
            gateway,
            api: api.clone(),
            store,
            stored,
            session: session_rx,
            target: Arc::new(target),
            static_dir: sounds_dir.clone(),
        };
        Self {
            state,
            api,
            outbound,
            session,
            sounds_dir,
        }
    }

    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    pub fn board(&self) -> &BoardHandle {
        &self.state.board
    }

    /// Feed a SOUNDBOARD_SOUNDS snapshot to the board and wait for it to apply.
    pub async fn load_board(&self, sounds: &[(&str, &str, &str)]) {
        let event = GatewayEvent::SoundboardSounds(SoundboardSoundsData {
            guild_id: GUILD.to_string(),
            soundboard_sounds: sounds
                .iter()
                .map(|(id, name, owner)| remote(id, name, owner))
                .collect(),
        });
        self.board().gateway_event(event).await.unwrap();
        self.board().snapshot().await.unwrap();
    }

    /// Number of refresh requests queued for the gateway since the last call.
    pub fn refresh_requests(&mut self) -> usize {
        std::iter::from_fn(|| self.outbound.try_recv().ok()).count()
    }

    pub fn stored_index(&self) -> StoredSoundIndex {
        self.state.stored.load().as_ref().clone()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.sounds_dir);
    }
}

pub fn remote(id: &str, name: &str, owner: &str) -> RemoteSound {
    RemoteSound {
        sound_id: id.to_string(),
        name: name.to_string(),
        user_id: owner.to_string(),
        user: None,
    }
}

/// Eight sounds numbered 0..8; even ones owned by the operator.
pub fn full_board() -> Vec<(String, String, String)> {
    (0..8)
        .map(|i| {
            let owner = if i % 2 == 0 { OPERATOR } else { "someone" };
            (format!("id{i}"), format!("sound{i}"), owner.to_string())
        })
        .collect()
}

pub fn as_refs(sounds: &[(String, String, String)]) -> Vec<(&str, &str, &str)> {
    sounds
        .iter()
        .map(|(a, b, c)| (a.as_str(), b.as_str(), c.as_str()))
        .collect()
}

pub fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    json_request(Method::POST, uri, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or_else(|_| json!(null))
}
