use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::board::{BoardHandle, Target};
use crate::gateway::session::SessionState;
use crate::gateway::GatewayHandle;
use crate::rest::SoundboardApi;
use crate::storage::{SoundStore, StoredSoundIndex};
use crate::viewers::ViewerRegistry;

#[derive(Clone)]
pub struct AppState {
    pub board: BoardHandle,
    pub viewers: Arc<ViewerRegistry>,
    pub gateway: GatewayHandle,
    pub api: Arc<dyn SoundboardApi>,
    pub store: SoundStore,
    /// Latest stored-sound index; the board task publishes new ones.
    pub stored: Arc<ArcSwap<StoredSoundIndex>>,
    pub session: watch::Receiver<SessionState>,
    pub target: Arc<Target>,
    pub static_dir: PathBuf,
}
