pub mod markup;
pub mod render;
pub mod slots;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};

use crate::gateway::events::{GatewayEvent, ReadySupplementalData, SoundboardSoundsData};
use crate::gateway::GatewayHandle;
use crate::models::user::{UserData, UserInfo};
use crate::models::voice::VoiceState;
use crate::rest::SoundboardApi;
use crate::error::AppError;
use crate::storage::{stored_name, SoundStore, StoredSoundIndex};
use crate::viewers::{ViewerHandle, ViewerRegistry};
use render::RenderContext;
use slots::SlotTable;

const COMMAND_CAPACITY: usize = 100;

/// The guild, voice channel and account the relay acts for.
#[derive(Debug, Clone)]
pub struct Target {
    pub guild_id: String,
    pub channel_id: String,
    pub operator_id: String,
}

/// Point-in-time copy of the board for request handlers.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub table: SlotTable,
    pub presence: bool,
}

pub enum BoardCommand {
    Gateway(GatewayEvent),
    StoredSoundsChanged(Arc<StoredSoundIndex>),
    /// An auto-save gave up. `permanent` failures are not retried.
    SaveFailed { name: String, permanent: bool },
    Welcome(ViewerHandle),
    Snapshot(oneshot::Sender<BoardSnapshot>),
}

#[derive(Debug, thiserror::Error)]
#[error("board task is not running")]
pub struct BoardClosed;

/// Cloneable handle to the board task.
#[derive(Clone)]
pub struct BoardHandle {
    tx: mpsc::Sender<BoardCommand>,
}

impl BoardHandle {
    async fn send(&self, cmd: BoardCommand) -> Result<(), BoardClosed> {
        self.tx.send(cmd).await.map_err(|_| BoardClosed)
    }

    pub async fn gateway_event(&self, event: GatewayEvent) -> Result<(), BoardClosed> {
        self.send(BoardCommand::Gateway(event)).await
    }

    pub async fn stored_sounds_changed(&self, index: StoredSoundIndex) -> Result<(), BoardClosed> {
        self.send(BoardCommand::StoredSoundsChanged(Arc::new(index)))
            .await
    }

    /// Push the full board to a newly registered viewer.
    pub async fn welcome(&self, viewer: ViewerHandle) -> Result<(), BoardClosed> {
        self.send(BoardCommand::Welcome(viewer)).await
    }

    pub async fn snapshot(&self) -> Result<BoardSnapshot, BoardClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(BoardCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| BoardClosed)
    }
}

struct AutoSave {
    api: Arc<dyn SoundboardApi>,
    store: SoundStore,
}

/// Sole owner of the slot table and everything rendered from it.
pub struct Board {
    target: Target,
    table: SlotTable,
    users: HashMap<String, UserInfo>,
    presence: bool,
    stored: Arc<ArcSwap<StoredSoundIndex>>,
    viewers: Arc<ViewerRegistry>,
    gateway: GatewayHandle,
    auto_save: Option<AutoSave>,
    pending_saves: HashSet<String>,
    unsaveable: HashSet<String>,
}

impl Board {
    pub fn new(
        target: Target,
        viewers: Arc<ViewerRegistry>,
        gateway: GatewayHandle,
        stored: Arc<ArcSwap<StoredSoundIndex>>,
    ) -> Self {
        Self {
            target,
            table: SlotTable::new(),
            users: HashMap::new(),
            presence: false,
            stored,
            viewers,
            gateway,
            auto_save: None,
            pending_saves: HashSet::new(),
            unsaveable: HashSet::new(),
        }
    }

    /// Cache every sound that shows up on the board but not on disk.
    pub fn with_auto_save(mut self, api: Arc<dyn SoundboardApi>, store: SoundStore) -> Self {
        self.auto_save = Some(AutoSave { api, store });
        self
    }

    pub fn spawn(self) -> BoardHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = BoardHandle { tx: tx.clone() };
        tokio::spawn(self.run(rx, tx.downgrade()));
        handle
    }

    async fn run(mut self, mut rx: mpsc::Receiver<BoardCommand>, me: mpsc::WeakSender<BoardCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                BoardCommand::Gateway(event) => self.on_gateway_event(event, &me),
                BoardCommand::StoredSoundsChanged(index) => {
                    self.pending_saves.retain(|name| !index.contains(name));
                    self.stored.store(index);
                    self.broadcast(self.render_full());
                }
                BoardCommand::SaveFailed { name, permanent } => {
                    self.pending_saves.remove(&name);
                    if permanent {
                        self.unsaveable.insert(name);
                    }
                }
                BoardCommand::Welcome(viewer) => viewer.push(Arc::from(self.render_full())),
                BoardCommand::Snapshot(reply) => {
                    let _ = reply.send(BoardSnapshot {
                        table: self.table.clone(),
                        presence: self.presence,
                    });
                }
            }
        }
        tracing::debug!("board task stopped");
    }

    fn on_gateway_event(&mut self, event: GatewayEvent, me: &mpsc::WeakSender<BoardCommand>) {
        tracing::trace!("gateway event {}", event.name());
        match event {
            GatewayEvent::Ready(ready) => {
                if let Some(user) = ready.user.as_ref() {
                    tracing::info!("gateway ready as {} ({})", user.username, user.id);
                }
                for user in ready.user.iter().chain(ready.users.iter()) {
                    self.cache_user(user);
                }
            }
            GatewayEvent::ReadySupplemental(data) => {
                let presence = self.presence_from_supplemental(&data);
                if presence != self.presence {
                    self.presence = presence;
                    self.broadcast(self.render_full());
                }
            }
            GatewayEvent::SoundboardSounds(data) => self.on_soundboard_sounds(data, me),
            GatewayEvent::SoundCreated(data) | GatewayEvent::SoundDeleted(data) => {
                if data.guild_id.as_deref().is_some_and(|g| g != self.target.guild_id) {
                    return;
                }
                self.gateway.request_soundboard_sounds();
            }
            GatewayEvent::VoiceStateUpdate(vs) => self.on_voice_state(&vs),
            GatewayEvent::Unknown(_) => {}
        }
    }

    fn cache_user(&mut self, user: &UserData) {
        let Some(avatar) = user.avatar.as_ref().filter(|a| !a.is_empty()) else {
            return;
        };
        self.users.insert(
            user.id.clone(),
            UserInfo {
                username: user.username.clone(),
                avatar: Some(avatar.clone()),
            },
        );
    }

    fn presence_from_supplemental(&self, data: &ReadySupplementalData) -> bool {
        data.guilds
            .iter()
            .filter(|g| g.id == self.target.guild_id)
            .flat_map(|g| g.voice_states.iter())
            .any(|vs| {
                vs.channel_id.as_deref() == Some(self.target.channel_id.as_str())
                    && vs
                        .user_id
                        .as_deref()
                        .is_none_or(|u| u == self.target.operator_id)
            })
    }

    fn on_voice_state(&mut self, vs: &VoiceState) {
        if vs.user_id.as_deref() != Some(self.target.operator_id.as_str())
            || vs.guild_id.as_deref() != Some(self.target.guild_id.as_str())
        {
            return;
        }
        self.presence = vs.channel_id.as_deref() == Some(self.target.channel_id.as_str());
        tracing::info!("operator presence in target channel: {}", self.presence);
        // Every send control depends on presence, stored-sound cards included.
        self.broadcast(self.render_full());
    }

    fn on_soundboard_sounds(&mut self, data: SoundboardSoundsData, me: &mpsc::WeakSender<BoardCommand>) {
        if data.guild_id != self.target.guild_id {
            return;
        }
        for user in data.soundboard_sounds.iter().filter_map(|s| s.user.as_ref()) {
            self.cache_user(user);
        }

        let changes = self.table.reconcile(&data.soundboard_sounds);
        tracing::debug!(
            "soundboard snapshot: {} sounds, {} slots changed",
            self.table.occupied_count(),
            changes.len()
        );
        if !changes.is_empty() {
            let stored = self.stored.load();
            let ctx = self.context(&stored);
            let html = render::render_changes(&ctx, &self.table, &changes);
            self.broadcast(html);
        }

        self.schedule_auto_save(me);
    }

    fn schedule_auto_save(&mut self, me: &mpsc::WeakSender<BoardCommand>) {
        let Some(auto_save) = self.auto_save.as_ref() else {
            return;
        };
        let stored = self.stored.load();
        for (_, slot) in self.table.occupied() {
            let key = stored_name(&slot.name);
            if stored.contains(&key)
                || self.unsaveable.contains(&key)
                || !self.pending_saves.insert(key.clone())
            {
                continue;
            }
            let api = auto_save.api.clone();
            let store = auto_save.store.clone();
            let me = me.clone();
            let sound_id = slot.sound_id.clone();
            let name = slot.name.clone();
            tokio::spawn(async move {
                let result = store.save_remote(api.as_ref(), &sound_id, &name).await;
                let Some(tx) = me.upgrade() else {
                    return;
                };
                let cmd = match result {
                    Ok(index) => BoardCommand::StoredSoundsChanged(Arc::new(index)),
                    Err(e) => {
                        tracing::warn!("couldn't cache sound {name}: {e:?}");
                        BoardCommand::SaveFailed {
                            name: key,
                            permanent: matches!(
                                e,
                                AppError::PayloadTooLarge(_) | AppError::BadRequest(_)
                            ),
                        }
                    }
                };
                let _ = tx.send(cmd).await;
            });
        }
    }

    fn context<'a>(&'a self, stored: &'a StoredSoundIndex) -> RenderContext<'a> {
        RenderContext {
            presence: self.presence,
            operator_id: &self.target.operator_id,
            users: &self.users,
            stored,
        }
    }

    fn render_full(&self) -> String {
        let stored = self.stored.load();
        let ctx = self.context(&stored);
        render::render_board(&ctx, &self.table)
    }

    fn broadcast(&self, html: String) {
        let sent = self.viewers.broadcast(Arc::from(html));
        tracing::trace!("pushed fragment to {sent} viewers");
    }
}
