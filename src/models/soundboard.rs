use serde::{Deserialize, Serialize};

use super::user::UserData;

/// Number of soundboard positions available on the guild.
pub const SLOT_COUNT: usize = 8;

/// One position on the soundboard. The ordinal is the slot's index in the
/// table; an empty `sound_id` means the position is free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SoundboardSlot {
    pub sound_id: String,
    pub name: String,
    pub owner_id: String,
    pub owner_avatar: Option<String>,
}

impl SoundboardSlot {
    pub fn is_empty(&self) -> bool {
        self.sound_id.is_empty()
    }

    /// Builds a populated slot, or `None` when the remote record is missing
    /// any of the fields an occupied slot requires.
    pub fn from_remote(sound: &RemoteSound) -> Option<Self> {
        if sound.sound_id.is_empty() || sound.name.is_empty() || sound.user_id.is_empty() {
            return None;
        }
        let owner_avatar = sound
            .user
            .as_ref()
            .and_then(|u| u.avatar.clone())
            .filter(|a| !a.is_empty());
        Some(Self {
            sound_id: sound.sound_id.clone(),
            name: sound.name.clone(),
            owner_id: sound.user_id.clone(),
            owner_avatar,
        })
    }
}

/// A sound as listed in a SOUNDBOARD_SOUNDS gateway snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSound {
    #[serde(default)]
    pub sound_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user: Option<UserData>,
}

/// Response body of a successful sound upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSound {
    pub name: String,
    pub sound_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub volume: f32,
}
