use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceState {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Per-guild portion of READY_SUPPLEMENTAL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuildVoiceStates {
    pub id: String,
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,
}
