use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::soundboard::RemoteSound;
use crate::models::user::UserData;
use crate::models::voice::{GuildVoiceStates, VoiceState};

/// Opcodes for gateway messages.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
    pub const REQUEST_SOUNDBOARD_SOUNDS: u8 = 31;
}

/// Close codes.
pub mod close_code {
    pub const AUTHENTICATION_FAILED: u16 = 4004;
}

/// Client capability bits sent with IDENTIFY.
pub const CAPABILITIES: u64 = 30717;

/// Gateway message envelope.
#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub d: Option<Value>,
}

/// READY payload data.
#[derive(Debug, Default, Deserialize)]
pub struct ReadyData {
    #[serde(default)]
    pub user: Option<UserData>,
    #[serde(default)]
    pub users: Vec<UserData>,
}

/// READY_SUPPLEMENTAL payload data.
#[derive(Debug, Default, Deserialize)]
pub struct ReadySupplementalData {
    #[serde(default)]
    pub guilds: Vec<GuildVoiceStates>,
}

/// SOUNDBOARD_SOUNDS payload data.
#[derive(Debug, Default, Deserialize)]
pub struct SoundboardSoundsData {
    pub guild_id: String,
    #[serde(default)]
    pub soundboard_sounds: Vec<RemoteSound>,
}

/// GUILD_SOUNDBOARD_SOUND_CREATE / _DELETE payload data. Only the guild is
/// used; the event is a signal to re-request the full list.
#[derive(Debug, Default, Deserialize)]
pub struct GuildSoundData {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub sound_id: Option<String>,
}

/// Dispatch events the relay understands.
#[derive(Debug)]
pub enum GatewayEvent {
    Ready(ReadyData),
    ReadySupplemental(ReadySupplementalData),
    SoundboardSounds(SoundboardSoundsData),
    SoundCreated(GuildSoundData),
    SoundDeleted(GuildSoundData),
    VoiceStateUpdate(VoiceState),
    Unknown(String),
}

impl GatewayEvent {
    /// Decode a dispatch by event name. Unrecognised names become `Unknown`
    /// without looking at the data.
    pub fn decode(name: &str, data: Value) -> Result<Self, serde_json::Error> {
        let event = match name {
            "READY" => GatewayEvent::Ready(serde_json::from_value(data)?),
            "READY_SUPPLEMENTAL" => GatewayEvent::ReadySupplemental(serde_json::from_value(data)?),
            "SOUNDBOARD_SOUNDS" => GatewayEvent::SoundboardSounds(serde_json::from_value(data)?),
            "GUILD_SOUNDBOARD_SOUND_CREATE" => {
                GatewayEvent::SoundCreated(serde_json::from_value(data)?)
            }
            "GUILD_SOUNDBOARD_SOUND_DELETE" => {
                GatewayEvent::SoundDeleted(serde_json::from_value(data)?)
            }
            "VOICE_STATE_UPDATE" => GatewayEvent::VoiceStateUpdate(serde_json::from_value(data)?),
            other => GatewayEvent::Unknown(other.to_string()),
        };
        Ok(event)
    }

    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::Ready(_) => "READY",
            GatewayEvent::ReadySupplemental(_) => "READY_SUPPLEMENTAL",
            GatewayEvent::SoundboardSounds(_) => "SOUNDBOARD_SOUNDS",
            GatewayEvent::SoundCreated(_) => "GUILD_SOUNDBOARD_SOUND_CREATE",
            GatewayEvent::SoundDeleted(_) => "GUILD_SOUNDBOARD_SOUND_DELETE",
            GatewayEvent::VoiceStateUpdate(_) => "VOICE_STATE_UPDATE",
            GatewayEvent::Unknown(name) => name,
        }
    }
}

/// Browser client properties the gateway and API expect from a user session.
pub fn client_properties() -> Value {
    json!({
        "os": "Windows",
        "browser": "Chrome",
        "device": "",
        "system_locale": "en-US",
        "browser_user_agent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
        "browser_version": "125.0.0.0",
        "os_version": "10",
        "referrer": "https://www.google.com/",
        "referring_domain": "www.google.com",
        "search_engine": "google",
        "referrer_current": "",
        "referring_domain_current": "",
        "release_channel": "stable",
        "client_build_number": 301920,
        "client_event_source": null,
        "design_id": 0
    })
}

pub fn identify_frame(token: &str) -> String {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "capabilities": CAPABILITIES,
            "properties": client_properties(),
            "presence": {
                "status": "unknown",
                "since": 0,
                "activities": [],
                "afk": false
            },
            "compress": false,
            "client_state": { "guild_versions": {} }
        }
    })
    .to_string()
}

pub fn request_soundboard_sounds_frame(guild_id: &str) -> String {
    json!({
        "op": opcode::REQUEST_SOUNDBOARD_SOUNDS,
        "d": { "guild_ids": [guild_id] }
    })
    .to_string()
}

pub fn heartbeat_frame(last_seq: Option<u64>) -> String {
    json!({ "op": opcode::HEARTBEAT, "d": last_seq }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_soundboard_snapshot() {
        let data = json!({
            "guild_id": "g1",
            "soundboard_sounds": [
                { "sound_id": "s1", "name": "boo", "user_id": "u1",
                  "user": { "id": "u1", "username": "ann", "avatar": "av" } }
            ]
        });
        let event = GatewayEvent::decode("SOUNDBOARD_SOUNDS", data).unwrap();
        let GatewayEvent::SoundboardSounds(snapshot) = event else {
            panic!("expected SoundboardSounds, got {event:?}");
        };
        assert_eq!(snapshot.guild_id, "g1");
        assert_eq!(snapshot.soundboard_sounds.len(), 1);
        assert_eq!(snapshot.soundboard_sounds[0].name, "boo");
        let user = snapshot.soundboard_sounds[0].user.as_ref().unwrap();
        assert_eq!(user.avatar.as_deref(), Some("av"));
    }

    #[test]
    fn decodes_voice_state_with_null_channel() {
        let data = json!({ "user_id": "u1", "guild_id": "g1", "channel_id": null });
        let event = GatewayEvent::decode("VOICE_STATE_UPDATE", data).unwrap();
        let GatewayEvent::VoiceStateUpdate(vs) = event else {
            panic!("expected VoiceStateUpdate");
        };
        assert_eq!(vs.user_id.as_deref(), Some("u1"));
        assert!(vs.channel_id.is_none());
    }

    #[test]
    fn unknown_events_fall_through() {
        let event = GatewayEvent::decode("TYPING_START", json!("not an object")).unwrap();
        assert!(matches!(event, GatewayEvent::Unknown(ref n) if n == "TYPING_START"));
    }

    #[test]
    fn malformed_known_event_is_an_error() {
        assert!(GatewayEvent::decode("SOUNDBOARD_SOUNDS", json!({ "soundboard_sounds": 5 })).is_err());
    }

    #[test]
    fn envelope_tolerates_missing_fields() {
        let payload: GatewayPayload = serde_json::from_str(r#"{"op":11}"#).unwrap();
        assert_eq!(payload.op, opcode::HEARTBEAT_ACK);
        assert!(payload.t.is_none() && payload.d.is_none() && payload.s.is_none());
    }

    #[test]
    fn frames_have_expected_shape() {
        let identify: Value = serde_json::from_str(&identify_frame("tok")).unwrap();
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "tok");
        assert_eq!(identify["d"]["capabilities"], 30717);
        assert_eq!(identify["d"]["compress"], false);

        let request: Value = serde_json::from_str(&request_soundboard_sounds_frame("g1")).unwrap();
        assert_eq!(request, json!({ "op": 31, "d": { "guild_ids": ["g1"] } }));

        let heartbeat: Value = serde_json::from_str(&heartbeat_frame(Some(42))).unwrap();
        assert_eq!(heartbeat, json!({ "op": 1, "d": 42 }));
        let first: Value = serde_json::from_str(&heartbeat_frame(None)).unwrap();
        assert_eq!(first, json!({ "op": 1, "d": null }));
    }
}
