use serde::{Deserialize, Serialize};

/// User object as embedded in gateway and REST payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Cached display metadata for a sound's owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub avatar: Option<String>,
}
