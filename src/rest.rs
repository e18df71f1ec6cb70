use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;

use crate::gateway::events::client_properties;
use crate::models::soundboard::CreatedSound;
use crate::models::user::UserData;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    ServerError { status: u16, body: String },
}

/// Raw bytes of a sound fetched from the CDN.
#[derive(Debug, Clone)]
pub struct DownloadedSound {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Soundboard operations against the Discord API. Calls are single
/// attempts; callers decide whether to retry.
#[async_trait]
pub trait SoundboardApi: Send + Sync {
    async fn current_user(&self) -> Result<UserData, RestError>;

    async fn send_sound(
        &self,
        guild_id: &str,
        channel_id: &str,
        sound_id: &str,
    ) -> Result<(), RestError>;

    async fn delete_sound(&self, guild_id: &str, sound_id: &str) -> Result<(), RestError>;

    async fn create_sound(
        &self,
        guild_id: &str,
        name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<CreatedSound, RestError>;

    async fn download_sound(&self, sound_id: &str) -> Result<DownloadedSound, RestError>;
}

pub struct DiscordRestClient {
    client: Client,
    api_url: String,
    cdn_url: String,
    token: String,
    super_properties: String,
}

impl DiscordRestClient {
    pub fn new(api_url: &str, cdn_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            cdn_url: cdn_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            super_properties: STANDARD.encode(client_properties().to_string()),
        }
    }

    fn apply_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", &self.token)
            .header("X-Super-Properties", &self.super_properties)
    }

    async fn check(resp: Response) -> Result<Response, RestError> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RestError::ServerError { status, body });
        }
        Ok(resp)
    }
}

/// Encode audio as the `data:` URI the upload endpoint expects.
pub fn audio_data_uri(mime_type: &str, data: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(data))
}

#[async_trait]
impl SoundboardApi for DiscordRestClient {
    async fn current_user(&self) -> Result<UserData, RestError> {
        let url = format!("{}/api/v9/users/@me", self.api_url);
        let resp = self.apply_auth(self.client.get(&url)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn send_sound(
        &self,
        guild_id: &str,
        channel_id: &str,
        sound_id: &str,
    ) -> Result<(), RestError> {
        let url = format!(
            "{}/api/v9/channels/{channel_id}/send-soundboard-sound",
            self.api_url
        );
        let builder = self.client.post(&url).json(&json!({
            "sound_id": sound_id,
            "emoji_id": null,
            "source_guild_id": guild_id,
        }));
        let resp = self.apply_auth(builder).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete_sound(&self, guild_id: &str, sound_id: &str) -> Result<(), RestError> {
        let start = Instant::now();
        let url = format!(
            "{}/api/v9/guilds/{guild_id}/soundboard-sounds/{sound_id}",
            self.api_url
        );
        let resp = self.apply_auth(self.client.delete(&url)).send().await?;
        Self::check(resp).await?;
        tracing::debug!("delete_sound took {:?}", start.elapsed());
        Ok(())
    }

    async fn create_sound(
        &self,
        guild_id: &str,
        name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<CreatedSound, RestError> {
        let start = Instant::now();
        let url = format!("{}/api/v9/guilds/{guild_id}/soundboard-sounds", self.api_url);
        let builder = self.client.post(&url).json(&json!({
            "name": name,
            "sound": audio_data_uri(mime_type, data),
        }));
        let resp = self.apply_auth(builder).send().await?;
        let created = Self::check(resp).await?.json().await?;
        tracing::debug!("create_sound took {:?}", start.elapsed());
        Ok(created)
    }

    async fn download_sound(&self, sound_id: &str) -> Result<DownloadedSound, RestError> {
        let url = format!("{}/soundboard-sounds/{sound_id}", self.cdn_url);
        let resp = Self::check(self.client.get(&url).send().await?).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?.to_vec();
        Ok(DownloadedSound {
            bytes,
            content_type,
        })
    }
}
