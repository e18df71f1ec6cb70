use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::sync::Arc;

use crate::board::{markup, BoardSnapshot};
use crate::error::AppError;
use crate::models::soundboard::CreatedSound;
use crate::state::AppState;
use crate::storage::{ext_to_mime, split_sound_file, MAX_SOUND_SIZE};

#[derive(Debug, Deserialize)]
pub struct SendSoundInput {
    #[serde(rename = "soundID")]
    pub sound_id: String,
    #[serde(default)]
    pub ordinal: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AddSoundInput {
    #[serde(rename = "soundLocation")]
    pub sound_location: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSoundInput {
    #[serde(rename = "soundID")]
    pub sound_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveSoundInput {
    #[serde(rename = "soundID")]
    pub sound_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SwapSoundInput {
    pub add: AddSoundInput,
    #[serde(default)]
    pub delete: Option<DeleteSoundInput>,
}

#[derive(Debug, Deserialize)]
pub struct QuickplayQuery {
    #[serde(rename = "soundLocation", default)]
    pub sound_location: String,
    #[serde(default)]
    pub ordinal: String,
}

async fn snapshot(state: &AppState) -> Result<BoardSnapshot, AppError> {
    state.board.snapshot().await.map_err(|_| AppError::Unavailable)
}

fn notify_played(state: &AppState, element_id: &str, sound_id: &str) {
    state
        .viewers
        .broadcast(Arc::from(markup::play_notice(element_id, sound_id)));
}

async fn send(state: &AppState, sound_id: &str) -> Result<(), AppError> {
    state
        .api
        .send_sound(&state.target.guild_id, &state.target.channel_id, sound_id)
        .await?;
    tracing::info!("sent sound {sound_id}");
    Ok(())
}

async fn delete(state: &AppState, sound_id: &str) -> Result<(), AppError> {
    state
        .api
        .delete_sound(&state.target.guild_id, sound_id)
        .await?;
    tracing::info!("deleted sound {sound_id}");
    Ok(())
}

/// Upload a cached sound to the soundboard. `freed` names a sound that was
/// just deleted to make room; the board may not reflect that yet.
async fn upload_stored(
    state: &AppState,
    sound_location: &str,
    freed: Option<&str>,
) -> Result<CreatedSound, AppError> {
    let (name, extension) = split_sound_file(sound_location).ok_or_else(|| {
        AppError::BadRequest(format!("not a stored sound file: {sound_location}"))
    })?;

    let board = snapshot(state).await?;
    if let Some((_, slot)) = board.table.find_by_name(name) {
        if Some(slot.sound_id.as_str()) != freed {
            return Err(AppError::Conflict(format!("{name} is already on the soundboard")));
        }
    }
    if freed.is_none() && board.table.is_full() {
        return Err(AppError::Conflict("soundboard is full".to_string()));
    }

    let cached = state
        .stored
        .load()
        .get(name)
        .filter(|s| s.extension == extension && !s.bytes.is_empty())
        .map(|s| s.bytes.clone());
    let bytes = match cached {
        Some(bytes) => bytes,
        None => state.store.read(sound_location).await?,
    };
    if bytes.len() > MAX_SOUND_SIZE {
        return Err(AppError::PayloadTooLarge(format!(
            "sound exceeds maximum size of {} KB",
            MAX_SOUND_SIZE / 1024
        )));
    }

    let created = state
        .api
        .create_sound(&state.target.guild_id, name, ext_to_mime(extension), &bytes)
        .await?;
    tracing::info!("added {sound_location} to the soundboard as {}", created.sound_id);
    Ok(created)
}

pub async fn send_sound(
    State(state): State<AppState>,
    Json(input): Json<SendSoundInput>,
) -> Result<StatusCode, AppError> {
    if input.sound_id.is_empty() {
        return Err(AppError::BadRequest("soundID is required".to_string()));
    }
    send(&state, &input.sound_id).await?;
    let element_id = input.ordinal.map(markup::slot_id).unwrap_or_default();
    notify_played(&state, &element_id, &input.sound_id);
    Ok(StatusCode::ACCEPTED)
}

pub async fn add_sound(
    State(state): State<AppState>,
    Json(input): Json<AddSoundInput>,
) -> Result<StatusCode, AppError> {
    upload_stored(&state, &input.sound_location, None).await?;
    state.gateway.request_soundboard_sounds();
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_sound(
    State(state): State<AppState>,
    Json(input): Json<DeleteSoundInput>,
) -> Result<StatusCode, AppError> {
    if input.sound_id.is_empty() {
        return Err(AppError::BadRequest("soundID is required".to_string()));
    }
    delete(&state, &input.sound_id).await?;
    state.gateway.request_soundboard_sounds();
    Ok(StatusCode::ACCEPTED)
}

pub async fn save_sound(
    State(state): State<AppState>,
    Json(input): Json<SaveSoundInput>,
) -> Result<StatusCode, AppError> {
    if input.sound_id.is_empty() || input.name.is_empty() {
        return Err(AppError::BadRequest("soundID and name are required".to_string()));
    }
    if state.stored.load().contains(&input.name) {
        return Err(AppError::Conflict(format!("{} is already saved", input.name)));
    }
    let index = state
        .store
        .save_remote(state.api.as_ref(), &input.sound_id, &input.name)
        .await?;
    state
        .board
        .stored_sounds_changed(index)
        .await
        .map_err(|_| AppError::Unavailable)?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn swap_sound(
    State(state): State<AppState>,
    Json(input): Json<SwapSoundInput>,
) -> Result<StatusCode, AppError> {
    let freed = match input.delete.filter(|d| !d.sound_id.is_empty()) {
        Some(d) => {
            delete(&state, &d.sound_id).await?;
            Some(d.sound_id)
        }
        None => None,
    };
    let result = upload_stored(&state, &input.add.sound_location, freed.as_deref()).await;
    // The delete already happened upstream, so refresh either way.
    state.gateway.request_soundboard_sounds();
    result?;
    Ok(StatusCode::ACCEPTED)
}

/// Play a stored sound by name, uploading it first if it is not on the
/// board. A full board gives up one of the operator's own sounds.
pub async fn quickplay(
    State(state): State<AppState>,
    Query(query): Query<QuickplayQuery>,
) -> Result<StatusCode, AppError> {
    if query.sound_location.is_empty() || query.ordinal.is_empty() {
        return Err(AppError::BadRequest(
            "soundLocation and ordinal are required".to_string(),
        ));
    }
    let name = query.sound_location.as_str();

    let board = snapshot(&state).await?;
    if let Some((_, slot)) = board.table.find_by_name(name) {
        send(&state, &slot.sound_id).await?;
        notify_played(&state, &query.ordinal, &slot.sound_id);
        return Ok(StatusCode::ACCEPTED);
    }

    let file_name = state
        .stored
        .load()
        .get(name)
        .map(|s| s.file_name())
        .ok_or_else(|| AppError::NotFound(format!("no stored sound named {name}")))?;

    let mut freed = None;
    if board.table.is_full() {
        let mine: Vec<&str> = board
            .table
            .owned_by(&state.target.operator_id)
            .map(|(_, s)| s.sound_id.as_str())
            .collect();
        let victim = mine
            .choose(&mut rand::thread_rng())
            .map(|id| id.to_string())
            .ok_or_else(|| {
                AppError::Conflict("soundboard is full and holds none of your sounds".to_string())
            })?;
        delete(&state, &victim).await?;
        freed = Some(victim);
    }

    let result = async {
        let created = upload_stored(&state, &file_name, freed.as_deref()).await?;
        send(&state, &created.sound_id).await?;
        notify_played(&state, &query.ordinal, &created.sound_id);
        Ok::<_, AppError>(())
    }
    .await;
    state.gateway.request_soundboard_sounds();
    result?;
    Ok(StatusCode::ACCEPTED)
}
