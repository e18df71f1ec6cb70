use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::rest::SoundboardApi;

pub const MAX_SOUND_SIZE: usize = 512 * 1024; // 512 KB

pub const SOUND_EXTENSIONS: &[&str] = &["ogg", "mp3"];

/// A sound file cached in the sounds directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSound {
    pub name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl StoredSound {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.extension)
    }

    pub fn mime_type(&self) -> &'static str {
        ext_to_mime(&self.extension)
    }
}

/// Snapshot of the sounds directory, ordered case-insensitively by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSoundIndex {
    sounds: Vec<StoredSound>,
}

impl StoredSoundIndex {
    pub fn from_sounds(mut sounds: Vec<StoredSound>) -> Self {
        sounds.sort_by_key(|s| s.file_name().to_lowercase());
        Self { sounds }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredSound> {
        self.sounds.iter()
    }

    /// Look up a sound by display name, as it would be named on disk.
    pub fn get(&self, name: &str) -> Option<&StoredSound> {
        let on_disk = stored_name(name);
        self.sounds
            .iter()
            .find(|s| s.name == name || s.name == on_disk)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }
}

/// Directory-backed cache of downloaded sound files.
#[derive(Debug, Clone)]
pub struct SoundStore {
    dir: PathBuf,
}

impl SoundStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names of every cached sound, sorted case-insensitively.
    pub async fn list(&self) -> Result<Vec<String>, AppError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::Internal(format!("failed to read sounds directory: {e}")))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Internal(format!("failed to read directory entry: {e}")))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if split_sound_file(name).is_some() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_by_key(|n| n.to_lowercase());
        Ok(names)
    }

    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>, AppError> {
        let file_name = checked_file_name(file_name)?;
        let path = self.dir.join(file_name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("no stored sound named {file_name}")))
            }
            Err(e) => Err(AppError::Internal(format!(
                "failed to read sound file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Write a sound file. Returns the file name it was stored under.
    pub async fn write(&self, name: &str, extension: &str, bytes: &[u8]) -> Result<String, AppError> {
        if bytes.len() > MAX_SOUND_SIZE {
            return Err(AppError::PayloadTooLarge(format!(
                "sound exceeds maximum size of {} KB",
                MAX_SOUND_SIZE / 1024
            )));
        }
        let file_name = format!("{}.{extension}", stored_name(name));
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Internal(format!("failed to create sounds directory: {e}")))?;
        tokio::fs::write(self.dir.join(&file_name), bytes)
            .await
            .map_err(|e| AppError::Internal(format!("failed to write sound file: {e}")))?;
        Ok(file_name)
    }

    /// Rescan the directory and read every sound into memory.
    ///
    /// A file that cannot be read is indexed with no bytes.
    pub async fn load_index(&self) -> Result<StoredSoundIndex, AppError> {
        let mut sounds = Vec::new();
        for file_name in self.list().await? {
            let Some((name, extension)) = split_sound_file(&file_name) else {
                continue;
            };
            let bytes = match tokio::fs::read(self.dir.join(&file_name)).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("couldn't prefetch sound file {file_name}: {e}");
                    Vec::new()
                }
            };
            sounds.push(StoredSound {
                name: name.to_string(),
                extension: extension.to_string(),
                bytes,
            });
        }
        Ok(StoredSoundIndex::from_sounds(sounds))
    }

    /// Download a soundboard sound from the CDN into the cache and return the
    /// rebuilt index.
    pub async fn save_remote(
        &self,
        api: &dyn SoundboardApi,
        sound_id: &str,
        name: &str,
    ) -> Result<StoredSoundIndex, AppError> {
        let downloaded = api.download_sound(sound_id).await?;
        let extension = mime_to_ext(downloaded.content_type.as_deref().unwrap_or_default());
        let file_name = self.write(name, extension, &downloaded.bytes).await?;
        tracing::info!("saved sound {sound_id} as {file_name}");
        self.load_index().await
    }
}

/// Split `name.ext` into its stem and a supported extension.
pub fn split_sound_file(file_name: &str) -> Option<(&str, &str)> {
    let (name, ext) = file_name.rsplit_once('.')?;
    if name.is_empty() || !SOUND_EXTENSIONS.contains(&ext) {
        return None;
    }
    Some((name, ext))
}

/// Reject anything that could escape the sounds directory.
fn checked_file_name(file_name: &str) -> Result<&str, AppError> {
    if file_name.is_empty()
        || file_name.starts_with('.')
        || file_name.contains(['/', '\\', '\0'])
    {
        return Err(AppError::BadRequest(format!(
            "invalid sound file name: {file_name}"
        )));
    }
    Ok(file_name)
}

/// The file stem a sound called `name` is saved under.
pub fn stored_name(name: &str) -> String {
    let name = name.replace(['/', '\\', '\0'], "_");
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        "sound".to_string()
    } else {
        name.to_string()
    }
}

pub fn mime_to_ext(content_type: &str) -> &'static str {
    match content_type {
        "audio/mpeg" | "audio/mpeg3" | "audio/mp3" => "mp3",
        _ => "ogg",
    }
}

pub fn ext_to_mime(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        _ => "audio/ogg",
    }
}

/// A fresh, not-yet-created directory under the system temp dir.
pub fn temp_storage_path() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("soundrelay-test-{}", uuid::Uuid::new_v4()));
    path
}
