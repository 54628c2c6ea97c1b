use crate::core::io::Storage;
use crate::services::catalog::{AvatarProfile, VoiceProfile};
use crate::services::generation::GenerationResult;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const KEY_SCRIPT: &str = "script.json";
pub const KEY_AVATAR: &str = "avatar.json";
pub const KEY_VOICE: &str = "voice.json";
pub const KEY_RESULT: &str = "result.json";

/// Cross-step wizard state, one JSON record per key.
///
/// `load_*` returns `Ok(None)` for a key that was never written; the step
/// guard acts on that missing sentinel. Serialization and storage errors
/// propagate to the caller and are not retried.
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    root: String,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, root: &str) -> Self {
        Self {
            storage,
            root: root.to_string(),
        }
    }

    fn key_path(&self, key: &str) -> String {
        Path::new(&self.root).join(key).to_string_lossy().to_string()
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.key_path(key);
        if !self.storage.exists(&path).await? {
            return Ok(None);
        }
        let bytes = self.storage.read(&path).await?;
        let content = String::from_utf8(bytes)?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session record {}", key))?;
        Ok(Some(value))
    }

    async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize session record {}", key))?;
        self.storage
            .write(&self.key_path(key), content.as_bytes())
            .await
    }

    pub async fn load_script(&self) -> Result<Option<String>> {
        self.get(KEY_SCRIPT).await
    }

    pub async fn save_script(&self, text: &str) -> Result<()> {
        self.put(KEY_SCRIPT, &text).await
    }

    pub async fn load_avatar(&self) -> Result<Option<AvatarProfile>> {
        self.get(KEY_AVATAR).await
    }

    pub async fn save_avatar(&self, avatar: &AvatarProfile) -> Result<()> {
        self.put(KEY_AVATAR, avatar).await
    }

    pub async fn load_voice(&self) -> Result<Option<VoiceProfile>> {
        self.get(KEY_VOICE).await
    }

    pub async fn save_voice(&self, voice: &VoiceProfile) -> Result<()> {
        self.put(KEY_VOICE, voice).await
    }

    pub async fn load_result(&self) -> Result<Option<GenerationResult>> {
        self.get(KEY_RESULT).await
    }

    pub async fn save_result(&self, result: &GenerationResult) -> Result<()> {
        self.put(KEY_RESULT, result).await
    }

    /// Deletes every session record. Used by "start over" on the result
    /// screen.
    pub async fn clear(&self) -> Result<()> {
        for key in [KEY_SCRIPT, KEY_AVATAR, KEY_VOICE, KEY_RESULT] {
            self.storage.delete(&self.key_path(key)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::services::catalog::Catalog;

    fn store(root: &Path) -> SessionStore {
        SessionStore::new(Arc::new(NativeStorage::new()), &root.to_string_lossy())
    }

    #[tokio::test]
    async fn test_missing_key_is_none() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let session = store(temp_dir.path());

        assert!(session.load_script().await?.is_none());
        assert!(session.load_avatar().await?.is_none());
        assert!(session.load_voice().await?.is_none());
        assert!(session.load_result().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_roundtrip() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let session = store(temp_dir.path());
        let catalog = Catalog::builtin();

        session.save_script("Hello world").await?;
        session.save_avatar(&catalog.avatars[0]).await?;
        session.save_voice(&catalog.voices[1]).await?;

        assert_eq!(session.load_script().await?.as_deref(), Some("Hello world"));
        assert_eq!(session.load_avatar().await?, Some(catalog.avatars[0].clone()));
        assert_eq!(session.load_voice().await?, Some(catalog.voices[1].clone()));
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_is_last_write_wins() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let session = store(temp_dir.path());
        let catalog = Catalog::builtin();

        session.save_avatar(&catalog.avatars[0]).await?;
        session.save_avatar(&catalog.avatars[1]).await?;

        assert_eq!(session.load_avatar().await?, Some(catalog.avatars[1].clone()));
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_removes_everything() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let session = store(temp_dir.path());
        let catalog = Catalog::builtin();

        session.save_script("text").await?;
        session.save_avatar(&catalog.avatars[0]).await?;
        session.clear().await?;

        assert!(session.load_script().await?.is_none());
        assert!(session.load_avatar().await?.is_none());
        Ok(())
    }
}
