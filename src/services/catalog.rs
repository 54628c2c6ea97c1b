use crate::core::config::Config;
use crate::core::io::Storage;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One avatar the generator can animate. Selecting an entry stores the whole
/// record, so downstream steps never have to look ids up again.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AvatarProfile {
    pub id: u32,
    pub name: String,
    pub media_ref: String,
    pub category: String,
}

/// One voice the generator can speak with. Preset voices carry a preview
/// reference; the custom entry has none.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VoiceProfile {
    pub id: u32,
    pub name: String,
    pub accent: String,
    pub category: String,
    pub preview_ref: Option<String>,
}

/// Ordered option lists for the selection steps. Order is display order.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Catalog {
    pub avatars: Vec<AvatarProfile>,
    pub voices: Vec<VoiceProfile>,
}

impl Catalog {
    /// Built-in presets: five stock entries plus the "Custom" placeholder.
    pub fn builtin() -> Self {
        let avatars = vec![
            avatar(1, "Emma", "previews/avatars/emma.mp3", "female"),
            avatar(2, "Michael", "previews/avatars/michael.mp3", "male"),
            avatar(3, "Sofia", "previews/avatars/sofia.mp3", "female"),
            avatar(4, "James", "previews/avatars/james.mp3", "male"),
            avatar(5, "Alex", "previews/avatars/alex.mp3", "neutral"),
            avatar(6, "Custom", "previews/avatars/custom.mp3", "custom"),
        ];
        let voices = vec![
            voice(1, "Emma", "American", "female", Some("previews/voices/emma.mp3")),
            voice(2, "Michael", "British", "male", Some("previews/voices/michael.mp3")),
            voice(3, "Sofia", "Spanish", "female", Some("previews/voices/sofia.mp3")),
            voice(4, "James", "Australian", "male", Some("previews/voices/james.mp3")),
            voice(5, "Alex", "American", "neutral", Some("previews/voices/alex.mp3")),
            voice(6, "Custom", "Upload", "custom", None),
        ];
        Self { avatars, voices }
    }

    /// Loads the catalog override named in the config, falling back to the
    /// built-in presets.
    pub async fn load(config: &Config, storage: &dyn Storage) -> Result<Self> {
        let catalog = if let Some(path) = &config.catalog_file {
            if storage.exists(path).await? {
                let bytes = storage.read(path).await?;
                let content = String::from_utf8(bytes)?;
                serde_yaml_ng::from_str(&content)
                    .with_context(|| format!("Failed to parse catalog file {}", path))?
            } else {
                log::warn!("Catalog file {} not found, using built-in presets", path);
                Self::builtin()
            }
        } else {
            Self::builtin()
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        if self.avatars.is_empty() {
            bail!("Catalog has no avatars");
        }
        if self.voices.is_empty() {
            bail!("Catalog has no voices");
        }

        let mut seen = HashSet::new();
        for a in &self.avatars {
            if !seen.insert(a.id) {
                bail!("Duplicate avatar id in catalog: {}", a.id);
            }
        }
        seen.clear();
        for v in &self.voices {
            if !seen.insert(v.id) {
                bail!("Duplicate voice id in catalog: {}", v.id);
            }
        }
        Ok(())
    }

    pub fn avatar(&self, id: u32) -> Option<&AvatarProfile> {
        self.avatars.iter().find(|a| a.id == id)
    }

    pub fn voice(&self, id: u32) -> Option<&VoiceProfile> {
        self.voices.iter().find(|v| v.id == id)
    }
}

fn avatar(id: u32, name: &str, media_ref: &str, category: &str) -> AvatarProfile {
    AvatarProfile {
        id,
        name: name.to_string(),
        media_ref: media_ref.to_string(),
        category: category.to_string(),
    }
}

fn voice(id: u32, name: &str, accent: &str, category: &str, preview_ref: Option<&str>) -> VoiceProfile {
    VoiceProfile {
        id,
        name: name.to_string(),
        accent: accent.to_string(),
        category: category.to_string(),
        preview_ref: preview_ref.map(|p| p.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;

    #[test]
    fn test_builtin_order_and_ids() {
        let catalog = Catalog::builtin();

        let avatar_names: Vec<&str> = catalog.avatars.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            avatar_names,
            ["Emma", "Michael", "Sofia", "James", "Alex", "Custom"]
        );
        let voice_names: Vec<&str> = catalog.voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(
            voice_names,
            ["Emma", "Michael", "Sofia", "James", "Alex", "Custom"]
        );

        assert_eq!(catalog.avatars.iter().map(|a| a.id).collect::<Vec<_>>(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(catalog.voices.iter().map(|v| v.id).collect::<Vec<_>>(), [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_builtin_previews() {
        let catalog = Catalog::builtin();

        for v in &catalog.voices[..5] {
            assert!(v.preview_ref.is_some(), "preset voice {} has no preview", v.name);
        }
        assert!(catalog.voices[5].preview_ref.is_none());
        assert_eq!(catalog.voices[5].category, "custom");
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut catalog = Catalog::builtin();
        catalog.voices[1].id = 1;
        assert!(catalog.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_override_file() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("catalog.yml");
        let yaml = r#"
avatars:
  - id: 1
    name: Nova
    media_ref: nova.mp3
    category: female
voices:
  - id: 1
    name: Nova
    accent: Irish
    category: female
    preview_ref: nova-voice.mp3
"#;
        std::fs::write(&path, yaml)?;

        let config = Config {
            catalog_file: Some(path.to_string_lossy().to_string()),
            ..Config::default()
        };
        let catalog = Catalog::load(&config, &NativeStorage::new()).await?;

        assert_eq!(catalog.avatars.len(), 1);
        assert_eq!(catalog.avatars[0].name, "Nova");
        assert_eq!(catalog.voices[0].accent, "Irish");
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_override_falls_back() -> Result<()> {
        let config = Config {
            catalog_file: Some("does-not-exist.yml".to_string()),
            ..Config::default()
        };
        let catalog = Catalog::load(&config, &NativeStorage::new()).await?;
        assert_eq!(catalog.avatars.len(), 6);
        Ok(())
    }
}
