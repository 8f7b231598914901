use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Gateway settings that survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(
        rename = "openclaw_gateway_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub gateway_url: Option<String>,
    #[serde(
        rename = "openclaw_gateway_token",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub gateway_token: Option<String>,
}

/// JSON file holding [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `path`, or at the per-user default location.
    pub fn open(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => default_path().context("Could not determine a settings directory")?,
        };
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file yields empty settings.
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            return Settings::default();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    tracing::info!("Loaded settings from {}", self.path.display());
                    settings
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse settings file {}, using defaults: {}",
                        self.path.display(),
                        e
                    );
                    Settings::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read settings file {}: {}", self.path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write settings file: {}", self.path.display()))?;
        tracing::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

/// `<config dir>/voice-ui/settings.json`
pub fn default_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-ui").join("settings.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty_settings() -> Result<()> {
        let dir = tempdir()?;
        let store = SettingsStore::new(dir.path().join("settings.json"));

        assert_eq!(store.load(), Settings::default());
        Ok(())
    }

    #[test]
    fn saved_settings_use_the_fixed_keys() -> Result<()> {
        let dir = tempdir()?;
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        let settings = Settings {
            gateway_url: Some("ws://127.0.0.1:8787/ws".to_string()),
            gateway_token: Some("s3cret".to_string()),
        };

        store.save(&settings)?;

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path())?)?;
        assert_eq!(raw["openclaw_gateway_url"], "ws://127.0.0.1:8787/ws");
        assert_eq!(raw["openclaw_gateway_token"], "s3cret");
        assert_eq!(store.load(), settings);
        Ok(())
    }

    #[test]
    fn cleared_token_is_omitted() -> Result<()> {
        let dir = tempdir()?;
        let store = SettingsStore::new(dir.path().join("settings.json"));

        store.save(&Settings {
            gateway_url: Some("ws://gateway/ws".to_string()),
            gateway_token: None,
        })?;

        let content = std::fs::read_to_string(store.path())?;
        assert!(!content.contains("openclaw_gateway_token"));
        Ok(())
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json")?;

        assert_eq!(SettingsStore::new(path).load(), Settings::default());
        Ok(())
    }
}
