//! Shared user settings.
//!
//! The settings file is always `~/.config/crossbell/settings.toml`. It only
//! records which title config to use when none is given on the command line;
//! tables and keys it does not know about are kept on rewrite.

use std::path::{Path, PathBuf};

use crossbell_core::{RepackError, Result};
use serde::{Deserialize, Serialize};

/// Canonical path to the shared settings file: `~/.config/crossbell/settings.toml`.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("crossbell").join("settings.toml")
}

/// Contents of `settings.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "TitleSettings::is_empty")]
    pub title: TitleSettings,
    #[serde(flatten)]
    other: toml::Table,
}

/// The `[title]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TitleSettings {
    /// Title layout used when `--config` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
    #[serde(flatten)]
    other: toml::Table,
}

impl TitleSettings {
    fn is_empty(&self) -> bool {
        self.config.is_none() && self.other.is_empty()
    }
}

impl Settings {
    /// Read a settings file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let mut settings: Self = toml::from_str(&contents).map_err(|source| RepackError::Config {
            path: path.display().to_string(),
            source,
        })?;
        // An empty string clears the setting as well.
        if settings.title.config.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            settings.title.config = None;
        }
        Ok(settings)
    }

    /// Write the settings via a temporary file, creating the directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, self.to_toml()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RepackError::Io(std::io::Error::other(e)))
    }
}

/// Resolve the title config path using a priority chain:
///
/// 1. CLI override (if `Some`)
/// 2. Saved `title.config` in `settings.toml`
/// 3. `None`, meaning the embedded default
pub fn resolve_title_config(cli_override: Option<PathBuf>) -> Option<PathBuf> {
    if cli_override.is_some() {
        return cli_override;
    }
    match Settings::load(&settings_path()) {
        Ok(settings) => settings.title.config,
        Err(e) => {
            log::warn!("Ignoring unreadable settings: {}", e);
            None
        }
    }
}

/// Save (or clear) the title config path in `settings.toml`.
pub fn save_title_config(path: Option<&Path>) -> Result<()> {
    let settings_file = settings_path();
    let mut settings = Settings::load(&settings_file)?;
    settings.title.config = path.map(Path::to_path_buf);
    settings.save(&settings_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override_wins() {
        let path = PathBuf::from("custom.toml");
        assert_eq!(resolve_title_config(Some(path.clone())), Some(path));
    }

    #[test]
    fn test_set_and_clear_keeps_other_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("crossbell").join("settings.toml");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "[other]\nkeep = true\n\n[title]\nnote = \"x\"\n").unwrap();

        let mut settings = Settings::load(&file).unwrap();
        assert_eq!(settings.title.config, None);
        settings.title.config = Some(PathBuf::from("/games/ao.toml"));
        settings.save(&file).unwrap();

        let reloaded = Settings::load(&file).unwrap();
        assert_eq!(reloaded.title.config, Some(PathBuf::from("/games/ao.toml")));
        let text = std::fs::read_to_string(&file).unwrap();
        assert!(text.contains("keep = true"));
        assert!(text.contains("note = \"x\""));

        let mut cleared = reloaded;
        cleared.title.config = None;
        cleared.save(&file).unwrap();
        let text = std::fs::read_to_string(&file).unwrap();
        assert!(!text.contains("config"));
        assert!(text.contains("keep = true"));
    }

    #[test]
    fn test_missing_settings_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings = Settings::load(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_empty_path_means_unset() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("settings.toml");
        std::fs::write(&file, "[title]\nconfig = \"\"\n").unwrap();
        assert_eq!(Settings::load(&file).unwrap().title.config, None);
    }

    #[test]
    fn test_malformed_settings_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("settings.toml");
        std::fs::write(&file, "[title\n").unwrap();
        assert!(matches!(Settings::load(&file), Err(RepackError::Config { .. })));
    }
}
