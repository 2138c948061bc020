//! Per-title repack layout: which files carry text, how their pointer tables
//! are shaped, where cross-references live and how to patch the executable.
//!
//! The layout is plain TOML. The Ao no Kiseki layout ships embedded and is
//! used when neither the command line nor the settings file name another.

use std::path::Path;

use crossbell_codec::{BinaryPatch, TextTableLayout};
use crossbell_core::{RepackError, Result};
use serde::{Deserialize, Serialize};

use crate::settings;

/// Embedded default layout.
const DEFAULT_CONFIG: &str = include_str!("../config/ao.toml");

/// Name reported for the embedded layout in errors.
const DEFAULT_CONFIG_NAME: &str = "<built-in ao.toml>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleConfig {
    pub title: String,
    /// Directory inside the disc image the game reads its data from.
    pub disc_root: String,
    /// Disc path of the executable, outside `disc_root`.
    pub eboot_path: String,

    pub text_dir: String,
    pub scenario_dir: String,
    #[serde(default = "default_scenario_glob")]
    pub scenario_glob: String,
    pub monster_dir: String,
    #[serde(default = "default_monster_glob")]
    pub monster_glob: String,

    #[serde(default)]
    pub text_files: Vec<TextFileConfig>,

    #[serde(default)]
    pub monster_note: Option<MonsterNoteConfig>,

    pub references: ReferenceConfig,

    #[serde(default)]
    pub eboot_patches: Vec<BinaryPatch>,
}

/// One pointer-table text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFileConfig {
    pub name: String,
    #[serde(flatten)]
    pub layout: TextTableLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterNoteConfig {
    pub path: String,
    /// Monster file numbers, `ms<number>.dat`, in archive order.
    pub files: Vec<String>,
}

/// Files the cross-reference fixer maintains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Master file index (`data.lst`).
    pub index_file: String,
    /// Files naming text files.
    #[serde(default)]
    pub text_backrefs: Vec<String>,
    /// Files naming monster files.
    #[serde(default)]
    pub monster_backrefs: Vec<String>,
    /// Files naming the monster note archive.
    #[serde(default)]
    pub monster_note_backrefs: Vec<String>,
    /// Map tables listing scenario files.
    pub map_dir: String,
    #[serde(default = "default_map_glob")]
    pub map_glob: String,
}

fn default_scenario_glob() -> String {
    "*.bin".to_string()
}

fn default_monster_glob() -> String {
    "ms*.dat".to_string()
}

fn default_map_glob() -> String {
    "*.mc1".to_string()
}

impl TitleConfig {
    /// Parse a layout from TOML text; `origin` names it in errors.
    pub fn from_toml(text: &str, origin: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| RepackError::Config {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text, &path.display().to_string())
    }

    /// The embedded Ao no Kiseki layout.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(DEFAULT_CONFIG, DEFAULT_CONFIG_NAME)
    }

    /// Resolve the layout to use: explicit path, then the settings file,
    /// then the embedded default.
    pub fn resolve(cli_override: Option<&Path>) -> Result<Self> {
        match settings::resolve_title_config(cli_override.map(Path::to_path_buf)) {
            Some(path) => {
                log::debug!("Using title config {}", path.display());
                Self::load(&path)
            }
            None => Self::builtin(),
        }
    }

    /// Path of a text file relative to the game root.
    pub fn text_path(&self, file: &TextFileConfig) -> String {
        format!("{}/{}", self.text_dir, file.name)
    }

    /// Path of monster file `ms<number>.dat`.
    pub fn monster_path(&self, number: &str) -> String {
        format!("{}/ms{}.dat", self.monster_dir, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbell_codec::text_table::CountWidth;

    #[test]
    fn test_builtin_config_parses() {
        let config = TitleConfig::builtin().unwrap();
        assert_eq!(config.disc_root, "PSP_GAME/USRDIR");
        assert!(!config.text_files.is_empty());
        assert_eq!(config.eboot_patches.len(), 4);
        assert_eq!(config.eboot_patches[0], BinaryPatch::zero(0x28DC80, 6));

        let note = config.monster_note.as_ref().unwrap();
        assert_eq!(note.files.first().map(String::as_str), Some("02102"));
        assert_eq!(note.files.last().map(String::as_str), Some("89302"));
        assert!(note.files.iter().all(|n| n.len() == 5));
    }

    #[test]
    fn test_text_layout_defaults() {
        let config = TitleConfig::builtin().unwrap();
        let book = config.text_files.iter().find(|f| f.name == "t_book00._dt").unwrap();
        assert_eq!(book.layout.count_width, CountWidth::U16);
        let item = &config.text_files[0];
        assert_eq!(config.text_path(item), "data/text/t_item._dt");
        assert_eq!(item.layout.count_width, CountWidth::U32);
        assert_eq!(item.layout.count_offset, 0);
    }

    #[test]
    fn test_monster_path() {
        let config = TitleConfig::builtin().unwrap();
        assert_eq!(config.monster_path("02102"), "data/battle/dat/ms02102.dat");
    }

    #[test]
    fn test_invalid_toml_names_origin() {
        let err = TitleConfig::from_toml("title = ", "custom.toml").unwrap_err();
        match err {
            RepackError::Config { path, .. } => assert_eq!(path, "custom.toml"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_path_wins() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        let mut config = TitleConfig::builtin().unwrap();
        config.title = "Custom".to_string();
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let resolved = TitleConfig::resolve(Some(&path)).unwrap();
        assert_eq!(resolved, config);
    }
}
