//! Translation set on disk.
//!
//! ```text
//! <root>/text/t_item.json      one array of TextItem per game file,
//! <root>/scena/c0100.json      named after the file stem
//! <root>/monster/ms02102.json
//! <root>/stringtable.json      shared scenario string table overrides
//! <root>/EBOOT.BIN             pre-built executable for the PSP target
//! ```
//!
//! A game file without a JSON file is left untouched.

use std::path::{Path, PathBuf};

use crossbell_core::{RepackError, Result, TextItem};

pub const TEXT: &str = "text";
pub const SCENARIO: &str = "scena";
pub const MONSTER: &str = "monster";

const STRING_TABLE_FILE: &str = "stringtable.json";
const EBOOT_FILE: &str = "EBOOT.BIN";

#[derive(Debug, Clone)]
pub struct TranslationSet {
    root: PathBuf,
}

impl TranslationSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// JSON path for a game file in a category, e.g. `text/t_item.json`.
    pub fn items_path(&self, category: &str, game_file: &str) -> PathBuf {
        let name = crate::fs::file_name(game_file);
        let stem = Path::new(name)
            .file_stem()
            .map_or_else(|| name.to_string(), |s| s.to_string_lossy().into_owned());
        self.root.join(category).join(format!("{}.json", stem))
    }

    /// Translation items for a game file, or `None` when there are none.
    pub fn items(&self, category: &str, game_file: &str) -> Result<Option<Vec<TextItem>>> {
        let path = self.items_path(category, game_file);
        if !path.is_file() {
            return Ok(None);
        }
        read_items(&path).map(Some)
    }

    /// Shared string table overrides; empty when the file is absent.
    pub fn string_table(&self) -> Result<Vec<TextItem>> {
        let path = self.root.join(STRING_TABLE_FILE);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        read_items(&path)
    }

    /// The replacement executable, if provided.
    pub fn eboot(&self) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(EBOOT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }
}

fn read_items(path: &Path) -> Result<Vec<TextItem>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| RepackError::Json {
        path: path.display().to_string(),
        source,
    })
}
