//! File system facade over a disc image or a plain install directory.
//!
//! Codecs and the build pipeline only see [`FileSystem`]; which backend is
//! behind it is chosen once per run from the target format.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crossbell_core::{ByteCursor, RepackError, Result, TextEncoding};
use crossbell_iso::{DirectoryRecord, DiscImage, Placement};
use glob::{MatchOptions, Pattern};

/// Game file access by `/`- or `\`-separated path relative to the game root.
pub trait FileSystem {
    /// Load a whole file into a cursor decoding strings with `encoding`.
    fn open(&self, path: &str, encoding: TextEncoding) -> Result<ByteCursor>;

    /// Replace a file's contents.
    fn save(&mut self, path: &str, data: &[u8]) -> Result<Placement>;

    /// Files directly under `dir` whose name matches `pattern`, as sorted
    /// root-relative `/`-separated paths.
    fn list_children(&self, dir: &str, pattern: &str) -> Result<Vec<String>>;

    fn exists(&self, path: &str) -> bool;
}

/// Join path segments with `/`, dropping empty ones.
pub fn normalize_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// The final segment of a path.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| RepackError::validation(format!("invalid file pattern '{}': {}", pattern, e)))
}

fn name_matches(pattern: &Pattern, name: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };
    pattern.matches_with(name, options)
}

fn child_path(dir: &str, name: &str) -> String {
    let dir = normalize_path(dir);
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

// ---------------------------------------------------------------------------
// Disc backend
// ---------------------------------------------------------------------------

/// Disc image files under a fixed root directory (`PSP_GAME/USRDIR`).
pub struct DiscFileSystem {
    image: DiscImage,
    root: String,
}

impl DiscFileSystem {
    pub fn new(image: DiscImage, root: &str) -> Self {
        Self {
            image,
            root: normalize_path(root),
        }
    }

    pub fn image(&self) -> &DiscImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut DiscImage {
        &mut self.image
    }

    pub fn into_image(self) -> DiscImage {
        self.image
    }

    /// Image path for a root-relative path.
    pub fn full_path(&self, path: &str) -> String {
        let path = normalize_path(path);
        match (self.root.is_empty(), path.is_empty()) {
            (true, _) => path,
            (false, true) => self.root.clone(),
            (false, false) => format!("{}/{}", self.root, path),
        }
    }

    /// Directory record of a root-relative path.
    pub fn record(&self, path: &str) -> Result<&DirectoryRecord> {
        self.image.find(&self.full_path(path))
    }
}

impl FileSystem for DiscFileSystem {
    fn open(&self, path: &str, encoding: TextEncoding) -> Result<ByteCursor> {
        let data = self.image.read(&self.full_path(path))?;
        Ok(ByteCursor::new(data, encoding))
    }

    fn save(&mut self, path: &str, data: &[u8]) -> Result<Placement> {
        let full = self.full_path(path);
        self.image.replace(&full, data)
    }

    fn list_children(&self, dir: &str, pattern: &str) -> Result<Vec<String>> {
        let pattern = compile_pattern(pattern)?;
        let mut paths: Vec<String> = self
            .image
            .children(&self.full_path(dir))?
            .into_iter()
            .filter(|r| !r.is_dir && name_matches(&pattern, &r.name))
            .map(|r| child_path(dir, &r.name))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn exists(&self, path: &str) -> bool {
        self.image.contains(&self.full_path(path))
    }
}

// ---------------------------------------------------------------------------
// Directory backend
// ---------------------------------------------------------------------------

/// A game installed as plain files under a root directory.
///
/// Saves are staged in memory and only reach the directory on [`flush`],
/// so an aborted run leaves the install as it was.
///
/// [`flush`]: DirectoryFileSystem::flush
pub struct DirectoryFileSystem {
    root: PathBuf,
    staged: BTreeMap<String, Vec<u8>>,
}

impl DirectoryFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staged: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root-relative paths with pending writes.
    pub fn staged(&self) -> impl Iterator<Item = &str> {
        self.staged.keys().map(String::as_str)
    }

    /// Write every staged file to disk. Returns the number written.
    pub fn flush(&mut self) -> Result<usize> {
        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();
        for (path, data) in staged {
            let native = self.native_path(&path);
            let tmp = native.with_extension(format!(
                "{}.tmp",
                native.extension().and_then(|e| e.to_str()).unwrap_or("")
            ));
            std::fs::write(&tmp, &data).map_err(|e| map_io(e, &tmp))?;
            std::fs::rename(&tmp, &native).map_err(|e| map_io(e, &native))?;
            log::debug!("Wrote {}", native.display());
        }
        Ok(count)
    }

    fn native_path(&self, path: &str) -> PathBuf {
        path.split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

fn map_io(err: std::io::Error, path: &Path) -> RepackError {
    if err.kind() == std::io::ErrorKind::NotFound {
        RepackError::not_found(path.display().to_string())
    } else {
        RepackError::Io(err)
    }
}

impl FileSystem for DirectoryFileSystem {
    fn open(&self, path: &str, encoding: TextEncoding) -> Result<ByteCursor> {
        if let Some(data) = self.staged.get(&normalize_path(path)) {
            return Ok(ByteCursor::new(data.clone(), encoding));
        }
        let native = self.native_path(path);
        let data = std::fs::read(&native).map_err(|e| map_io(e, &native))?;
        Ok(ByteCursor::new(data, encoding))
    }

    fn save(&mut self, path: &str, data: &[u8]) -> Result<Placement> {
        let native = self.native_path(path);
        match native.parent() {
            Some(parent) if parent.is_dir() => {}
            _ => return Err(RepackError::not_found(native.display().to_string())),
        }
        self.staged.insert(normalize_path(path), data.to_vec());
        Ok(Placement::InPlace)
    }

    fn list_children(&self, dir: &str, pattern: &str) -> Result<Vec<String>> {
        let pattern = compile_pattern(pattern)?;
        let native = self.native_path(dir);
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&native).map_err(|e| map_io(e, &native))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                log::warn!("Skipping non-UTF-8 file name in {}", native.display());
                continue;
            };
            if name_matches(&pattern, name) {
                paths.push(child_path(dir, name));
            }
        }
        let prefix = child_path(dir, "");
        for path in self.staged.keys() {
            let Some(name) = path.strip_prefix(&prefix) else {
                continue;
            };
            if !name.contains('/') && name_matches(&pattern, name) && !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn exists(&self, path: &str) -> bool {
        self.staged.contains_key(&normalize_path(path)) || self.native_path(path).is_file()
    }
}

#[cfg(test)]
#[path = "tests/fs_tests.rs"]
mod tests;
