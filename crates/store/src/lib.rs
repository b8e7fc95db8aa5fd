//! `store` crate — flow documents on disk.
//!
//! Documents live as pretty-printed `.json` files in a single data
//! directory.  The path of the most recently saved document is remembered
//! in a marker file under a separate config directory.  No engine logic
//! lives here.

pub mod error;

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use engine::Flowchart;

pub use error::StoreError;

/// Marker file holding the path of the last saved document.
pub const LAST_OPENED_FILE: &str = "last_opened_file.txt";

/// Subdirectory of the per-user data and config directories.
pub const APP_DIR: &str = "flowrun";

const EXTENSION: &str = "json";

/// Loads and saves flow documents under a data directory.
#[derive(Debug, Clone)]
pub struct FlowStore {
    data_dir: PathBuf,
    config_dir: PathBuf,
}

impl FlowStore {
    /// Both directories are created lazily, on first save.
    pub fn new(data_dir: impl Into<PathBuf>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            config_dir: config_dir.into(),
        }
    }

    /// Per-user directories: `<data dir>/flowrun` for documents and
    /// `<config dir>/flowrun` for the marker.
    pub fn default_dirs() -> Result<(PathBuf, PathBuf), StoreError> {
        let data = dirs::data_dir().ok_or(StoreError::NoUserDir { kind: "data" })?;
        let config = dirs::config_dir().ok_or(StoreError::NoUserDir { kind: "config" })?;
        Ok((data.join(APP_DIR), config.join(APP_DIR)))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Full path for `name`, with `.json` appended when missing.
    ///
    /// # Errors
    /// [`StoreError::InvalidName`] unless `name` is a single plain file
    /// name, so documents never land outside the data directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let mut components = Path::new(name).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(StoreError::InvalidName { name: name.to_owned() });
        }

        let mut file = name.to_owned();
        if Path::new(name).extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            file.push('.');
            file.push_str(EXTENSION);
        }
        Ok(self.data_dir.join(file))
    }

    /// Write `document` as pretty-printed JSON and remember it as the last
    /// opened file.  Returns the path written.
    pub fn save<T: Serialize + ?Sized>(&self, document: &T, name: &str) -> Result<PathBuf, StoreError> {
        let json = serde_json::to_vec_pretty(document)?;
        self.write(&json, name)
    }

    /// Like [`FlowStore::save`] for a raw JSON document.  The bytes must be
    /// valid JSON; they are re-indented before writing.
    pub fn save_bytes(&self, bytes: &[u8], name: &str) -> Result<PathBuf, StoreError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        self.save(&value, name)
    }

    /// Raw bytes of the stored document `name`.
    pub fn load(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes = bytes.len(), "flow document loaded");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound { name: name.to_owned() }),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Load and parse the stored document `name`.
    pub fn load_flowchart(&self, name: &str) -> Result<Flowchart, StoreError> {
        Ok(Flowchart::parse(&self.load(name)?)?)
    }

    /// Path of the most recently saved document, if any.
    pub fn last_opened(&self) -> Result<Option<PathBuf>, StoreError> {
        let marker = self.config_dir.join(LAST_OPENED_FILE);
        match fs::read_to_string(&marker) {
            Ok(path) if path.trim().is_empty() => Ok(None),
            Ok(path) => Ok(Some(PathBuf::from(path.trim()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(marker, e)),
        }
    }

    /// Names (without extension) of every stored document, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.data_dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.data_dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn write(&self, json: &[u8], name: &str) -> Result<PathBuf, StoreError> {
        let path = self.path_for(name)?;
        for dir in [&self.data_dir, &self.config_dir] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        fs::write(&path, json).map_err(|e| StoreError::io(&path, e))?;

        let marker = self.config_dir.join(LAST_OPENED_FILE);
        fs::write(&marker, path.to_string_lossy().as_bytes()).map_err(|e| StoreError::io(&marker, e))?;

        info!(path = %path.display(), "flow document saved");
        Ok(path)
    }
}
