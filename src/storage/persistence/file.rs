//! Directory-backed persistence with cached append handles

use super::{PersistenceBackend, PersistenceError};
use memmap2::Mmap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// One file per key under a root directory
pub struct FileBackend {
    root: PathBuf,
    /// Sync every whole-file write before returning
    sync_writes: bool,
    /// Open append channels by key
    handles: Mutex<HashMap<String, File>>,
}

impl FileBackend {
    /// Open a backend rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>, sync_writes: bool) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            sync_writes,
            handles: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of append channels currently open
    pub fn open_handles(&self) -> usize {
        self.handles.lock().len()
    }

    /// Get the file path for a key
    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn ensure_parent(path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl PersistenceBackend for FileBackend {
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let path = self.key_path(key);
        Self::ensure_parent(&path)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.write_all(data)?;
        if self.sync_writes {
            file.sync_all()?;
        }

        Ok(())
    }

    fn append(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let mut handles = self.handles.lock();

        if !handles.contains_key(key) {
            let path = self.key_path(key);
            Self::ensure_parent(&path)?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            handles.insert(key.to_string(), file);
        }

        if let Some(file) = handles.get_mut(key) {
            file.write_all(data)?;
        }

        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let file = match File::open(self.key_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Zero-length files cannot be mapped
        if file.metadata()?.len() == 0 {
            return Ok(Some(Vec::new()));
        }

        // Safety: entry files are only ever appended to, and only by the
        // session that owns them
        let map = unsafe { Mmap::map(&file)? };
        Ok(Some(map.to_vec()))
    }

    fn size(&self, key: &str) -> Result<u64, PersistenceError> {
        match fs::metadata(self.key_path(key)) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(PersistenceError::Corrupted(format!("{} is not a file", key))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn truncate(&self, key: &str, len: u64) -> Result<(), PersistenceError> {
        let mut handles = self.handles.lock();

        // Append channels write at the end of file, so shrinking through
        // the cached handle is enough
        if let Some(file) = handles.get_mut(key) {
            file.set_len(len)?;
            return Ok(());
        }

        match OpenOptions::new().write(true).open(self.key_path(key)) {
            Ok(file) => file.set_len(len)?,
            Err(e) if e.kind() == ErrorKind::NotFound && len == 0 => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn sync(&self) -> Result<(), PersistenceError> {
        let handles = self.handles.lock();

        for file in handles.values() {
            file.sync_data()?;
        }

        Ok(())
    }

    fn release(&self) -> Result<(), PersistenceError> {
        self.sync()?;
        self.handles.lock().clear();
        Ok(())
    }
}
